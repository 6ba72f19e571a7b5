//! Contract validation errors.

use thiserror::Error;

/// Errors produced while building or validating envelopes.
#[derive(Debug, Error)]
pub enum ContractError {
    /// The `event_type` string is not part of the closed enum.
    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    /// A required envelope field is missing or has the wrong shape.
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(String),

    /// The payload does not match the variant selected by `event_type`.
    #[error("payload does not match event type {event_type}: {reason}")]
    PayloadMismatch { event_type: String, reason: String },

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
