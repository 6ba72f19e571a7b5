//! Bus error types.

use thiserror::Error;

use autoforge_events::ContractError;

/// Errors produced by broker and bus operations.
#[derive(Debug, Error)]
pub enum BusError {
    /// Publish targeted an exchange that was never declared.
    #[error("unknown exchange: {0}")]
    UnknownExchange(String),

    /// A queue referenced by name does not exist.
    #[error("unknown queue: {0}")]
    UnknownQueue(String),

    /// The queue's channel is closed (broker shut down).
    #[error("queue closed: {0}")]
    QueueClosed(String),

    /// A subscription with this queue name is already consuming.
    #[error("queue already has a subscription: {0}")]
    AlreadySubscribed(String),

    /// Envelope serialization failed before publish.
    #[error(transparent)]
    Contract(#[from] ContractError),
}
