//! LLM adapter errors.

use thiserror::Error;

/// Errors from text-completion providers.
#[derive(Debug, Error)]
pub enum LlmError {
    /// Network-level failure talking to the provider.
    #[error("provider request failed: {0}")]
    Request(#[from] reqwest::Error),

    /// The provider answered with a non-success status.
    #[error("provider returned {status}: {body}")]
    Api { status: u16, body: String },

    /// The provider's response body did not have the expected shape.
    #[error("provider response malformed: {0}")]
    MalformedResponse(String),

    /// Provider selection failed (bad configuration).
    #[error("provider misconfigured: {0}")]
    Config(String),
}
