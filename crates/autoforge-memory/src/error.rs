//! Storage error types for the memory facade.

use thiserror::Error;

/// Errors produced by the structured, semantic, and cache stores.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Underlying SQLite failure.
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Schema migration failed.
    #[error("migration error: {0}")]
    Migration(String),

    /// JSON serialization or deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The event payload could not be interpreted.
    #[error("contract error: {0}")]
    Contract(#[from] autoforge_events::ContractError),
}
