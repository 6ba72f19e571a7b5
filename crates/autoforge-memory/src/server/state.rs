//! Application state shared across memory-service handlers.

use std::sync::Arc;

use crate::embed::{EmbedConfig, Embedder};
use crate::error::StorageError;
use crate::store::MemoryStore;

/// Shared state for the memory HTTP server.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<MemoryStore>,
}

impl AppState {
    /// State backed by a SQLite database at `db_path`, with the embedding
    /// API taken from the environment when configured.
    pub fn new(db_path: &str) -> Result<Self, StorageError> {
        let embedder = Embedder::new(EmbedConfig::from_env());
        Ok(AppState {
            store: Arc::new(MemoryStore::new(db_path, embedder)?),
        })
    }

    /// Fully in-memory state (tests, all-in-one process).
    pub fn in_memory() -> Result<Self, StorageError> {
        Ok(AppState {
            store: Arc::new(MemoryStore::in_memory()?),
        })
    }

    /// State over an existing store (the all-in-one process shares one
    /// store between the HTTP surface and in-process callers).
    pub fn with_store(store: Arc<MemoryStore>) -> Self {
        AppState { store }
    }
}
