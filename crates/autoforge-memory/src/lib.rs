//! The memory facade: one HTTP surface over three logical stores.
//!
//! - A structured event log and per-task state in SQLite (WAL, migrated).
//! - A semantic vector index with a deterministic offline embedding
//!   fallback and heuristic retrieval scoring.
//! - An operational TTL cache with atomic idempotency checks.
//!
//! All cross-service reads in the pipeline go through this facade; every
//! other service holds a [`MemoryClient`].

pub mod cache;
pub mod client;
pub mod embed;
pub mod error;
pub mod rows;
pub mod schema;
pub mod server;
pub mod store;
pub mod vector;

pub use client::{ClientError, MemoryClient};
pub use embed::{Embedder, EMBEDDING_DIM};
pub use error::StorageError;
pub use rows::{EventRow, ScoredResult, SemanticSearchRequest, TaskRow, TaskUpsert};
pub use server::{build_router, AppState};
pub use store::MemoryStore;
