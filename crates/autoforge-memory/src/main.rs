//! Binary entrypoint for the memory HTTP server.
//!
//! Reads configuration from environment variables:
//! - `AUTOFORGE_MEMORY_DB_PATH`: SQLite database file path (default: "autoforge-memory.db")
//! - `AUTOFORGE_MEMORY_PORT`: listen port (default: "8001")
//! - `AUTOFORGE_EMBEDDING_API_KEY` (+ `_API_BASE_URL`, `_MODEL`): optional
//!   embeddings API; the hash fallback is used when unset.

use autoforge_memory::server::{build_router, AppState};

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();

    let db_path = std::env::var("AUTOFORGE_MEMORY_DB_PATH")
        .unwrap_or_else(|_| "autoforge-memory.db".to_string());
    let port = std::env::var("AUTOFORGE_MEMORY_PORT").unwrap_or_else(|_| "8001".to_string());

    let state = AppState::new(&db_path).expect("failed to initialize memory store");
    let app = build_router(state);

    let addr = format!("0.0.0.0:{port}");
    tracing::info!("memory service starting on {}", addr);

    let listener = tokio::net::TcpListener::bind(&addr)
        .await
        .expect("failed to bind memory service port");
    axum::serve(listener, app)
        .await
        .expect("memory service crashed");
}
