//! Router assembly for the memory HTTP API.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::server::handlers;
use crate::server::state::AppState;

/// Builds the complete axum router with all memory routes.
///
/// CORS is permissive (every service in the pipeline calls this surface);
/// TraceLayer provides request-level logging via tracing.
pub fn build_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route(
            "/events",
            get(handlers::list_events).post(handlers::store_event),
        )
        .route("/tasks", post(handlers::update_task))
        .route("/tasks/{plan_id}", get(handlers::get_tasks))
        .route("/semantic/search", post(handlers::semantic_search))
        .route("/cache", post(handlers::cache_set))
        .route("/cache/{key}", get(handlers::cache_get))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
