//! Router assembly for the gateway.

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::handlers;
use crate::state::GatewayState;

/// Builds the gateway router: plan endpoints, read proxies, HITL approval
/// endpoints, status, and the WebSocket firehose.
pub fn build_router(state: GatewayState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/plan", post(handlers::create_plan))
        .route("/api/replan", post(handlers::replan))
        .route("/api/events", get(handlers::get_events))
        .route("/api/tasks/{plan_id}", get(handlers::get_tasks))
        .route("/api/plan_metrics/{plan_id}", get(handlers::plan_metrics))
        .route("/api/approvals", get(handlers::list_approvals))
        .route(
            "/api/approvals/{approval_id}/approve",
            post(handlers::approve_pr),
        )
        .route(
            "/api/approvals/{approval_id}/reject",
            post(handlers::reject_pr),
        )
        .route("/api/status", get(handlers::status))
        .route("/ws", get(handlers::ws_upgrade))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state)
}
