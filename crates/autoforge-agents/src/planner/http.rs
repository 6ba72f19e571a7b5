//! HTTP surface for the planner: `POST /plan`.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use crate::planner::{PlanSummary, PlannerService};

/// Request body for `POST /plan`.
#[derive(Debug, Deserialize)]
pub struct PlanRequestBody {
    pub prompt: String,
    #[serde(default = "PlanRequestBody::default_project")]
    pub project_name: String,
    #[serde(default)]
    pub repo_url: String,
}

impl PlanRequestBody {
    fn default_project() -> String {
        "default".to_string()
    }
}

/// Builds the planner router.
pub fn build_router(service: Arc<PlannerService>) -> Router {
    Router::new()
        .route("/plan", post(create_plan))
        .route("/health", get(health))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(service)
}

async fn create_plan(
    State(service): State<Arc<PlannerService>>,
    Json(body): Json<PlanRequestBody>,
) -> Response {
    if body.prompt.trim().is_empty() {
        return (
            StatusCode::BAD_REQUEST,
            Json(serde_json::json!({"error": "prompt must not be empty"})),
        )
            .into_response();
    }

    match service
        .plan(&body.prompt, &body.project_name, &body.repo_url)
        .await
    {
        Ok(summary) => Json::<PlanSummary>(summary).into_response(),
        Err(err) => {
            tracing::error!(%err, "plan execution failed");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(serde_json::json!({
                    "detail": "Plan execution failed",
                    "error": err.to_string(),
                })),
            )
                .into_response()
        }
    }
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({"status": "ok", "service": super::SERVICE_NAME}))
}
