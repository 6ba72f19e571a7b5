//! Gateway API errors with HTTP status mapping.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

/// Errors surfaced by gateway endpoints.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// Unknown approval id or other missing entity (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Invalid request (400).
    #[error("bad request: {0}")]
    BadRequest(String),

    /// An upstream service (planner, memory) failed (502).
    #[error("upstream failure: {0}")]
    Upstream(String),

    /// Internal gateway error (500).
    #[error("internal error: {0}")]
    Internal(String),
}

impl IntoResponse for GatewayError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            GatewayError::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            GatewayError::BadRequest(_) => (StatusCode::BAD_REQUEST, "BAD_REQUEST"),
            GatewayError::Upstream(_) => (StatusCode::BAD_GATEWAY, "UPSTREAM_FAILURE"),
            GatewayError::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        };
        let body = serde_json::json!({
            "success": false,
            "error": {"code": code, "message": self.to_string()},
        });
        (status, axum::Json(body)).into_response()
    }
}
