//! Row types shared by the store, the HTTP surface, and the client.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One stored event, as returned by `GET /events`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventRow {
    pub event_id: String,
    pub event_type: String,
    pub producer: String,
    pub idempotency_key: String,
    pub payload: Value,
    pub plan_id: String,
    pub created_at: String,
}

/// One task's durable state, as returned by `GET /tasks/{plan_id}`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRow {
    pub task_id: String,
    pub plan_id: String,
    pub status: String,
    pub file_path: String,
    pub code: String,
    pub repo_url: String,
    pub qa_attempt: u32,
}

/// Upsert request for task state.
///
/// Empty strings leave the stored value untouched; `qa_attempt` overwrites
/// only when supplied.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskUpsert {
    pub task_id: String,
    pub plan_id: String,
    #[serde(default = "TaskUpsert::default_status")]
    pub status: String,
    #[serde(default)]
    pub file_path: String,
    #[serde(default)]
    pub code: String,
    #[serde(default)]
    pub repo_url: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub qa_attempt: Option<u32>,
}

impl TaskUpsert {
    pub fn status_only(task_id: impl Into<String>, plan_id: impl Into<String>, status: impl Into<String>) -> Self {
        TaskUpsert {
            task_id: task_id.into(),
            plan_id: plan_id.into(),
            status: status.into(),
            file_path: String::new(),
            code: String::new(),
            repo_url: String::new(),
            qa_attempt: None,
        }
    }

    fn default_status() -> String {
        "pending".to_string()
    }
}

/// One semantic search hit.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredResult {
    pub id: String,
    /// Raw vector similarity.
    pub score: f32,
    /// Similarity blended with importance, impact, recency, and frequency.
    pub heuristic_score: f32,
    pub payload: Value,
}

/// Request body for `POST /semantic/search`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SemanticSearchRequest {
    pub query: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub plan_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event_types: Option<Vec<String>>,
    #[serde(default = "SemanticSearchRequest::default_limit")]
    pub limit: usize,
}

impl SemanticSearchRequest {
    fn default_limit() -> usize {
        5
    }
}
