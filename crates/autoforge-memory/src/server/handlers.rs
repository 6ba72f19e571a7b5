//! Handler functions for the memory HTTP API.

use std::time::Duration;

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use autoforge_events::Envelope;

use crate::rows::{EventRow, ScoredResult, SemanticSearchRequest, TaskRow, TaskUpsert};
use crate::server::error::ApiError;
use crate::server::state::AppState;

#[derive(Debug, Serialize)]
pub struct StoreEventResponse {
    pub stored: bool,
    pub event_id: String,
}

/// `POST /events` — body is a raw envelope; returns whether it was new.
pub async fn store_event(
    State(state): State<AppState>,
    Json(raw): Json<Value>,
) -> Result<Json<StoreEventResponse>, ApiError> {
    let envelope = Envelope::validate(raw)?;
    let stored = state.store.store_event(&envelope).await?;
    Ok(Json(StoreEventResponse {
        stored,
        event_id: envelope.event_id,
    }))
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    pub event_type: Option<String>,
    pub plan_id: Option<String>,
    #[serde(default = "EventsQuery::default_limit")]
    pub limit: u32,
}

impl EventsQuery {
    fn default_limit() -> u32 {
        50
    }
}

/// `GET /events?event_type=&plan_id=&limit=` — most-recent-first rows.
pub async fn list_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<Vec<EventRow>>, ApiError> {
    let rows = state.store.get_events(
        query.event_type.as_deref(),
        query.plan_id.as_deref(),
        query.limit,
    )?;
    Ok(Json(rows))
}

#[derive(Debug, Serialize)]
pub struct UpdateTaskResponse {
    pub updated: bool,
    pub task_id: String,
}

/// `POST /tasks` — task state upsert.
pub async fn update_task(
    State(state): State<AppState>,
    Json(upsert): Json<TaskUpsert>,
) -> Result<Json<UpdateTaskResponse>, ApiError> {
    if upsert.task_id.is_empty() {
        return Err(ApiError::BadRequest("task_id must not be empty".into()));
    }
    state.store.update_task(&upsert)?;
    Ok(Json(UpdateTaskResponse {
        updated: true,
        task_id: upsert.task_id,
    }))
}

/// `GET /tasks/{plan_id}` — all task rows for a plan.
pub async fn get_tasks(
    State(state): State<AppState>,
    Path(plan_id): Path<String>,
) -> Result<Json<Vec<TaskRow>>, ApiError> {
    Ok(Json(state.store.get_tasks(&plan_id)?))
}

#[derive(Debug, Serialize)]
pub struct SemanticSearchResponse {
    pub results: Vec<ScoredResult>,
}

/// `POST /semantic/search` — heuristic-ranked retrieval.
pub async fn semantic_search(
    State(state): State<AppState>,
    Json(request): Json<SemanticSearchRequest>,
) -> Result<Json<SemanticSearchResponse>, ApiError> {
    let results = state.store.semantic_search(&request).await;
    Ok(Json(SemanticSearchResponse { results }))
}

#[derive(Debug, Deserialize)]
pub struct CacheSetRequest {
    pub key: String,
    pub value: String,
    #[serde(default = "CacheSetRequest::default_ttl")]
    pub ttl: u64,
}

impl CacheSetRequest {
    fn default_ttl() -> u64 {
        3600
    }
}

/// `POST /cache` — operational KV set with TTL seconds.
pub async fn cache_set(
    State(state): State<AppState>,
    Json(request): Json<CacheSetRequest>,
) -> Result<Json<Value>, ApiError> {
    state
        .store
        .cache_set(&request.key, &request.value, Duration::from_secs(request.ttl));
    Ok(Json(serde_json::json!({"cached": true})))
}

/// `GET /cache/{key}` — 404 on miss.
pub async fn cache_get(
    State(state): State<AppState>,
    Path(key): Path<String>,
) -> Result<Json<Value>, ApiError> {
    match state.store.cache_get(&key) {
        Some(value) => Ok(Json(serde_json::json!({"key": key, "value": value}))),
        None => Err(ApiError::NotFound(format!("key not found: {key}"))),
    }
}

/// `GET /health`.
pub async fn health(State(state): State<AppState>) -> Json<Value> {
    Json(serde_json::json!({
        "status": "ok",
        "service": "memory_service",
        "indexed_points": state.store.indexed_points(),
    }))
}
