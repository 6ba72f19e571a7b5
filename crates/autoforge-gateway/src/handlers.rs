//! Gateway HTTP and WebSocket handlers.

use std::collections::BTreeMap;
use std::time::Instant;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Path, Query, State};
use axum::response::Response;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};
use sha2::{Digest, Sha256};
use uuid::Uuid;

use autoforge_events::{
    canonical_json, short_id, Envelope, EventPayload, PlanRevision, PrApproval, Severity,
};

use crate::error::GatewayError;
use crate::state::GatewayState;
use crate::SERVICE_NAME;

// ---------------------------------------------------------------------------
// Plan endpoints
// ---------------------------------------------------------------------------

/// `POST /api/plan` — idempotent proxy to the planner.
///
/// An identical body inside the TTL window returns the cached response
/// without contacting the planner at all.
pub async fn create_plan(
    State(state): State<GatewayState>,
    Json(body): Json<Value>,
) -> Result<Json<Value>, GatewayError> {
    let key = format!("{:x}", Sha256::digest(canonical_json(&body).as_bytes()));
    if let Some(entry) = state.plan_cache.get(&key) {
        let (cached, at) = entry.value();
        if at.elapsed() < state.config.plan_idem_ttl {
            tracing::info!("idempotent /api/plan request, returning cached response");
            return Ok(Json(cached.clone()));
        }
    }

    let response = state
        .http
        .post(format!(
            "{}/plan",
            state.config.planner_url.trim_end_matches('/')
        ))
        .json(&body)
        .send()
        .await
        .map_err(|e| GatewayError::Upstream(e.to_string()))?;

    let status = response.status();
    let value: Value = response
        .json()
        .await
        .map_err(|e| GatewayError::Upstream(format!("invalid planner response: {e}")))?;
    if !status.is_success() {
        return Err(GatewayError::Upstream(format!(
            "planner returned {status}: {value}"
        )));
    }

    state.plan_cache.insert(key, (value.clone(), Instant::now()));
    Ok(Json(value))
}

#[derive(Debug, Deserialize)]
pub struct ReplanBody {
    pub original_plan_id: String,
    #[serde(default)]
    pub new_plan_id: Option<String>,
    #[serde(default)]
    pub reason: String,
    #[serde(default)]
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub severity: Option<Severity>,
}

/// `POST /api/replan` — a human confirms a plan revision; the planner
/// executes it regardless of severity.
pub async fn replan(
    State(state): State<GatewayState>,
    Json(body): Json<ReplanBody>,
) -> Result<Json<Value>, GatewayError> {
    if body.original_plan_id.is_empty() {
        return Err(GatewayError::BadRequest(
            "original_plan_id must not be empty".to_string(),
        ));
    }
    let revision = PlanRevision {
        original_plan_id: body.original_plan_id.clone(),
        new_plan_id: body
            .new_plan_id
            .unwrap_or_else(|| Uuid::new_v4().to_string()),
        reason: body.reason,
        summary: format!(
            "Human-confirmed revision of plan {}.",
            short_id(&body.original_plan_id)
        ),
        suggestions: body.suggestions,
        severity: body.severity.unwrap_or_default(),
    };

    let event = Envelope::new(
        SERVICE_NAME,
        EventPayload::PlanRevisionConfirmed(revision.clone()),
    )
    .map_err(|e| GatewayError::Internal(e.to_string()))?;
    state
        .bus
        .publish(&event)
        .await
        .map_err(|e| GatewayError::Internal(e.to_string()))?;
    if let Err(err) = state.memory.store_event(&event).await {
        tracing::warn!(%err, "could not store plan.revision_confirmed");
    }

    Ok(Json(json!({
        "status": "confirmed",
        "new_plan_id": revision.new_plan_id,
    })))
}

// ---------------------------------------------------------------------------
// Read proxies
// ---------------------------------------------------------------------------

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

/// `GET /api/events` — proxy to memory.
pub async fn get_events(
    State(state): State<GatewayState>,
    Query(query): Query<EventsQuery>,
) -> Result<Json<Value>, GatewayError> {
    let rows = state
        .memory
        .get_events(
            query.event_type.as_deref(),
            query.plan_id.as_deref(),
            query.limit,
        )
        .await
        .map_err(|e| GatewayError::Upstream(e.to_string()))?;
    Ok(Json(serde_json::to_value(rows).unwrap_or(Value::Null)))
}

/// `GET /api/tasks/{plan_id}` — proxy to memory.
pub async fn get_tasks(
    State(state): State<GatewayState>,
    Path(plan_id): Path<String>,
) -> Result<Json<Value>, GatewayError> {
    let tasks = state
        .memory
        .get_tasks(&plan_id)
        .await
        .map_err(|e| GatewayError::Upstream(e.to_string()))?;
    Ok(Json(serde_json::to_value(tasks).unwrap_or(Value::Null)))
}

/// `GET /api/plan_metrics/{plan_id}` — aggregates `metrics.tokens_used`
/// rows into per-service and total token counts.
pub async fn plan_metrics(
    State(state): State<GatewayState>,
    Path(plan_id): Path<String>,
) -> Result<Json<Value>, GatewayError> {
    let rows = state
        .memory
        .get_events(Some("metrics.tokens_used"), Some(&plan_id), 500)
        .await
        .map_err(|e| GatewayError::Upstream(e.to_string()))?;

    let mut per_service: BTreeMap<String, (u64, u64)> = BTreeMap::new();
    for row in &rows {
        let service = row
            .payload
            .get("service")
            .and_then(Value::as_str)
            .unwrap_or("unknown")
            .to_string();
        let prompt = row
            .payload
            .get("prompt_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let completion = row
            .payload
            .get("completion_tokens")
            .and_then(Value::as_u64)
            .unwrap_or(0);
        let entry = per_service.entry(service).or_insert((0, 0));
        entry.0 += prompt;
        entry.1 += completion;
    }

    let total_prompt: u64 = per_service.values().map(|(p, _)| p).sum();
    let total_completion: u64 = per_service.values().map(|(_, c)| c).sum();
    let services: BTreeMap<String, Value> = per_service
        .into_iter()
        .map(|(service, (prompt, completion))| {
            (
                service,
                json!({"prompt_tokens": prompt, "completion_tokens": completion}),
            )
        })
        .collect();

    Ok(Json(json!({
        "plan_id": plan_id,
        "total_prompt_tokens": total_prompt,
        "total_completion_tokens": total_completion,
        "services": services,
    })))
}

// ---------------------------------------------------------------------------
// HITL approvals
// ---------------------------------------------------------------------------

/// `GET /api/approvals` — all pending human approvals.
pub async fn list_approvals(State(state): State<GatewayState>) -> Json<Value> {
    let pending: Vec<PrApproval> = state.pending.iter().map(|e| e.value().clone()).collect();
    Json(json!({"pending": pending, "count": pending.len()}))
}

/// `POST /api/approvals/{approval_id}/approve`.
pub async fn approve_pr(
    State(state): State<GatewayState>,
    Path(approval_id): Path<String>,
) -> Result<Json<Value>, GatewayError> {
    decide(&state, &approval_id, true).await
}

/// `POST /api/approvals/{approval_id}/reject`.
pub async fn reject_pr(
    State(state): State<GatewayState>,
    Path(approval_id): Path<String>,
) -> Result<Json<Value>, GatewayError> {
    decide(&state, &approval_id, false).await
}

async fn decide(
    state: &GatewayState,
    approval_id: &str,
    approved: bool,
) -> Result<Json<Value>, GatewayError> {
    let Some((_, mut approval)) = state.pending.remove(approval_id) else {
        return Err(GatewayError::NotFound(format!(
            "approval {approval_id} not found or already decided"
        )));
    };

    approval.decision = if approved { "approved" } else { "rejected" }.to_string();

    let payload = if approved {
        EventPayload::PrHumanApproved(approval.clone())
    } else {
        EventPayload::PrHumanRejected(approval.clone())
    };
    let event =
        Envelope::new(SERVICE_NAME, payload).map_err(|e| GatewayError::Internal(e.to_string()))?;
    state
        .bus
        .publish(&event)
        .await
        .map_err(|e| GatewayError::Internal(e.to_string()))?;
    if let Err(err) = state.memory.store_event(&event).await {
        tracing::warn!(%err, "could not store human decision event");
    }

    state.ws.broadcast(
        &json!({"type": "approval_decided", "approval": approval}).to_string(),
    );
    state
        .ws
        .broadcast(&json!({"type": "event", "event": event}).to_string());

    tracing::info!(
        plan_id = short_id(&approval.plan_id),
        approval_id = short_id(approval_id),
        decision = %approval.decision,
        "human decision recorded"
    );
    Ok(Json(json!({
        "status": approval.decision,
        "plan_id": approval.plan_id,
    })))
}

// ---------------------------------------------------------------------------
// Status + WebSocket
// ---------------------------------------------------------------------------

/// `GET /api/status`.
pub async fn status(State(state): State<GatewayState>) -> Json<Value> {
    Json(json!({
        "service": SERVICE_NAME,
        "ws_connections": state.ws.connection_count(),
        "pending_approvals": state.pending.len(),
    }))
}

/// `GET /health`.
pub async fn health() -> Json<Value> {
    Json(json!({"status": "ok", "service": SERVICE_NAME}))
}

/// `WS /ws` — upgrade, replay history and pending approvals, then stream.
pub async fn ws_upgrade(
    State(state): State<GatewayState>,
    upgrade: WebSocketUpgrade,
) -> Response {
    upgrade.on_upgrade(move |socket| handle_socket(state, socket))
}

async fn handle_socket(state: GatewayState, mut socket: WebSocket) {
    // History first (oldest of the window first), then the pending set.
    if let Ok(events) = state
        .memory
        .get_events(None, None, state.config.history_limit)
        .await
    {
        for event in events.iter().rev() {
            let message = json!({"type": "history", "event": event}).to_string();
            if socket.send(Message::Text(message.into())).await.is_err() {
                return;
            }
        }
    } else {
        tracing::warn!("could not fetch history for new WebSocket client");
    }

    for entry in state.pending.iter() {
        let message = json!({"type": "approval", "approval": entry.value()}).to_string();
        if socket.send(Message::Text(message.into())).await.is_err() {
            return;
        }
    }

    let (client_id, mut outbound) = state.ws.connect();
    loop {
        tokio::select! {
            message = outbound.recv() => {
                match message {
                    Some(text) => {
                        if socket.send(Message::Text(text.into())).await.is_err() {
                            break;
                        }
                    }
                    None => break,
                }
            }
            incoming = socket.recv() => {
                match incoming {
                    // Client messages are ignored; the socket is one-way.
                    Some(Ok(_)) => {}
                    _ => break,
                }
            }
        }
    }
    state.ws.disconnect(client_id);
}
