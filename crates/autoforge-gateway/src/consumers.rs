//! The gateway's two bus consumers: the firehose broadcaster and the HITL
//! approval interceptor.

use std::sync::Arc;

use serde_json::Value;

use autoforge_bus::{FnHandler, SubscribeOptions};
use autoforge_events::{
    short_id, Envelope, EventPayload, EventType, PipelineConclusion, PrApproval, SecurityResult,
};

use crate::error::GatewayError;
use crate::state::GatewayState;
use crate::SERVICE_NAME;

/// Registers both consumers.
pub fn start(state: &GatewayState) -> Result<(), GatewayError> {
    start_broadcaster(state)?;
    start_approval_interceptor(state)?;
    tracing::info!("gateway consumers active");
    Ok(())
}

/// Forwards every envelope on the bus to every connected WebSocket client.
fn start_broadcaster(state: &GatewayState) -> Result<(), GatewayError> {
    let ws = Arc::clone(&state.ws);
    state
        .bus
        .subscribe(
            "gateway_service.broadcast",
            &["#"],
            Arc::new(FnHandler(move |event: Envelope| {
                let ws = Arc::clone(&ws);
                async move {
                    let message = serde_json::json!({"type": "event", "event": event});
                    ws.broadcast(&message.to_string());
                    Ok(())
                }
            })),
            SubscribeOptions::default().with_max_retries(1),
        )
        .map_err(|e| GatewayError::Internal(e.to_string()))
}

/// Intercepts `security.approved`: emits the pipeline conclusion, then
/// holds the PR as a pending approval until a human decides.
fn start_approval_interceptor(state: &GatewayState) -> Result<(), GatewayError> {
    let state_for_handler = state.clone();
    state
        .bus
        .subscribe(
            "gateway_service.hitl_approvals",
            &[EventType::SecurityApproved.as_str()],
            Arc::new(FnHandler(move |event: Envelope| {
                let state = state_for_handler.clone();
                async move {
                    if let EventPayload::SecurityApproved(sec) = event.decode()? {
                        intercept_approval(&state, sec).await?;
                    }
                    Ok(())
                }
            })),
            SubscribeOptions::default().with_max_retries(1),
        )
        .map_err(|e| GatewayError::Internal(e.to_string()))
}

async fn intercept_approval(
    state: &GatewayState,
    sec: SecurityResult,
) -> Result<(), GatewayError> {
    if !sec.approved || !sec.has_pr_context() {
        return Ok(());
    }

    let files_changed: Vec<String> = sec
        .pr_context
        .get("files")
        .and_then(Value::as_array)
        .map(|files| {
            files
                .iter()
                .filter_map(|f| f.get("file_path").and_then(Value::as_str))
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default();

    let conclusion = Envelope::new(
        SERVICE_NAME,
        EventPayload::PipelineConclusion(PipelineConclusion {
            plan_id: sec.plan_id.clone(),
            branch_name: sec.branch_name.clone(),
            conclusion_text: sec.reasoning.clone(),
            files_changed,
            approved: sec.approved,
        }),
    )
    .map_err(|e| GatewayError::Internal(e.to_string()))?;
    state
        .bus
        .publish(&conclusion)
        .await
        .map_err(|e| GatewayError::Internal(e.to_string()))?;
    if let Err(err) = state.memory.store_event(&conclusion).await {
        tracing::warn!(%err, "could not store pipeline.conclusion in memory");
    }

    let approval = PrApproval::new(
        sec.plan_id.clone(),
        sec.branch_name.clone(),
        sec.files_scanned,
        sec.reasoning.clone(),
        sec.pr_context.clone(),
    );
    state
        .pending
        .insert(approval.approval_id.clone(), approval.clone());

    let pending_event = Envelope::new(
        SERVICE_NAME,
        EventPayload::PrPendingApproval(approval.clone()),
    )
    .map_err(|e| GatewayError::Internal(e.to_string()))?;
    state
        .bus
        .publish(&pending_event)
        .await
        .map_err(|e| GatewayError::Internal(e.to_string()))?;
    if let Err(err) = state.memory.store_event(&pending_event).await {
        tracing::warn!(%err, "could not store pr.pending_approval in memory");
    }

    state.ws.broadcast(
        &serde_json::json!({"type": "approval", "approval": approval}).to_string(),
    );

    tracing::info!(
        plan_id = short_id(&sec.plan_id),
        approval_id = short_id(&approval.approval_id),
        "PR approval pending, waiting for human decision"
    );
    Ok(())
}
