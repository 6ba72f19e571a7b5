//! Shared helpers for memory persistence and prompt context windows.

use autoforge_events::{short_id, Envelope, EventPayload, EventType, TokensUsed};
use autoforge_llm::LlmResponse;
use autoforge_memory::{EventRow, MemoryClient};

/// Persists an event to memory, logging and suppressing failures — the bus
/// stays the source of truth, the event has already been published.
pub async fn store_event(memory: &MemoryClient, event: &Envelope) {
    if let Err(err) = memory.store_event(event).await {
        tracing::error!(
            event_id = short_id(&event.event_id),
            %err,
            "failed to store event in memory"
        );
    }
}

/// Records LLM token usage for a plan as a `metrics.tokens_used` row.
pub async fn record_tokens(
    memory: &MemoryClient,
    service: &str,
    plan_id: &str,
    response: &LlmResponse,
) {
    if response.prompt_tokens == 0 && response.completion_tokens == 0 {
        return;
    }
    let event = match Envelope::new(
        service,
        EventPayload::MetricsTokensUsed(TokensUsed {
            plan_id: plan_id.to_string(),
            service: service.to_string(),
            prompt_tokens: response.prompt_tokens,
            completion_tokens: response.completion_tokens,
        }),
    ) {
        Ok(event) => event,
        Err(err) => {
            tracing::error!(%err, "failed to build token metrics event");
            return;
        }
    };
    store_event(memory, &event).await;
}

/// Cap on the rendered short-term memory window.
const MEMORY_WINDOW_MAX_CHARS: usize = 2000;

/// Builds a compact short-term memory window from the last `limit` events
/// of a plan. Fetch failures degrade to an empty window.
pub async fn short_term_memory(memory: &MemoryClient, plan_id: &str, limit: u32) -> String {
    let events = match memory.get_events(None, Some(plan_id), limit).await {
        Ok(events) => events,
        Err(err) => {
            tracing::warn!(
                plan_id = short_id(plan_id),
                %err,
                "failed to fetch short-term memory"
            );
            return String::new();
        }
    };

    let mut lines: Vec<String> = Vec::with_capacity(events.len());
    for event in &events {
        let mut line = format!(
            "[{}] from {} at {}",
            event.event_type, event.producer, event.created_at
        );
        if let Some(summary) = event_summary(event) {
            line.push_str(" :: ");
            line.push_str(&summary);
        }
        lines.push(line);
    }

    let mut window = lines.join("\n");
    if window.len() > MEMORY_WINDOW_MAX_CHARS {
        let mut end = MEMORY_WINDOW_MAX_CHARS;
        while end > 0 && !window.is_char_boundary(end) {
            end -= 1;
        }
        window.truncate(end);
    }
    window
}

fn event_summary(event: &EventRow) -> Option<String> {
    let payload = &event.payload;
    let clip = |s: &str| -> String { s.chars().take(200).collect() };

    match event.event_type.parse::<EventType>().ok()? {
        EventType::PlanCreated => payload
            .get("reasoning")
            .and_then(serde_json::Value::as_str)
            .map(clip),
        EventType::CodeGenerated => payload
            .get("file_path")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string),
        EventType::QaPassed
        | EventType::QaFailed
        | EventType::SecurityApproved
        | EventType::SecurityBlocked => payload
            .get("reasoning")
            .and_then(serde_json::Value::as_str)
            .map(clip),
        _ => None,
    }
}
