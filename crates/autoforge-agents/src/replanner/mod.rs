//! The replanner: a read-only critic that proposes structural plan
//! revisions after QA or security failures.
//!
//! The replanner never modifies a plan itself. It emits
//! `plan.revision_suggested` with a freshly allocated `new_plan_id`; the
//! planner (severity-gated) or a human (via the gateway) decides whether
//! the revision actually runs.

pub mod critic;

use std::sync::Arc;

use uuid::Uuid;

use autoforge_bus::{EventBus, FnHandler, SubscribeOptions};
use autoforge_events::{short_id, Envelope, EventPayload, EventType, PlanRevision};
use autoforge_llm::LlmProvider;
use autoforge_memory::{MemoryClient, SemanticSearchRequest};

use crate::context::{record_tokens, store_event};
use crate::error::AgentError;
use self::critic::{analyse_outcome, FailedOutcome};

pub const SERVICE_NAME: &str = "replanner_service";

/// The replanner service.
pub struct ReplannerService {
    bus: Arc<EventBus>,
    memory: MemoryClient,
    llm: Arc<dyn LlmProvider>,
}

impl ReplannerService {
    pub fn new(bus: Arc<EventBus>, memory: MemoryClient, llm: Arc<dyn LlmProvider>) -> Arc<Self> {
        Arc::new(ReplannerService { bus, memory, llm })
    }

    pub fn start(self: &Arc<Self>) -> Result<(), AgentError> {
        let service = Arc::clone(self);
        self.bus.subscribe(
            "replanner_service.outcomes",
            &[
                EventType::QaFailed.as_str(),
                EventType::SecurityBlocked.as_str(),
            ],
            Arc::new(FnHandler(move |event: Envelope| {
                let service = Arc::clone(&service);
                async move {
                    let outcome = match event.decode()? {
                        EventPayload::QaFailed(qa) => Some(FailedOutcome::Qa(qa)),
                        EventPayload::SecurityBlocked(sec) => Some(FailedOutcome::Security(sec)),
                        _ => None,
                    };
                    if let Some(outcome) = outcome {
                        service.criticise(outcome).await?;
                    }
                    Ok(())
                }
            })),
            SubscribeOptions::default(),
        )?;
        tracing::info!("replanner ready");
        Ok(())
    }

    async fn criticise(&self, outcome: FailedOutcome) -> Result<(), AgentError> {
        let plan_id = outcome.plan_id().to_string();
        let memory_context = self.memory_context(&plan_id).await;

        let (decision, response) =
            analyse_outcome(self.llm.as_ref(), &outcome, &memory_context).await?;
        record_tokens(&self.memory, SERVICE_NAME, &plan_id, &response).await;

        if !decision.revision_needed {
            tracing::info!(
                plan_id = short_id(&plan_id),
                severity = %decision.severity,
                "no revision needed"
            );
            return Ok(());
        }

        let outcome_kind = match &outcome {
            FailedOutcome::Qa(_) => "qa_failed",
            FailedOutcome::Security(_) => "security_blocked",
        };
        let revision = PlanRevision {
            original_plan_id: plan_id.clone(),
            new_plan_id: Uuid::new_v4().to_string(),
            reason: decision.reason,
            summary: format!(
                "Replanner suggests revising plan {} after {outcome_kind}.",
                short_id(&plan_id)
            ),
            suggestions: decision.suggestions,
            severity: decision.severity,
        };

        let event = Envelope::new(
            SERVICE_NAME,
            EventPayload::PlanRevisionSuggested(revision.clone()),
        )?;
        self.bus.publish(&event).await?;
        store_event(&self.memory, &event).await;

        tracing::info!(
            original_plan = short_id(&plan_id),
            new_plan = short_id(&revision.new_plan_id),
            severity = %revision.severity,
            "plan.revision_suggested emitted"
        );
        Ok(())
    }

    /// Plan-scoped semantic context: prior conclusions, QA failures, and
    /// security blocks for this plan.
    async fn memory_context(&self, plan_id: &str) -> String {
        let results = self
            .memory
            .semantic_search(&SemanticSearchRequest {
                query: format!("Outcome summary and reasoning for plan {plan_id}"),
                plan_id: Some(plan_id.to_string()),
                event_types: Some(vec![
                    EventType::PipelineConclusion.as_str().to_string(),
                    EventType::QaFailed.as_str().to_string(),
                    EventType::SecurityBlocked.as_str().to_string(),
                ]),
                limit: 5,
            })
            .await
            .unwrap_or_default();

        results
            .iter()
            .filter_map(|result| {
                let payload = result.payload.as_object()?;
                let text: String = payload
                    .get("text")?
                    .as_str()?
                    .chars()
                    .take(400)
                    .collect::<String>()
                    .replace('\n', " ");
                let event_type = payload
                    .get("event_type")
                    .and_then(serde_json::Value::as_str)
                    .unwrap_or("");
                Some(format!(
                    "- [{event_type}] score={:.3}: {text}",
                    result.heuristic_score
                ))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}
