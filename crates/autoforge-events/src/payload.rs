//! Typed payloads for each event type.
//!
//! The wire envelope carries the payload as plain JSON; [`EventPayload`] is
//! the tagged union a consumer gets back from [`crate::Envelope::decode`],
//! keyed by the envelope's `event_type`. Several event types share one
//! payload shape (QA pass/fail, security approve/block, the three approval
//! stages, the two revision stages).

use serde::{Deserialize, Serialize};
use serde_json::Value;
use uuid::Uuid;

use crate::error::ContractError;
use crate::types::{EventType, Severity};

fn empty_object() -> Value {
    Value::Object(serde_json::Map::new())
}

/// A single unit of work inside a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    pub task_id: String,
    pub description: String,
    pub file_path: String,
    #[serde(default = "TaskSpec::default_language")]
    pub language: String,
}

impl TaskSpec {
    pub fn new(description: impl Into<String>, file_path: impl Into<String>, language: impl Into<String>) -> Self {
        TaskSpec {
            task_id: Uuid::new_v4().to_string(),
            description: description.into(),
            file_path: file_path.into(),
            language: language.into(),
        }
    }

    fn default_language() -> String {
        "python".to_string()
    }
}

/// `plan.requested` — a user asked for a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRequested {
    pub user_prompt: String,
    pub project_name: String,
    #[serde(default)]
    pub repo_url: String,
}

/// `plan.created` — the planner decomposed a request into tasks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanCreated {
    pub plan_id: String,
    pub original_prompt: String,
    pub tasks: Vec<TaskSpec>,
    #[serde(default)]
    pub reasoning: String,
}

/// `task.assigned` — one task handed to the developer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskAssigned {
    pub plan_id: String,
    pub task: TaskSpec,
    #[serde(default)]
    pub qa_feedback: String,
    #[serde(default)]
    pub plan_reasoning: String,
    #[serde(default)]
    pub repo_url: String,
}

/// `code.generated` — the developer produced code for one task.
///
/// Also embedded in `pr.requested` as the aggregated file set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CodeGenerated {
    pub plan_id: String,
    pub task_id: String,
    pub file_path: String,
    pub code: String,
    #[serde(default = "TaskSpec::default_language")]
    pub language: String,
    #[serde(default)]
    pub qa_attempt: u32,
    #[serde(default)]
    pub reasoning: String,
}

/// `qa.passed` / `qa.failed` — outcome of reviewing one task's code.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QaResult {
    pub plan_id: String,
    pub task_id: String,
    pub passed: bool,
    pub issues: Vec<String>,
    pub code: String,
    pub file_path: String,
    pub qa_attempt: u32,
    #[serde(default)]
    pub reasoning: String,
}

/// `pr.requested` — all tasks of a plan passed QA; one aggregated PR.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrRequested {
    pub plan_id: String,
    #[serde(default)]
    pub repo_url: String,
    pub branch_name: String,
    pub files: Vec<CodeGenerated>,
    pub commit_message: String,
    #[serde(default)]
    pub security_approved: bool,
}

/// `security.approved` / `security.blocked` — verdict over the aggregated
/// PR file set. `pr_context` carries the original `pr.requested` payload
/// when approved and stays empty when blocked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SecurityResult {
    pub plan_id: String,
    pub branch_name: String,
    pub approved: bool,
    pub violations: Vec<String>,
    pub files_scanned: u32,
    #[serde(default = "empty_object")]
    pub pr_context: Value,
    #[serde(default)]
    pub reasoning: String,
}

impl SecurityResult {
    /// Whether `pr_context` actually carries a PR payload.
    pub fn has_pr_context(&self) -> bool {
        self.pr_context.as_object().is_some_and(|m| !m.is_empty())
    }
}

/// `pr.pending_approval` / `pr.human_approved` / `pr.human_rejected` —
/// a PR held for (and then decided by) a human.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrApproval {
    pub approval_id: String,
    pub plan_id: String,
    pub branch_name: String,
    pub files_count: u32,
    #[serde(default)]
    pub security_reasoning: String,
    #[serde(default = "empty_object")]
    pub pr_context: Value,
    #[serde(default)]
    pub decision: String,
}

impl PrApproval {
    pub fn new(
        plan_id: impl Into<String>,
        branch_name: impl Into<String>,
        files_count: u32,
        security_reasoning: impl Into<String>,
        pr_context: Value,
    ) -> Self {
        PrApproval {
            approval_id: Uuid::new_v4().to_string(),
            plan_id: plan_id.into(),
            branch_name: branch_name.into(),
            files_count,
            security_reasoning: security_reasoning.into(),
            pr_context,
            decision: String::new(),
        }
    }
}

/// `pr.created` — the source-control executor materialized the PR.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PrCreated {
    pub plan_id: String,
    pub pr_url: String,
    pub pr_number: u64,
    pub branch_name: String,
}

/// `pipeline.conclusion` — the final human-readable summary for a plan.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConclusion {
    pub plan_id: String,
    pub branch_name: String,
    pub conclusion_text: String,
    pub files_changed: Vec<String>,
    pub approved: bool,
}

/// `plan.revision_suggested` / `plan.revision_confirmed` — the critic's
/// structural suggestions, linking the original plan to a pre-allocated
/// replacement id.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlanRevision {
    pub original_plan_id: String,
    pub new_plan_id: String,
    pub reason: String,
    #[serde(default)]
    pub summary: String,
    pub suggestions: Vec<String>,
    #[serde(default)]
    pub severity: Severity,
}

/// `metrics.tokens_used` — LLM token accounting, persisted per call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokensUsed {
    pub plan_id: String,
    pub service: String,
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
}

/// The typed payload union, keyed by [`EventType`].
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    PlanRequested(PlanRequested),
    PlanCreated(PlanCreated),
    PlanRevisionSuggested(PlanRevision),
    PlanRevisionConfirmed(PlanRevision),
    TaskAssigned(TaskAssigned),
    CodeGenerated(CodeGenerated),
    QaPassed(QaResult),
    QaFailed(QaResult),
    PrRequested(PrRequested),
    SecurityApproved(SecurityResult),
    SecurityBlocked(SecurityResult),
    PrPendingApproval(PrApproval),
    PrHumanApproved(PrApproval),
    PrHumanRejected(PrApproval),
    PrCreated(PrCreated),
    PipelineConclusion(PipelineConclusion),
    MemoryStore(Value),
    MemoryQuery(Value),
    MetricsTokensUsed(TokensUsed),
}

impl EventPayload {
    /// The event type this payload variant belongs to.
    pub fn event_type(&self) -> EventType {
        match self {
            EventPayload::PlanRequested(_) => EventType::PlanRequested,
            EventPayload::PlanCreated(_) => EventType::PlanCreated,
            EventPayload::PlanRevisionSuggested(_) => EventType::PlanRevisionSuggested,
            EventPayload::PlanRevisionConfirmed(_) => EventType::PlanRevisionConfirmed,
            EventPayload::TaskAssigned(_) => EventType::TaskAssigned,
            EventPayload::CodeGenerated(_) => EventType::CodeGenerated,
            EventPayload::QaPassed(_) => EventType::QaPassed,
            EventPayload::QaFailed(_) => EventType::QaFailed,
            EventPayload::PrRequested(_) => EventType::PrRequested,
            EventPayload::SecurityApproved(_) => EventType::SecurityApproved,
            EventPayload::SecurityBlocked(_) => EventType::SecurityBlocked,
            EventPayload::PrPendingApproval(_) => EventType::PrPendingApproval,
            EventPayload::PrHumanApproved(_) => EventType::PrHumanApproved,
            EventPayload::PrHumanRejected(_) => EventType::PrHumanRejected,
            EventPayload::PrCreated(_) => EventType::PrCreated,
            EventPayload::PipelineConclusion(_) => EventType::PipelineConclusion,
            EventPayload::MemoryStore(_) => EventType::MemoryStore,
            EventPayload::MemoryQuery(_) => EventType::MemoryQuery,
            EventPayload::MetricsTokensUsed(_) => EventType::MetricsTokensUsed,
        }
    }

    /// Serializes the payload into its wire JSON value.
    pub fn to_value(&self) -> Result<Value, ContractError> {
        let value = match self {
            EventPayload::PlanRequested(p) => serde_json::to_value(p)?,
            EventPayload::PlanCreated(p) => serde_json::to_value(p)?,
            EventPayload::PlanRevisionSuggested(p) => serde_json::to_value(p)?,
            EventPayload::PlanRevisionConfirmed(p) => serde_json::to_value(p)?,
            EventPayload::TaskAssigned(p) => serde_json::to_value(p)?,
            EventPayload::CodeGenerated(p) => serde_json::to_value(p)?,
            EventPayload::QaPassed(p) => serde_json::to_value(p)?,
            EventPayload::QaFailed(p) => serde_json::to_value(p)?,
            EventPayload::PrRequested(p) => serde_json::to_value(p)?,
            EventPayload::SecurityApproved(p) => serde_json::to_value(p)?,
            EventPayload::SecurityBlocked(p) => serde_json::to_value(p)?,
            EventPayload::PrPendingApproval(p) => serde_json::to_value(p)?,
            EventPayload::PrHumanApproved(p) => serde_json::to_value(p)?,
            EventPayload::PrHumanRejected(p) => serde_json::to_value(p)?,
            EventPayload::PrCreated(p) => serde_json::to_value(p)?,
            EventPayload::PipelineConclusion(p) => serde_json::to_value(p)?,
            EventPayload::MemoryStore(v) | EventPayload::MemoryQuery(v) => v.clone(),
            EventPayload::MetricsTokensUsed(p) => serde_json::to_value(p)?,
        };
        Ok(value)
    }

    /// Decodes a wire payload into the variant selected by `event_type`.
    pub fn decode(event_type: EventType, payload: &Value) -> Result<EventPayload, ContractError> {
        fn typed<T: serde::de::DeserializeOwned>(
            event_type: EventType,
            payload: &Value,
        ) -> Result<T, ContractError> {
            serde_json::from_value(payload.clone()).map_err(|e| ContractError::PayloadMismatch {
                event_type: event_type.as_str().to_string(),
                reason: e.to_string(),
            })
        }

        Ok(match event_type {
            EventType::PlanRequested => {
                EventPayload::PlanRequested(typed(event_type, payload)?)
            }
            EventType::PlanCreated => EventPayload::PlanCreated(typed(event_type, payload)?),
            EventType::PlanRevisionSuggested => {
                EventPayload::PlanRevisionSuggested(typed(event_type, payload)?)
            }
            EventType::PlanRevisionConfirmed => {
                EventPayload::PlanRevisionConfirmed(typed(event_type, payload)?)
            }
            EventType::TaskAssigned => EventPayload::TaskAssigned(typed(event_type, payload)?),
            EventType::CodeGenerated => EventPayload::CodeGenerated(typed(event_type, payload)?),
            EventType::QaPassed => EventPayload::QaPassed(typed(event_type, payload)?),
            EventType::QaFailed => EventPayload::QaFailed(typed(event_type, payload)?),
            EventType::PrRequested => EventPayload::PrRequested(typed(event_type, payload)?),
            EventType::SecurityApproved => {
                EventPayload::SecurityApproved(typed(event_type, payload)?)
            }
            EventType::SecurityBlocked => {
                EventPayload::SecurityBlocked(typed(event_type, payload)?)
            }
            EventType::PrPendingApproval => {
                EventPayload::PrPendingApproval(typed(event_type, payload)?)
            }
            EventType::PrHumanApproved => {
                EventPayload::PrHumanApproved(typed(event_type, payload)?)
            }
            EventType::PrHumanRejected => {
                EventPayload::PrHumanRejected(typed(event_type, payload)?)
            }
            EventType::PrCreated => EventPayload::PrCreated(typed(event_type, payload)?),
            EventType::PipelineConclusion => {
                EventPayload::PipelineConclusion(typed(event_type, payload)?)
            }
            EventType::MemoryStore => EventPayload::MemoryStore(payload.clone()),
            EventType::MemoryQuery => EventPayload::MemoryQuery(payload.clone()),
            EventType::MetricsTokensUsed => {
                EventPayload::MetricsTokensUsed(typed(event_type, payload)?)
            }
        })
    }

    /// The `plan_id` embedded in the payload, when the variant carries one.
    ///
    /// `plan.revision_*` events report the original plan's id so the event
    /// log groups the revision with the plan it criticises.
    pub fn plan_id(&self) -> Option<&str> {
        match self {
            EventPayload::PlanRequested(_) => None,
            EventPayload::PlanCreated(p) => Some(&p.plan_id),
            EventPayload::PlanRevisionSuggested(p) | EventPayload::PlanRevisionConfirmed(p) => {
                Some(&p.original_plan_id)
            }
            EventPayload::TaskAssigned(p) => Some(&p.plan_id),
            EventPayload::CodeGenerated(p) => Some(&p.plan_id),
            EventPayload::QaPassed(p) | EventPayload::QaFailed(p) => Some(&p.plan_id),
            EventPayload::PrRequested(p) => Some(&p.plan_id),
            EventPayload::SecurityApproved(p) | EventPayload::SecurityBlocked(p) => {
                Some(&p.plan_id)
            }
            EventPayload::PrPendingApproval(p)
            | EventPayload::PrHumanApproved(p)
            | EventPayload::PrHumanRejected(p) => Some(&p.plan_id),
            EventPayload::PrCreated(p) => Some(&p.plan_id),
            EventPayload::PipelineConclusion(p) => Some(&p.plan_id),
            EventPayload::MemoryStore(v) | EventPayload::MemoryQuery(v) => {
                v.get("plan_id").and_then(Value::as_str)
            }
            EventPayload::MetricsTokensUsed(p) => Some(&p.plan_id),
        }
    }
}
