//! The QA gate between the developer and the security stage.
//!
//! On pass it updates task state and runs the plan-readiness barrier: once
//! every task of a plan is `qa_passed`, the passed files are aggregated into
//! exactly one `pr.requested`. On fail it re-enqueues the task with feedback
//! while retries remain, then emits a single terminal `qa.failed`.

pub mod reviewer;

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::Value;

use autoforge_bus::{EventBus, FnHandler, SubscribeOptions};
use autoforge_events::{
    short_id, CodeGenerated, Envelope, EventPayload, EventType, PrRequested, QaResult,
    TaskAssigned, TaskSpec,
};
use autoforge_llm::LlmProvider;
use autoforge_memory::{MemoryClient, TaskUpsert};
use autoforge_tools::{execute_tool, python_lint_tool, ToolRegistry};

use crate::context::{record_tokens, short_term_memory, store_event};
use crate::error::AgentError;
use self::reviewer::{llm_review, static_check, ReviewResult};

pub const SERVICE_NAME: &str = "qa_service";

/// QA configuration.
#[derive(Debug, Clone)]
pub struct QaConfig {
    /// How many QA retries a task gets before `qa.failed`.
    pub max_qa_retries: u32,
    /// Short-term memory window size for reviews.
    pub memory_window: u32,
    /// Branch prefix for aggregated PR requests.
    pub branch_prefix: String,
}

impl QaConfig {
    pub fn from_env() -> Self {
        QaConfig {
            max_qa_retries: std::env::var("AUTOFORGE_MAX_QA_RETRIES")
                .ok()
                .and_then(|s| s.parse().ok())
                .unwrap_or(2),
            memory_window: 30,
            branch_prefix: "autoforge".to_string(),
        }
    }
}

impl Default for QaConfig {
    fn default() -> Self {
        QaConfig {
            max_qa_retries: 2,
            memory_window: 30,
            branch_prefix: "autoforge".to_string(),
        }
    }
}

/// The QA service.
///
/// The reasoning caches are service-local by design: the durable record
/// lives in the event log, these only feed the aggregated PR's combined
/// reasoning chain.
pub struct QaService {
    bus: Arc<EventBus>,
    memory: MemoryClient,
    llm: Arc<dyn LlmProvider>,
    tools: ToolRegistry,
    config: QaConfig,
    dev_reasoning: DashMap<String, String>,
    qa_reasoning: DashMap<String, String>,
}

impl QaService {
    pub fn new(
        bus: Arc<EventBus>,
        memory: MemoryClient,
        llm: Arc<dyn LlmProvider>,
        config: QaConfig,
    ) -> Arc<Self> {
        let tools = ToolRegistry::new();
        tools.register(python_lint_tool());
        Arc::new(QaService {
            bus,
            memory,
            llm,
            tools,
            config,
            dev_reasoning: DashMap::new(),
            qa_reasoning: DashMap::new(),
        })
    }

    pub fn start(self: &Arc<Self>) -> Result<(), AgentError> {
        let service = Arc::clone(self);
        self.bus.subscribe(
            "qa_service.code_review",
            &[EventType::CodeGenerated.as_str()],
            Arc::new(FnHandler(move |event: Envelope| {
                let service = Arc::clone(&service);
                async move {
                    if let EventPayload::CodeGenerated(generated) = event.decode()? {
                        service.review(generated).await?;
                    }
                    Ok(())
                }
            })),
            SubscribeOptions::default(),
        )?;
        tracing::info!(max_qa_retries = self.config.max_qa_retries, "QA ready");
        Ok(())
    }

    async fn review(&self, generated: CodeGenerated) -> Result<(), AgentError> {
        let task_id = generated.task_id.clone();
        let plan_id = generated.plan_id.clone();
        tracing::info!(
            task_id = short_id(&task_id),
            plan_id = short_id(&plan_id),
            qa_attempt = generated.qa_attempt,
            "reviewing code"
        );

        self.dev_reasoning
            .insert(task_id.clone(), generated.reasoning.clone());

        // Pass 1: deterministic. Any hit fails the review with machine
        // reasoning and zero LLM cost.
        let static_issues = self.static_pass(&generated).await;
        let result = if !static_issues.is_empty() {
            ReviewResult {
                passed: false,
                reasoning: format!(
                    "Static analysis detected {} issue(s) before LLM review. \
Rejecting this change until the reported issues are fixed.",
                    static_issues.len()
                ),
                issues: static_issues,
            }
        } else {
            // Pass 2: semantic review responding to the developer's
            // reasoning.
            let window =
                short_term_memory(&self.memory, &plan_id, self.config.memory_window).await;
            let (result, response) = llm_review(
                self.llm.as_ref(),
                &generated.code,
                &generated.file_path,
                &generated.language,
                &format!(
                    "Generate {} code for {}",
                    generated.language, generated.file_path
                ),
                &generated.reasoning,
                &window,
            )
            .await?;
            record_tokens(&self.memory, SERVICE_NAME, &plan_id, &response).await;
            result
        };

        self.qa_reasoning
            .insert(task_id.clone(), result.reasoning.clone());

        let qa_payload = QaResult {
            plan_id: plan_id.clone(),
            task_id: task_id.clone(),
            passed: result.passed,
            issues: result.issues.clone(),
            code: generated.code.clone(),
            file_path: generated.file_path.clone(),
            qa_attempt: generated.qa_attempt,
            reasoning: result.reasoning.clone(),
        };

        if result.passed {
            tracing::info!(task_id = short_id(&task_id), "QA PASSED");
            let event = Envelope::new(SERVICE_NAME, EventPayload::QaPassed(qa_payload))?;
            self.bus.publish(&event).await?;
            store_event(&self.memory, &event).await;

            if let Err(err) = self
                .memory
                .update_task(&TaskUpsert::status_only(&task_id, &plan_id, "qa_passed"))
                .await
            {
                tracing::error!(%err, "failed to mark task qa_passed");
            }
            self.check_plan_ready(&plan_id).await;
        } else if generated.qa_attempt < self.config.max_qa_retries {
            tracing::warn!(
                task_id = short_id(&task_id),
                attempt = generated.qa_attempt,
                issues = ?result.issues,
                "QA FAILED, re-enqueueing with feedback"
            );
            self.retry_task(&generated, &result.issues).await?;
        } else {
            tracing::error!(
                task_id = short_id(&task_id),
                "QA exhausted retries, marking qa_failed"
            );
            let event = Envelope::new(SERVICE_NAME, EventPayload::QaFailed(qa_payload))?;
            self.bus.publish(&event).await?;
            store_event(&self.memory, &event).await;

            if let Err(err) = self
                .memory
                .update_task(&TaskUpsert::status_only(&task_id, &plan_id, "qa_failed"))
                .await
            {
                tracing::error!(%err, "failed to mark task qa_failed");
            }
        }
        Ok(())
    }

    /// Static lint (Python) plus dangerous-substring scan (any language).
    async fn static_pass(&self, generated: &CodeGenerated) -> Vec<String> {
        let mut issues = static_check(&generated.code);

        if generated.language.eq_ignore_ascii_case("python") {
            let result = execute_tool(
                &self.tools,
                "python_lint",
                serde_json::json!({
                    "language": generated.language,
                    "code": generated.code,
                    "file_path": generated.file_path,
                }),
            )
            .await;
            // A missing linter is not a verdict; only real findings fail
            // the review.
            if result.success {
                if let Some(output) = result.output {
                    if output.get("supported").and_then(Value::as_bool) == Some(true) {
                        if let Some(found) = output.get("issues").and_then(Value::as_array) {
                            for issue in found {
                                let line = issue.get("line").and_then(Value::as_u64).unwrap_or(0);
                                let column =
                                    issue.get("column").and_then(Value::as_u64).unwrap_or(0);
                                let code =
                                    issue.get("code").and_then(Value::as_str).unwrap_or("");
                                let message =
                                    issue.get("message").and_then(Value::as_str).unwrap_or("");
                                issues
                                    .push(format!("[ruff {code}] L{line}:C{column} {message}"));
                            }
                        }
                    }
                }
            } else if let Some(error) = result.error {
                tracing::warn!(%error, "python_lint tool failed, skipping static lint");
            }
        }
        issues
    }

    /// Re-enqueues the task with QA feedback embedded.
    ///
    /// The task-state attempt is bumped before the retry event is published
    /// so the developer's attempt-scoped idempotency check sees the new
    /// attempt.
    async fn retry_task(
        &self,
        original: &CodeGenerated,
        issues: &[String],
    ) -> Result<(), AgentError> {
        // The attempt number keeps each retry's payload (and therefore its
        // idempotency key) distinct even when the issue list repeats.
        let feedback = format!(
            "Previous QA issues to fix (attempt {}):\n{}",
            original.qa_attempt + 1,
            issues
                .iter()
                .map(|i| format!("- {i}"))
                .collect::<Vec<_>>()
                .join("\n")
        );

        let mut bump = TaskUpsert::status_only(&original.task_id, &original.plan_id, "qa_retry");
        bump.qa_attempt = Some(original.qa_attempt + 1);
        self.memory.update_task(&bump).await?;

        let retry_spec = TaskSpec {
            task_id: original.task_id.clone(),
            description: format!(
                "Fix the following issues in {}:\n{}",
                original.file_path, feedback
            ),
            file_path: original.file_path.clone(),
            language: original.language.clone(),
        };
        let retry = Envelope::new(
            SERVICE_NAME,
            EventPayload::TaskAssigned(TaskAssigned {
                plan_id: original.plan_id.clone(),
                task: retry_spec,
                qa_feedback: feedback,
                plan_reasoning: String::new(),
                repo_url: String::new(),
            }),
        )?;
        self.bus.publish(&retry).await?;
        store_event(&self.memory, &retry).await;

        tracing::info!(
            task_id = short_id(&original.task_id),
            qa_attempt = original.qa_attempt + 1,
            "task re-enqueued to developer"
        );
        Ok(())
    }

    /// Plan-readiness barrier: when every task of the plan is `qa_passed`,
    /// aggregate the files (with their combined dev+QA reasoning) into one
    /// `pr.requested`.
    async fn check_plan_ready(&self, plan_id: &str) {
        let tasks = match self.memory.get_tasks(plan_id).await {
            Ok(tasks) => tasks,
            Err(err) => {
                tracing::error!(%err, "failed to read tasks for readiness barrier");
                return;
            }
        };
        if tasks.is_empty() || !tasks.iter().all(|t| t.status == "qa_passed") {
            return;
        }

        let repo_url = tasks
            .iter()
            .map(|t| t.repo_url.clone())
            .find(|url| !url.is_empty())
            .unwrap_or_default();

        let files: Vec<CodeGenerated> = tasks
            .iter()
            .map(|t| CodeGenerated {
                plan_id: plan_id.to_string(),
                task_id: t.task_id.clone(),
                file_path: t.file_path.clone(),
                code: t.code.clone(),
                language: "python".to_string(),
                qa_attempt: t.qa_attempt,
                reasoning: self.chain_reasoning(&t.task_id),
            })
            .collect();

        let pr = PrRequested {
            plan_id: plan_id.to_string(),
            repo_url,
            branch_name: format!("{}/plan-{}", self.config.branch_prefix, short_id(plan_id)),
            files,
            commit_message: format!("feat: implement plan {} (QA approved)", short_id(plan_id)),
            security_approved: false,
        };

        let event = match Envelope::new(SERVICE_NAME, EventPayload::PrRequested(pr)) {
            Ok(event) => event,
            Err(err) => {
                tracing::error!(%err, "failed to build pr.requested");
                return;
            }
        };
        if let Err(err) = self.bus.publish(&event).await {
            tracing::error!(%err, "failed to publish pr.requested");
            return;
        }
        store_event(&self.memory, &event).await;
        tracing::info!(
            plan_id = short_id(plan_id),
            "all tasks QA-passed, pr.requested published"
        );
    }

    /// Combined `[Developer] … / [QA Reviewer] …` chain for one task.
    fn chain_reasoning(&self, task_id: &str) -> String {
        let mut parts = Vec::new();
        if let Some(dev) = self.dev_reasoning.get(task_id) {
            if !dev.is_empty() {
                parts.push(format!("[Developer] {}", dev.value()));
            }
        }
        if let Some(qa) = self.qa_reasoning.get(task_id) {
            if !qa.is_empty() {
                parts.push(format!("[QA Reviewer] {}", qa.value()));
            }
        }
        parts.join("\n")
    }
}
