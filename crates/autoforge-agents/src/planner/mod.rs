//! The planner: decomposes user requests into tasks and accepts
//! severity-gated plan revisions.

pub mod http;
pub mod parse;

use std::sync::Arc;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use autoforge_bus::{EventBus, FnHandler, SubscribeOptions};
use autoforge_events::{
    short_id, Envelope, EventPayload, EventType, PlanCreated, PlanRevision, TaskAssigned, TaskSpec,
};
use autoforge_llm::LlmProvider;
use autoforge_memory::{MemoryClient, SemanticSearchRequest};

use crate::context::{record_tokens, store_event};
use crate::error::AgentError;
use self::parse::parse_plan_response;

pub const SERVICE_NAME: &str = "meta_planner";

const PLANNING_PROMPT: &str = "You are a senior software architect. Given the following user request,
decompose it into a list of concrete development tasks.

Relevant memory from earlier plans and outcomes (may be empty):
{memory_context}

Each task must specify:
- description: what the task does
- file_path: the file to create/modify
- language: programming language

Format your response EXACTLY as:
REASONING: <1-3 sentences explaining how you decomposed the request>
TASKS:
<JSON array of objects with keys: description, file_path, language>

Do NOT include any other text after the JSON array.

User request:
{prompt}
";

/// Planner configuration, read from `AUTOFORGE_*` env vars.
#[derive(Debug, Clone)]
pub struct PlannerConfig {
    /// TTL for the plan-request idempotency cache.
    pub idem_ttl: Duration,
    /// How many semantic memories feed the planning prompt.
    pub context_limit: usize,
}

impl PlannerConfig {
    pub fn from_env() -> Self {
        PlannerConfig {
            idem_ttl: Duration::from_secs(
                std::env::var("AUTOFORGE_PLAN_IDEM_TTL_SECONDS")
                    .ok()
                    .and_then(|s| s.parse().ok())
                    .unwrap_or(30),
            ),
            context_limit: 5,
        }
    }
}

impl Default for PlannerConfig {
    fn default() -> Self {
        PlannerConfig {
            idem_ttl: Duration::from_secs(30),
            context_limit: 5,
        }
    }
}

/// Summary returned by `POST /plan`.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PlanSummary {
    pub plan_id: String,
    pub task_count: usize,
    pub tasks: Vec<TaskSpec>,
}

/// The planner service.
pub struct PlannerService {
    bus: Arc<EventBus>,
    memory: MemoryClient,
    llm: Arc<dyn LlmProvider>,
    config: PlannerConfig,
    idem_cache: DashMap<String, (PlanSummary, Instant)>,
}

impl PlannerService {
    pub fn new(
        bus: Arc<EventBus>,
        memory: MemoryClient,
        llm: Arc<dyn LlmProvider>,
        config: PlannerConfig,
    ) -> Arc<Self> {
        Arc::new(PlannerService {
            bus,
            memory,
            llm,
            config,
            idem_cache: DashMap::new(),
        })
    }

    /// Registers the planner's bus subscriptions.
    pub fn start(self: &Arc<Self>) -> Result<(), AgentError> {
        let service = Arc::clone(self);
        self.bus.subscribe(
            "meta_planner.plan_requests",
            &[EventType::PlanRequested.as_str()],
            Arc::new(FnHandler(move |event: Envelope| {
                let service = Arc::clone(&service);
                async move {
                    if let EventPayload::PlanRequested(request) = event.decode()? {
                        service
                            .plan(
                                &request.user_prompt,
                                &request.project_name,
                                &request.repo_url,
                            )
                            .await?;
                    }
                    Ok(())
                }
            })),
            SubscribeOptions::default(),
        )?;

        let service = Arc::clone(self);
        self.bus.subscribe(
            "meta_planner.revisions",
            &[
                EventType::PlanRevisionSuggested.as_str(),
                EventType::PlanRevisionConfirmed.as_str(),
            ],
            Arc::new(FnHandler(move |event: Envelope| {
                let service = Arc::clone(&service);
                async move {
                    match event.decode()? {
                        EventPayload::PlanRevisionSuggested(revision) => {
                            service.handle_revision_suggested(revision).await?;
                        }
                        EventPayload::PlanRevisionConfirmed(revision) => {
                            service.replan(revision).await?;
                        }
                        _ => {}
                    }
                    Ok(())
                }
            })),
            SubscribeOptions::default(),
        )?;

        tracing::info!("planner ready");
        Ok(())
    }

    /// Idempotent plan entry point: an identical request inside the TTL
    /// window returns the cached summary without re-executing.
    pub async fn plan(
        &self,
        prompt: &str,
        project_name: &str,
        repo_url: &str,
    ) -> Result<PlanSummary, AgentError> {
        let key = request_key(prompt, project_name, repo_url);
        if let Some(entry) = self.idem_cache.get(&key) {
            let (cached, at) = entry.value();
            if at.elapsed() < self.config.idem_ttl {
                tracing::info!(
                    plan_id = short_id(&cached.plan_id),
                    "idempotent plan request, returning cached plan"
                );
                return Ok(cached.clone());
            }
        }

        let summary = self.execute_plan(prompt, repo_url, None).await?;
        self.idem_cache
            .insert(key, (summary.clone(), Instant::now()));
        Ok(summary)
    }

    /// Decomposes a prompt and publishes `plan.created` plus one
    /// `task.assigned` per task. A forced id is used when re-planning.
    async fn execute_plan(
        &self,
        prompt: &str,
        repo_url: &str,
        forced_plan_id: Option<String>,
    ) -> Result<PlanSummary, AgentError> {
        let memory_context = self.memory_context(prompt).await;
        let llm_prompt = PLANNING_PROMPT
            .replace("{memory_context}", if memory_context.is_empty() { "None." } else { &memory_context })
            .replace("{prompt}", prompt);

        let response = self.llm.generate_text(&llm_prompt).await?;
        let outline = parse_plan_response(&response.content);

        let plan_id = forced_plan_id.unwrap_or_else(|| Uuid::new_v4().to_string());
        record_tokens(&self.memory, SERVICE_NAME, &plan_id, &response).await;

        let tasks: Vec<TaskSpec> = outline
            .tasks
            .iter()
            .map(|t| TaskSpec::new(&t.description, &t.file_path, &t.language))
            .collect();

        let plan_event = Envelope::new(
            SERVICE_NAME,
            EventPayload::PlanCreated(PlanCreated {
                plan_id: plan_id.clone(),
                original_prompt: prompt.to_string(),
                tasks: tasks.clone(),
                reasoning: outline.reasoning.clone(),
            }),
        )?;
        self.bus.publish(&plan_event).await?;
        store_event(&self.memory, &plan_event).await;

        for task in &tasks {
            let assigned = Envelope::new(
                SERVICE_NAME,
                EventPayload::TaskAssigned(TaskAssigned {
                    plan_id: plan_id.clone(),
                    task: task.clone(),
                    qa_feedback: String::new(),
                    plan_reasoning: outline.reasoning.clone(),
                    repo_url: repo_url.to_string(),
                }),
            )?;
            self.bus.publish(&assigned).await?;
            store_event(&self.memory, &assigned).await;
        }

        tracing::info!(
            plan_id = short_id(&plan_id),
            tasks = tasks.len(),
            "plan created"
        );
        Ok(PlanSummary {
            plan_id,
            task_count: tasks.len(),
            tasks,
        })
    }

    /// Severity gate for critic suggestions: high/critical replan
    /// automatically, lower severities wait for a human.
    async fn handle_revision_suggested(&self, revision: PlanRevision) -> Result<(), AgentError> {
        if !revision.severity.auto_replans() {
            tracing::info!(
                original_plan = short_id(&revision.original_plan_id),
                severity = %revision.severity,
                "revision below auto-replan threshold, ignoring"
            );
            return Ok(());
        }
        self.replan(revision).await
    }

    /// Executes a new plan under the supplied `new_plan_id`, with a prompt
    /// augmented by the revision reason and suggestions.
    async fn replan(&self, revision: PlanRevision) -> Result<(), AgentError> {
        let original = self.load_original_plan(&revision.original_plan_id).await;
        let Some((original_prompt, original_reasoning)) = original else {
            tracing::warn!(
                original_plan = short_id(&revision.original_plan_id),
                "cannot replan: original plan.created not found in memory"
            );
            return Ok(());
        };

        let repo_url = self.infer_repo_url(&revision.original_plan_id).await;

        let mut prompt = format!(
            "{original_prompt}\n\nA previous plan for this request failed and was revised.\n\
Revision reason: {}\n",
            revision.reason
        );
        if !revision.suggestions.is_empty() {
            prompt.push_str("Apply these suggestions:\n");
            for suggestion in &revision.suggestions {
                prompt.push_str(&format!("- {suggestion}\n"));
            }
        }
        if !original_reasoning.is_empty() {
            prompt.push_str(&format!(
                "\nOriginal planner reasoning (for context): {original_reasoning}\n"
            ));
        }

        tracing::info!(
            original_plan = short_id(&revision.original_plan_id),
            new_plan = short_id(&revision.new_plan_id),
            severity = %revision.severity,
            "executing revised plan"
        );
        self.execute_plan(&prompt, &repo_url, Some(revision.new_plan_id))
            .await?;
        Ok(())
    }

    async fn load_original_plan(&self, plan_id: &str) -> Option<(String, String)> {
        let events = self
            .memory
            .get_events(Some(EventType::PlanCreated.as_str()), Some(plan_id), 10)
            .await
            .ok()?;
        let row = events.first()?;
        let prompt = row
            .payload
            .get("original_prompt")
            .and_then(Value::as_str)?
            .to_string();
        let reasoning = row
            .payload
            .get("reasoning")
            .and_then(Value::as_str)
            .unwrap_or("")
            .to_string();
        Some((prompt, reasoning))
    }

    async fn infer_repo_url(&self, plan_id: &str) -> String {
        match self.memory.get_tasks(plan_id).await {
            Ok(tasks) => tasks
                .into_iter()
                .map(|t| t.repo_url)
                .find(|url| !url.is_empty())
                .unwrap_or_default(),
            Err(_) => String::new(),
        }
    }

    async fn memory_context(&self, prompt: &str) -> String {
        let results = self
            .memory
            .semantic_search(&SemanticSearchRequest {
                query: prompt.to_string(),
                plan_id: None,
                event_types: Some(vec![
                    EventType::PlanCreated.as_str().to_string(),
                    EventType::PipelineConclusion.as_str().to_string(),
                ]),
                limit: self.config.context_limit,
            })
            .await
            .unwrap_or_default();

        results
            .iter()
            .filter_map(|result| {
                let text = result.payload.get("text")?.as_str()?;
                let clipped: String = text.chars().take(300).collect();
                Some(format!("- {}", clipped.replace('\n', " ")))
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

fn request_key(prompt: &str, project_name: &str, repo_url: &str) -> String {
    let raw = format!("{prompt}|{project_name}|{repo_url}");
    format!("{:x}", Sha256::digest(raw.as_bytes()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_key_is_deterministic_and_distinct() {
        let a = request_key("p", "n", "r");
        let b = request_key("p", "n", "r");
        let c = request_key("p", "n", "other");
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
