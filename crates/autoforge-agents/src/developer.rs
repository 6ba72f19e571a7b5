//! The developer: implements one task, emitting code plus rationale.

use std::path::PathBuf;
use std::sync::Arc;

use serde_json::Value;

use autoforge_bus::{EventBus, FnHandler, SubscribeOptions};
use autoforge_events::{
    short_id, CodeGenerated, Envelope, EventPayload, EventType, TaskAssigned,
};
use autoforge_llm::LlmProvider;
use autoforge_memory::{MemoryClient, TaskUpsert};
use autoforge_tools::{execute_tool, read_file_tool, ToolRegistry};

use crate::context::{record_tokens, short_term_memory, store_event};
use crate::error::AgentError;

pub const SERVICE_NAME: &str = "dev_service";

const CODE_GEN_PROMPT: &str = "You are an expert {language} developer in an autonomous pipeline.

The plan architect's reasoning for this plan (may be empty):
{plan_reasoning}

Recent events for this plan (short-term memory, may be empty):
{short_term_memory}

Write production-quality code for the following task:
{description}

The code should be written for file: {file_path}
{qa_feedback}
Format your response EXACTLY as:
REASONING: <2-3 sentences explaining your implementation choices>
CODE:
<the complete file contents, no markdown fences>
";

/// Developer configuration.
#[derive(Debug, Clone)]
pub struct DeveloperConfig {
    /// Sandbox root for the `read_file` tool.
    pub workspace_root: PathBuf,
    /// Short-term memory window size.
    pub memory_window: u32,
}

impl DeveloperConfig {
    pub fn from_env() -> Self {
        DeveloperConfig {
            workspace_root: std::env::var("AUTOFORGE_WORKSPACE_ROOT")
                .unwrap_or_else(|_| "./workspace".to_string())
                .into(),
            memory_window: 30,
        }
    }
}

/// The developer service.
pub struct DeveloperService {
    bus: Arc<EventBus>,
    memory: MemoryClient,
    llm: Arc<dyn LlmProvider>,
    tools: ToolRegistry,
    config: DeveloperConfig,
}

impl DeveloperService {
    pub fn new(
        bus: Arc<EventBus>,
        memory: MemoryClient,
        llm: Arc<dyn LlmProvider>,
        config: DeveloperConfig,
    ) -> Arc<Self> {
        let tools = ToolRegistry::new();
        tools.register(read_file_tool(config.workspace_root.clone()));
        Arc::new(DeveloperService {
            bus,
            memory,
            llm,
            tools,
            config,
        })
    }

    pub fn start(self: &Arc<Self>) -> Result<(), AgentError> {
        let service = Arc::clone(self);
        self.bus.subscribe(
            "dev_service.tasks",
            &[EventType::TaskAssigned.as_str()],
            Arc::new(FnHandler(move |event: Envelope| {
                let service = Arc::clone(&service);
                async move {
                    if let EventPayload::TaskAssigned(assigned) = event.decode()? {
                        service.handle_task(assigned).await?;
                    }
                    Ok(())
                }
            })),
            SubscribeOptions::default(),
        )?;
        tracing::info!("developer ready");
        Ok(())
    }

    async fn handle_task(&self, assigned: TaskAssigned) -> Result<(), AgentError> {
        let task = &assigned.task;
        let plan_id = &assigned.plan_id;

        // The QA stage owns qa_attempt; read the current value from task
        // state so retried generations are stamped correctly.
        let current_attempt = self
            .memory
            .get_tasks(plan_id)
            .await
            .unwrap_or_default()
            .into_iter()
            .find(|t| t.task_id == task.task_id)
            .map(|t| t.qa_attempt)
            .unwrap_or(0);

        if self.already_generated(plan_id, &task.task_id, current_attempt).await {
            tracing::info!(
                task_id = short_id(&task.task_id),
                attempt = current_attempt,
                "task already has code.generated for this attempt, skipping"
            );
            return Ok(());
        }

        tracing::info!(
            task_id = short_id(&task.task_id),
            plan_id = short_id(plan_id),
            qa_feedback = !assigned.qa_feedback.is_empty(),
            "processing task"
        );

        if let Err(err) = self
            .memory
            .update_task(&TaskUpsert::status_only(
                &task.task_id,
                plan_id,
                "in_progress",
            ))
            .await
        {
            tracing::error!(%err, "failed to mark task in_progress");
        }

        let window = short_term_memory(&self.memory, plan_id, self.config.memory_window).await;
        let preview = self.existing_file_preview(&task.file_path).await;
        let combined_window = [window, preview]
            .into_iter()
            .filter(|s| !s.is_empty())
            .collect::<Vec<_>>()
            .join("\n");

        let qa_feedback_block = if assigned.qa_feedback.is_empty() {
            String::new()
        } else {
            format!(
                "\nA previous attempt failed QA review. You MUST address this feedback:\n{}\n",
                assigned.qa_feedback
            )
        };

        let prompt = CODE_GEN_PROMPT
            .replace("{language}", &task.language)
            .replace(
                "{plan_reasoning}",
                if assigned.plan_reasoning.is_empty() {
                    "None."
                } else {
                    &assigned.plan_reasoning
                },
            )
            .replace(
                "{short_term_memory}",
                if combined_window.is_empty() {
                    "None."
                } else {
                    &combined_window
                },
            )
            .replace("{description}", &task.description)
            .replace("{file_path}", &task.file_path)
            .replace("{qa_feedback}", &qa_feedback_block);

        let response = self.llm.generate_text(&prompt).await?;
        record_tokens(&self.memory, SERVICE_NAME, plan_id, &response).await;
        let (reasoning, code) = parse_code_response(&response.content);

        let generated = Envelope::new(
            SERVICE_NAME,
            EventPayload::CodeGenerated(CodeGenerated {
                plan_id: plan_id.clone(),
                task_id: task.task_id.clone(),
                file_path: task.file_path.clone(),
                code: code.clone(),
                language: task.language.clone(),
                qa_attempt: current_attempt,
                reasoning,
            }),
        )?;
        self.bus.publish(&generated).await?;
        store_event(&self.memory, &generated).await;

        if let Err(err) = self
            .memory
            .update_task(&TaskUpsert {
                task_id: task.task_id.clone(),
                plan_id: plan_id.clone(),
                status: "completed".to_string(),
                file_path: task.file_path.clone(),
                code,
                repo_url: assigned.repo_url.clone(),
                qa_attempt: None,
            })
            .await
        {
            tracing::error!(%err, "failed to mark task completed");
        }

        tracing::info!(
            task_id = short_id(&task.task_id),
            "code generated, forwarded to QA"
        );
        Ok(())
    }

    /// Idempotent pre-check: a `code.generated` for this task at the same
    /// attempt means a crash-redelivery; skip instead of regenerating.
    async fn already_generated(&self, plan_id: &str, task_id: &str, attempt: u32) -> bool {
        let events = match self
            .memory
            .get_events(Some(EventType::CodeGenerated.as_str()), Some(plan_id), 100)
            .await
        {
            Ok(events) => events,
            Err(_) => return false,
        };
        events.iter().any(|event| {
            event.payload.get("task_id").and_then(Value::as_str) == Some(task_id)
                && event
                    .payload
                    .get("qa_attempt")
                    .and_then(Value::as_u64)
                    .unwrap_or(0) as u32
                    == attempt
        })
    }

    /// Best-effort preview of the target file through the sandboxed
    /// `read_file` tool.
    async fn existing_file_preview(&self, file_path: &str) -> String {
        if file_path.trim().is_empty() {
            return String::new();
        }
        let result = execute_tool(
            &self.tools,
            "read_file",
            serde_json::json!({"path": file_path, "max_bytes": 4000}),
        )
        .await;
        if !result.success {
            return String::new();
        }
        let Some(output) = result.output else {
            return String::new();
        };
        if output.get("exists").and_then(Value::as_bool) != Some(true) {
            return String::new();
        }
        match output.get("content").and_then(Value::as_str) {
            Some(content) if !content.trim().is_empty() => {
                format!("Existing contents of {file_path}:\n{content}")
            }
            _ => String::new(),
        }
    }
}

/// Splits a `REASONING:` / `CODE:` response. A response without markers is
/// treated as bare code; fences are stripped either way.
pub fn parse_code_response(raw: &str) -> (String, String) {
    let mut reasoning = String::new();
    let mut code_lines: Vec<&str> = Vec::new();
    let mut in_code = false;
    let mut saw_marker = false;

    for line in raw.lines() {
        let stripped = line.trim();
        let upper = stripped.to_ascii_uppercase();
        if let Some(rest) = upper.strip_prefix("REASONING:") {
            let offset = stripped.len() - rest.len();
            reasoning = stripped[offset..].trim().to_string();
            in_code = false;
            saw_marker = true;
        } else if upper.starts_with("CODE:") {
            in_code = true;
            saw_marker = true;
            let inline = stripped["CODE:".len()..].trim();
            if !inline.is_empty() {
                code_lines.push(inline);
            }
        } else if in_code {
            code_lines.push(line);
        }
    }

    let code = if saw_marker {
        code_lines.join("\n")
    } else {
        raw.to_string()
    };
    (reasoning, crate::planner::parse::strip_fences(&code))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_reasoning_and_code() {
        let raw = "REASONING: straightforward print\nCODE:\nprint('hello')\nprint('world')";
        let (reasoning, code) = parse_code_response(raw);
        assert_eq!(reasoning, "straightforward print");
        assert_eq!(code, "print('hello')\nprint('world')");
    }

    #[test]
    fn strips_markdown_fences_from_code() {
        let raw = "REASONING: r\nCODE:\n```python\nx = 1\n```";
        let (_, code) = parse_code_response(raw);
        assert_eq!(code, "x = 1");
    }

    #[test]
    fn bare_code_without_markers_is_kept() {
        let raw = "def main():\n    pass";
        let (reasoning, code) = parse_code_response(raw);
        assert_eq!(reasoning, "");
        assert_eq!(code, raw);
    }

    #[test]
    fn fenced_bare_response_is_unwrapped() {
        let raw = "```python\ndef main():\n    pass\n```";
        let (_, code) = parse_code_response(raw);
        assert_eq!(code, "def main():\n    pass");
    }
}
