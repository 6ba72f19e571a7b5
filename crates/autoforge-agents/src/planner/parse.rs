//! Parsing of the planner LLM's `REASONING:` / `TASKS:` response.

use serde_json::Value;

/// A parsed planner response before task ids are assigned.
#[derive(Debug, Clone, PartialEq)]
pub struct PlanOutline {
    pub reasoning: String,
    pub tasks: Vec<TaskOutline>,
}

/// One task as described by the LLM.
#[derive(Debug, Clone, PartialEq)]
pub struct TaskOutline {
    pub description: String,
    pub file_path: String,
    pub language: String,
}

/// Parses the planner response leniently.
///
/// Expected shape is a `REASONING:` line followed by `TASKS:` and a JSON
/// array of `{description, file_path, language}`. Markdown fences are
/// stripped; a response that is just a bare JSON array is accepted; when no
/// task list can be recovered a single fallback task is synthesized so the
/// pipeline keeps moving.
pub fn parse_plan_response(raw: &str) -> PlanOutline {
    let (reasoning, tasks_text) = split_sections(raw);
    let cleaned = strip_fences(&tasks_text);

    if let Some(tasks) = parse_task_array(&cleaned) {
        if !tasks.is_empty() {
            return PlanOutline { reasoning, tasks };
        }
    }

    tracing::warn!("failed to parse planner response as JSON, creating fallback task");
    let preview: String = raw.chars().take(200).collect();
    PlanOutline {
        reasoning,
        tasks: vec![TaskOutline {
            description: format!("Implement: {preview}"),
            file_path: "src/main.py".to_string(),
            language: "python".to_string(),
        }],
    }
}

fn split_sections(raw: &str) -> (String, String) {
    let mut reasoning = String::new();
    let mut tasks = String::new();
    let mut in_tasks = false;

    for line in raw.lines() {
        let stripped = line.trim();
        let upper = stripped.to_ascii_uppercase();
        if let Some(rest) = upper.strip_prefix("REASONING:") {
            let offset = stripped.len() - rest.len();
            reasoning = stripped[offset..].trim().to_string();
            in_tasks = false;
        } else if upper.starts_with("TASKS:") {
            in_tasks = true;
            let inline = stripped["TASKS:".len()..].trim();
            if !inline.is_empty() {
                tasks.push_str(inline);
                tasks.push('\n');
            }
        } else if in_tasks {
            tasks.push_str(line);
            tasks.push('\n');
        }
    }

    if tasks.trim().is_empty() {
        // No TASKS marker; maybe the whole response is the array.
        (reasoning, raw.to_string())
    } else {
        (reasoning, tasks)
    }
}

/// Strips a leading/trailing markdown fence if present.
pub fn strip_fences(text: &str) -> String {
    let trimmed = text.trim();
    if !trimmed.starts_with("```") {
        return trimmed.to_string();
    }
    let mut lines: Vec<&str> = trimmed.lines().collect();
    lines.remove(0);
    if lines.last().is_some_and(|l| l.trim() == "```") {
        lines.pop();
    }
    lines.join("\n").trim().to_string()
}

fn parse_task_array(text: &str) -> Option<Vec<TaskOutline>> {
    let value: Value = serde_json::from_str(text).ok()?;
    let items = value.as_array()?;
    Some(
        items
            .iter()
            .filter_map(|item| {
                let obj = item.as_object()?;
                Some(TaskOutline {
                    description: obj
                        .get("description")
                        .and_then(Value::as_str)
                        .unwrap_or("")
                        .to_string(),
                    file_path: obj
                        .get("file_path")
                        .and_then(Value::as_str)
                        .unwrap_or("unknown.py")
                        .to_string(),
                    language: obj
                        .get("language")
                        .and_then(Value::as_str)
                        .unwrap_or("python")
                        .to_string(),
                })
            })
            .collect(),
    )
}
