//! Static lint tool backed by ruff.

use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::ToolError;
use crate::models::{ToolDefinition, ToolFn};

/// Arguments for the `python_lint` tool.
#[derive(Debug, Deserialize)]
pub struct LintArgs {
    #[serde(default = "LintArgs::default_language")]
    pub language: String,
    pub code: String,
    #[serde(default = "LintArgs::default_file_path")]
    pub file_path: String,
}

impl LintArgs {
    fn default_language() -> String {
        "python".to_string()
    }

    fn default_file_path() -> String {
        "tmp.py".to_string()
    }
}

/// One structured lint finding.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LintIssue {
    pub line: u32,
    pub column: u32,
    pub code: String,
    pub message: String,
}

/// Parses ruff's concise output (`path:line:col: CODE message`) into
/// structured issues. Unparseable lines are skipped.
pub fn parse_ruff_output(stdout: &str) -> Vec<LintIssue> {
    let mut issues = Vec::new();
    for line in stdout.lines() {
        let mut parts = line.splitn(4, ':');
        let (Some(_path), Some(line_s), Some(col_s), Some(rest)) =
            (parts.next(), parts.next(), parts.next(), parts.next())
        else {
            continue;
        };
        let (Ok(line_no), Ok(col_no)) = (line_s.trim().parse(), col_s.trim().parse()) else {
            continue;
        };
        let rest = rest.trim_start();
        let (code, message) = match rest.split_once(' ') {
            Some((code, message)) => (code, message),
            None => (rest, ""),
        };
        issues.push(LintIssue {
            line: line_no,
            column: col_no,
            code: code.trim().to_string(),
            message: message.trim().to_string(),
        });
    }
    issues
}

/// Builds the `python_lint` tool.
///
/// Writes the code to a scratch file and runs `python -m ruff check` on it.
/// Only `language = "python"` is supported; other languages return
/// `{supported: false}` so callers can skip the pass cheaply. A missing
/// ruff binary is a tool failure, which QA treats as "no static findings".
pub fn python_lint_tool() -> ToolDefinition {
    let func: ToolFn = Arc::new(|args| {
        Box::pin(async move {
            let args: LintArgs = serde_json::from_value(args)
                .map_err(|e| ToolError::InvalidArguments(e.to_string()))?;

            if !args.language.eq_ignore_ascii_case("python") {
                return Ok(json!({"supported": false, "issues": []}));
            }

            let dir = tempfile::tempdir()?;
            let file_name = std::path::Path::new(&args.file_path)
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "tmp.py".to_string());
            let target = dir.path().join(file_name);
            tokio::fs::write(&target, &args.code).await?;

            let output = tokio::process::Command::new("python")
                .args(["-m", "ruff", "check", "--output-format", "concise"])
                .arg(&target)
                .output()
                .await
                .map_err(|e| ToolError::Subprocess(format!("failed to spawn ruff: {e}")))?;

            let stdout = String::from_utf8_lossy(&output.stdout);
            let issues = parse_ruff_output(&stdout);
            Ok(json!({
                "supported": true,
                "issues": issues,
                "exit_code": output.status.code().unwrap_or(-1),
            }))
        })
    });

    ToolDefinition::new("python_lint", "Run ruff over a Python snippet", func)
        .with_timeout(Duration::from_secs(20))
        .with_tags(["lint", "python"])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_concise_ruff_lines() {
        let stdout = "\
/tmp/x/hello.py:1:7: F821 Undefined name `x`
/tmp/x/hello.py:3:1: E402 Module level import not at top of file
";
        let issues = parse_ruff_output(stdout);
        assert_eq!(
            issues,
            vec![
                LintIssue {
                    line: 1,
                    column: 7,
                    code: "F821".into(),
                    message: "Undefined name `x`".into(),
                },
                LintIssue {
                    line: 3,
                    column: 1,
                    code: "E402".into(),
                    message: "Module level import not at top of file".into(),
                },
            ]
        );
    }

    #[test]
    fn skips_unparseable_lines() {
        let stdout = "Found 2 errors.\nnot:a:ruff_line\n";
        assert!(parse_ruff_output(stdout).is_empty());
    }

    #[test]
    fn empty_output_means_no_issues() {
        assert!(parse_ruff_output("").is_empty());
    }

    #[tokio::test]
    async fn non_python_is_unsupported_not_an_error() {
        let registry = crate::ToolRegistry::new();
        registry.register(python_lint_tool());
        let result = crate::execute_tool(
            &registry,
            "python_lint",
            json!({"language": "rust", "code": "fn main() {}"}),
        )
        .await;
        assert!(result.success);
        assert_eq!(result.output.unwrap()["supported"], json!(false));
    }
}
