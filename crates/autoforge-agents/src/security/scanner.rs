//! Deterministic static scanner over the aggregated PR file set.
//!
//! Pure regex, no LLM: security verdicts must be reproducible, and every
//! violation maps to a named rule for auditability. The composed reasoning
//! doubles as the pipeline's final conclusion, so it folds in each file's
//! dev+QA reasoning chain before the security summary.

use std::sync::OnceLock;

use regex::Regex;

use autoforge_events::{short_id, CodeGenerated};

/// One named rule in the catalogue.
pub struct SecurityRule {
    pub name: &'static str,
    pub pattern: Regex,
}

fn rule(name: &'static str, pattern: &str) -> SecurityRule {
    SecurityRule {
        name,
        pattern: Regex::new(pattern).expect("security rule regex must compile"),
    }
}

/// The fixed rule catalogue, in audit order.
pub fn security_rules() -> &'static [SecurityRule] {
    static RULES: OnceLock<Vec<SecurityRule>> = OnceLock::new();
    RULES.get_or_init(|| {
        vec![
            rule(
                "hardcoded_api_key",
                r#"(?i)(api_key|apikey)\s*=\s*["'][A-Za-z0-9_\-]{16,}["']"#,
            ),
            rule(
                "hardcoded_password",
                r#"(?i)(password|passwd|pwd)\s*=\s*["'][^"']{4,}["']"#,
            ),
            rule(
                "hardcoded_token",
                r#"(?i)(token|secret)\s*=\s*["'][A-Za-z0-9_\-]{16,}["']"#,
            ),
            rule("dangerous_eval", r"\beval\s*\("),
            rule("dangerous_exec", r"\bexec\s*\("),
            rule("pickle_deserialize", r"\bpickle\.loads\s*\("),
            rule("marshal_deserialize", r"\bmarshal\.loads\s*\("),
            rule("path_traversal", r"\.\./"),
            rule("shell_injection_os", r"\bos\.system\s*\("),
            rule(
                "shell_injection_subprocess",
                r"\bsubprocess\.(call|Popen|run)\s*\(.*shell\s*=\s*True",
            ),
            rule(
                "sql_injection_risk",
                r#"(?i)(execute|executemany)\s*\(\s*["'].*%s"#,
            ),
            rule(
                "permissive_cors",
                r#"(?i)allow_origins\s*=\s*\[?\s*["']\*["']"#,
            ),
            rule("debug_flag", r"(?i)\bdebug\s*=\s*True\b"),
        ]
    })
}

/// Result of scanning one aggregated file set.
#[derive(Debug, Clone, PartialEq)]
pub struct ScanResult {
    pub approved: bool,
    pub violations: Vec<String>,
    pub files_scanned: u32,
    pub reasoning: String,
}

/// Scans all files in a PR payload.
///
/// Pure: the same `files` always produce the same result, with violations
/// stable-ordered by `(file_path, rule_name)`. `approved` is true exactly
/// when no violation was found.
pub fn scan_files(files: &[CodeGenerated]) -> ScanResult {
    let mut hits: Vec<(String, &'static str)> = Vec::new();
    let mut files_scanned = 0u32;

    for file in files {
        if file.code.is_empty() {
            continue;
        }
        files_scanned += 1;
        for rule in security_rules() {
            if rule.pattern.is_match(&file.code) {
                hits.push((file.file_path.clone(), rule.name));
            }
        }
    }

    hits.sort();
    let violations: Vec<String> = hits
        .iter()
        .map(|(file_path, rule_name)| format!("[{file_path}] Rule '{rule_name}': pattern matched"))
        .collect();

    let approved = violations.is_empty();
    let reasoning = compose_conclusion(files, approved, &violations, files_scanned);

    if approved {
        tracing::info!(files_scanned, "security scan PASSED");
    } else {
        tracing::warn!(
            files_scanned,
            violations = violations.len(),
            "security scan FAILED"
        );
    }

    ScanResult {
        approved,
        violations,
        files_scanned,
        reasoning,
    }
}

/// Composes the final pipeline conclusion: the per-file dev+QA reasoning
/// chain, the security summary, then the verdict.
fn compose_conclusion(
    files: &[CodeGenerated],
    approved: bool,
    violations: &[String],
    files_scanned: u32,
) -> String {
    let mut sections: Vec<String> = Vec::new();

    let plan_id = files.first().map(|f| f.plan_id.as_str()).unwrap_or("");
    sections.push(format!("Agent chain for plan {}:", short_id(plan_id)));

    for file in files {
        if !file.reasoning.trim().is_empty() {
            sections.push(format!("## {}\n{}", file.file_path, file.reasoning.trim()));
        }
    }

    let rules_checked = security_rules().len();
    let mut summary = format!(
        "Security: scanned {files_scanned} file(s) against {rules_checked} rules \
(hardcoded secrets, dangerous eval/exec, unsafe deserialization, shell and SQL injection, \
permissive CORS, debug flags)."
    );
    if approved {
        summary.push_str(" No violations found. Code is safe for repository publication.");
    } else {
        summary.push_str(&format!(
            " Found {} violation(s). Publication blocked until resolved:",
            violations.len()
        ));
        for violation in violations {
            summary.push_str(&format!("\n- {violation}"));
        }
    }
    sections.push(summary);

    sections.join("\n\n")
}
