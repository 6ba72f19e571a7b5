//! Critic logic: decide whether a failed outcome warrants a plan revision.

use autoforge_events::{QaResult, SecurityResult, Severity};
use autoforge_llm::{LlmProvider, LlmResponse};

use crate::error::AgentError;

const REPLANNER_PROMPT: &str = "You are an autonomous replanning agent in a multi-agent dev pipeline.

You are analysing the outcome of a previous plan with id {plan_id}.

You receive:
- The final QA and/or Security result.
- A compact semantic memory window with past decisions and conclusions.

MEMORY CONTEXT:
{memory_context}

CURRENT OUTCOME SUMMARY:
{outcome_summary}
{security_instruction}
Your job:
1. Decide whether the existing plan needs revision.
2. If yes, propose the smallest set of concrete, high-leverage adjustments.
3. Focus on structural changes to the plan, not line-by-line code fixes.

Respond EXACTLY in this format:
REASON: <1-3 sentences explaining why a revision is or is not needed>
SEVERITY: low|medium|high|critical
REVISION_NEEDED: yes|no
SUGGESTIONS:
- <suggestion 1 (if any)>
- <suggestion 2 (if any)>
";

const SECURITY_BLOCKED_INSTRUCTION: &str = "
IMPORTANT (Security denied): The code was BLOCKED by the security scan. Your SUGGESTIONS \
must directly address EACH violation and the security reasoning above, so that the next \
implementation satisfies the security rules and the next run succeeds. Each suggestion \
should state what to remove, change or add to comply with security.
";

/// A failing outcome the critic can analyse.
#[derive(Debug, Clone)]
pub enum FailedOutcome {
    Qa(QaResult),
    Security(SecurityResult),
}

impl FailedOutcome {
    pub fn plan_id(&self) -> &str {
        match self {
            FailedOutcome::Qa(qa) => &qa.plan_id,
            FailedOutcome::Security(sec) => &sec.plan_id,
        }
    }

    fn is_security_block(&self) -> bool {
        matches!(self, FailedOutcome::Security(_))
    }
}

/// The critic's structured decision.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplanDecision {
    pub revision_needed: bool,
    pub severity: Severity,
    pub reason: String,
    pub suggestions: Vec<String>,
}

/// Runs the critic over a failed outcome. Returns the decision and the raw
/// response for token accounting.
pub async fn analyse_outcome(
    llm: &dyn LlmProvider,
    outcome: &FailedOutcome,
    memory_context: &str,
) -> Result<(ReplanDecision, LlmResponse), AgentError> {
    let security_instruction = if outcome.is_security_block() {
        SECURITY_BLOCKED_INSTRUCTION
    } else {
        ""
    };
    let prompt = REPLANNER_PROMPT
        .replace("{plan_id}", outcome.plan_id())
        .replace(
            "{memory_context}",
            if memory_context.trim().is_empty() {
                "None."
            } else {
                memory_context
            },
        )
        .replace("{outcome_summary}", &summarise_outcome(outcome))
        .replace("{security_instruction}", security_instruction);

    let response = llm.generate_text(&prompt).await?;
    let decision = parse_replanner_response(&response.content);
    tracing::info!(
        plan_id = autoforge_events::short_id(outcome.plan_id()),
        revision_needed = decision.revision_needed,
        severity = %decision.severity,
        "critic analysed outcome"
    );
    Ok((decision, response))
}

/// Renders the outcome into the prompt's summary block.
pub fn summarise_outcome(outcome: &FailedOutcome) -> String {
    match outcome {
        FailedOutcome::Qa(qa) => {
            let status = if qa.passed { "PASSED" } else { "FAILED" };
            let issues = if qa.issues.is_empty() {
                "none".to_string()
            } else {
                qa.issues.join(", ")
            };
            format!(
                "QA RESULT ({status}) for task {} in plan {}. Issues: {issues}. Reasoning: {}",
                qa.task_id, qa.plan_id, qa.reasoning
            )
        }
        FailedOutcome::Security(sec) => {
            let status = if sec.approved { "APPROVED" } else { "BLOCKED" };
            let mut lines = vec![
                format!(
                    "SECURITY RESULT: {status} for plan {}, branch {}.",
                    sec.plan_id, sec.branch_name
                ),
                format!("Files scanned: {}.", sec.files_scanned),
            ];
            if sec.violations.is_empty() {
                lines.push("Violations: none listed.".to_string());
            } else {
                lines.push("Violations (code MUST be changed to fix these):".to_string());
                for (i, violation) in sec.violations.iter().enumerate() {
                    lines.push(format!("  {}. {violation}", i + 1));
                }
            }
            if !sec.reasoning.trim().is_empty() {
                lines.push(format!("Security reasoning: {}", sec.reasoning));
            }
            lines.join("\n")
        }
    }
}

/// Parses the strict `REASON / SEVERITY / REVISION_NEEDED / SUGGESTIONS`
/// format leniently.
pub fn parse_replanner_response(raw: &str) -> ReplanDecision {
    let mut revision_needed = false;
    let mut severity = Severity::Medium;
    let mut reason = String::new();
    let mut suggestions: Vec<String> = Vec::new();
    let mut in_suggestions = false;

    for line in raw.lines() {
        let stripped = line.trim();
        let upper = stripped.to_ascii_uppercase();

        if let Some(rest) = upper.strip_prefix("REASON:") {
            let offset = stripped.len() - rest.len();
            reason = stripped[offset..].trim().to_string();
            in_suggestions = false;
        } else if upper.starts_with("SEVERITY:") {
            severity = Severity::parse_lenient(&stripped["SEVERITY:".len()..]);
            in_suggestions = false;
        } else if upper.starts_with("REVISION_NEEDED:") {
            let flag = stripped["REVISION_NEEDED:".len()..].trim().to_ascii_lowercase();
            revision_needed = flag == "yes";
            in_suggestions = false;
        } else if upper.starts_with("SUGGESTIONS:") {
            in_suggestions = true;
        } else if in_suggestions && stripped.starts_with("- ") {
            let suggestion = stripped.trim_start_matches("- ").trim();
            if !suggestion.is_empty()
                && !suggestion.eq_ignore_ascii_case("none")
                && !suggestion.eq_ignore_ascii_case("n/a")
            {
                suggestions.push(suggestion.to_string());
            }
        }
    }

    ReplanDecision {
        revision_needed,
        severity,
        reason,
        suggestions,
    }
}
