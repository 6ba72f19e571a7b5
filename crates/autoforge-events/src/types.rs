//! Closed enums shared across the pipeline: event types and revision
//! severities.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::ContractError;

/// The closed set of event types routable on the bus.
///
/// The wire value doubles as the topic routing key, so the string forms are
/// part of the broker contract and must never change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventType {
    #[serde(rename = "plan.requested")]
    PlanRequested,
    #[serde(rename = "plan.created")]
    PlanCreated,
    #[serde(rename = "plan.revision_suggested")]
    PlanRevisionSuggested,
    #[serde(rename = "plan.revision_confirmed")]
    PlanRevisionConfirmed,
    #[serde(rename = "task.assigned")]
    TaskAssigned,
    #[serde(rename = "code.generated")]
    CodeGenerated,
    #[serde(rename = "qa.passed")]
    QaPassed,
    #[serde(rename = "qa.failed")]
    QaFailed,
    #[serde(rename = "pr.requested")]
    PrRequested,
    #[serde(rename = "security.approved")]
    SecurityApproved,
    #[serde(rename = "security.blocked")]
    SecurityBlocked,
    #[serde(rename = "pr.pending_approval")]
    PrPendingApproval,
    #[serde(rename = "pr.human_approved")]
    PrHumanApproved,
    #[serde(rename = "pr.human_rejected")]
    PrHumanRejected,
    #[serde(rename = "pr.created")]
    PrCreated,
    #[serde(rename = "pipeline.conclusion")]
    PipelineConclusion,
    #[serde(rename = "memory.store")]
    MemoryStore,
    #[serde(rename = "memory.query")]
    MemoryQuery,
    #[serde(rename = "metrics.tokens_used")]
    MetricsTokensUsed,
}

impl EventType {
    /// The wire string / routing key for this event type.
    pub fn as_str(&self) -> &'static str {
        match self {
            EventType::PlanRequested => "plan.requested",
            EventType::PlanCreated => "plan.created",
            EventType::PlanRevisionSuggested => "plan.revision_suggested",
            EventType::PlanRevisionConfirmed => "plan.revision_confirmed",
            EventType::TaskAssigned => "task.assigned",
            EventType::CodeGenerated => "code.generated",
            EventType::QaPassed => "qa.passed",
            EventType::QaFailed => "qa.failed",
            EventType::PrRequested => "pr.requested",
            EventType::SecurityApproved => "security.approved",
            EventType::SecurityBlocked => "security.blocked",
            EventType::PrPendingApproval => "pr.pending_approval",
            EventType::PrHumanApproved => "pr.human_approved",
            EventType::PrHumanRejected => "pr.human_rejected",
            EventType::PrCreated => "pr.created",
            EventType::PipelineConclusion => "pipeline.conclusion",
            EventType::MemoryStore => "memory.store",
            EventType::MemoryQuery => "memory.query",
            EventType::MetricsTokensUsed => "metrics.tokens_used",
        }
    }

    /// All event types, in wire order.
    pub fn all() -> &'static [EventType] {
        &[
            EventType::PlanRequested,
            EventType::PlanCreated,
            EventType::PlanRevisionSuggested,
            EventType::PlanRevisionConfirmed,
            EventType::TaskAssigned,
            EventType::CodeGenerated,
            EventType::QaPassed,
            EventType::QaFailed,
            EventType::PrRequested,
            EventType::SecurityApproved,
            EventType::SecurityBlocked,
            EventType::PrPendingApproval,
            EventType::PrHumanApproved,
            EventType::PrHumanRejected,
            EventType::PrCreated,
            EventType::PipelineConclusion,
            EventType::MemoryStore,
            EventType::MemoryQuery,
            EventType::MetricsTokensUsed,
        ]
    }
}

impl fmt::Display for EventType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EventType {
    type Err = ContractError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        EventType::all()
            .iter()
            .find(|t| t.as_str() == s)
            .copied()
            .ok_or_else(|| ContractError::UnknownEventType(s.to_string()))
    }
}

/// Severity of a suggested plan revision.
///
/// The planner auto-executes revisions at `High` and above; lower severities
/// are logged and left for a human to confirm.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Low,
    #[default]
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Low => "low",
            Severity::Medium => "medium",
            Severity::High => "high",
            Severity::Critical => "critical",
        }
    }

    /// Lenient parse used on LLM output; anything unrecognised maps to
    /// `Medium`.
    pub fn parse_lenient(s: &str) -> Severity {
        match s.trim().to_ascii_lowercase().as_str() {
            "low" => Severity::Low,
            "high" => Severity::High,
            "critical" => Severity::Critical,
            _ => Severity::Medium,
        }
    }

    /// Whether this severity gates an automatic replan.
    pub fn auto_replans(&self) -> bool {
        *self >= Severity::High
    }
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn event_type_round_trips_through_wire_string() {
        for t in EventType::all() {
            assert_eq!(t.as_str().parse::<EventType>().unwrap(), *t);
        }
    }

    #[test]
    fn unknown_event_type_is_rejected() {
        let err = "plan.exploded".parse::<EventType>().unwrap_err();
        assert!(matches!(err, ContractError::UnknownEventType(_)));
    }

    #[test]
    fn event_type_serde_uses_wire_names() {
        let json = serde_json::to_string(&EventType::QaFailed).unwrap();
        assert_eq!(json, "\"qa.failed\"");
        let back: EventType = serde_json::from_str(&json).unwrap();
        assert_eq!(back, EventType::QaFailed);
    }

    #[test]
    fn severity_gate_is_high_or_critical() {
        assert!(!Severity::Low.auto_replans());
        assert!(!Severity::Medium.auto_replans());
        assert!(Severity::High.auto_replans());
        assert!(Severity::Critical.auto_replans());
    }

    #[test]
    fn severity_parse_is_lenient() {
        assert_eq!(Severity::parse_lenient(" CRITICAL "), Severity::Critical);
        assert_eq!(Severity::parse_lenient("whatever"), Severity::Medium);
    }
}
