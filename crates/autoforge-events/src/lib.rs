//! Event contracts for the autoforge bus.
//!
//! Every message flowing through the broker is an [`Envelope`] wrapping one
//! of the typed payloads in [`payload`]. The envelope carries a globally
//! unique `event_id` and a deterministic `idempotency_key` derived from the
//! event type plus a canonical rendering of the payload, so two envelopes
//! describing the same logical operation always share a key while remaining
//! distinguishable as deliveries.

pub mod canonical;
pub mod envelope;
pub mod error;
pub mod payload;
pub mod types;

pub use canonical::canonical_json;
pub use envelope::Envelope;
pub use error::ContractError;
pub use payload::{
    CodeGenerated, EventPayload, PipelineConclusion, PlanCreated, PlanRequested, PlanRevision,
    PrApproval, PrCreated, PrRequested, QaResult, SecurityResult, TaskAssigned, TaskSpec,
    TokensUsed,
};
pub use types::{EventType, Severity};

/// Returns the first eight characters of an id for log lines.
///
/// Ids shorter than eight characters are returned unchanged.
pub fn short_id(id: &str) -> &str {
    if id.len() >= 8 {
        &id[..8]
    } else {
        id
    }
}

#[cfg(test)]
mod tests {
    use super::short_id;

    #[test]
    fn short_id_truncates_long_ids() {
        assert_eq!(short_id("0123456789abcdef"), "01234567");
    }

    #[test]
    fn short_id_keeps_short_ids() {
        assert_eq!(short_id("abc"), "abc");
    }
}
