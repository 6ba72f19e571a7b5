//! The canonical envelope wrapped around every bus message.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use sha2::{Digest, Sha256};
use uuid::Uuid;

use crate::canonical::canonical_json;
use crate::error::ContractError;
use crate::payload::EventPayload;
use crate::types::EventType;

/// Current contract version stamped on every envelope.
pub const CONTRACT_VERSION: &str = "1.0";

/// Uniform wrapper for all events in the system.
///
/// Determinism guarantees:
/// - `event_id` is a fresh UUID v4 per envelope, so two publications of the
///   same logical event remain distinguishable as deliveries.
/// - `idempotency_key` is the SHA-256 of `event_type ⧺ ":" ⧺
///   canonical_json(payload)`, so semantically equal `(event_type, payload)`
///   pairs share a key across processes.
/// - `timestamp` is UTC with an explicit offset.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Envelope {
    pub event_id: String,
    pub event_type: EventType,
    pub version: String,
    pub timestamp: DateTime<Utc>,
    pub producer: String,
    pub idempotency_key: String,
    pub payload: Value,
}

impl Envelope {
    /// Builds an envelope for a typed payload, filling `event_id`,
    /// `timestamp`, and `idempotency_key`.
    pub fn new(producer: impl Into<String>, payload: EventPayload) -> Result<Envelope, ContractError> {
        let event_type = payload.event_type();
        let value = payload.to_value()?;
        let idempotency_key = idempotency_key(event_type, &value);
        Ok(Envelope {
            event_id: Uuid::new_v4().to_string(),
            event_type,
            version: CONTRACT_VERSION.to_string(),
            timestamp: Utc::now(),
            producer: producer.into(),
            idempotency_key,
            payload: value,
        })
    }

    /// Validates a raw wire value into an envelope.
    ///
    /// Missing `event_id` and `timestamp` are filled; an empty or missing
    /// `idempotency_key` is recomputed. Unknown event types and payloads
    /// that do not decode into the variant selected by `event_type` are
    /// rejected.
    pub fn validate(raw: Value) -> Result<Envelope, ContractError> {
        let obj = raw
            .as_object()
            .ok_or_else(|| ContractError::InvalidEnvelope("not a JSON object".to_string()))?;

        let type_str = obj
            .get("event_type")
            .and_then(Value::as_str)
            .ok_or_else(|| ContractError::InvalidEnvelope("missing event_type".to_string()))?;
        let event_type: EventType = type_str.parse()?;

        let producer = obj
            .get("producer")
            .and_then(Value::as_str)
            .ok_or_else(|| ContractError::InvalidEnvelope("missing producer".to_string()))?
            .to_string();

        let payload = obj.get("payload").cloned().unwrap_or(Value::Null);
        // Reject payloads that do not match the selected variant up front so
        // consumers never see a half-valid envelope.
        EventPayload::decode(event_type, &payload)?;

        let event_id = obj
            .get("event_id")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        let timestamp = match obj.get("timestamp").and_then(Value::as_str) {
            Some(s) => s
                .parse::<DateTime<Utc>>()
                .map_err(|e| ContractError::InvalidEnvelope(format!("bad timestamp: {e}")))?,
            None => Utc::now(),
        };

        let idempotency_key = obj
            .get("idempotency_key")
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .unwrap_or_else(|| idempotency_key(event_type, &payload));

        let version = obj
            .get("version")
            .and_then(Value::as_str)
            .unwrap_or(CONTRACT_VERSION)
            .to_string();

        Ok(Envelope {
            event_id,
            event_type,
            version,
            timestamp,
            producer,
            idempotency_key,
            payload,
        })
    }

    /// Decodes the payload into its typed variant.
    pub fn decode(&self) -> Result<EventPayload, ContractError> {
        EventPayload::decode(self.event_type, &self.payload)
    }

    /// Serializes the envelope to wire JSON bytes.
    pub fn to_bytes(&self) -> Result<Vec<u8>, ContractError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Parses wire JSON bytes into a validated envelope.
    pub fn from_bytes(bytes: &[u8]) -> Result<Envelope, ContractError> {
        let raw: Value = serde_json::from_slice(bytes)?;
        Envelope::validate(raw)
    }
}

/// Deterministic idempotency key for an `(event_type, payload)` pair.
pub fn idempotency_key(event_type: EventType, payload: &Value) -> String {
    let mut hasher = Sha256::new();
    hasher.update(event_type.as_str().as_bytes());
    hasher.update(b":");
    hasher.update(canonical_json(payload).as_bytes());
    hex_digest(hasher)
}

fn hex_digest(hasher: Sha256) -> String {
    let digest = hasher.finalize();
    let mut out = String::with_capacity(digest.len() * 2);
    for byte in digest {
        out.push_str(&format!("{byte:02x}"));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::{PlanRequested, TaskSpec};
    use serde_json::json;

    fn plan_requested() -> EventPayload {
        EventPayload::PlanRequested(PlanRequested {
            user_prompt: "Write hello-world in py".into(),
            project_name: "p".into(),
            repo_url: "git@h:u/r".into(),
        })
    }

    #[test]
    fn equal_payloads_share_idempotency_key_with_distinct_ids() {
        let a = Envelope::new("meta_planner", plan_requested()).unwrap();
        let b = Envelope::new("meta_planner", plan_requested()).unwrap();
        assert_eq!(a.idempotency_key, b.idempotency_key);
        assert_ne!(a.event_id, b.event_id);
    }

    #[test]
    fn idempotency_key_depends_on_event_type() {
        let payload = json!({"plan_id": "p", "task": TaskSpec::new("d", "f.py", "python")});
        let a = idempotency_key(EventType::TaskAssigned, &payload);
        let b = idempotency_key(EventType::CodeGenerated, &payload);
        assert_ne!(a, b);
    }

    #[test]
    fn validate_fills_missing_id_timestamp_and_key() {
        let raw = json!({
            "event_type": "plan.requested",
            "producer": "gateway",
            "payload": {"user_prompt": "x", "project_name": "p"}
        });
        let env = Envelope::validate(raw).unwrap();
        assert!(!env.event_id.is_empty());
        assert!(!env.idempotency_key.is_empty());
        assert_eq!(env.version, CONTRACT_VERSION);
        assert_eq!(
            env.idempotency_key,
            idempotency_key(EventType::PlanRequested, &env.payload)
        );
    }

    #[test]
    fn validate_rejects_unknown_event_type() {
        let raw = json!({
            "event_type": "plan.unknown",
            "producer": "x",
            "payload": {}
        });
        assert!(matches!(
            Envelope::validate(raw),
            Err(ContractError::UnknownEventType(_))
        ));
    }

    #[test]
    fn validate_rejects_payload_variant_mismatch() {
        let raw = json!({
            "event_type": "code.generated",
            "producer": "x",
            "payload": {"user_prompt": "nope"}
        });
        assert!(matches!(
            Envelope::validate(raw),
            Err(ContractError::PayloadMismatch { .. })
        ));
    }

    #[test]
    fn wire_round_trip_preserves_key_and_id() {
        let env = Envelope::new("qa_service", plan_requested()).unwrap();
        let bytes = env.to_bytes().unwrap();
        let back = Envelope::from_bytes(&bytes).unwrap();
        assert_eq!(back.event_id, env.event_id);
        assert_eq!(back.idempotency_key, env.idempotency_key);
        assert_eq!(back.event_type, env.event_type);
    }

    #[test]
    fn key_ignores_payload_field_order() {
        let a = json!({"user_prompt": "x", "project_name": "p", "repo_url": ""});
        // Build the same object with a different insertion order.
        let mut map = serde_json::Map::new();
        map.insert("repo_url".into(), json!(""));
        map.insert("project_name".into(), json!("p"));
        map.insert("user_prompt".into(), json!("x"));
        let b = Value::Object(map);
        assert_eq!(
            idempotency_key(EventType::PlanRequested, &a),
            idempotency_key(EventType::PlanRequested, &b)
        );
    }
}
