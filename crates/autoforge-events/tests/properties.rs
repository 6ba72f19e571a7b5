//! Property tests for the envelope contract: canonical JSON must be
//! insensitive to object key order, and idempotency keys must be a pure
//! function of `(event_type, payload)`.

use autoforge_events::{canonical_json, envelope::idempotency_key, EventType};
use proptest::prelude::*;
use serde_json::Value;

/// Strategy for arbitrary JSON values of bounded depth.
fn arb_json() -> impl Strategy<Value = Value> {
    let leaf = prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| Value::Number(n.into())),
        "[a-z0-9 ]{0,12}".prop_map(Value::String),
    ];
    leaf.prop_recursive(3, 24, 6, |inner| {
        prop_oneof![
            prop::collection::vec(inner.clone(), 0..4).prop_map(Value::Array),
            prop::collection::btree_map("[a-z_]{1,8}", inner, 0..4).prop_map(|m| {
                Value::Object(m.into_iter().collect())
            }),
        ]
    })
}

/// Reinserts object entries in reverse order at every level; serde_json's
/// map preserves insertion order, so this produces a differently-ordered but
/// semantically equal value.
fn reverse_key_order(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut out = serde_json::Map::new();
            let mut entries: Vec<_> = map.iter().collect();
            entries.reverse();
            for (k, v) in entries {
                out.insert(k.clone(), reverse_key_order(v));
            }
            Value::Object(out)
        }
        Value::Array(items) => Value::Array(items.iter().map(reverse_key_order).collect()),
        other => other.clone(),
    }
}

proptest! {
    #[test]
    fn canonical_json_ignores_key_insertion_order(v in arb_json()) {
        let reordered = reverse_key_order(&v);
        prop_assert_eq!(canonical_json(&v), canonical_json(&reordered));
    }

    #[test]
    fn canonical_json_is_parseable_and_equal(v in arb_json()) {
        let rendered = canonical_json(&v);
        let back: Value = serde_json::from_str(&rendered).unwrap();
        prop_assert_eq!(back, v);
    }

    #[test]
    fn idempotency_key_is_order_insensitive(v in arb_json()) {
        let reordered = reverse_key_order(&v);
        prop_assert_eq!(
            idempotency_key(EventType::MemoryStore, &v),
            idempotency_key(EventType::MemoryStore, &reordered)
        );
    }

    #[test]
    fn idempotency_key_distinguishes_event_types(v in arb_json()) {
        prop_assert_ne!(
            idempotency_key(EventType::MemoryStore, &v),
            idempotency_key(EventType::MemoryQuery, &v)
        );
    }
}
