//! Canonical JSON rendering for idempotency hashing.
//!
//! Two payloads that are semantically equal must hash identically across
//! processes, so the rendering sorts object keys recursively and relies on
//! serde_json's stable number and string forms. Array order is meaningful
//! and preserved.

use serde_json::Value;

/// Renders a JSON value in canonical form: object keys sorted recursively,
/// no insignificant whitespace.
pub fn canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_value(value, &mut out);
    out
}

fn write_value(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => out.push_str(&n.to_string()),
        Value::String(s) => {
            // serde_json escapes deterministically.
            out.push_str(&serde_json::to_string(s).expect("string serialization is infallible"));
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_value(item, out);
            }
            out.push(']');
        }
        Value::Object(map) => {
            let mut keys: Vec<&String> = map.keys().collect();
            keys.sort();
            out.push('{');
            for (i, key) in keys.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(
                    &serde_json::to_string(key).expect("string serialization is infallible"),
                );
                out.push(':');
                write_value(&map[*key], out);
            }
            out.push('}');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn keys_are_sorted_recursively() {
        let v = json!({"b": {"z": 1, "a": 2}, "a": [3, {"y": 0, "x": 1}]});
        assert_eq!(
            canonical_json(&v),
            r#"{"a":[3,{"x":1,"y":0}],"b":{"a":2,"z":1}}"#
        );
    }

    #[test]
    fn array_order_is_preserved() {
        let v = json!([2, 1, 3]);
        assert_eq!(canonical_json(&v), "[2,1,3]");
    }

    #[test]
    fn strings_are_escaped() {
        let v = json!({"k": "a\"b\nc"});
        assert_eq!(canonical_json(&v), r#"{"k":"a\"b\nc"}"#);
    }

    #[test]
    fn scalars_render_stably() {
        assert_eq!(canonical_json(&json!(null)), "null");
        assert_eq!(canonical_json(&json!(true)), "true");
        assert_eq!(canonical_json(&json!(1.5)), "1.5");
        assert_eq!(canonical_json(&json!(-7)), "-7");
    }
}
