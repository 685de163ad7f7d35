//! Canonical JSON codec and payload hashing
//!
//! Graph payloads are hashed over their canonical serialization: object
//! keys sorted, no insignificant whitespace, numbers in serde_json's
//! deterministic formatting. The hash binds validation-time identity to
//! apply-time identity, so canonicalization must be stable across
//! processes.

use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

/// Rebuild `value` with every object's keys in sorted order.
pub fn canonicalize(value: &Value) -> Value {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut sorted = Map::new();
            for (k, v) in entries {
                sorted.insert(k.clone(), canonicalize(v));
            }
            Value::Object(sorted)
        }
        Value::Array(items) => Value::Array(items.iter().map(canonicalize).collect()),
        other => other.clone(),
    }
}

/// Canonical serialization: sorted keys, compact separators.
pub fn to_canonical_json(value: &Value) -> String {
    serde_json::to_string(&canonicalize(value)).expect("canonical JSON serialization cannot fail")
}

/// Hex-encoded SHA-256 of arbitrary bytes.
pub fn sha256_hex(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let digest = hasher.finalize();
    digest.iter().map(|b| format!("{:02x}", b)).collect()
}

/// SHA-256 of the canonical serialization of `value`.
pub fn payload_hash(value: &Value) -> String {
    sha256_hex(to_canonical_json(value).as_bytes())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_affect_hash() {
        let a = json!({"b": 1, "a": {"z": true, "y": [1, 2]}});
        let b = json!({"a": {"y": [1, 2], "z": true}, "b": 1});
        assert_eq!(payload_hash(&a), payload_hash(&b));
    }

    #[test]
    fn canonical_json_round_trips() {
        let value = json!({
            "nodes": [{"id": "n1", "data": {"inputs": {"x": 1.5, "y": null}}}],
            "edges": []
        });
        let encoded = to_canonical_json(&value);
        let decoded: Value = serde_json::from_str(&encoded).unwrap();
        assert_eq!(decoded, value);
    }

    #[test]
    fn any_mutation_changes_the_hash() {
        let mut value = json!({"nodes": [{"id": "n1"}], "edges": []});
        let before = payload_hash(&value);
        value["nodes"][0]["id"] = json!("n2");
        assert_ne!(before, payload_hash(&value));
    }

    #[test]
    fn sha256_matches_known_vector() {
        // sha256("") is a fixed constant
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
