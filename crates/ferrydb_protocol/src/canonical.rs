//! Canonical JSON encoding.
//!
//! Two replicas are declared converged when the SHA-256 of their canonical
//! database encoding matches, so the encoder must be deterministic:
//! object keys sorted by code point, array order preserved, one fixed
//! number format, uniform string escaping.

use serde_json::Value;
use sha2::{Digest, Sha256};
use std::fmt::Write;

/// Encodes a JSON value canonically.
///
/// Object keys are emitted in ascending code-point order regardless of
/// insertion order; arrays keep their order. Numbers and string escapes are
/// delegated to `serde_json`, which formats both deterministically.
pub fn to_canonical_json(value: &Value) -> String {
    let mut out = String::new();
    write_canonical(value, &mut out);
    out
}

/// SHA-256 of the canonical encoding, hex-encoded.
pub fn canonical_sha256_hex(value: &Value) -> String {
    let canonical = to_canonical_json(value);
    let digest = Sha256::digest(canonical.as_bytes());
    let mut hex = String::with_capacity(digest.len() * 2);
    for byte in digest {
        let _ = write!(hex, "{byte:02x}");
    }
    hex
}

fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Null => out.push_str("null"),
        Value::Bool(b) => out.push_str(if *b { "true" } else { "false" }),
        Value::Number(n) => {
            let _ = write!(out, "{n}");
        }
        Value::String(s) => {
            // serde_json escapes strings deterministically.
            let _ = write!(out, "{}", Value::String(s.clone()));
        }
        Value::Array(items) => {
            out.push('[');
            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
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
                let _ = write!(out, "{}", Value::String((*key).clone()));
                out.push(':');
                write_canonical(&map[*key], out);
            }
            out.push('}');
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;
    use serde_json::json;

    #[test]
    fn keys_are_sorted() {
        let value = json!({"b": 1, "a": 2, "c": {"z": 1, "y": 2}});
        assert_eq!(
            to_canonical_json(&value),
            r#"{"a":2,"b":1,"c":{"y":2,"z":1}}"#
        );
    }

    #[test]
    fn arrays_keep_order() {
        let value = json!([3, 1, 2]);
        assert_eq!(to_canonical_json(&value), "[3,1,2]");
    }

    #[test]
    fn strings_are_escaped() {
        let value = json!({"k": "a\"b\nc"});
        assert_eq!(to_canonical_json(&value), r#"{"k":"a\"b\nc"}"#);
    }

    #[test]
    fn scalars() {
        assert_eq!(to_canonical_json(&json!(null)), "null");
        assert_eq!(to_canonical_json(&json!(true)), "true");
        assert_eq!(to_canonical_json(&json!(42)), "42");
        assert_eq!(to_canonical_json(&json!(-1.5)), "-1.5");
    }

    #[test]
    fn hash_is_stable_and_hex() {
        let a = json!({"x": 1, "y": [1, 2]});
        let b = json!({"y": [1, 2], "x": 1});
        let hash = canonical_sha256_hex(&a);
        assert_eq!(hash, canonical_sha256_hex(&b));
        assert_eq!(hash.len(), 64);
        assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));
    }

    proptest! {
        #[test]
        fn canonical_output_parses_back(pairs in prop::collection::btree_map("[a-z]{1,8}", any::<i64>(), 0..8)) {
            let value = json!(pairs);
            let canonical = to_canonical_json(&value);
            let reparsed: serde_json::Value = serde_json::from_str(&canonical).unwrap();
            prop_assert_eq!(reparsed, value);
        }
    }
}
