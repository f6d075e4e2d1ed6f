//! Canonical JSON hashing, used by `aegis-settings` to compute the
//! `version = hash("sha256:" + canonical_json)` invariant from `spec.md` §3.

use sha2::{Digest, Sha256};

/// Recursively sort object keys so that two semantically-equal
/// [`serde_json::Value`]s serialize identically regardless of insertion
/// order.
fn canonicalize(value: &serde_json::Value) -> serde_json::Value {
    match value {
        serde_json::Value::Object(map) => {
            let mut entries: Vec<_> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));
            let mut out = serde_json::Map::new();
            for (k, v) in entries {
                out.insert(k.clone(), canonicalize(v));
            }
            serde_json::Value::Object(out)
        }
        serde_json::Value::Array(items) => {
            serde_json::Value::Array(items.iter().map(canonicalize).collect())
        }
        other => other.clone(),
    }
}

/// Compute `sha256:<hex>` over the canonical serialization of `value`.
///
/// Used as the optimistic-concurrency `version` token for settings rows:
/// any semantic change to `values` produces a new version, and clients
/// that round-trip a `GET` without modification can safely resend it as
/// `ifMatch`.
#[must_use]
pub fn canonical_version(value: &serde_json::Value) -> String {
    let canonical = canonicalize(value);
    // serde_json's default serialization preserves insertion order; since
    // `canonicalize` already sorted keys, this is deterministic.
    let bytes = serde_json::to_vec(&canonical).expect("canonicalized value always serializes");
    let digest = Sha256::digest(&bytes);
    format!("sha256:{}", hex_encode(&digest))
}

fn hex_encode(bytes: &[u8]) -> String {
    use std::fmt::Write as _;
    let mut out = String::with_capacity(bytes.len() * 2);
    for b in bytes {
        write!(out, "{b:02x}").expect("writing to a String never fails");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn key_order_does_not_affect_version() {
        let a = json!({"b": 1, "a": 2});
        let b = json!({"a": 2, "b": 1});
        assert_eq!(canonical_version(&a), canonical_version(&b));
    }

    #[test]
    fn value_change_changes_version() {
        let a = json!({"a": 1});
        let b = json!({"a": 2});
        assert_ne!(canonical_version(&a), canonical_version(&b));
    }

    #[test]
    fn version_has_sha256_prefix() {
        let v = canonical_version(&json!({}));
        assert!(v.starts_with("sha256:"));
        assert_eq!(v.len(), "sha256:".len() + 64);
    }
}
