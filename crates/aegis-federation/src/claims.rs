//! Tagged claim values and dot-path extraction for upstream attribute
//! mapping (`spec.md` §4.N, `SPEC_FULL.md` §9 "dynamic typing in claim
//! mapping becomes a tagged value type"). The source's dynamically-typed
//! claim tree becomes [`ClaimValue`]; `attribute_mapping` entries are
//! `target_field -> "dot.path.into.raw.claims"`, evaluated against the
//! upstream userinfo/id_token claim set.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// A normalized claim value. Covers everything `serde_json::Value` does;
/// kept as a distinct type (rather than re-exporting `Value` directly)
/// so callers outside this crate don't need a `serde_json` dependency
/// just to read a mapped attribute.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum ClaimValue {
    Null,
    Bool(bool),
    Number(f64),
    String(String),
    Array(Vec<ClaimValue>),
    Object(HashMap<String, ClaimValue>),
}

impl ClaimValue {
    #[must_use]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Render as a string regardless of underlying type, per the `sub`
    /// coercion rule in `spec.md` §4.N ("`sub` coerced to string").
    #[must_use]
    pub fn to_coerced_string(&self) -> Option<String> {
        match self {
            Self::String(s) => Some(s.clone()),
            Self::Number(n) => Some(if n.fract() == 0.0 { format!("{n:.0}") } else { n.to_string() }),
            Self::Bool(b) => Some(b.to_string()),
            _ => None,
        }
    }
}

impl From<serde_json::Value> for ClaimValue {
    fn from(value: serde_json::Value) -> Self {
        match value {
            serde_json::Value::Null => Self::Null,
            serde_json::Value::Bool(b) => Self::Bool(b),
            serde_json::Value::Number(n) => Self::Number(n.as_f64().unwrap_or_default()),
            serde_json::Value::String(s) => Self::String(s),
            serde_json::Value::Array(items) => Self::Array(items.into_iter().map(Into::into).collect()),
            serde_json::Value::Object(map) => {
                Self::Object(map.into_iter().map(|(k, v)| (k, v.into())).collect())
            }
        }
    }
}

/// Extract a value out of a raw claim tree by a dot-notation path, e.g.
/// `"address.country"` or `"identities.0.issuer"` for array indices.
#[must_use]
pub fn extract_path(raw: &serde_json::Value, path: &str) -> Option<ClaimValue> {
    let mut current = raw;
    for segment in path.split('.') {
        current = match current {
            serde_json::Value::Object(map) => map.get(segment)?,
            serde_json::Value::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current.clone().into())
}

/// Apply a client's `attribute_mapping` (`target_field -> dot_path`) to
/// the raw upstream claims, coercing `sub` to a string per spec.
#[must_use]
pub fn apply_mapping(
    raw: &serde_json::Value,
    mapping: &HashMap<String, String>,
) -> HashMap<String, ClaimValue> {
    let mut out = HashMap::with_capacity(mapping.len());
    for (target, path) in mapping {
        let Some(value) = extract_path(raw, path) else { continue };
        if target == "sub" {
            if let Some(coerced) = value.to_coerced_string() {
                out.insert(target.clone(), ClaimValue::String(coerced));
                continue;
            }
        }
        out.insert(target.clone(), value);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn extracts_nested_path() {
        let raw = json!({"address": {"country": "US"}});
        assert_eq!(extract_path(&raw, "address.country"), Some(ClaimValue::String("US".to_string())));
    }

    #[test]
    fn extracts_array_index() {
        let raw = json!({"identities": [{"issuer": "google"}]});
        let value = extract_path(&raw, "identities.0.issuer").unwrap();
        assert_eq!(value.as_str(), Some("google"));
    }

    #[test]
    fn missing_path_yields_none() {
        let raw = json!({"a": 1});
        assert_eq!(extract_path(&raw, "a.b.c"), None);
    }

    #[test]
    fn sub_is_always_coerced_to_string() {
        let raw = json!({"user_id": 12345});
        let mut mapping = HashMap::new();
        mapping.insert("sub".to_string(), "user_id".to_string());
        let mapped = apply_mapping(&raw, &mapping);
        assert_eq!(mapped.get("sub"), Some(&ClaimValue::String("12345".to_string())));
    }
}
