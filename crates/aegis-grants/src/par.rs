//! PARStore (`spec.md` §4.J): pushed-authorization-request mint/consume,
//! single-consume, TTL ≤ 600 s.

use aegis_core::{ids, OpError, OpResult};
use dashmap::DashMap;

const MAX_PAR_TTL_SECONDS: i64 = 600;
const REQUEST_URI_PREFIX: &str = "urn:ietf:params:oauth:request_uri:";

struct ParRecord {
    client_id: String,
    params: serde_json::Value,
    expires_at: i64,
}

pub struct ParStore {
    records: DashMap<String, ParRecord>,
}

impl ParStore {
    #[must_use]
    pub fn new() -> Self {
        Self { records: DashMap::new() }
    }

    /// Push `params` (already validated exactly as `/authorize` would,
    /// minus user interaction) and return a fresh `request_uri`.
    pub fn push(&self, client_id: impl Into<String>, params: serde_json::Value, ttl_seconds: i64) -> String {
        let ttl = ttl_seconds.min(MAX_PAR_TTL_SECONDS).max(1);
        let request_uri = format!("{REQUEST_URI_PREFIX}{}", ids::random_opaque(48));
        self.records.insert(
            request_uri.clone(),
            ParRecord {
                client_id: client_id.into(),
                params,
                expires_at: aegis_core::clock::expires_in(ttl),
            },
        );
        request_uri
    }

    /// Consume a `request_uri`, verifying the presenting `client_id`
    /// matches the one that pushed it. Single-use: a second call with the
    /// same `request_uri` always fails.
    pub fn consume(&self, request_uri: &str, client_id: &str) -> OpResult<serde_json::Value> {
        let Some((_, record)) = self.records.remove(request_uri) else {
            return Err(OpError::invalid_request("request_uri not found or already used"));
        };
        if aegis_core::clock::is_expired(record.expires_at) {
            return Err(OpError::invalid_request("request_uri expired"));
        }
        if record.client_id != client_id {
            return Err(OpError::invalid_request("client_id does not match pushing client"));
        }
        Ok(record.params)
    }
}

impl Default for ParStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn push_then_consume_round_trips() {
        let store = ParStore::new();
        let uri = store.push("client-1", json!({"scope": "openid"}), 60);
        assert!(uri.starts_with(REQUEST_URI_PREFIX));
        let params = store.consume(&uri, "client-1").unwrap();
        assert_eq!(params["scope"], "openid");
    }

    #[test]
    fn consume_is_single_use() {
        let store = ParStore::new();
        let uri = store.push("client-1", json!({}), 60);
        store.consume(&uri, "client-1").unwrap();
        assert!(store.consume(&uri, "client-1").is_err());
    }

    #[test]
    fn consume_rejects_client_id_mismatch() {
        let store = ParStore::new();
        let uri = store.push("client-1", json!({}), 60);
        assert!(store.consume(&uri, "client-2").is_err());
    }
}
