//! CodeStore (`spec.md` §4.H): authorization-code mint/consume, one-time,
//! PKCE binding.

use aegis_core::{ids, OpError, OpResult};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

const MAX_CODE_TTL_SECONDS: i64 = 600;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pkce {
    pub challenge: String,
    pub method: PkceMethod,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum PkceMethod {
    S256,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthorizationCode {
    pub code: String,
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub subject: String,
    pub nonce: Option<String>,
    pub pkce: Option<Pkce>,
    pub max_age: Option<i64>,
    pub amr: Vec<String>,
    pub auth_time: i64,
    pub issued_at: i64,
    pub expires_at: i64,
}

/// What `consume` hands back once bindings are verified.
pub struct ConsumedCode {
    pub client_id: String,
    pub redirect_uri: String,
    pub scope: String,
    pub subject: String,
    pub nonce: Option<String>,
    pub amr: Vec<String>,
    pub auth_time: i64,
}

pub struct CodeStore {
    codes: DashMap<String, AuthorizationCode>,
}

impl CodeStore {
    #[must_use]
    pub fn new() -> Self {
        Self { codes: DashMap::new() }
    }

    /// Mint a new ≥128-char base64url code bound to the given request
    /// parameters, and store it with `ttl_seconds` (capped at 600).
    #[allow(clippy::too_many_arguments)]
    pub fn mint(
        &self,
        client_id: impl Into<String>,
        redirect_uri: impl Into<String>,
        scope: impl Into<String>,
        subject: impl Into<String>,
        nonce: Option<String>,
        pkce: Option<Pkce>,
        max_age: Option<i64>,
        amr: Vec<String>,
        auth_time: i64,
        ttl_seconds: i64,
    ) -> OpResult<String> {
        let ttl = ttl_seconds.min(MAX_CODE_TTL_SECONDS).max(1);
        let code = ids::random_authorization_code();
        let record = AuthorizationCode {
            code: code.clone(),
            client_id: client_id.into(),
            redirect_uri: redirect_uri.into(),
            scope: scope.into(),
            subject: subject.into(),
            nonce,
            pkce,
            max_age,
            amr,
            auth_time,
            issued_at: aegis_core::clock::now_millis(),
            expires_at: aegis_core::clock::expires_in(ttl),
        };
        self.codes.insert(code.clone(), record);
        Ok(code)
    }

    /// Atomically verify and consume `code`. Any mismatch (wrong client,
    /// wrong redirect_uri, PKCE verifier failure, expiry, or the code
    /// simply not existing/already consumed) returns `invalid_grant` —
    /// the caller never learns which check failed.
    pub fn consume(
        &self,
        code: &str,
        client_id: &str,
        redirect_uri: &str,
        code_verifier: Option<&str>,
    ) -> OpResult<ConsumedCode> {
        let Some((_, record)) = self.codes.remove(code) else {
            return Err(OpError::invalid_grant("authorization code not found or already used"));
        };

        if aegis_core::clock::is_expired(record.expires_at) {
            return Err(OpError::invalid_grant("authorization code expired"));
        }
        if record.client_id != client_id || record.redirect_uri != redirect_uri {
            return Err(OpError::invalid_grant("authorization code binding mismatch"));
        }

        if let Some(pkce) = &record.pkce {
            let verifier = code_verifier.ok_or_else(|| OpError::invalid_grant("code_verifier required"))?;
            let computed = Sha256::digest(verifier.as_bytes());
            let computed_b64 = URL_SAFE_NO_PAD.encode(computed);
            if computed_b64 != pkce.challenge {
                return Err(OpError::invalid_grant("code_verifier does not match code_challenge"));
            }
        } else if code_verifier.is_some() {
            return Err(OpError::invalid_grant("code_verifier presented for a non-PKCE code"));
        }

        Ok(ConsumedCode {
            client_id: record.client_id,
            redirect_uri: record.redirect_uri,
            scope: record.scope,
            subject: record.subject,
            nonce: record.nonce,
            amr: record.amr,
            auth_time: record.auth_time,
        })
    }
}

impl Default for CodeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pkce_for(verifier: &str) -> Pkce {
        let challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(verifier.as_bytes()));
        Pkce { challenge, method: PkceMethod::S256 }
    }

    #[test]
    fn mint_produces_min_length_code() {
        let store = CodeStore::new();
        let code = store
            .mint("client-1", "https://rp.example/cb", "openid", "user-1", None, None, None, vec![], 0, 600)
            .unwrap();
        assert!(code.len() >= aegis_core::ids::MIN_OPAQUE_CODE_LEN);
    }

    #[test]
    fn consume_verifies_pkce_and_is_single_use() {
        let store = CodeStore::new();
        let pkce = pkce_for("verifier-value");
        let code = store
            .mint(
                "client-1",
                "https://rp.example/cb",
                "openid",
                "user-1",
                None,
                Some(pkce),
                None,
                vec![],
                0,
                600,
            )
            .unwrap();

        let consumed = store
            .consume(&code, "client-1", "https://rp.example/cb", Some("verifier-value"))
            .unwrap();
        assert_eq!(consumed.subject, "user-1");

        let replay = store.consume(&code, "client-1", "https://rp.example/cb", Some("verifier-value"));
        assert!(replay.is_err());
    }

    #[test]
    fn consume_rejects_wrong_verifier() {
        let store = CodeStore::new();
        let pkce = pkce_for("verifier-value");
        let code = store
            .mint("client-1", "https://rp.example/cb", "openid", "user-1", None, Some(pkce), None, vec![], 0, 600)
            .unwrap();
        assert!(store.consume(&code, "client-1", "https://rp.example/cb", Some("wrong")).is_err());
    }

    #[test]
    fn consume_rejects_client_id_mismatch() {
        let store = CodeStore::new();
        let code = store
            .mint("client-1", "https://rp.example/cb", "openid", "user-1", None, None, None, vec![], 0, 600)
            .unwrap();
        assert!(store.consume(&code, "client-2", "https://rp.example/cb", None).is_err());
    }
}
