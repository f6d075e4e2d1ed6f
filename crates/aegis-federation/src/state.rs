//! Upstream authorization state (`spec.md` §4.N: "`begin(provider,
//! tenant)` creates an external_idp_auth_state record (PKCE + nonce +
//! state) and returns the upstream authorize URL"). Stored through
//! [`aegis_actors::ChallengeStore`] under
//! [`aegis_actors::ChallengeType::ExternalIdpAuthState`], keyed on the
//! `state` value itself, so it inherits single-consume and TTL-expiry
//! behavior rather than this crate reimplementing either.

use aegis_core::ids;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Default lifetime of an in-flight upstream authorization attempt.
pub const AUTH_STATE_TTL_SECONDS: i64 = 600;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExternalAuthState {
    pub provider_id: String,
    pub tenant_id: String,
    pub pkce_verifier: String,
    pub nonce: String,
    pub redirect_uri: String,
}

/// Freshly minted upstream-auth attempt: the opaque `state` value to
/// hand the caller for correlation, the record to persist under it, and
/// the PKCE challenge to embed in the upstream authorize URL.
pub struct BeginAttempt {
    pub state: String,
    pub record: ExternalAuthState,
    pub code_challenge: String,
}

/// Mint a fresh `state`/PKCE pair/nonce for a `begin()` call.
#[must_use]
pub fn new_attempt(provider_id: &str, tenant_id: &str, redirect_uri: &str) -> BeginAttempt {
    let state = ids::random_opaque(32);
    let pkce_verifier = ids::random_opaque(48);
    let code_challenge = URL_SAFE_NO_PAD.encode(Sha256::digest(pkce_verifier.as_bytes()));
    let nonce = ids::random_opaque(24);

    BeginAttempt {
        state,
        record: ExternalAuthState {
            provider_id: provider_id.to_string(),
            tenant_id: tenant_id.to_string(),
            pkce_verifier,
            nonce,
            redirect_uri: redirect_uri.to_string(),
        },
        code_challenge,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_attempt_challenge_matches_verifier() {
        let attempt = new_attempt("google", "tenant-1", "https://op.example/auth/external/google/callback");
        let recomputed = URL_SAFE_NO_PAD.encode(Sha256::digest(attempt.record.pkce_verifier.as_bytes()));
        assert_eq!(recomputed, attempt.code_challenge);
    }

    #[test]
    fn new_attempt_state_is_unique() {
        let a = new_attempt("google", "t", "https://op.example/cb");
        let b = new_attempt("google", "t", "https://op.example/cb");
        assert_ne!(a.state, b.state);
    }
}
