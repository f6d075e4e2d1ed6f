//! Backchannel logout (`spec.md` §4.N, §8 scenario 6): verify a
//! provider-pushed `logout_token` against its JWKS, replay-check its
//! `jti` through [`ChallengeStore`], then fan the logout out to every
//! session bound to `(provider_id, sub)` and clear stored tokens on the
//! matching [`crate::linking::LinkedIdentity`] row.

use std::sync::Arc;

use aegis_actors::{ChallengeStore, ChallengeType, SessionStore};
use jsonwebtoken::jwk::JwkSet;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tracing::{info, warn};

use crate::callback::select_jwk;
use crate::error::UpstreamError;
use crate::linking::LinkedIdentityStore;

/// OpenID Connect Back-Channel Logout 1.0 event type URI that must be
/// present in the `events` claim.
const BACKCHANNEL_LOGOUT_EVENT: &str = "http://schemas.openid.net/event/backchannel-logout";

/// Extra slack added to the logout token's own `iat`-derived window
/// before its replay-cache entry expires, bounding how long the jti
/// needs to stay in [`ChallengeStore`] (`spec.md` §4.N: "jti
/// replay-prevented via ChallengeStore with TTL iat-window + buffer").
const REPLAY_WINDOW_BUFFER_SECONDS: i64 = 60;
const MAX_LOGOUT_TOKEN_AGE_SECONDS: i64 = 120;

#[derive(Debug, Deserialize)]
struct LogoutTokenClaims {
    iss: String,
    aud: serde_json::Value,
    iat: i64,
    jti: String,
    sub: Option<String>,
    sid: Option<String>,
    events: serde_json::Value,
    nonce: Option<String>,
}

#[derive(Debug, Clone)]
pub struct LogoutOutcome {
    pub sessions_terminated: usize,
    pub tokens_cleared: bool,
}

/// Process an inbound backchannel-logout POST.
///
/// # Errors
/// Returns [`UpstreamError::InvalidLogoutToken`] for any structural,
/// signature, issuer/audience, `events`, or `nonce`-presence failure,
/// and [`UpstreamError::LogoutTokenReplay`] if `jti` was already
/// processed.
pub async fn process_logout_token(
    logout_token: &str,
    jwks: &JwkSet,
    expected_issuer: &str,
    expected_client_id: &str,
    provider_id: &str,
    challenges: &ChallengeStore,
    sessions: &SessionStore,
    identities: &Arc<LinkedIdentityStore>,
) -> Result<LogoutOutcome, UpstreamError> {
    let claims = verify_logout_token(logout_token, jwks, expected_issuer, expected_client_id)?;

    if challenges.exists(ChallengeType::BackchannelLogoutJti, &claims.jti).await {
        return Err(UpstreamError::LogoutTokenReplay);
    }
    let ttl = (MAX_LOGOUT_TOKEN_AGE_SECONDS + REPLAY_WINDOW_BUFFER_SECONDS).max(1);
    // Best-effort: a store conflict here just means a concurrent request
    // won the race, which is exactly the replay we want to reject.
    if challenges
        .store(ChallengeType::BackchannelLogoutJti, &claims.jti, serde_json::json!({}), ttl)
        .await
        .is_err()
    {
        return Err(UpstreamError::LogoutTokenReplay);
    }

    let Some(sub) = claims.sub.clone() else {
        return Err(UpstreamError::InvalidLogoutToken("logout_token missing sub".to_string()));
    };

    let tokens_cleared = identities.clear_tokens(provider_id, &sub);
    let sessions_terminated = sessions.terminate_by_external_identity(provider_id, &sub).await;
    info!(provider_id, sessions_terminated, tokens_cleared, "processed backchannel logout");

    Ok(LogoutOutcome { sessions_terminated, tokens_cleared })
}

fn verify_logout_token(
    logout_token: &str,
    jwks: &JwkSet,
    expected_issuer: &str,
    expected_client_id: &str,
) -> Result<LogoutTokenClaims, UpstreamError> {
    let header = jsonwebtoken::decode_header(logout_token)
        .map_err(|e| UpstreamError::InvalidLogoutToken(format!("malformed header: {e}")))?;
    if matches!(header.alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
        return Err(UpstreamError::InvalidLogoutToken("HMAC-signed logout_token rejected".to_string()));
    }

    let jwk = select_jwk(jwks, header.kid.as_deref())
        .ok_or_else(|| UpstreamError::InvalidLogoutToken("no matching key in provider JWKS".to_string()))?;
    let decoding_key = match &jwk.algorithm {
        jsonwebtoken::jwk::AlgorithmParameters::RSA(rsa) => {
            DecodingKey::from_rsa_components(&rsa.n, &rsa.e)
        }
        jsonwebtoken::jwk::AlgorithmParameters::EllipticCurve(ec) => {
            DecodingKey::from_ec_components(&ec.x, &ec.y)
        }
        _ => return Err(UpstreamError::InvalidLogoutToken("unsupported provider key type".to_string())),
    }
    .map_err(|e| UpstreamError::InvalidLogoutToken(e.to_string()))?;

    let mut validation = Validation::new(header.alg);
    validation.set_issuer(&[expected_issuer]);
    validation.set_audience(&[expected_client_id]);
    validation.validate_exp = false;

    let data = jsonwebtoken::decode::<LogoutTokenClaims>(logout_token, &decoding_key, &validation)
        .map_err(|e| UpstreamError::InvalidLogoutToken(e.to_string()))?;
    let claims = data.claims;

    if claims.nonce.is_some() {
        return Err(UpstreamError::InvalidLogoutToken("logout_token must not carry a nonce".to_string()));
    }
    // `sid`-only logout tokens are valid per the OIDC Back-Channel Logout
    // spec, but this provider's session model only indexes sessions by
    // `(provider_id, sub)` (`SessionStore::terminate_by_external_identity`),
    // so a token carrying only `sid` cannot be acted on downstream and is
    // rejected here rather than accepted and silently dropped later.
    if claims.sub.is_none() {
        return Err(UpstreamError::InvalidLogoutToken("logout_token must carry sub".to_string()));
    }

    let has_logout_event = claims
        .events
        .get(BACKCHANNEL_LOGOUT_EVENT)
        .is_some_and(|v| v.is_object());
    if !has_logout_event {
        return Err(UpstreamError::InvalidLogoutToken("events claim missing backchannel-logout member".to_string()));
    }

    let age = aegis_core::clock::now_millis() / 1000 - claims.iat;
    if !(0..=MAX_LOGOUT_TOKEN_AGE_SECONDS).contains(&age) {
        warn!(age, "logout_token iat outside the acceptable freshness window");
        return Err(UpstreamError::InvalidLogoutToken("logout_token iat outside acceptable window".to_string()));
    }

    Ok(claims)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_token() {
        let jwks = JwkSet { keys: vec![] };
        let result = verify_logout_token("not-a-jwt", &jwks, "https://idp.example", "client-1");
        assert!(result.is_err());
    }
}
