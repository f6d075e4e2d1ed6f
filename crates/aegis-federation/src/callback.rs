//! Upstream authorization-code exchange and id_token verification
//! (`spec.md` §4.N): `callback(provider, query)` exchanges the code at
//! the provider's `token_endpoint`, then verifies the returned
//! `id_token` against the provider's JWKS before any claim is trusted.

use std::time::Duration;

use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use serde::Deserialize;
use tracing::warn;

use crate::error::UpstreamError;
use crate::ssrf::validate_upstream_url;

#[derive(Debug, Deserialize)]
pub struct UpstreamTokenResponse {
    pub access_token: Option<String>,
    pub id_token: String,
    pub refresh_token: Option<String>,
    #[serde(default)]
    pub scope: Option<String>,
}

/// Exchange an authorization code at the upstream `token_endpoint` using
/// the PKCE verifier minted at `begin()` time.
///
/// # Errors
/// Returns [`UpstreamError::TokenExchange`] for any transport, non-2xx,
/// or body-decode failure, or [`UpstreamError::Ssrf`] if `token_endpoint`
/// fails SSRF validation.
pub async fn exchange_code(
    http: &reqwest::Client,
    token_endpoint: &str,
    code: &str,
    redirect_uri: &str,
    code_verifier: &str,
    client_id: &str,
    client_secret: Option<&str>,
) -> Result<UpstreamTokenResponse, UpstreamError> {
    validate_upstream_url(token_endpoint)?;

    let mut form = vec![
        ("grant_type", "authorization_code"),
        ("code", code),
        ("redirect_uri", redirect_uri),
        ("client_id", client_id),
        ("code_verifier", code_verifier),
    ];
    if let Some(secret) = client_secret {
        form.push(("client_secret", secret));
    }

    let response = http
        .post(token_endpoint)
        .timeout(Duration::from_secs(5))
        .form(&form)
        .send()
        .await
        .map_err(|e| UpstreamError::TokenExchange(e.to_string()))?;

    if !response.status().is_success() {
        return Err(UpstreamError::TokenExchange(format!("upstream returned {}", response.status())));
    }

    response.json().await.map_err(|e| UpstreamError::TokenExchange(e.to_string()))
}

/// Verify an upstream `id_token`'s signature against the provider's
/// JWKS, and the standard `iss`/`aud` claims. Does **not** enforce
/// `nonce` match — callers compare that against the stored
/// [`crate::state::ExternalAuthState`] themselves, since this function
/// has no access to it.
///
/// # Errors
/// Returns [`UpstreamError::InvalidIdToken`] for any structural, key
/// selection, signature, or claim-validation failure.
pub fn verify_id_token(
    id_token: &str,
    jwks: &JwkSet,
    expected_issuer: &str,
    expected_audience: &str,
) -> Result<serde_json::Value, UpstreamError> {
    let header = jsonwebtoken::decode_header(id_token)
        .map_err(|e| UpstreamError::InvalidIdToken(format!("malformed header: {e}")))?;

    if matches!(header.alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512) {
        return Err(UpstreamError::InvalidIdToken("HMAC-signed upstream id_token rejected".to_string()));
    }

    let jwk = select_jwk(jwks, header.kid.as_deref())
        .ok_or_else(|| UpstreamError::InvalidIdToken("no matching key in upstream JWKS".to_string()))?;
    let decoding_key = decoding_key_from_jwk(jwk)?;

    let mut validation = Validation::new(header.alg);
    validation.set_audience(&[expected_audience]);
    validation.set_issuer(&[expected_issuer]);
    validation.validate_exp = true;

    let data = jsonwebtoken::decode::<serde_json::Value>(id_token, &decoding_key, &validation)
        .map_err(|e| UpstreamError::InvalidIdToken(e.to_string()))?;

    Ok(data.claims)
}

pub(crate) fn select_jwk<'a>(jwks: &'a JwkSet, kid: Option<&str>) -> Option<&'a Jwk> {
    if let Some(kid) = kid {
        if let Some(found) = jwks.keys.iter().find(|k| k.common.key_id.as_deref() == Some(kid)) {
            return Some(found);
        }
        warn!(kid, "upstream JWKS had no key with this kid; falling back to first key");
    }
    jwks.keys.first()
}

fn decoding_key_from_jwk(jwk: &Jwk) -> Result<DecodingKey, UpstreamError> {
    match &jwk.algorithm {
        AlgorithmParameters::RSA(rsa) => DecodingKey::from_rsa_components(&rsa.n, &rsa.e)
            .map_err(|e| UpstreamError::InvalidIdToken(format!("invalid RSA key: {e}"))),
        AlgorithmParameters::EllipticCurve(ec) => DecodingKey::from_ec_components(&ec.x, &ec.y)
            .map_err(|e| UpstreamError::InvalidIdToken(format!("invalid EC key: {e}"))),
        _ => Err(UpstreamError::InvalidIdToken("unsupported upstream key type".to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn verify_rejects_malformed_token() {
        let jwks = JwkSet { keys: vec![] };
        let result = verify_id_token("not-a-jwt", &jwks, "https://idp.example", "client-1");
        assert!(result.is_err());
    }

    #[test]
    fn select_jwk_falls_back_to_first_key_without_kid() {
        let jwks = JwkSet { keys: vec![] };
        assert!(select_jwk(&jwks, None).is_none());
    }
}
