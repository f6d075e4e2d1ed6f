//! DPoP (RFC 9449) proof verification and `cnf.jkt` binding (`spec.md`
//! §4.I, §6). Grounded on the JWK-thumbprint shape used by
//! `turbomcp-dpop::types::compute_jwk_thumbprint`, rewritten against
//! `jsonwebtoken`'s JWK type instead of a bespoke `DpopJwk` enum.

use aegis_core::{clock, OpError, OpResult};
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use base64::Engine as _;
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};
use sha2::{Digest, Sha256};

/// Acceptable clock skew for the `iat` freshness check.
const PROOF_FRESHNESS_SECONDS: i64 = 60;

/// A verified DPoP proof's claims relevant to binding.
#[derive(Debug, Clone)]
pub struct VerifiedProof {
    pub jti: String,
    pub jkt: String,
}

/// RFC 7638 JWK thumbprint: `base64url(SHA-256(canonical_json(jwk)))`
/// with only the required, lexicographically-ordered members.
///
/// `serde_json`'s `preserve_order` feature is on workspace-wide for
/// readability elsewhere, so this function builds the canonical object
/// by hand rather than relying on `serde_json::Map`'s insertion order.
#[must_use]
pub fn jwk_thumbprint(jwk: &Jwk) -> OpResult<String> {
    let canonical = match &jwk.algorithm {
        AlgorithmParameters::RSA(rsa) => {
            serde_json::json!({ "e": rsa.e, "kty": "RSA", "n": rsa.n })
        }
        AlgorithmParameters::EllipticCurve(ec) => {
            serde_json::json!({ "crv": format!("{:?}", ec.curve), "kty": "EC", "x": ec.x, "y": ec.y })
        }
        AlgorithmParameters::OctetKeyPair(okp) => {
            serde_json::json!({ "crv": format!("{:?}", okp.curve), "kty": "OKP", "x": okp.x })
        }
        _ => return Err(OpError::invalid_dpop_proof("unsupported key type for JWK thumbprint")),
    };
    let bytes = serde_json::to_vec(&canonical)?;
    Ok(URL_SAFE_NO_PAD.encode(Sha256::digest(bytes)))
}

/// Verify a compact DPoP proof JWT against the HTTP method/URI the caller
/// observed, an optional bound access token (`ath`), and jti replay
/// prevention is the caller's responsibility (via `ChallengeStore`) since
/// this function is pure and side-effect-free.
///
/// # Errors
/// Returns `invalid_dpop_proof` for any structural, signature, or
/// freshness failure.
pub fn verify_proof(proof_jwt: &str, htm: &str, htu: &str, access_token: Option<&str>) -> OpResult<VerifiedProof> {
    let header = jsonwebtoken::decode_header(proof_jwt)
        .map_err(|e| OpError::invalid_dpop_proof(format!("malformed proof header: {e}")))?;

    if header.typ.as_deref() != Some("dpop+jwt") {
        return Err(OpError::invalid_dpop_proof("proof typ must be dpop+jwt"));
    }
    let jwk = header
        .jwk
        .ok_or_else(|| OpError::invalid_dpop_proof("proof header missing embedded jwk"))?;
    let decoding_key = decoding_key_from_jwk(&jwk)?;

    let mut validation = Validation::new(header.alg);
    validation.validate_exp = false;
    validation.validate_aud = false;
    validation.required_spec_claims.clear();

    let token_data = jsonwebtoken::decode::<serde_json::Value>(proof_jwt, &decoding_key, &validation)
        .map_err(|e| OpError::invalid_dpop_proof(format!("proof signature invalid: {e}")))?;
    let claims = token_data.claims;

    let claim_htm = claims.get("htm").and_then(|v| v.as_str());
    if claim_htm != Some(htm) {
        return Err(OpError::invalid_dpop_proof("htm mismatch"));
    }
    let claim_htu = claims.get("htu").and_then(|v| v.as_str());
    if claim_htu != Some(htu) {
        return Err(OpError::invalid_dpop_proof("htu mismatch"));
    }

    let iat = claims
        .get("iat")
        .and_then(serde_json::Value::as_i64)
        .ok_or_else(|| OpError::invalid_dpop_proof("proof missing iat"))?;
    let now_seconds = clock::now_millis() / 1000;
    if (now_seconds - iat).abs() > PROOF_FRESHNESS_SECONDS {
        return Err(OpError::invalid_dpop_proof("proof iat outside freshness window"));
    }

    let jti = claims
        .get("jti")
        .and_then(|v| v.as_str())
        .ok_or_else(|| OpError::invalid_dpop_proof("proof missing jti"))?
        .to_string();

    if let Some(token) = access_token {
        let expected_ath = URL_SAFE_NO_PAD.encode(Sha256::digest(token.as_bytes()));
        let claim_ath = claims.get("ath").and_then(|v| v.as_str());
        if claim_ath != Some(expected_ath.as_str()) {
            return Err(OpError::invalid_dpop_proof("ath does not bind to presented access token"));
        }
    }

    let jkt = jwk_thumbprint(&jwk)?;
    Ok(VerifiedProof { jti, jkt })
}

fn decoding_key_from_jwk(jwk: &Jwk) -> OpResult<DecodingKey> {
    match &jwk.algorithm {
        AlgorithmParameters::RSA(rsa) => DecodingKey::from_rsa_components(&rsa.n, &rsa.e)
            .map_err(|e| OpError::invalid_dpop_proof(format!("invalid RSA proof key: {e}"))),
        AlgorithmParameters::EllipticCurve(ec) => DecodingKey::from_ec_components(&ec.x, &ec.y)
            .map_err(|e| OpError::invalid_dpop_proof(format!("invalid EC proof key: {e}"))),
        _ => Err(OpError::invalid_dpop_proof("unsupported proof key type")),
    }
}

/// Whether `alg` is acceptable for a DPoP proof signature (never a MAC
/// algorithm, since the whole point is asymmetric proof-of-possession).
#[must_use]
pub fn is_acceptable_algorithm(alg: Algorithm) -> bool {
    !matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_malformed_proof() {
        let result = verify_proof("not-a-jwt", "POST", "https://as.example/token", None);
        assert!(result.is_err());
    }

    #[test]
    fn none_like_hmac_is_unacceptable() {
        assert!(!is_acceptable_algorithm(Algorithm::HS256));
        assert!(is_acceptable_algorithm(Algorithm::ES256));
    }
}
