//! JAR (`spec.md` §4.J): `request`/`request_uri` JWT-secured authorization
//! requests. A 5-part compact value is a JWE and is decrypted with the
//! provider's own key first; the inner (or, for a plain 3-part value, the
//! outer) JWS is then verified against the client's JWKS.

use aegis_core::{OpError, OpResult};
use aegis_crypto::keyring::jwe;
use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet};
use jsonwebtoken::{Algorithm, DecodingKey, Validation};

/// Decrypt (if necessary) and verify a JAR value, returning its claims as
/// a JSON object. Claims from the JWT override duplicate query
/// parameters; that merge happens one level up, in `aegis-authorize`.
pub fn decode_and_verify(
    jar_value: &str,
    client_jwks: &JwkSet,
    expected_client_id: &str,
    provider_private_key_pem: Option<&str>,
) -> OpResult<serde_json::Value> {
    let parts: Vec<&str> = jar_value.split('.').collect();

    let jws = match parts.len() {
        3 => jar_value.to_string(),
        5 => {
            let key_pem = provider_private_key_pem.ok_or_else(|| {
                OpError::invalid_request("encrypted request object received but no decryption key configured")
            })?;
            let decrypted = jwe::decrypt(jar_value, key_pem)
                .map_err(|e| OpError::invalid_request(format!("failed to decrypt request object: {e}")))?;
            String::from_utf8(decrypted)
                .map_err(|_| OpError::invalid_request("decrypted request object is not valid UTF-8 JWS"))?
        }
        _ => return Err(OpError::invalid_request("request object is neither a JWS nor a JWE")),
    };

    let header = jsonwebtoken::decode_header(&jws)
        .map_err(|e| OpError::invalid_request(format!("invalid request object header: {e}")))?;

    let kid = header.kid.as_deref();
    let jwk = select_jwk(client_jwks, kid)
        .ok_or_else(|| OpError::invalid_request("no matching key in client JWKS for request object"))?;
    let decoding_key = decoding_key_from_jwk(jwk)?;

    let mut validation = Validation::new(header.alg);
    validation.set_required_spec_claims(&["client_id"]);
    validation.validate_exp = true;
    validation.validate_aud = false;

    let token_data = jsonwebtoken::decode::<serde_json::Value>(&jws, &decoding_key, &validation)
        .map_err(|e| OpError::invalid_request(format!("request object signature invalid: {e}")))?;

    let claims = token_data.claims;
    let claimed_client_id = claims.get("client_id").and_then(|v| v.as_str());
    if claimed_client_id != Some(expected_client_id) {
        return Err(OpError::invalid_request("client_id in request object does not match query parameter"));
    }

    Ok(claims)
}

fn select_jwk<'a>(jwks: &'a JwkSet, kid: Option<&str>) -> Option<&'a Jwk> {
    if let Some(kid) = kid {
        if let Some(found) = jwks.keys.iter().find(|k| k.common.key_id.as_deref() == Some(kid)) {
            return Some(found);
        }
    }
    jwks.keys.first()
}

fn decoding_key_from_jwk(jwk: &Jwk) -> OpResult<DecodingKey> {
    match &jwk.algorithm {
        AlgorithmParameters::RSA(rsa) => DecodingKey::from_rsa_components(&rsa.n, &rsa.e)
            .map_err(|e| OpError::invalid_request(format!("invalid RSA key in client JWKS: {e}"))),
        AlgorithmParameters::EllipticCurve(ec) => DecodingKey::from_ec_components(&ec.x, &ec.y)
            .map_err(|e| OpError::invalid_request(format!("invalid EC key in client JWKS: {e}"))),
        _ => Err(OpError::invalid_request("unsupported key type in client JWKS")),
    }
}

/// Whether `alg` from a decoded header is acceptable for a request
/// object. `none` is always rejected for JAR regardless of profile,
/// since an unsigned request object defeats its own purpose.
#[must_use]
pub fn is_acceptable_algorithm(alg: Algorithm) -> bool {
    !matches!(alg, Algorithm::HS256 | Algorithm::HS384 | Algorithm::HS512)
}
