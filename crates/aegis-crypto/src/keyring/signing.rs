//! The provider's own signing key ring: JWS signing, JWKS publication, and
//! generation-overlap key rotation (`spec.md` §4.A).

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use arc_swap::ArcSwap;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use parking_lot::RwLock;
use serde::de::DeserializeOwned;
use serde::Serialize;
use tracing::{info, warn};

use crate::error::CryptoError;
use crate::keyring::types::{SigningAlgorithm, SigningKey};

/// Overlap window a retired key remains valid for verification after a
/// newer key becomes active, per `SPEC_FULL.md` §2.1.
pub const ROTATION_OVERLAP: Duration = Duration::from_secs(24 * 60 * 60);

/// `alg: none` is rejected unless a profile explicitly allows it (used only
/// by conformance test suites, never in a real deployment).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct SigningProfile {
    pub allow_none_algorithm: bool,
}

/// Holds the active signing key plus a bounded history of retired keys
/// still inside their verification overlap window.
///
/// Mirrors the copy-on-rotate pattern the workspace uses elsewhere for
/// hot-path-read / cold-path-write state: readers take an `Arc` snapshot
/// via [`ArcSwap::load`] and never block a concurrent rotation.
pub struct KeyRing {
    active: ArcSwap<SigningKey>,
    retired: RwLock<Vec<Arc<SigningKey>>>,
    profile: SigningProfile,
}

impl KeyRing {
    #[must_use]
    pub fn new(initial: SigningKey, profile: SigningProfile) -> Self {
        Self {
            active: ArcSwap::from_pointee(initial),
            retired: RwLock::new(Vec::new()),
            profile,
        }
    }

    /// Currently active signing key.
    #[must_use]
    pub fn active(&self) -> Arc<SigningKey> {
        self.active.load_full()
    }

    /// Promote `next` to active, moving the previous active key into the
    /// retired set with a `retired_at` set `ROTATION_OVERLAP` in the
    /// future so in-flight tokens signed with it still validate.
    pub fn rotate(&self, mut next: SigningKey) {
        next.retired_at = None;
        let previous = self.active.swap(Arc::new(next));
        let mut retired_previous = (*previous).clone();
        retired_previous.retired_at = Some(SystemTime::now() + ROTATION_OVERLAP);
        info!(kid = %retired_previous.kid, "retiring signing key after rotation");

        let mut retired = self.retired.write();
        retired.push(Arc::new(retired_previous));
        retired.retain(|k| !k.is_retired());
    }

    /// Find a key (active or within its overlap window) by `kid`, for
    /// signature verification.
    #[must_use]
    pub fn find(&self, kid: &str) -> Option<Arc<SigningKey>> {
        let active = self.active.load_full();
        if active.kid == kid {
            return Some(active);
        }
        self.retired
            .read()
            .iter()
            .find(|k| k.kid == kid && !k.is_retired())
            .cloned()
    }

    /// JWKS document (RFC 7517) containing the active key and any retired
    /// keys still inside their overlap window, so relying parties can keep
    /// verifying tokens signed moments before a rotation.
    #[must_use]
    pub fn jwks_document(&self) -> serde_json::Value {
        let mut keys = vec![self.active.load_full().public_jwk.clone()];
        keys.extend(
            self.retired
                .read()
                .iter()
                .filter(|k| !k.is_retired())
                .map(|k| k.public_jwk.clone()),
        );
        serde_json::json!({ "keys": keys })
    }

    /// Sign `claims` with the active key, returning a compact JWS.
    ///
    /// # Errors
    /// Returns [`CryptoError::NoneAlgorithmRejected`] if the profile
    /// disallows `alg: none` and that was somehow selected, and
    /// [`CryptoError::SigningFailed`] for any `jsonwebtoken` failure.
    pub fn sign<T: Serialize>(&self, claims: &T) -> Result<String, CryptoError> {
        let key = self.active.load_full();
        self.sign_with(&key, claims)
    }

    fn sign_with<T: Serialize>(
        &self,
        key: &SigningKey,
        claims: &T,
    ) -> Result<String, CryptoError> {
        let alg = key.algorithm.to_jsonwebtoken();
        if alg == jsonwebtoken::Algorithm::HS256 && !self.profile.allow_none_algorithm {
            return Err(CryptoError::NoneAlgorithmRejected);
        }

        let mut header = Header::new(alg);
        header.kid = Some(key.kid.clone());

        let encoding_key = match key.algorithm {
            SigningAlgorithm::Rs256 => EncodingKey::from_rsa_pem(&key.private_key_pem),
            SigningAlgorithm::Es256 | SigningAlgorithm::Es384 | SigningAlgorithm::Es512 => {
                EncodingKey::from_ec_pem(&key.private_key_pem)
            }
            SigningAlgorithm::EdDsa => EncodingKey::from_ed_pem(&key.private_key_pem),
        }
        .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;

        jsonwebtoken::encode(&header, claims, &encoding_key)
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))
    }

    /// Verify and decode a compact JWS signed by this ring (active or
    /// still inside its retirement overlap window) into `T`.
    ///
    /// # Errors
    /// Returns [`CryptoError::KeyNotFound`] if the header's `kid` names no
    /// known key, and [`CryptoError::SigningFailed`] (reused here as the
    /// generic decode-failure variant) for any signature/claim failure.
    pub fn verify<T: DeserializeOwned>(&self, jws: &str) -> Result<T, CryptoError> {
        let header = jsonwebtoken::decode_header(jws).map_err(|e| CryptoError::SigningFailed(e.to_string()))?;
        let kid = header.kid.as_deref().ok_or_else(|| CryptoError::KeyNotFound("<no kid>".to_string()))?;
        let key = self.find(kid).ok_or_else(|| CryptoError::KeyNotFound(kid.to_string()))?;

        let jwk: jsonwebtoken::jwk::Jwk = serde_json::from_value(key.public_jwk.clone())
            .map_err(|e| CryptoError::SigningFailed(format!("stored public_jwk is not a valid JWK: {e}")))?;
        let decoding_key = match &jwk.algorithm {
            jsonwebtoken::jwk::AlgorithmParameters::RSA(rsa) => {
                DecodingKey::from_rsa_components(&rsa.n, &rsa.e)
            }
            jsonwebtoken::jwk::AlgorithmParameters::EllipticCurve(ec) => {
                DecodingKey::from_ec_components(&ec.x, &ec.y)
            }
            jsonwebtoken::jwk::AlgorithmParameters::OctetKeyPair(okp) => {
                DecodingKey::from_ed_components(&okp.x)
            }
            jsonwebtoken::jwk::AlgorithmParameters::OctetKey(_) => {
                return Err(CryptoError::UnsupportedAlgorithm("symmetric JWK cannot verify a provider-signed JWS".into()));
            }
        }
        .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;

        let mut validation = Validation::new(key.algorithm.to_jsonwebtoken());
        validation.validate_aud = false;
        let data = jsonwebtoken::decode::<T>(jws, &decoding_key, &validation)
            .map_err(|e| CryptoError::SigningFailed(e.to_string()))?;
        Ok(data.claims)
    }

    /// Drop retired keys whose overlap window has elapsed. Called
    /// periodically by the facade's housekeeping task; rotation itself
    /// already prunes opportunistically so this is a safety net against a
    /// long gap between rotations.
    pub fn sweep_expired(&self) {
        let mut retired = self.retired.write();
        let before = retired.len();
        retired.retain(|k| !k.is_retired());
        if retired.len() != before {
            warn!(
                dropped = before - retired.len(),
                "swept expired signing keys out of rotation overlap"
            );
        }
    }
}
