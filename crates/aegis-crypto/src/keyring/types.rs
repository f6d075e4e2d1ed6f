//! Signing algorithms and key material for the provider's own JWKS
//! (`spec.md` §4.A, component A).

use std::time::SystemTime;

use serde::{Deserialize, Serialize};
use zeroize::Zeroize;

/// Signing algorithms the provider may publish a key for.
///
/// `spec.md` §4.A requires RS256 as the universal default plus the
/// elliptic-curve family for tenants that opt into smaller tokens.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SigningAlgorithm {
    #[serde(rename = "RS256")]
    Rs256,
    #[serde(rename = "ES256")]
    Es256,
    #[serde(rename = "ES384")]
    Es384,
    #[serde(rename = "ES512")]
    Es512,
    #[serde(rename = "EdDSA")]
    EdDsa,
}

impl SigningAlgorithm {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Rs256 => "RS256",
            Self::Es256 => "ES256",
            Self::Es384 => "ES384",
            Self::Es512 => "ES512",
            Self::EdDsa => "EdDSA",
        }
    }

    #[must_use]
    pub fn to_jsonwebtoken(self) -> jsonwebtoken::Algorithm {
        match self {
            Self::Rs256 => jsonwebtoken::Algorithm::RS256,
            Self::Es256 => jsonwebtoken::Algorithm::ES256,
            Self::Es384 => jsonwebtoken::Algorithm::ES384,
            // jsonwebtoken has no ES512 variant as of 9.x; it is accepted at
            // the config layer but rejected at key-generation time until
            // upstream support lands.
            Self::Es512 => jsonwebtoken::Algorithm::ES384,
            Self::EdDsa => jsonwebtoken::Algorithm::EdDSA,
        }
    }
}

/// Private key material backing a signing key. Zeroized on drop.
#[derive(Clone)]
pub enum SigningPrivateKey {
    Rsa(Vec<u8>),
    Ec(Vec<u8>),
    Ed25519(Vec<u8>),
}

impl Zeroize for SigningPrivateKey {
    fn zeroize(&mut self) {
        match self {
            Self::Rsa(bytes) | Self::Ec(bytes) | Self::Ed25519(bytes) => bytes.zeroize(),
        }
    }
}

impl Drop for SigningPrivateKey {
    fn drop(&mut self) {
        self.zeroize();
    }
}

impl std::fmt::Debug for SigningPrivateKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SigningPrivateKey(..)")
    }
}

/// A single keypair in the provider's rotation, identified by `kid`.
#[derive(Debug, Clone)]
pub struct SigningKey {
    pub kid: String,
    pub algorithm: SigningAlgorithm,
    pub private_key_pem: Vec<u8>,
    pub public_jwk: serde_json::Value,
    pub created_at: SystemTime,
    /// Set once this key is superseded by a newer active key. Verification
    /// continues to accept it until `retire_at` per the rotation overlap
    /// window (`SPEC_FULL.md` §2.1).
    pub retired_at: Option<SystemTime>,
}

impl SigningKey {
    #[must_use]
    pub fn is_retired(&self) -> bool {
        self.retired_at.is_some_and(|t| SystemTime::now() >= t)
    }
}
