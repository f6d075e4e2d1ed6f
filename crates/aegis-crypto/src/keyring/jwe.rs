//! JSON Web Encryption (RFC 7516) for clients that request encrypted ID
//! tokens or userinfo responses (`spec.md` §4.A).
//!
//! `jsonwebtoken` (the workspace's default JOSE crate, via
//! [`crate::keyring::signing`]) only implements JWS. `picky`'s `jose`
//! feature carries a full JWE implementation and is pulled in for this
//! module alone.

use picky::jose::jwe::{Jwe, JweAlg, JweEnc};
use picky::key::{PrivateKey, PublicKey};

use crate::error::CryptoError;

/// Key-management algorithms a client may request for JWE wrapping.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JweKeyAlgorithm {
    RsaOaep,
    RsaOaep256,
    EcdhEs,
    EcdhEsA256Kw,
}

impl JweKeyAlgorithm {
    fn to_picky(self) -> JweAlg {
        match self {
            Self::RsaOaep => JweAlg::RsaOaep,
            Self::RsaOaep256 => JweAlg::RsaOaep256,
            Self::EcdhEs => JweAlg::EcdhEs,
            Self::EcdhEsA256Kw => JweAlg::EcdhEsA256kw,
        }
    }

    /// Parse the `alg` value from client metadata / registration request.
    pub fn parse(value: &str) -> Result<Self, CryptoError> {
        match value {
            "RSA-OAEP" => Ok(Self::RsaOaep),
            "RSA-OAEP-256" => Ok(Self::RsaOaep256),
            "ECDH-ES" => Ok(Self::EcdhEs),
            "ECDH-ES+A256KW" => Ok(Self::EcdhEsA256Kw),
            other => Err(CryptoError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

/// Content-encryption algorithms a client may request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JweContentEncryption {
    A128Gcm,
    A256Gcm,
    A128CbcHs256,
}

impl JweContentEncryption {
    fn to_picky(self) -> JweEnc {
        match self {
            Self::A128Gcm => JweEnc::Aes128Gcm,
            Self::A256Gcm => JweEnc::Aes256Gcm,
            Self::A128CbcHs256 => JweEnc::Aes128CbcHmacSha256,
        }
    }

    pub fn parse(value: &str) -> Result<Self, CryptoError> {
        match value {
            "A128GCM" => Ok(Self::A128Gcm),
            "A256GCM" => Ok(Self::A256Gcm),
            "A128CBC-HS256" => Ok(Self::A128CbcHs256),
            other => Err(CryptoError::UnsupportedAlgorithm(other.to_string())),
        }
    }
}

/// Encrypt `payload` (typically a signed JWT — nested JWS-in-JWE, per
/// OIDC core §10.2) to `recipient_public_key_pem` under the requested
/// key-management and content-encryption algorithm pair.
pub fn encrypt(
    payload: &[u8],
    recipient_public_key_pem: &str,
    key_alg: JweKeyAlgorithm,
    content_enc: JweContentEncryption,
) -> Result<String, CryptoError> {
    let public_key = PublicKey::from_pem_str(recipient_public_key_pem)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let jwe = Jwe::new(key_alg.to_picky(), content_enc.to_picky(), payload.to_vec());
    jwe.encode(&public_key)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))
}

/// Decrypt a compact JWE using the provider's own private key — used when
/// the provider is the recipient of an encrypted request object (JAR) or
/// an encrypted client assertion.
pub fn decrypt(compact_jwe: &str, recipient_private_key_pem: &str) -> Result<Vec<u8>, CryptoError> {
    let private_key = PrivateKey::from_pem_str(recipient_private_key_pem)
        .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

    let decrypted = Jwe::decode(compact_jwe, &private_key)
        .map_err(|_| CryptoError::TamperedCiphertext)?;
    Ok(decrypted.payload)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_known_key_algorithms() {
        assert_eq!(JweKeyAlgorithm::parse("RSA-OAEP").unwrap(), JweKeyAlgorithm::RsaOaep);
        assert_eq!(
            JweKeyAlgorithm::parse("ECDH-ES+A256KW").unwrap(),
            JweKeyAlgorithm::EcdhEsA256Kw
        );
        assert!(JweKeyAlgorithm::parse("bogus").is_err());
    }

    #[test]
    fn parses_known_content_encryptions() {
        assert_eq!(
            JweContentEncryption::parse("A256GCM").unwrap(),
            JweContentEncryption::A256Gcm
        );
        assert!(JweContentEncryption::parse("bogus").is_err());
    }
}
