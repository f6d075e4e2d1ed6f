//! Leaf error type for cryptographic operations, converted into
//! [`aegis_core::OpError`] at the crate boundary.

use aegis_core::{OpError, OpErrorKind};

/// Errors raised by [`crate::symmetric`] and [`crate::keyring`].
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("ciphertext too short to contain iv and auth tag")]
    CiphertextTooShort,

    #[error("authentication tag verification failed")]
    TamperedCiphertext,

    #[error("invalid base64url encoding: {0}")]
    InvalidEncoding(String),

    #[error("unsupported signing algorithm: {0}")]
    UnsupportedAlgorithm(String),

    #[error("key not found for kid: {0}")]
    KeyNotFound(String),

    #[error("client encryption key resolution failed: {0}")]
    KeyResolutionFailed(String),

    #[error("signing failed: {0}")]
    SigningFailed(String),

    #[error("encryption failed: {0}")]
    EncryptionFailed(String),

    #[error("`alg: none` is not permitted by the active profile")]
    NoneAlgorithmRejected,
}

impl From<CryptoError> for OpError {
    fn from(err: CryptoError) -> Self {
        let kind = match err {
            CryptoError::KeyNotFound(_) => OpErrorKind::NotFound,
            CryptoError::TamperedCiphertext
            | CryptoError::NoneAlgorithmRejected
            | CryptoError::UnsupportedAlgorithm(_) => OpErrorKind::InvalidRequest,
            CryptoError::KeyResolutionFailed(_) => OpErrorKind::TemporarilyUnavailable,
            _ => OpErrorKind::ServerError,
        };
        OpError::new(kind, err.to_string()).with_component("aegis-crypto")
    }
}
