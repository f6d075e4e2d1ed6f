//! Leaf error type for client metadata validation and registration,
//! converted to [`aegis_core::OpError`] at the crate boundary.

use aegis_core::{OpError, OpErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown client_id")]
    UnknownClient,
    #[error("client is disabled")]
    ClientDisabled,
    #[error("invalid client metadata: {0}")]
    InvalidMetadata(String),
    #[error("sector_identifier_uri validation failed: {0}")]
    SectorIdentifier(String),
    #[error("jwks resolution failed: {0}")]
    JwksResolution(#[from] aegis_crypto::error::CryptoError),
}

impl From<RegistryError> for OpError {
    fn from(err: RegistryError) -> Self {
        match &err {
            RegistryError::UnknownClient => {
                OpError::new(OpErrorKind::InvalidClient, err.to_string()).with_component("aegis-registry")
            }
            RegistryError::ClientDisabled => {
                OpError::new(OpErrorKind::UnauthorizedClient, err.to_string()).with_component("aegis-registry")
            }
            RegistryError::InvalidMetadata(_) | RegistryError::SectorIdentifier(_) => {
                OpError::new(OpErrorKind::InvalidRequest, err.to_string()).with_component("aegis-registry")
            }
            RegistryError::JwksResolution(_) => {
                OpError::new(OpErrorKind::TemporarilyUnavailable, err.to_string()).with_component("aegis-registry")
            }
        }
    }
}
