//! Leaf error type for upstream federation failures, converted into
//! [`aegis_core::OpError`] at the crate boundary (`spec.md` §7).

use aegis_core::{OpError, OpErrorKind};
use thiserror::Error;

use crate::ssrf::SsrfError;

#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("ssrf protection blocked an upstream call: {0}")]
    Ssrf(#[from] SsrfError),
    #[error("upstream discovery failed: {0}")]
    Discovery(#[from] crate::discovery::DiscoveryError),
    #[error("upstream token exchange failed: {0}")]
    TokenExchange(String),
    #[error("upstream id_token verification failed: {0}")]
    InvalidIdToken(String),
    #[error("state parameter mismatch or expired auth state")]
    StateMismatch,
    #[error("attribute mapping produced no usable subject")]
    UnmappedSubject,
    #[error("logout_token verification failed: {0}")]
    InvalidLogoutToken(String),
    #[error("logout_token jti already processed (replay)")]
    LogoutTokenReplay,
}

impl From<UpstreamError> for OpError {
    fn from(err: UpstreamError) -> Self {
        let kind = match err {
            UpstreamError::StateMismatch
            | UpstreamError::InvalidIdToken(_)
            | UpstreamError::InvalidLogoutToken(_)
            | UpstreamError::LogoutTokenReplay
            | UpstreamError::UnmappedSubject => OpErrorKind::InvalidRequest,
            UpstreamError::Ssrf(_) | UpstreamError::Discovery(_) | UpstreamError::TokenExchange(_) => {
                OpErrorKind::TemporarilyUnavailable
            }
        };
        OpError::new(kind, err.to_string()).with_component("aegis-federation")
    }
}
