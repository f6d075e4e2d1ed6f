//! Leaf error type for policy decisions, converted to
//! [`aegis_core::OpError`] at the crate boundary.

use aegis_core::{OpError, OpErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PolicyError {
    #[error("sector_identifier_uri fetch failed: {0}")]
    SectorIdentifierFetch(String),
    #[error("sector_identifier_uri does not cover redirect host {0:?}")]
    SectorIdentifierIncomplete(String),
    #[error("decision-flow graph is invalid: {0}")]
    InvalidFlowGraph(String),
    #[error("decision-flow node not found: {0}")]
    NodeNotFound(String),
    #[error("consent required for scopes: {0:?}")]
    ConsentRequired(Vec<String>),
}

impl From<PolicyError> for OpError {
    fn from(err: PolicyError) -> Self {
        let kind = match &err {
            PolicyError::ConsentRequired(_) => OpErrorKind::ConsentRequired,
            PolicyError::SectorIdentifierFetch(_) => OpErrorKind::TemporarilyUnavailable,
            PolicyError::SectorIdentifierIncomplete(_)
            | PolicyError::InvalidFlowGraph(_)
            | PolicyError::NodeNotFound(_) => OpErrorKind::InvalidRequest,
        };
        OpError::new(kind, err.to_string()).with_component("aegis-policy")
    }
}
