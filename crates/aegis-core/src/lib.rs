//! # aegis-core
//!
//! Shared primitives for the Aegis identity provider workspace: the unified
//! error taxonomy, opaque id generation, canonical-JSON version hashing, and
//! clock helpers. Every other crate in the workspace depends on this one and
//! none of it is OAuth/OIDC-protocol-specific — that logic lives in
//! `aegis-authorize`, `aegis-tokens`, and friends.

pub mod canonical;
pub mod clock;
pub mod error;
pub mod ids;

pub use error::{OpError, OpErrorKind, OpResult};
