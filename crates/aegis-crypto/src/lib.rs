//! # aegis-crypto
//!
//! Cryptographic primitives for the Aegis identity provider: the
//! [`keyring::KeyRing`] that owns the provider's own JWS signing keys and
//! JWKS publication, JWE wrap/unwrap for clients that request encrypted
//! responses, resolution of registered clients' JWKS, and the symmetric
//! helpers (AES-256-GCM envelopes, HMAC code binding) used by the rest of
//! the workspace.

pub mod error;
pub mod keyring;
pub mod symmetric;

pub use error::CryptoError;
pub use keyring::{ClientJwksResolver, KeyRing, SigningAlgorithm, SigningKey, SigningProfile};
