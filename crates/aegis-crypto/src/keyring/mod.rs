//! The provider's key material: its own signing keys and JWKS (`signing`),
//! JWE wrap/unwrap for client-requested encryption (`jwe`), and resolution
//! of registered clients' own JWKS (`client`).

pub mod client;
pub mod jwe;
pub mod signing;
pub mod types;

pub use client::ClientJwksResolver;
pub use signing::{KeyRing, SigningProfile, ROTATION_OVERLAP};
pub use types::{SigningAlgorithm, SigningKey};
