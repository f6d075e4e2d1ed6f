//! # aegis-tokens
//!
//! ID/access/refresh token minting and verification (`spec.md` §4.I):
//! [`service::TokenService`] mints OIDC ID tokens and OAuth access tokens
//! (opaque or JWT), rotates refresh-token families, serves cached RFC 7662
//! introspection, and performs RFC 8693 token exchange via [`exchange`].
//! [`dpop`] implements RFC 9449 proof-of-possession binding and [`hashes`]
//! the `at_hash`/`c_hash`/`s_hash`/token-hash primitives shared by both.

pub mod dpop;
pub mod exchange;
pub mod grant;
pub mod hashes;
pub mod service;

pub use dpop::{jwk_thumbprint, verify_proof, VerifiedProof};
pub use exchange::{evaluate as evaluate_exchange, ExchangeDecision, ExchangePolicy, ExchangeRequest, TokenType};
pub use grant::GrantType;
pub use hashes::{left_half_hash, token_hash};
pub use service::{
    AccessTokenClaims, AccessTokenKind, ClientCredentialsTokens, Confirmation, ExchangeTokens, IdTokenClaims,
    IntrospectionCacheConfig, IntrospectionResponse, MintedAccessToken, RefreshGrantTokens, RotatedRefresh,
    TokenService,
};
