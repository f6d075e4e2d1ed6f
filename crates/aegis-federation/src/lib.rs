//! # aegis-federation
//!
//! External IdP federation (`spec.md` §4.N): upstream discovery
//! ([`discovery`]), dynamically-typed claim normalization ([`claims`]),
//! the in-flight upstream-authorization state record ([`state`]),
//! account linking ([`linking`]), authorization-code exchange and
//! id_token verification ([`callback`]), backchannel logout
//! ([`backchannel_logout`]), and the [`engine::FederationEngine`] facade
//! tying them together. An outbound-URL SSRF guard ([`ssrf`]) gates
//! every network call this crate makes, since both discovery documents
//! and token endpoints are tenant-configured.

pub mod backchannel_logout;
pub mod callback;
pub mod claims;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod linking;
pub mod ssrf;
pub mod state;

pub use backchannel_logout::LogoutOutcome;
pub use claims::ClaimValue;
pub use discovery::{DiscoveryClient, ProviderMetadata};
pub use engine::{CallbackResult, FederationEngine, ProviderConfig};
pub use error::UpstreamError;
pub use linking::{LinkedIdentity, LinkedIdentityStore, Resolution};
pub use state::ExternalAuthState;
