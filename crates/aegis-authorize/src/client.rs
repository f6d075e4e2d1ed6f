//! Minimal client-metadata seam `AuthorizeEngine` needs from the client
//! registry, kept as a narrow trait here (rather than a dependency on
//! `aegis-registry`) so the two crates don't form a cycle — the facade
//! wires a concrete `aegis_registry::ClientRegistry` implementation in.

use crate::request::ResponseType;

#[derive(Debug, Clone)]
pub struct ClientProfile {
    pub client_id: String,
    pub enabled: bool,
    pub is_public: bool,
    pub redirect_uris: Vec<String>,
    pub allowed_response_types: Vec<ResponseType>,
    pub pkce_required: bool,
    pub allow_http_redirect: bool,
}

impl ClientProfile {
    #[must_use]
    pub fn allows_redirect_uri(&self, redirect_uri: &str) -> bool {
        self.redirect_uris.iter().any(|u| u == redirect_uri)
    }

    #[must_use]
    pub fn allows_response_type(&self, response_type: ResponseType) -> bool {
        self.allowed_response_types.contains(&response_type)
    }
}

/// Synchronous lookup: a real registry backs this with an in-memory
/// cache (`moka`/`dashmap`), so no async boundary is needed here.
pub trait ClientLookup: Send + Sync {
    fn find(&self, client_id: &str) -> Option<ClientProfile>;
}

/// Separate async seam for resolving a client's own JWKS, needed only to
/// verify JAR request objects (`spec.md` §4.J). Kept apart from
/// [`ClientLookup`] because JWKS resolution is the one client-metadata
/// query that has to cross an await point (cache miss => outbound
/// fetch-by-reference), and most `ClientLookup` callers have no need for
/// it.
#[async_trait::async_trait]
pub trait ClientJwksLookup: Send + Sync {
    async fn jwks(&self, client_id: &str) -> aegis_core::OpResult<std::sync::Arc<jsonwebtoken::jwk::JwkSet>>;
}
