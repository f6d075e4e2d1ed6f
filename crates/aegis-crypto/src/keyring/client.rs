//! Resolves a client's own JWKS (by value or by `jwks_uri` reference) for
//! verifying JAR request objects and wrapping JWE payloads to that client's
//! public key (`spec.md` §4.A, §4.O).

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::jwk::JwkSet;
use moka::future::Cache;
use tracing::{debug, error, info};

use crate::error::CryptoError;

const DEFAULT_TTL: Duration = Duration::from_secs(600);
const FETCH_TIMEOUT: Duration = Duration::from_secs(10);

/// Fetches and caches registered clients' JWKS documents.
///
/// Distinct from [`crate::keyring::signing::KeyRing`], which holds *this
/// provider's own* signing keys: `ClientJwksResolver` holds keys that
/// belong to relying parties, fetched over the network, and is therefore
/// one of the two legitimate outbound-HTTP seams in the workspace
/// (`SPEC_FULL.md` §1.4).
#[derive(Clone)]
pub struct ClientJwksResolver {
    http: reqwest::Client,
    cache: Cache<String, Arc<JwkSet>>,
}

impl ClientJwksResolver {
    #[must_use]
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_TTL)
    }

    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            http: reqwest::Client::builder()
                .timeout(FETCH_TIMEOUT)
                .build()
                .expect("reqwest client with static timeout always builds"),
            cache: Cache::builder().time_to_live(ttl).build(),
        }
    }

    /// Resolve a client's JWKS, preferring the value registered inline
    /// (`jwks`) and falling back to fetching `jwks_uri` (cached per-URI).
    pub async fn resolve(
        &self,
        jwks: Option<&serde_json::Value>,
        jwks_uri: Option<&str>,
    ) -> Result<Arc<JwkSet>, CryptoError> {
        if let Some(value) = jwks {
            let set: JwkSet = serde_json::from_value(value.clone())
                .map_err(|e| CryptoError::KeyResolutionFailed(e.to_string()))?;
            return Ok(Arc::new(set));
        }

        let uri = jwks_uri.ok_or_else(|| {
            CryptoError::KeyResolutionFailed("client has neither jwks nor jwks_uri".to_string())
        })?;

        if let Some(cached) = self.cache.get(uri).await {
            debug!(jwks_uri = uri, "client JWKS cache hit");
            return Ok(cached);
        }

        info!(jwks_uri = uri, "fetching client JWKS");
        let response = self.http.get(uri).send().await.map_err(|e| {
            error!(jwks_uri = uri, error = %e, "client JWKS fetch failed");
            CryptoError::KeyResolutionFailed(e.to_string())
        })?;

        if !response.status().is_success() {
            return Err(CryptoError::KeyResolutionFailed(format!(
                "client JWKS endpoint returned {}",
                response.status()
            )));
        }

        let set: JwkSet = response
            .json()
            .await
            .map_err(|e| CryptoError::KeyResolutionFailed(e.to_string()))?;
        let set = Arc::new(set);
        self.cache.insert(uri.to_string(), set.clone()).await;
        Ok(set)
    }

    /// Evict a cached JWKS, used after a verification failure in case the
    /// client rotated its keys out of band.
    pub async fn invalidate(&self, jwks_uri: &str) {
        self.cache.invalidate(jwks_uri).await;
    }
}

impl Default for ClientJwksResolver {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn resolve_prefers_inline_jwks() {
        let resolver = ClientJwksResolver::new();
        let jwks = json!({ "keys": [] });
        let resolved = resolver.resolve(Some(&jwks), Some("https://unused")).await.unwrap();
        assert!(resolved.keys.is_empty());
    }

    #[tokio::test]
    async fn resolve_without_jwks_or_uri_errors() {
        let resolver = ClientJwksResolver::new();
        assert!(resolver.resolve(None, None).await.is_err());
    }

    #[tokio::test]
    async fn fetches_and_caches_jwks_uri() {
        use wiremock::matchers::{method, path};
        use wiremock::{Mock, MockServer, ResponseTemplate};

        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/jwks"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "keys": [] })))
            .expect(1)
            .mount(&server)
            .await;

        let resolver = ClientJwksResolver::new();
        let uri = format!("{}/jwks", server.uri());
        resolver.resolve(None, Some(&uri)).await.unwrap();
        // Second call must hit the cache, not the mock server again
        // (the `expect(1)` above would fail the test on teardown otherwise).
        resolver.resolve(None, Some(&uri)).await.unwrap();
    }
}
