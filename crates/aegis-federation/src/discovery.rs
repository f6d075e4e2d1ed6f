//! Upstream OIDC discovery metadata fetch and cache (`spec.md` §4.N).
//!
//! Mirrors `turbomcp-auth::discovery::fetcher::DiscoveryFetcher`'s
//! fetch-then-cache shape, trimmed to the fields `FederationEngine` needs
//! (`authorization_endpoint`, `token_endpoint`, `jwks_uri`) and reusing
//! [`aegis_crypto::keyring::client::ClientJwksResolver`] for the JWKS leg
//! rather than a second bespoke fetcher.

use std::sync::Arc;
use std::time::Duration;

use aegis_crypto::keyring::client::ClientJwksResolver;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::ssrf::{validate_upstream_url, SsrfError};

const DEFAULT_CACHE_TTL: Duration = Duration::from_secs(3600);
const MAX_RESPONSE_BYTES: usize = 64 * 1024;

#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("ssrf protection blocked discovery fetch: {0}")]
    SsrfBlocked(#[from] SsrfError),
    #[error("discovery fetch failed: {0}")]
    Http(String),
    #[error("discovery document too large ({0} bytes)")]
    TooLarge(usize),
    #[error("discovery document invalid: {0}")]
    InvalidJson(String),
    #[error("discovery document missing required field: {0}")]
    MissingField(&'static str),
}

/// The subset of OpenID Provider Metadata (OIDC Discovery 1.0) federation
/// needs to drive `begin`/`callback`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderMetadata {
    pub issuer: String,
    pub authorization_endpoint: String,
    pub token_endpoint: String,
    pub jwks_uri: String,
    #[serde(default)]
    pub userinfo_endpoint: Option<String>,
}

pub struct DiscoveryClient {
    http: reqwest::Client,
    metadata_cache: Cache<String, Arc<ProviderMetadata>>,
    jwks: ClientJwksResolver,
}

impl DiscoveryClient {
    #[must_use]
    pub fn new() -> Self {
        Self::with_ttl(DEFAULT_CACHE_TTL)
    }

    #[must_use]
    pub fn with_ttl(ttl: Duration) -> Self {
        Self {
            http: reqwest::Client::builder()
                .redirect(reqwest::redirect::Policy::none())
                .timeout(Duration::from_secs(5))
                .build()
                .expect("reqwest client with static timeout always builds"),
            metadata_cache: Cache::builder().time_to_live(ttl).build(),
            jwks: ClientJwksResolver::with_ttl(ttl),
        }
    }

    /// Fetch (or serve from cache) `{issuer}/.well-known/openid-configuration`.
    ///
    /// # Errors
    /// Returns [`DiscoveryError`] if the issuer URL fails SSRF validation,
    /// the request fails, the body exceeds [`MAX_RESPONSE_BYTES`], or the
    /// document is missing a required endpoint.
    pub async fn metadata(&self, issuer: &str) -> Result<Arc<ProviderMetadata>, DiscoveryError> {
        if let Some(cached) = self.metadata_cache.get(issuer).await {
            debug!(issuer, "discovery cache hit");
            return Ok(cached);
        }

        let well_known = format!("{}/.well-known/openid-configuration", issuer.trim_end_matches('/'));
        validate_upstream_url(&well_known)?;

        info!(issuer, "fetching upstream discovery document");
        let response = self.http.get(&well_known).send().await.map_err(|e| DiscoveryError::Http(e.to_string()))?;
        if !response.status().is_success() {
            return Err(DiscoveryError::Http(format!("discovery endpoint returned {}", response.status())));
        }

        let bytes = response.bytes().await.map_err(|e| DiscoveryError::Http(e.to_string()))?;
        if bytes.len() > MAX_RESPONSE_BYTES {
            return Err(DiscoveryError::TooLarge(bytes.len()));
        }

        let metadata: ProviderMetadata =
            serde_json::from_slice(&bytes).map_err(|e| DiscoveryError::InvalidJson(e.to_string()))?;
        if metadata.issuer != issuer {
            return Err(DiscoveryError::InvalidJson(format!(
                "document issuer {} does not match requested issuer {issuer}",
                metadata.issuer
            )));
        }

        let metadata = Arc::new(metadata);
        self.metadata_cache.insert(issuer.to_string(), metadata.clone()).await;
        Ok(metadata)
    }

    /// Resolve the upstream provider's JWKS, cached per `jwks_uri`.
    ///
    /// # Errors
    /// Propagates [`aegis_crypto::CryptoError`] fetch/parse failures.
    pub async fn jwks(&self, jwks_uri: &str) -> Result<Arc<jsonwebtoken::jwk::JwkSet>, aegis_crypto::error::CryptoError> {
        validate_upstream_url(jwks_uri)
            .map_err(|e| aegis_crypto::error::CryptoError::KeyResolutionFailed(e.to_string()))?;
        self.jwks.resolve(None, Some(jwks_uri)).await
    }
}

impl Default for DiscoveryClient {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn fetches_and_caches_metadata() {
        let server = MockServer::start().await;
        let issuer = server.uri();
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "issuer": issuer,
                "authorization_endpoint": format!("{issuer}/authorize"),
                "token_endpoint": format!("{issuer}/token"),
                "jwks_uri": format!("{issuer}/jwks"),
            })))
            .expect(1)
            .mount(&server)
            .await;

        let client = DiscoveryClient::new();
        let first = client.metadata(&issuer).await.unwrap();
        assert_eq!(first.token_endpoint, format!("{issuer}/token"));
        // cache hit, no second request expected
        client.metadata(&issuer).await.unwrap();
    }

    #[tokio::test]
    async fn rejects_issuer_mismatch() {
        let server = MockServer::start().await;
        let issuer = server.uri();
        Mock::given(method("GET"))
            .and(path("/.well-known/openid-configuration"))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "issuer": "https://not-the-same.example",
                "authorization_endpoint": "https://not-the-same.example/authorize",
                "token_endpoint": "https://not-the-same.example/token",
                "jwks_uri": "https://not-the-same.example/jwks",
            })))
            .mount(&server)
            .await;

        let client = DiscoveryClient::new();
        assert!(client.metadata(&issuer).await.is_err());
    }
}
