//! `ClientRegistry` (`spec.md` §4.O): the in-memory client store, wired
//! into `aegis-authorize` through the narrow [`aegis_authorize::ClientLookup`]
//! seam so that crate keeps no dependency on this one.

use dashmap::DashMap;
use tracing::info;

use aegis_authorize::{ClientJwksLookup, ClientLookup, ClientProfile};
use aegis_crypto::ClientJwksResolver;

use crate::client::ClientMetadata;
use crate::error::RegistryError;

/// Owns every tenant's registered clients and resolves their JWKS.
///
/// Mutation (register/update/disable) goes through `&self` methods
/// backed by [`DashMap`]'s internal sharding; there is no single-writer
/// actor here because client rows change far less often, and far less
/// latency-sensitively, than sessions or refresh families (`spec.md`
/// §5 reserves the actor model for per-key hot paths).
pub struct ClientRegistry {
    clients: DashMap<String, ClientMetadata>,
    jwks_resolver: ClientJwksResolver,
    allow_http_redirect: bool,
}

impl ClientRegistry {
    #[must_use]
    pub fn new(allow_http_redirect: bool) -> Self {
        Self {
            clients: DashMap::new(),
            jwks_resolver: ClientJwksResolver::new(),
            allow_http_redirect,
        }
    }

    /// Validate and insert a fully-formed client row, e.g. the output of
    /// [`crate::dcr::register`] or a platform-seeded static client.
    ///
    /// # Errors
    /// Propagates [`RegistryError::InvalidMetadata`] from validation.
    pub fn insert(&self, metadata: ClientMetadata) -> Result<(), RegistryError> {
        crate::client::validate_metadata(&metadata)?;
        info!(client_id = %metadata.id, tenant_id = %metadata.tenant_id, "client registered");
        self.clients.insert(metadata.id.clone(), metadata);
        Ok(())
    }

    #[must_use]
    pub fn get(&self, client_id: &str) -> Option<ClientMetadata> {
        self.clients.get(client_id).map(|entry| entry.value().clone())
    }

    /// # Errors
    /// Returns [`RegistryError::UnknownClient`] if no client with this id
    /// is registered.
    pub fn disable(&self, client_id: &str) -> Result<(), RegistryError> {
        let mut entry = self.clients.get_mut(client_id).ok_or(RegistryError::UnknownClient)?;
        entry.enabled = false;
        Ok(())
    }

    /// Resolve a client's own JWKS, by value or by `jwks_uri`.
    ///
    /// # Errors
    /// Returns [`RegistryError::UnknownClient`] if the client isn't
    /// registered, or propagates JWKS fetch/parse failures.
    pub async fn jwks(&self, client_id: &str) -> Result<std::sync::Arc<jsonwebtoken::jwk::JwkSet>, RegistryError> {
        let metadata = self.get(client_id).ok_or(RegistryError::UnknownClient)?;
        self.jwks_resolver
            .resolve(metadata.jwks.as_ref(), metadata.jwks_uri.as_deref())
            .await
            .map_err(RegistryError::JwksResolution)
    }

    /// Verify a client's `client_secret` for `client_secret_basic`/`post`
    /// authentication.
    ///
    /// # Errors
    /// Returns [`RegistryError::UnknownClient`]/[`RegistryError::ClientDisabled`]
    /// or [`RegistryError::InvalidMetadata`] (wrong secret, or client has
    /// none registered — public clients never reach this check).
    pub fn authenticate_secret(&self, client_id: &str, presented_secret: &str) -> Result<(), RegistryError> {
        let metadata = self.get(client_id).ok_or(RegistryError::UnknownClient)?;
        if !metadata.enabled {
            return Err(RegistryError::ClientDisabled);
        }
        let stored = metadata
            .secret_hash
            .as_deref()
            .ok_or_else(|| RegistryError::InvalidMetadata("client has no secret registered".to_string()))?;
        if crate::dcr::verify_secret(presented_secret, stored) {
            Ok(())
        } else {
            Err(RegistryError::InvalidMetadata("client secret mismatch".to_string()))
        }
    }
}

impl ClientLookup for ClientRegistry {
    fn find(&self, client_id: &str) -> Option<ClientProfile> {
        let metadata = self.get(client_id)?;
        let allowed_response_types = metadata
            .response_types
            .iter()
            .filter_map(|rt| aegis_authorize::ResponseType::parse(rt))
            .collect();
        Some(ClientProfile {
            client_id: metadata.id,
            enabled: metadata.enabled,
            is_public: metadata.token_endpoint_auth_method == "none",
            redirect_uris: metadata.redirect_uris,
            allowed_response_types,
            pkce_required: metadata.pkce_required,
            allow_http_redirect: self.allow_http_redirect,
        })
    }
}

#[async_trait::async_trait]
impl ClientJwksLookup for ClientRegistry {
    async fn jwks(&self, client_id: &str) -> aegis_core::OpResult<std::sync::Arc<jsonwebtoken::jwk::JwkSet>> {
        self.jwks(client_id).await.map_err(aegis_core::OpError::from)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::SubjectType;

    fn sample(id: &str) -> ClientMetadata {
        ClientMetadata {
            id: id.to_string(),
            tenant_id: "tenant-1".to_string(),
            secret_hash: Some(crate::dcr::hash_secret("shh")),
            enabled: true,
            redirect_uris: vec!["https://app.example/cb".to_string()],
            grant_types: vec!["authorization_code".to_string()],
            response_types: vec!["code".to_string()],
            scopes: vec!["openid".to_string()],
            jwks: None,
            jwks_uri: None,
            id_token_enc_alg: None,
            id_token_enc_enc: None,
            userinfo_enc_alg: None,
            userinfo_enc_enc: None,
            subject_type: SubjectType::Public,
            sector_identifier_uri: None,
            token_endpoint_auth_method: "client_secret_basic".to_string(),
            pkce_required: true,
            dpop_required: false,
            attribute_mapping: None,
        }
    }

    #[test]
    fn insert_then_find_round_trips_through_client_lookup() {
        let registry = ClientRegistry::new(false);
        registry.insert(sample("client-1")).unwrap();
        let profile = registry.find("client-1").unwrap();
        assert!(profile.enabled);
        assert!(profile.allows_redirect_uri("https://app.example/cb"));
        assert!(profile.allows_response_type(aegis_authorize::ResponseType::Code));
    }

    #[test]
    fn unknown_client_is_none() {
        let registry = ClientRegistry::new(false);
        assert!(registry.find("nope").is_none());
    }

    #[test]
    fn disable_flips_enabled_flag() {
        let registry = ClientRegistry::new(false);
        registry.insert(sample("client-1")).unwrap();
        registry.disable("client-1").unwrap();
        assert!(!registry.find("client-1").unwrap().enabled);
    }

    #[test]
    fn authenticate_secret_accepts_correct_and_rejects_wrong() {
        let registry = ClientRegistry::new(false);
        registry.insert(sample("client-1")).unwrap();
        assert!(registry.authenticate_secret("client-1", "shh").is_ok());
        assert!(registry.authenticate_secret("client-1", "wrong").is_err());
    }
}
