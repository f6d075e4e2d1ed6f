//! `FederationEngine` (`spec.md` §4.N): ties discovery, upstream-state
//! tracking, code exchange, id_token verification, claim normalization,
//! and account resolution together into `begin`/`callback`.

use std::collections::HashMap;
use std::sync::Arc;

use aegis_actors::{ChallengeStore, ChallengeType, SessionStore};
use url::form_urlencoded;

use crate::callback::{exchange_code, verify_id_token};
use crate::claims::apply_mapping;
use crate::discovery::DiscoveryClient;
use crate::error::UpstreamError;
use crate::linking::{resolve, LinkedIdentityStore, Resolution};
use crate::state::{new_attempt, ExternalAuthState, AUTH_STATE_TTL_SECONDS};

/// A registered upstream provider's metadata the engine needs beyond
/// what discovery returns: how to authenticate at its token endpoint and
/// how to normalize its claims onto this provider's user model.
#[derive(Debug, Clone)]
pub struct ProviderConfig {
    pub provider_id: String,
    pub issuer: String,
    pub client_id: String,
    pub client_secret: Option<String>,
    pub scope: String,
    pub attribute_mapping: HashMap<String, String>,
}

pub struct CallbackResult {
    pub resolution: Resolution,
    pub normalized: HashMap<String, String>,
    pub provider_sub: String,
}

pub struct FederationEngine {
    discovery: DiscoveryClient,
    http: reqwest::Client,
    challenges: Arc<ChallengeStore>,
    sessions: Arc<SessionStore>,
    identities: Arc<LinkedIdentityStore>,
}

impl FederationEngine {
    #[must_use]
    pub fn new(
        challenges: Arc<ChallengeStore>,
        sessions: Arc<SessionStore>,
        identities: Arc<LinkedIdentityStore>,
    ) -> Self {
        Self {
            discovery: DiscoveryClient::new(),
            http: reqwest::Client::builder()
                .build()
                .expect("default reqwest client always builds"),
            challenges,
            sessions,
            identities,
        }
    }

    #[must_use]
    pub fn identities(&self) -> &Arc<LinkedIdentityStore> {
        &self.identities
    }

    /// Begin a federated sign-in: fetch discovery metadata, mint a
    /// PKCE/nonce/state triple, persist it, and build the upstream
    /// authorize URL.
    ///
    /// # Errors
    /// Propagates [`UpstreamError::Discovery`]/[`UpstreamError::Ssrf`]
    /// from metadata resolution, or a server error if the state record
    /// cannot be persisted (practically unreachable: `state` is freshly
    /// random).
    pub async fn begin(
        &self,
        provider: &ProviderConfig,
        tenant_id: &str,
        callback_redirect_uri: &str,
    ) -> Result<String, UpstreamError> {
        let metadata = self.discovery.metadata(&provider.issuer).await?;
        let attempt = new_attempt(&provider.provider_id, tenant_id, callback_redirect_uri);

        self.challenges
            .store(
                ChallengeType::ExternalIdpAuthState,
                &attempt.state,
                serde_json::to_value(&attempt.record).map_err(|e| UpstreamError::TokenExchange(e.to_string()))?,
                AUTH_STATE_TTL_SECONDS,
            )
            .await
            .map_err(|e| UpstreamError::TokenExchange(e.to_string()))?;

        let query: String = form_urlencoded::Serializer::new(String::new())
            .append_pair("response_type", "code")
            .append_pair("client_id", &provider.client_id)
            .append_pair("redirect_uri", callback_redirect_uri)
            .append_pair("scope", &provider.scope)
            .append_pair("state", &attempt.state)
            .append_pair("nonce", &attempt.record.nonce)
            .append_pair("code_challenge", &attempt.code_challenge)
            .append_pair("code_challenge_method", "S256")
            .finish();

        Ok(format!("{}?{query}", metadata.authorization_endpoint))
    }

    /// Handle the upstream redirect back to the callback endpoint.
    /// Validates `state`, exchanges `code`, verifies the returned
    /// `id_token`'s signature/issuer/audience/nonce, normalizes claims
    /// through `provider.attribute_mapping`, and resolves the result
    /// against the link store.
    ///
    /// # Errors
    /// Returns [`UpstreamError::StateMismatch`] for an unknown/expired/
    /// already-consumed `state`, and propagates exchange/verification
    /// failures otherwise.
    pub async fn callback(
        &self,
        provider: &ProviderConfig,
        query: &HashMap<String, String>,
        existing_user_by_email: Option<&str>,
    ) -> Result<CallbackResult, UpstreamError> {
        let state_param = query.get("state").ok_or(UpstreamError::StateMismatch)?;
        let code = query.get("code").ok_or_else(|| UpstreamError::TokenExchange("missing code".to_string()))?;

        let stored = self
            .challenges
            .consume(ChallengeType::ExternalIdpAuthState, state_param)
            .await
            .map_err(|_| UpstreamError::StateMismatch)?;
        let auth_state: ExternalAuthState =
            serde_json::from_value(stored).map_err(|_| UpstreamError::StateMismatch)?;
        if auth_state.provider_id != provider.provider_id {
            return Err(UpstreamError::StateMismatch);
        }

        let metadata = self.discovery.metadata(&provider.issuer).await?;
        let tokens = exchange_code(
            &self.http,
            &metadata.token_endpoint,
            code,
            &auth_state.redirect_uri,
            &auth_state.pkce_verifier,
            &provider.client_id,
            provider.client_secret.as_deref(),
        )
        .await?;

        let jwks = self.discovery.jwks(&metadata.jwks_uri).await.map_err(|e| {
            UpstreamError::InvalidIdToken(format!("failed to resolve provider jwks: {e}"))
        })?;
        let claims = verify_id_token(&tokens.id_token, &jwks, &provider.issuer, &provider.client_id)?;

        let claimed_nonce = claims.get("nonce").and_then(|v| v.as_str());
        if claimed_nonce != Some(auth_state.nonce.as_str()) {
            return Err(UpstreamError::InvalidIdToken("nonce mismatch".to_string()));
        }

        let mapped = apply_mapping(&claims, &provider.attribute_mapping);
        let mut normalized = HashMap::with_capacity(mapped.len());
        for (k, v) in mapped {
            if let Some(s) = v.to_coerced_string().or_else(|| v.as_str().map(ToString::to_string)) {
                normalized.insert(k, s);
            }
        }

        let provider_sub = normalized
            .get("sub")
            .cloned()
            .or_else(|| claims.get("sub").and_then(|v| v.as_str()).map(ToString::to_string))
            .ok_or(UpstreamError::UnmappedSubject)?;

        let resolution = resolve(
            &self.identities,
            &provider.provider_id,
            &provider_sub,
            &normalized,
            existing_user_by_email,
        );
        if let Resolution::SignedIn { .. } = &resolution {
            self.identities.touch(&provider.provider_id, &provider_sub);
        }

        Ok(CallbackResult { resolution, normalized, provider_sub })
    }

    /// Process a backchannel-logout POST for `provider`.
    ///
    /// # Errors
    /// See [`crate::backchannel_logout::process_logout_token`].
    pub async fn backchannel_logout(
        &self,
        provider: &ProviderConfig,
        logout_token: &str,
    ) -> Result<crate::backchannel_logout::LogoutOutcome, UpstreamError> {
        let metadata = self.discovery.metadata(&provider.issuer).await?;
        let jwks = self.discovery.jwks(&metadata.jwks_uri).await.map_err(|e| {
            UpstreamError::InvalidLogoutToken(format!("failed to resolve provider jwks: {e}"))
        })?;
        crate::backchannel_logout::process_logout_token(
            logout_token,
            &jwks,
            &provider.issuer,
            &provider.client_id,
            &provider.provider_id,
            &self.challenges,
            &self.sessions,
            &self.identities,
        )
        .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn provider() -> ProviderConfig {
        ProviderConfig {
            provider_id: "google".to_string(),
            issuer: "https://accounts.example.com".to_string(),
            client_id: "client-1".to_string(),
            client_secret: Some("secret".to_string()),
            scope: "openid email".to_string(),
            attribute_mapping: HashMap::new(),
        }
    }

    #[tokio::test]
    async fn callback_without_state_is_rejected() {
        let engine = FederationEngine::new(
            Arc::new(ChallengeStore::new()),
            Arc::new(SessionStore::new()),
            Arc::new(LinkedIdentityStore::new()),
        );
        let result = engine.callback(&provider(), &HashMap::new(), None).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn callback_with_unknown_state_is_state_mismatch() {
        let engine = FederationEngine::new(
            Arc::new(ChallengeStore::new()),
            Arc::new(SessionStore::new()),
            Arc::new(LinkedIdentityStore::new()),
        );
        let mut query = HashMap::new();
        query.insert("state".to_string(), "never-issued".to_string());
        query.insert("code".to_string(), "abc".to_string());
        let result = engine.callback(&provider(), &query, None).await;
        assert!(matches!(result, Err(UpstreamError::StateMismatch)));
    }
}
