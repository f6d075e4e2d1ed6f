//! TokenService (`spec.md` §4.I): mints ID/access/refresh tokens, serves
//! introspection, and performs RFC 8693 token exchange.
//!
//! Grounded on `turbomcp-auth::jwt::validator` for the claims-struct /
//! verify shape and `turbomcp-dpop::proof` for the `cnf.jkt` binding
//! concept, rewritten against this workspace's `aegis_crypto::KeyRing`
//! and `aegis_actors` stores instead of the teacher's bespoke DPoP types.

use std::sync::Arc;
use std::time::Duration;

use aegis_actors::{RefreshRotator, RevocationIndex, RotationOutcome};
use aegis_core::{clock, ids, OpError, OpResult};
use aegis_crypto::KeyRing;
use aegis_shard::{Domain, ShardRouter};
use dashmap::DashMap;
use moka::future::Cache;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::hashes::token_hash;

/// Whether an access token is minted as an opaque handle or a signed JWT,
/// per client policy (`spec.md` §4.I).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessTokenKind {
    Opaque,
    Jwt,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub exp: i64,
    pub iat: i64,
    pub auth_time: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub amr: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub at_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub c_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s_hash: Option<String>,
}

/// Confirmation-key claim embedded in a DPoP-bound access token
/// (RFC 9449 §4).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Confirmation {
    pub jkt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessTokenClaims {
    pub iss: String,
    pub sub: String,
    pub aud: String,
    pub client_id: String,
    pub scope: String,
    pub exp: i64,
    pub iat: i64,
    pub jti: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cnf: Option<Confirmation>,
    /// RFC 8693 delegation/impersonation chain, set only by token exchange.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub act: Option<serde_json::Value>,
}

/// Record kept for opaque (non-JWT) access tokens so introspection can
/// still resolve them; indexed by [`token_hash`] so the raw handle never
/// sits in the lookup table.
#[derive(Debug, Clone)]
struct OpaqueRecord {
    claims: AccessTokenClaims,
}

pub struct MintedAccessToken {
    pub value: String,
    pub kind: AccessTokenKind,
    pub jti: String,
    pub expires_at: i64,
}

/// A freshly-rotated refresh family member plus the family state needed
/// to mint a matching access token.
pub struct RotatedRefresh {
    pub jti: String,
    pub user_id: String,
    pub client_id: String,
    pub scope: String,
}

/// Full token set returned by the `refresh_token` grant.
pub struct RefreshGrantTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub scope: String,
    pub token_type: &'static str,
}

/// Token set returned by the `client_credentials` grant. No refresh
/// token: there is no resource owner to bind a rotatable family to.
pub struct ClientCredentialsTokens {
    pub access_token: String,
    pub scope: String,
    pub token_type: &'static str,
}

/// Token set returned by the RFC 8693 token-exchange grant.
pub struct ExchangeTokens {
    pub access_token: String,
    pub issued_token_type: &'static str,
    pub scope: String,
    pub token_type: &'static str,
}

#[derive(Debug, Clone)]
pub struct IntrospectionResponse {
    pub active: bool,
    pub sub: Option<String>,
    pub scope: Option<String>,
    pub client_id: Option<String>,
    pub exp: Option<i64>,
    pub iat: Option<i64>,
    pub token_type: Option<String>,
    pub cnf: Option<Confirmation>,
}

impl IntrospectionResponse {
    fn inactive() -> Self {
        Self { active: false, sub: None, scope: None, client_id: None, exp: None, iat: None, token_type: None, cnf: None }
    }
}

/// Configuration for the introspection response cache (`spec.md` §4.I:
/// `introspectionCache.ttlSeconds`, 1-3600, default 60; `enabled` flag).
#[derive(Debug, Clone, Copy)]
pub struct IntrospectionCacheConfig {
    pub enabled: bool,
    pub ttl_seconds: u64,
}

impl Default for IntrospectionCacheConfig {
    fn default() -> Self {
        Self { enabled: true, ttl_seconds: 60 }
    }
}

impl IntrospectionCacheConfig {
    #[must_use]
    pub fn clamp_ttl(mut self) -> Self {
        self.ttl_seconds = self.ttl_seconds.clamp(1, 3600);
        self
    }
}

pub struct TokenService {
    issuer: String,
    keyring: Arc<KeyRing>,
    shard_router: Arc<ShardRouter>,
    refresh_rotator: Arc<RefreshRotator>,
    revocation_index: Arc<RevocationIndex>,
    opaque_tokens: DashMap<String, OpaqueRecord>,
    introspection_cache: Cache<(String, String), IntrospectionResponse>,
    cache_config: IntrospectionCacheConfig,
}

impl TokenService {
    #[must_use]
    pub fn new(
        issuer: impl Into<String>,
        keyring: Arc<KeyRing>,
        shard_router: Arc<ShardRouter>,
        refresh_rotator: Arc<RefreshRotator>,
        revocation_index: Arc<RevocationIndex>,
        cache_config: IntrospectionCacheConfig,
    ) -> Self {
        let cache_config = cache_config.clamp_ttl();
        Self {
            issuer: issuer.into(),
            keyring,
            shard_router,
            refresh_rotator,
            revocation_index,
            opaque_tokens: DashMap::new(),
            introspection_cache: Cache::builder()
                .time_to_live(Duration::from_secs(cache_config.ttl_seconds))
                .build(),
            cache_config,
        }
    }

    /// Mint and sign an ID token, applying `at_hash`/`c_hash`/`s_hash`
    /// whenever the corresponding material is supplied by the caller
    /// (`AuthorizeEngine` decides which are required for a given
    /// `response_type`).
    ///
    /// # Errors
    /// Propagates [`aegis_crypto::CryptoError`] signing failures.
    pub fn mint_id_token(&self, claims: IdTokenClaims) -> OpResult<String> {
        self.keyring.sign(&claims).map_err(OpError::from)
    }

    /// Mint an access token for `client_id`/`subject` with `scope`,
    /// binding to `dpop_jkt` when the client presented a DPoP proof at
    /// the token endpoint.
    ///
    /// # Errors
    /// Propagates signing failures for the JWT variant.
    pub fn mint_access_token(
        &self,
        kind: AccessTokenKind,
        client_id: &str,
        subject: &str,
        scope: &str,
        ttl_seconds: i64,
        dpop_jkt: Option<String>,
        act: Option<serde_json::Value>,
    ) -> OpResult<MintedAccessToken> {
        let jti = uuid::Uuid::new_v4().to_string();
        let now = clock::now_millis();
        let expires_at = clock::expires_in(ttl_seconds);
        let claims = AccessTokenClaims {
            iss: self.issuer.clone(),
            sub: subject.to_string(),
            aud: client_id.to_string(),
            client_id: client_id.to_string(),
            scope: scope.to_string(),
            exp: expires_at / 1000,
            iat: now / 1000,
            jti: jti.clone(),
            cnf: dpop_jkt.map(|jkt| Confirmation { jkt }),
            act,
        };

        let value = match kind {
            AccessTokenKind::Jwt => self.keyring.sign(&claims).map_err(OpError::from)?,
            AccessTokenKind::Opaque => {
                let handle = ids::random_opaque(32);
                self.opaque_tokens.insert(token_hash(&handle), OpaqueRecord { claims });
                handle
            }
        };

        Ok(MintedAccessToken { value, kind, jti, expires_at })
    }

    /// Mint the first refresh token of a new family, routed through the
    /// refresh domain's current shard generation.
    ///
    /// # Errors
    /// Propagates `RefreshRotator::create_family` conflicts.
    pub async fn mint_refresh_family(
        &self,
        user_id: &str,
        client_id: &str,
        scope: &str,
        ttl_seconds: i64,
    ) -> OpResult<String> {
        let config = self.shard_router.config(Domain::Refresh).await;
        let family_id = uuid::Uuid::new_v4().to_string();
        let shard_index = aegis_actors::sharded::hash_shard_index(&family_id, config.current_shard_count as usize) as u32;
        let jti = aegis_shard::ids::build_refresh_jti(config.current_generation, shard_index, &family_id, 0);
        let family = aegis_actors::refresh::new_family(
            family_id,
            user_id,
            client_id,
            scope,
            config.current_generation,
            shard_index,
            jti.clone(),
            clock::expires_in(ttl_seconds),
        );
        self.refresh_rotator.create_family(family).await?;
        Ok(jti)
    }

    /// Rotate a presented refresh token. On reuse of a superseded member,
    /// the whole family is revoked and `invalid_grant` returned.
    ///
    /// # Errors
    /// Returns `invalid_grant` for an unroutable jti, a not-found family,
    /// or reuse detection.
    pub async fn rotate_refresh_token(&self, old_jti: &str) -> OpResult<RotatedRefresh> {
        let location = self.shard_router.locate_refresh(old_jti).await?;
        let family_id = extract_family_id(old_jti)
            .ok_or_else(|| OpError::invalid_grant("refresh token has no parseable family id"))?;
        let generation = location.generation.unwrap_or(0);
        let shard_index = location.shard_index;

        let outcome = self
            .refresh_rotator
            .rotate(&family_id, old_jti, |seq| {
                aegis_shard::ids::build_refresh_jti(generation, shard_index, &family_id, seq)
            })
            .await?;

        let new_jti = match outcome {
            RotationOutcome::Rotated { new_jti } | RotationOutcome::GraceWindowReplay { new_jti } => new_jti,
        };

        let family = self.refresh_rotator.get_family(&family_id).await?;
        Ok(RotatedRefresh {
            jti: new_jti,
            user_id: family.user_id,
            client_id: family.client_id,
            scope: family.scope,
        })
    }

    /// OAuth 2.0 `refresh_token` grant (`spec.md` §6): rotate `old_jti`
    /// and mint a matching access token for the family's bound client and
    /// subject.
    ///
    /// # Errors
    /// Propagates [`Self::rotate_refresh_token`] and signing failures.
    pub async fn refresh_token_grant(
        &self,
        kind: AccessTokenKind,
        old_jti: &str,
        access_token_ttl_seconds: i64,
        dpop_jkt: Option<String>,
    ) -> OpResult<RefreshGrantTokens> {
        let rotated = self.rotate_refresh_token(old_jti).await?;
        let minted = self.mint_access_token(
            kind,
            &rotated.client_id,
            &rotated.user_id,
            &rotated.scope,
            access_token_ttl_seconds,
            dpop_jkt,
            None,
        )?;
        Ok(RefreshGrantTokens {
            access_token: minted.value,
            refresh_token: rotated.jti,
            scope: rotated.scope,
            token_type: "Bearer",
        })
    }

    /// OAuth 2.0 `client_credentials` grant (`spec.md` §6): mint an
    /// access token whose subject is the client itself.
    ///
    /// # Errors
    /// Propagates signing failures for the JWT variant.
    pub fn client_credentials_grant(
        &self,
        kind: AccessTokenKind,
        client_id: &str,
        scope: &str,
        ttl_seconds: i64,
        dpop_jkt: Option<String>,
    ) -> OpResult<ClientCredentialsTokens> {
        let minted = self.mint_access_token(kind, client_id, client_id, scope, ttl_seconds, dpop_jkt, None)?;
        Ok(ClientCredentialsTokens { access_token: minted.value, scope: scope.to_string(), token_type: "Bearer" })
    }

    /// RFC 8693 token-exchange grant: introspect `subject_token` (and
    /// `actor_token`, if present) to resolve verified subjects, evaluate
    /// `request` against `policy` via [`crate::exchange::evaluate`], and
    /// mint the resulting access token.
    ///
    /// # Errors
    /// Returns `invalid_grant` if `subject_token`/`actor_token` aren't
    /// active, or propagates [`crate::exchange::evaluate`]'s errors.
    pub async fn exchange_token(
        &self,
        kind: AccessTokenKind,
        client_id: &str,
        request: &crate::exchange::ExchangeRequest,
        policy: &crate::exchange::ExchangePolicy,
        ttl_seconds: i64,
    ) -> OpResult<ExchangeTokens> {
        let subject_introspection = self.introspect(&request.subject_token, client_id).await;
        if !subject_introspection.active {
            return Err(OpError::invalid_grant("subject_token is not active"));
        }
        let original_subject = subject_introspection
            .sub
            .ok_or_else(|| OpError::invalid_grant("subject_token carries no sub"))?;
        let original_scope = subject_introspection.scope.unwrap_or_default();

        let actor_subject = match &request.actor_token {
            Some(actor_token) => {
                let actor_introspection = self.introspect(actor_token, client_id).await;
                if !actor_introspection.active {
                    return Err(OpError::invalid_grant("actor_token is not active"));
                }
                Some(
                    actor_introspection
                        .sub
                        .ok_or_else(|| OpError::invalid_grant("actor_token carries no sub"))?,
                )
            }
            None => None,
        };

        let decision =
            crate::exchange::evaluate(request, policy, &original_subject, &original_scope, actor_subject.as_deref())?;

        let minted =
            self.mint_access_token(kind, client_id, &decision.subject, &decision.scope, ttl_seconds, None, decision.act)?;

        Ok(ExchangeTokens {
            access_token: minted.value,
            issued_token_type: crate::exchange::TokenType::AccessToken.as_urn(),
            scope: decision.scope,
            token_type: "Bearer",
        })
    }

    /// RFC 7662 introspection. Verifies the token is structurally valid
    /// (JWT signature or opaque-handle lookup), checks the revocation
    /// index, and caches the response (including negative results) keyed
    /// on `(token_hash, client_id)` unless caching is disabled.
    pub async fn introspect(&self, token: &str, client_id: &str) -> IntrospectionResponse {
        if !self.cache_config.enabled {
            return self.introspect_uncached(token).await;
        }

        let key = (token_hash(token), client_id.to_string());
        if let Some(cached) = self.introspection_cache.get(&key).await {
            return cached;
        }

        let response = self.introspect_uncached(token).await;
        self.introspection_cache.insert(key, response.clone()).await;
        response
    }

    async fn introspect_uncached(&self, token: &str) -> IntrospectionResponse {
        let claims = match self.keyring.verify::<AccessTokenClaims>(token) {
            Ok(claims) => claims,
            Err(_) => {
                let hash = token_hash(token);
                match self.opaque_tokens.get(&hash) {
                    Some(record) => record.claims.clone(),
                    None => {
                        warn!("introspection target not found as JWT or opaque handle");
                        return IntrospectionResponse::inactive();
                    }
                }
            }
        };

        if clock::is_expired(claims.exp * 1000) {
            return IntrospectionResponse::inactive();
        }
        if self.revocation_index.is_revoked(&claims.jti).await {
            return IntrospectionResponse::inactive();
        }

        IntrospectionResponse {
            active: true,
            sub: Some(claims.sub),
            scope: Some(claims.scope),
            client_id: Some(claims.client_id),
            exp: Some(claims.exp),
            iat: Some(claims.iat),
            token_type: Some("Bearer".to_string()),
            cnf: claims.cnf,
        }
    }

    /// RFC 7009 revocation: mark the token's jti revoked in the shared
    /// index so any cached introspection result (positive or negative)
    /// is naturally superseded once its TTL elapses, and drop any opaque
    /// handle record immediately.
    pub async fn revoke(&self, token: &str, reason: &str) {
        let jti = match self.keyring.verify::<AccessTokenClaims>(token) {
            Ok(claims) => claims.jti,
            Err(_) => {
                let hash = token_hash(token);
                let Some((_, record)) = self.opaque_tokens.remove(&hash) else {
                    return;
                };
                record.claims.jti
            }
        };
        info!(jti = %jti, reason, "revoking token");
        let _ = self.revocation_index.revoke(&jti, reason, clock::expires_in(3600 * 24 * 30)).await;
    }
}

/// Extract the `family` component from a `rt{gen}_{shard}_{family}_{seq}`
/// jti. `family` itself may not contain `_`, matching the uuid family ids
/// this service mints.
fn extract_family_id(jti: &str) -> Option<String> {
    let rest = jti.strip_prefix("rt")?;
    let mut parts = rest.splitn(2, '_');
    let _gen = parts.next()?;
    let rest = parts.next()?;
    let mut parts = rest.splitn(2, '_');
    let _shard = parts.next()?;
    let rest = parts.next()?;
    let (family, _seq) = rest.rsplit_once('_')?;
    Some(family.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::{ExchangePolicy, ExchangeRequest, TokenType};

    fn test_signing_key() -> aegis_crypto::SigningKey {
        aegis_crypto::SigningKey {
            kid: "test-kid".to_string(),
            algorithm: aegis_crypto::SigningAlgorithm::Es256,
            private_key_pem: Vec::new(),
            public_jwk: serde_json::json!({}),
            created_at: std::time::SystemTime::now(),
            retired_at: None,
        }
    }

    async fn service() -> TokenService {
        let keyring = Arc::new(KeyRing::new(test_signing_key(), aegis_crypto::SigningProfile::default()));
        let shard_store = Arc::new(aegis_shard::store::InMemoryShardConfigStore::new());
        let shard_router = Arc::new(ShardRouter::new(shard_store));
        TokenService::new(
            "https://issuer.example",
            keyring,
            shard_router,
            Arc::new(RefreshRotator::new()),
            Arc::new(RevocationIndex::new()),
            IntrospectionCacheConfig::default(),
        )
    }

    #[test]
    fn extract_family_id_from_well_formed_jti() {
        assert_eq!(extract_family_id("rt3_17_fam-abc_5"), Some("fam-abc".to_string()));
    }

    #[test]
    fn extract_family_id_rejects_malformed_jti() {
        assert_eq!(extract_family_id("not-a-jti"), None);
    }

    #[test]
    fn introspection_cache_config_clamps_ttl() {
        let config = IntrospectionCacheConfig { enabled: true, ttl_seconds: 99_999 }.clamp_ttl();
        assert_eq!(config.ttl_seconds, 3600);
        let config = IntrospectionCacheConfig { enabled: true, ttl_seconds: 0 }.clamp_ttl();
        assert_eq!(config.ttl_seconds, 1);
    }

    #[tokio::test]
    async fn client_credentials_grant_mints_access_token_with_no_refresh_token() {
        let svc = service().await;
        let tokens = svc
            .client_credentials_grant(AccessTokenKind::Opaque, "client-1", "reports:read", 3600, None)
            .unwrap();
        assert!(!tokens.access_token.is_empty());
        assert_eq!(tokens.scope, "reports:read");
        assert_eq!(tokens.token_type, "Bearer");
    }

    #[tokio::test]
    async fn refresh_token_grant_rotates_and_mints_matching_access_token() {
        let svc = service().await;
        let old_jti = svc.mint_refresh_family("user-1", "client-1", "openid profile", 3600 * 24 * 30).await.unwrap();

        let tokens = svc.refresh_token_grant(AccessTokenKind::Opaque, &old_jti, 3600, None).await.unwrap();
        assert!(!tokens.access_token.is_empty());
        assert_ne!(tokens.refresh_token, old_jti, "rotation must mint a fresh jti");
        assert_eq!(tokens.scope, "openid profile");

        let introspected = svc.introspect(&tokens.access_token, "client-1").await;
        assert!(introspected.active);
        assert_eq!(introspected.sub.as_deref(), Some("user-1"));
    }

    #[tokio::test]
    async fn exchange_token_impersonates_with_verified_subject() {
        let svc = service().await;
        let subject_token = svc
            .mint_access_token(AccessTokenKind::Opaque, "client-1", "user-1", "read write", 3600, None, None)
            .unwrap();

        let request = ExchangeRequest {
            subject_token: subject_token.value,
            subject_token_type: TokenType::AccessToken,
            actor_token: None,
            requested_token_type: TokenType::AccessToken,
            scope: Some("read".to_string()),
            resource: None,
        };
        let policy = ExchangePolicy {
            allowed_subject_token_types: vec![TokenType::AccessToken],
            allow_impersonation: true,
            allow_delegation: false,
        };

        let tokens = svc.exchange_token(AccessTokenKind::Opaque, "client-1", &request, &policy, 3600).await.unwrap();
        assert!(!tokens.access_token.is_empty());
        assert_eq!(tokens.scope, "read");

        let introspected = svc.introspect(&tokens.access_token, "client-1").await;
        assert_eq!(introspected.sub.as_deref(), Some("user-1"));
    }

    #[tokio::test]
    async fn exchange_token_rejects_inactive_subject_token() {
        let svc = service().await;
        let request = ExchangeRequest {
            subject_token: "not-a-real-token".to_string(),
            subject_token_type: TokenType::AccessToken,
            actor_token: None,
            requested_token_type: TokenType::AccessToken,
            scope: None,
            resource: None,
        };
        let policy = ExchangePolicy {
            allowed_subject_token_types: vec![TokenType::AccessToken],
            allow_impersonation: true,
            allow_delegation: false,
        };
        assert!(svc.exchange_token(AccessTokenKind::Opaque, "client-1", &request, &policy, 3600).await.is_err());
    }
}
