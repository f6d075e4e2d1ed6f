//! [`Provider`]: wires every engine crate in the workspace into one
//! object. This is pure wiring — no protocol logic lives here. Per
//! `spec.md`'s Non-goals, key and secret provisioning is out of scope,
//! so [`Provider::new`] takes an already-constructed [`KeyRing`]
//! (generating or rotating in real signing key material is the host's
//! job, not the facade's) and an optional external shard-config store.

use std::sync::Arc;

use aegis_actors::{ChallengeStore, RefreshRotator, RevocationIndex, SessionStore};
use aegis_async_grants::{CIBAEngine, DeviceFlow, NotificationSink, PollGovernor, ReqwestNotificationSink};
use aegis_audit::{AuditLog, TombstoneStore};
use aegis_authorize::AuthorizeEngine;
use aegis_crypto::KeyRing;
use aegis_federation::{FederationEngine, LinkedIdentityStore};
use aegis_grants::{CodeStore, ParStore};
use aegis_policy::ConsentCache;
use aegis_registry::ClientRegistry;
use aegis_settings::{CategoryRegistry, SettingsStore};
use aegis_shard::{InMemoryShardConfigStore, ShardConfigStore, ShardRouter};
use aegis_tokens::{IntrospectionCacheConfig, TokenService};

use crate::config::AegisConfig;

/// Every stateful engine the provider needs, wired together and handed
/// out to a transport layer (HTTP handlers, a test harness, ...) that
/// this crate does not itself implement.
///
/// Clone is cheap: every field is an `Arc`.
#[derive(Clone)]
pub struct Provider {
    pub shard_router: Arc<ShardRouter>,
    pub challenges: Arc<ChallengeStore>,
    pub sessions: Arc<SessionStore>,
    pub refresh_rotator: Arc<RefreshRotator>,
    pub revocation_index: Arc<RevocationIndex>,
    pub codes: Arc<CodeStore>,
    pub par: Arc<ParStore>,
    pub tokens: Arc<TokenService>,
    pub authorize: Arc<AuthorizeEngine>,
    pub poll_governor: Arc<PollGovernor>,
    pub device_flow: Arc<DeviceFlow>,
    pub ciba: Arc<CIBAEngine>,
    pub linked_identities: Arc<LinkedIdentityStore>,
    pub federation: Arc<FederationEngine>,
    pub registry: Arc<ClientRegistry>,
    pub consent: Arc<ConsentCache>,
    pub settings: Arc<SettingsStore>,
    pub audit: Arc<AuditLog>,
    pub tombstones: Arc<TombstoneStore>,
}

/// Wiring inputs [`Provider::new`] cannot default on its own, since
/// they carry real key material or an external backing store.
pub struct ProviderDeps {
    pub keyring: Arc<KeyRing>,
    pub shard_store: Option<Arc<dyn ShardConfigStore>>,
    pub notification_sink: Option<Arc<dyn NotificationSink>>,
    pub consent_ttl: std::time::Duration,
    pub settings_categories: CategoryRegistry,
}

impl Provider {
    /// Assemble every engine from `config` and `deps`. `deps.keyring`
    /// must already hold real signing key material — see this module's
    /// doc comment for why that's not generated here.
    #[must_use]
    pub fn new(config: &AegisConfig, deps: ProviderDeps) -> Self {
        let shard_store = deps
            .shard_store
            .unwrap_or_else(|| Arc::new(InMemoryShardConfigStore::new()) as Arc<dyn ShardConfigStore>);
        let shard_router = Arc::new(ShardRouter::new(shard_store));

        let challenges = Arc::new(ChallengeStore::new());
        let sessions = Arc::new(SessionStore::new());
        let refresh_rotator = Arc::new(RefreshRotator::new());
        let revocation_index = Arc::new(RevocationIndex::new());
        let codes = Arc::new(CodeStore::new());
        let par = Arc::new(ParStore::new());

        let tokens = Arc::new(TokenService::new(
            config.issuer_url.clone(),
            Arc::clone(&deps.keyring),
            Arc::clone(&shard_router),
            Arc::clone(&refresh_rotator),
            Arc::clone(&revocation_index),
            IntrospectionCacheConfig::default(),
        ));

        let registry = Arc::new(ClientRegistry::new(config.allow_http_redirect));

        let authorize = Arc::new(AuthorizeEngine::new(
            Arc::clone(&registry) as Arc<dyn aegis_authorize::ClientLookup>,
            Arc::clone(&codes),
            Arc::clone(&par),
            Arc::clone(&tokens),
            Arc::clone(&deps.keyring),
            Some(Arc::clone(&registry) as Arc<dyn aegis_authorize::ClientJwksLookup>),
            // No separate provider decryption key concept exists in
            // `KeyRing` (signing keys only) — encrypted (5-part) request
            // objects fail cleanly in `jar::decode_and_verify`; plain JWS
            // request objects work end to end.
            None,
            config.issuer_url.clone(),
            config.code_expiry,
            config.token_expiry,
        ));

        let poll_governor = Arc::new(PollGovernor::new());
        let device_flow = Arc::new(DeviceFlow::new(Arc::clone(&poll_governor), Arc::clone(&tokens)));
        let notification_sink = deps
            .notification_sink
            .unwrap_or_else(|| Arc::new(ReqwestNotificationSink::new()) as Arc<dyn NotificationSink>);
        let ciba = Arc::new(CIBAEngine::new(Arc::clone(&poll_governor), Arc::clone(&tokens), notification_sink));

        let linked_identities = Arc::new(LinkedIdentityStore::new());
        let federation = Arc::new(FederationEngine::new(
            Arc::clone(&challenges),
            Arc::clone(&sessions),
            Arc::clone(&linked_identities),
        ));

        let consent = Arc::new(ConsentCache::new(deps.consent_ttl));
        let settings = Arc::new(SettingsStore::new(deps.settings_categories));
        let audit = Arc::new(AuditLog::new());
        let tombstones = Arc::new(TombstoneStore::new());

        Self {
            shard_router,
            challenges,
            sessions,
            refresh_rotator,
            revocation_index,
            codes,
            par,
            tokens,
            authorize,
            poll_governor,
            device_flow,
            ciba,
            linked_identities,
            federation,
            registry,
            consent,
            settings,
            audit,
            tombstones,
        }
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use aegis_crypto::{SigningAlgorithm, SigningKey, SigningProfile};

    use super::*;

    fn test_signing_key() -> SigningKey {
        SigningKey {
            kid: "test-kid".to_string(),
            algorithm: SigningAlgorithm::Es256,
            private_key_pem: Vec::new(),
            public_jwk: serde_json::json!({}),
            created_at: std::time::SystemTime::now(),
            retired_at: None,
        }
    }

    fn test_config() -> AegisConfig {
        // Constructed by hand rather than via `AegisConfig::load` so the
        // test doesn't depend on process environment state.
        let json = serde_json::json!({
            "issuer_url": "https://idp.example.test",
            "token_expiry": 3600,
            "code_expiry": 300,
            "state_expiry": 600,
            "nonce_expiry": 600,
            "allow_http_redirect": true,
            "rp_token_encryption_key": "a".repeat(64),
            "admin_api_secret": "test-secret",
            "authrim_revocation_shards": 4,
        });
        serde_json::from_value(json).unwrap()
    }

    fn test_deps() -> ProviderDeps {
        ProviderDeps {
            keyring: Arc::new(KeyRing::new(test_signing_key(), SigningProfile::default())),
            shard_store: None,
            notification_sink: None,
            consent_ttl: Duration::from_secs(300),
            settings_categories: CategoryRegistry::new().with_standard_categories(),
        }
    }

    #[test]
    fn wires_every_engine_without_panicking() {
        let provider = Provider::new(&test_config(), test_deps());
        assert!(provider.settings.effective("session_policy", None, "tenant-1").is_ok());
        assert_eq!(provider.audit.total_records(), 0);
        assert!(provider.tombstones.is_empty());
    }

    #[test]
    fn clone_is_cheap_arc_fanout() {
        let provider = Provider::new(&test_config(), test_deps());
        let cloned = provider.clone();
        assert!(Arc::ptr_eq(&provider.tokens, &cloned.tokens));
        assert!(Arc::ptr_eq(&provider.registry, &cloned.registry));
    }
}
