//! Device Authorization Grant (RFC 8628, `spec.md` §4.L).

use std::sync::Arc;

use aegis_core::{clock, ids, OpError, OpResult};
use aegis_tokens::service::{AccessTokenKind, TokenService};
use dashmap::DashMap;

use crate::poll_governor::{PollDecision, PollGovernor};

const DEVICE_CODE_TTL_SECONDS: i64 = 600;
const DEFAULT_POLL_INTERVAL_SECONDS: i64 = 5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DeviceState {
    Pending,
    Approved,
    Denied,
    Consumed,
}

struct DeviceRecord {
    client_id: String,
    scope: String,
    user_code: String,
    state: DeviceState,
    subject: Option<String>,
    expires_at: i64,
}

#[derive(Debug, Clone)]
pub struct DeviceAuthorization {
    pub device_code: String,
    pub user_code: String,
    pub expires_in: i64,
    pub interval: i64,
}

#[derive(Debug, Clone)]
pub struct DeviceTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub scope: String,
    pub token_type: &'static str,
}

/// `token(device_code, client_id)`'s per-poll outcome (`spec.md` §4.L).
#[derive(Debug, Clone)]
pub enum DevicePollOutcome {
    AuthorizationPending,
    SlowDown { interval: i64 },
    ExpiredToken,
    AccessDenied,
    Tokens(DeviceTokens),
}

pub struct DeviceFlow {
    records: DashMap<String, DeviceRecord>,
    by_user_code: DashMap<String, String>,
    governor: Arc<PollGovernor>,
    tokens: Arc<TokenService>,
}

impl DeviceFlow {
    #[must_use]
    pub fn new(governor: Arc<PollGovernor>, tokens: Arc<TokenService>) -> Self {
        Self { records: DashMap::new(), by_user_code: DashMap::new(), governor, tokens }
    }

    #[must_use]
    pub fn device_authorize(&self, client_id: impl Into<String>, scope: impl Into<String>) -> DeviceAuthorization {
        let device_code = ids::random_device_code();
        let user_code = ids::random_user_code();
        let expires_at = clock::expires_in(DEVICE_CODE_TTL_SECONDS);

        self.records.insert(
            device_code.clone(),
            DeviceRecord {
                client_id: client_id.into(),
                scope: scope.into(),
                user_code: user_code.clone(),
                state: DeviceState::Pending,
                subject: None,
                expires_at,
            },
        );
        self.by_user_code.insert(user_code.clone(), device_code.clone());
        self.governor.register(&device_code, DEFAULT_POLL_INTERVAL_SECONDS);

        DeviceAuthorization {
            device_code,
            user_code,
            expires_in: DEVICE_CODE_TTL_SECONDS,
            interval: DEFAULT_POLL_INTERVAL_SECONDS,
        }
    }

    /// User-facing verification step: transitions `pending → approved |
    /// denied` once, by the user-code the relying party displayed.
    ///
    /// # Errors
    /// Returns `invalid_request` if the user_code is unknown/expired, and
    /// `conflict` if it was already decided.
    pub fn verify(&self, user_code: &str, approved: bool, subject: &str) -> OpResult<()> {
        let device_code = self
            .by_user_code
            .get(user_code)
            .map(|e| e.value().clone())
            .ok_or_else(|| OpError::invalid_request("unknown or expired user_code"))?;
        let mut record = self
            .records
            .get_mut(&device_code)
            .ok_or_else(|| OpError::invalid_request("unknown or expired user_code"))?;

        if clock::is_expired(record.expires_at) {
            return Err(OpError::invalid_grant("device code expired"));
        }
        if record.state != DeviceState::Pending {
            return Err(OpError::conflict("device authorization was already decided"));
        }

        record.state = if approved { DeviceState::Approved } else { DeviceState::Denied };
        if approved {
            record.subject = Some(subject.to_string());
        }
        Ok(())
    }

    /// Poll the token endpoint for `device_code`. Never returns an
    /// [`OpError`] for the ordinary protocol states (pending, slow_down,
    /// expired, denied) since those are valid polling responses, not
    /// failures; only an unrecognized `client_id`/`device_code` pairing
    /// is an error.
    ///
    /// # Errors
    /// Returns `invalid_grant` if `device_code` is unknown or bound to a
    /// different client.
    pub async fn token(&self, device_code: &str, client_id: &str) -> OpResult<DevicePollOutcome> {
        let Some(mut record) = self.records.get_mut(device_code) else {
            return Err(OpError::invalid_grant("device_code not found"));
        };
        if record.client_id != client_id {
            return Err(OpError::invalid_grant("device_code was not issued to this client"));
        }

        if clock::is_expired(record.expires_at) {
            return Ok(DevicePollOutcome::ExpiredToken);
        }

        if let PollDecision::SlowDown { new_interval_seconds } = self.governor.poll(device_code) {
            return Ok(DevicePollOutcome::SlowDown { interval: new_interval_seconds });
        }

        match record.state {
            DeviceState::Pending => Ok(DevicePollOutcome::AuthorizationPending),
            DeviceState::Denied => Ok(DevicePollOutcome::AccessDenied),
            DeviceState::Consumed => Err(OpError::invalid_grant("device_code already consumed")),
            DeviceState::Approved => {
                let subject = record.subject.clone().expect("approved implies subject set");
                let scope = record.scope.clone();
                let minted = self.tokens.mint_access_token(
                    AccessTokenKind::Jwt,
                    client_id,
                    &subject,
                    &scope,
                    3600,
                    None,
                    None,
                )?;
                let refresh_token = self.tokens.mint_refresh_family(&subject, client_id, &scope, 30 * 24 * 3600).await?;

                record.state = DeviceState::Consumed;
                self.governor.forget(device_code);

                Ok(DevicePollOutcome::Tokens(DeviceTokens {
                    access_token: minted.value,
                    refresh_token,
                    scope,
                    token_type: "Bearer",
                }))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn governor() -> Arc<PollGovernor> {
        Arc::new(PollGovernor::new())
    }

    #[test]
    fn authorize_registers_governor_entry() {
        let flow = DeviceFlow::new(governor(), token_service());
        let auth = flow.device_authorize("client-1", "openid");
        assert_eq!(flow.governor.current_interval(&auth.device_code), Some(DEFAULT_POLL_INTERVAL_SECONDS));
    }

    #[test]
    fn verify_rejects_unknown_user_code() {
        let flow = DeviceFlow::new(governor(), token_service());
        assert!(flow.verify("ZZZZ-ZZZZ", true, "user-1").is_err());
    }

    #[test]
    fn verify_rejects_double_decision() {
        let flow = DeviceFlow::new(governor(), token_service());
        let auth = flow.device_authorize("client-1", "openid");
        flow.verify(&auth.user_code, true, "user-1").unwrap();
        assert!(flow.verify(&auth.user_code, true, "user-1").is_err());
    }

    fn token_service() -> Arc<TokenService> {
        let keyring = Arc::new(aegis_crypto::KeyRing::new(test_signing_key(), aegis_crypto::SigningProfile::default()));
        let store = Arc::new(aegis_shard::store::InMemoryShardConfigStore::new());
        let router = Arc::new(aegis_shard::ShardRouter::new(store));
        let refresh_rotator = Arc::new(aegis_actors::RefreshRotator::new());
        let revocation_index = Arc::new(aegis_actors::RevocationIndex::new());
        Arc::new(TokenService::new(
            "https://issuer.example",
            keyring,
            router,
            refresh_rotator,
            revocation_index,
            aegis_tokens::service::IntrospectionCacheConfig::default(),
        ))
    }

    fn test_signing_key() -> aegis_crypto::SigningKey {
        aegis_crypto::SigningKey {
            kid: "test-kid".to_string(),
            algorithm: aegis_crypto::SigningAlgorithm::Rs256,
            private_key_pem: Vec::new(),
            public_jwk: serde_json::json!({ "kty": "RSA", "kid": "test-kid" }),
            created_at: std::time::SystemTime::now(),
            retired_at: None,
        }
    }
}
