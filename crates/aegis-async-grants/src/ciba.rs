//! Client-Initiated Backchannel Authentication (CIBA, `spec.md` §4.M).
//!
//! Mirrors [`crate::device`] without a user_code: the end-user is
//! authenticated out of band (push notification, messaging app, phone
//! call) against `login_hint`/`login_hint_token`/`id_token_hint` rather
//! than by typing a code, so `auth_req_id` is the only correlation
//! handle. Delivery mode governs how the client learns the outcome:
//! `poll` behaves exactly like [`crate::device::DeviceFlow`], `ping`
//! POSTs a bare notification to the client's registered
//! `backchannel_notification_endpoint` and waits for the client to poll
//! the token endpoint, and `push` POSTs the minted tokens directly.

use std::sync::Arc;

use aegis_core::{clock, ids, OpError, OpResult};
use aegis_tokens::service::{AccessTokenKind, TokenService};
use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::json;
use tracing::{error, warn};

use crate::poll_governor::{PollDecision, PollGovernor};

const AUTH_REQ_ID_TTL_SECONDS: i64 = 600;
const DEFAULT_POLL_INTERVAL_SECONDS: i64 = 5;
/// Delivery attempts tolerated for `ping`/`push` before the request is
/// dead-lettered, per `spec.md` §4.M ("dead-letters after N attempts").
const MAX_DELIVERY_ATTEMPTS: u32 = 5;
/// `attempt`-th retry waits `BASE_BACKOFF_SECONDS * 2^(attempt-1)`.
const BASE_BACKOFF_SECONDS: i64 = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryMode {
    Poll,
    Ping,
    Push,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum CibaState {
    Pending,
    Approved,
    Denied,
    Consumed,
    DeadLettered,
}

struct CibaRecord {
    client_id: String,
    scope: String,
    mode: DeliveryMode,
    notification_endpoint: Option<String>,
    state: CibaState,
    subject: Option<String>,
    expires_at: i64,
    delivery_attempts: u32,
    next_delivery_at: i64,
}

#[derive(Debug, Clone)]
pub struct CibaAuthorization {
    pub auth_req_id: String,
    pub expires_in: i64,
    pub interval: i64,
}

#[derive(Debug, Clone)]
pub struct CibaTokens {
    pub access_token: String,
    pub refresh_token: String,
    pub scope: String,
    pub token_type: &'static str,
}

/// `token(auth_req_id, client_id)`'s per-poll outcome for `poll` mode
/// (`spec.md` §4.M).
#[derive(Debug, Clone)]
pub enum CibaPollOutcome {
    AuthorizationPending,
    SlowDown { interval: i64 },
    ExpiredToken,
    AccessDenied,
    Tokens(CibaTokens),
}

/// Outcome of one delivery attempt against a `ping`/`push` client.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeliveryOutcome {
    Delivered,
    Retrying { attempt: u32, next_in_seconds: i64 },
    DeadLettered,
    NotDue,
}

/// Outbound transport for `ping`/`push` notifications, abstracted so
/// tests can substitute a fake without a live HTTP endpoint.
#[async_trait]
pub trait NotificationSink: Send + Sync {
    async fn deliver(&self, endpoint: &str, payload: serde_json::Value) -> bool;
}

/// Default sink: POSTs the payload as JSON to the client's registered
/// `backchannel_notification_endpoint`.
pub struct ReqwestNotificationSink {
    client: reqwest::Client,
}

impl ReqwestNotificationSink {
    #[must_use]
    pub fn new() -> Self {
        Self { client: reqwest::Client::new() }
    }
}

impl Default for ReqwestNotificationSink {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl NotificationSink for ReqwestNotificationSink {
    async fn deliver(&self, endpoint: &str, payload: serde_json::Value) -> bool {
        match self.client.post(endpoint).json(&payload).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(err) => {
                warn!(endpoint, error = %err, "backchannel notification delivery failed");
                false
            }
        }
    }
}

pub struct CIBAEngine {
    records: DashMap<String, CibaRecord>,
    governor: Arc<PollGovernor>,
    tokens: Arc<TokenService>,
    sink: Arc<dyn NotificationSink>,
}

impl CIBAEngine {
    #[must_use]
    pub fn new(governor: Arc<PollGovernor>, tokens: Arc<TokenService>, sink: Arc<dyn NotificationSink>) -> Self {
        Self { records: DashMap::new(), governor, tokens, sink }
    }

    #[must_use]
    pub fn bc_authorize(
        &self,
        client_id: impl Into<String>,
        scope: impl Into<String>,
        mode: DeliveryMode,
        notification_endpoint: Option<String>,
    ) -> CibaAuthorization {
        let auth_req_id = ids::random_device_code();
        let expires_at = clock::expires_in(AUTH_REQ_ID_TTL_SECONDS);

        self.records.insert(
            auth_req_id.clone(),
            CibaRecord {
                client_id: client_id.into(),
                scope: scope.into(),
                mode,
                notification_endpoint,
                state: CibaState::Pending,
                subject: None,
                expires_at,
                delivery_attempts: 0,
                next_delivery_at: 0,
            },
        );
        if mode == DeliveryMode::Poll {
            self.governor.register(&auth_req_id, DEFAULT_POLL_INTERVAL_SECONDS);
        }

        CibaAuthorization {
            auth_req_id,
            expires_in: AUTH_REQ_ID_TTL_SECONDS,
            interval: DEFAULT_POLL_INTERVAL_SECONDS,
        }
    }

    /// Authentication-device-side decision: transitions `pending →
    /// approved | denied` once.
    ///
    /// # Errors
    /// Returns `invalid_request` if `auth_req_id` is unknown/expired, and
    /// `conflict` if it was already decided.
    pub fn decide(&self, auth_req_id: &str, approved: bool, subject: &str) -> OpResult<()> {
        let mut record = self
            .records
            .get_mut(auth_req_id)
            .ok_or_else(|| OpError::invalid_request("unknown or expired auth_req_id"))?;

        if clock::is_expired(record.expires_at) {
            return Err(OpError::invalid_grant("auth_req_id expired"));
        }
        if record.state != CibaState::Pending {
            return Err(OpError::conflict("backchannel authentication request was already decided"));
        }

        record.state = if approved { CibaState::Approved } else { CibaState::Denied };
        if approved {
            record.subject = Some(subject.to_string());
        }
        Ok(())
    }

    /// Poll the token endpoint for `auth_req_id`; only meaningful for
    /// `poll` mode, but any mode may be polled before its notification
    /// lands.
    ///
    /// # Errors
    /// Returns `invalid_grant` if `auth_req_id` is unknown or bound to a
    /// different client.
    pub async fn token(&self, auth_req_id: &str, client_id: &str) -> OpResult<CibaPollOutcome> {
        let Some(mut record) = self.records.get_mut(auth_req_id) else {
            return Err(OpError::invalid_grant("auth_req_id not found"));
        };
        if record.client_id != client_id {
            return Err(OpError::invalid_grant("auth_req_id was not issued to this client"));
        }

        if clock::is_expired(record.expires_at) {
            return Ok(CibaPollOutcome::ExpiredToken);
        }

        if record.mode == DeliveryMode::Poll {
            if let PollDecision::SlowDown { new_interval_seconds } = self.governor.poll(auth_req_id) {
                return Ok(CibaPollOutcome::SlowDown { interval: new_interval_seconds });
            }
        }

        match record.state {
            CibaState::Pending => Ok(CibaPollOutcome::AuthorizationPending),
            CibaState::Denied => Ok(CibaPollOutcome::AccessDenied),
            CibaState::Consumed => Err(OpError::invalid_grant("auth_req_id already consumed")),
            CibaState::DeadLettered => Err(OpError::invalid_grant("auth_req_id delivery was abandoned")),
            CibaState::Approved => {
                let tokens = self.mint(auth_req_id, &mut record).await?;
                Ok(CibaPollOutcome::Tokens(tokens))
            }
        }
    }

    async fn mint(&self, auth_req_id: &str, record: &mut CibaRecord) -> OpResult<CibaTokens> {
        let subject = record.subject.clone().expect("approved implies subject set");
        let scope = record.scope.clone();
        let minted = self.tokens.mint_access_token(
            AccessTokenKind::Jwt,
            &record.client_id,
            &subject,
            &scope,
            3600,
            None,
            None,
        )?;
        let refresh_token =
            self.tokens.mint_refresh_family(&subject, &record.client_id, &scope, 30 * 24 * 3600).await?;

        record.state = CibaState::Consumed;
        self.governor.forget(auth_req_id);

        Ok(CibaTokens { access_token: minted.value, refresh_token, scope, token_type: "Bearer" })
    }

    /// Drive outstanding `ping`/`push` deliveries one tick: attempts
    /// notification for every approved record whose backoff has
    /// elapsed, advancing the retry schedule on failure and
    /// dead-lettering past [`MAX_DELIVERY_ATTEMPTS`].
    ///
    /// Returns the outcome per `auth_req_id` touched this tick.
    pub async fn process_deliveries(&self) -> Vec<(String, DeliveryOutcome)> {
        let due: Vec<String> = self
            .records
            .iter()
            .filter(|e| {
                let r = e.value();
                r.mode != DeliveryMode::Poll
                    && r.state == CibaState::Approved
                    && clock::now_millis() / 1000 >= r.next_delivery_at
            })
            .map(|e| e.key().clone())
            .collect();

        let mut outcomes = Vec::with_capacity(due.len());
        for auth_req_id in due {
            let outcome = self.deliver_one(&auth_req_id).await;
            outcomes.push((auth_req_id, outcome));
        }
        outcomes
    }

    async fn deliver_one(&self, auth_req_id: &str) -> DeliveryOutcome {
        let Some((mode, endpoint)) = self.records.get(auth_req_id).and_then(|r| {
            r.notification_endpoint.clone().map(|endpoint| (r.mode, endpoint))
        }) else {
            return DeliveryOutcome::NotDue;
        };

        let payload = match mode {
            DeliveryMode::Push => {
                let tokens = match self.records.get_mut(auth_req_id) {
                    Some(mut r) => self.mint(auth_req_id, &mut r).await,
                    None => return DeliveryOutcome::NotDue,
                };
                match tokens {
                    Ok(t) => json!({
                        "access_token": t.access_token,
                        "refresh_token": t.refresh_token,
                        "scope": t.scope,
                        "token_type": t.token_type,
                    }),
                    Err(err) => {
                        error!(auth_req_id, error = %err, "push token minting failed");
                        json!({ "auth_req_id": auth_req_id })
                    }
                }
            }
            DeliveryMode::Ping => json!({ "auth_req_id": auth_req_id }),
            DeliveryMode::Poll => return DeliveryOutcome::NotDue,
        };

        let delivered = self.sink.deliver(&endpoint, payload).await;
        let Some(mut record) = self.records.get_mut(auth_req_id) else {
            return DeliveryOutcome::NotDue;
        };

        if delivered {
            if record.mode == DeliveryMode::Push {
                record.state = CibaState::Consumed;
            }
            return DeliveryOutcome::Delivered;
        }

        record.delivery_attempts += 1;
        if record.delivery_attempts >= MAX_DELIVERY_ATTEMPTS {
            record.state = CibaState::DeadLettered;
            warn!(auth_req_id, "backchannel notification dead-lettered");
            return DeliveryOutcome::DeadLettered;
        }
        let backoff = BASE_BACKOFF_SECONDS * (1i64 << (record.delivery_attempts - 1));
        record.next_delivery_at = clock::now_millis() / 1000 + backoff;
        DeliveryOutcome::Retrying { attempt: record.delivery_attempts, next_in_seconds: backoff }
    }
}
