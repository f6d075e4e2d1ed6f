//! ChallengeStore (`spec.md` §4.D): short-lived, single-consume
//! challenges backing DID registration nonces, WebAuthn challenges, OTP
//! hashes, PAR jti, upstream-federation auth state, and the
//! backchannel-logout jti replay cache.

use std::time::SystemTime;

use aegis_core::{OpError, OpResult};
use serde::{Deserialize, Serialize};

use crate::sharded::{hash_shard_index, ShardedMap};

const DEFAULT_SHARD_COUNT: usize = 16;
const MAX_TTL_SECONDS: i64 = 600;

/// The challenge kinds this store multiplexes under one key space,
/// keyed by `(type, id)` per §4.D.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChallengeType {
    DidRegistration,
    WebAuthn,
    OtpHash,
    ParRequestUri,
    BackchannelLogoutJti,
    ExternalIdpAuthState,
}

#[derive(Debug, Clone)]
struct ChallengeRecord {
    payload: serde_json::Value,
    expires_at_millis: i64,
}

type Key = (ChallengeType, String);

pub struct ChallengeStore {
    shards: ShardedMap<Key, ChallengeRecord>,
}

impl ChallengeStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_shard_count(DEFAULT_SHARD_COUNT)
    }

    #[must_use]
    pub fn with_shard_count(shard_count: usize) -> Self {
        Self { shards: ShardedMap::new(shard_count) }
    }

    fn shard_for(&self, challenge_type: ChallengeType, id: &str) -> usize {
        hash_shard_index(&format!("{challenge_type:?}:{id}"), self.shards.shard_count())
    }

    /// Store a new challenge. Rejects with `conflict` if `id` already
    /// exists for `challenge_type`, even if the existing entry has
    /// expired (callers should pick a fresh id rather than overwrite).
    pub async fn store(
        &self,
        challenge_type: ChallengeType,
        id: &str,
        payload: serde_json::Value,
        ttl_seconds: i64,
    ) -> OpResult<()> {
        if ttl_seconds <= 0 || ttl_seconds > MAX_TTL_SECONDS {
            return Err(OpError::invalid_request(format!(
                "challenge ttl must be in (0, {MAX_TTL_SECONDS}] seconds"
            )));
        }

        let shard = self.shard_for(challenge_type, id);
        let key = (challenge_type, id.to_string());
        self.shards
            .with_shard(shard, |map| {
                if map.contains_key(&key) {
                    return Err(OpError::conflict(format!(
                        "challenge {id} already exists for {challenge_type:?}"
                    )));
                }
                map.insert(
                    key,
                    ChallengeRecord {
                        payload,
                        expires_at_millis: aegis_core::clock::expires_in(ttl_seconds),
                    },
                );
                Ok(())
            })
            .await
    }

    /// Atomically return-and-delete a challenge. Returns `not_found` if
    /// the id was never stored, and `expired` (also via `not_found`
    /// kind, since both are the same protocol-visible outcome) if its TTL
    /// has elapsed — an expired entry is deleted on the way out so it
    /// never blocks a subsequent `store` with the same id.
    pub async fn consume(
        &self,
        challenge_type: ChallengeType,
        id: &str,
    ) -> OpResult<serde_json::Value> {
        let shard = self.shard_for(challenge_type, id);
        let key = (challenge_type, id.to_string());
        self.shards
            .with_shard(shard, |map| match map.remove(&key) {
                None => Err(OpError::not_found(format!("challenge {id} not found"))),
                Some(record) if aegis_core::clock::is_expired(record.expires_at_millis) => {
                    Err(OpError::not_found(format!("challenge {id} expired")))
                }
                Some(record) => Ok(record.payload),
            })
            .await
    }

    /// Whether `id` is currently stored and unexpired, without consuming
    /// it. Used for the BCL jti replay check, where the first phase of
    /// processing needs to fail fast on a replay before doing any other
    /// validation work.
    pub async fn exists(&self, challenge_type: ChallengeType, id: &str) -> bool {
        let shard = self.shard_for(challenge_type, id);
        let key = (challenge_type, id.to_string());
        self.shards
            .with_shard(shard, |map| {
                map.get(&key)
                    .is_some_and(|r| !aegis_core::clock::is_expired(r.expires_at_millis))
            })
            .await
    }
}

impl Default for ChallengeStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn store_then_consume_round_trips() {
        let store = ChallengeStore::new();
        store
            .store(ChallengeType::OtpHash, "chal-1", json!({"hash": "abc"}), 60)
            .await
            .unwrap();
        let payload = store.consume(ChallengeType::OtpHash, "chal-1").await.unwrap();
        assert_eq!(payload, json!({"hash": "abc"}));
    }

    #[tokio::test]
    async fn consume_is_single_use() {
        let store = ChallengeStore::new();
        store.store(ChallengeType::ParRequestUri, "req-1", json!({}), 60).await.unwrap();
        store.consume(ChallengeType::ParRequestUri, "req-1").await.unwrap();
        let second = store.consume(ChallengeType::ParRequestUri, "req-1").await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn store_rejects_duplicate_id() {
        let store = ChallengeStore::new();
        store.store(ChallengeType::WebAuthn, "id-1", json!({}), 60).await.unwrap();
        let dup = store.store(ChallengeType::WebAuthn, "id-1", json!({}), 60).await;
        assert!(dup.is_err());
    }

    #[tokio::test]
    async fn store_rejects_ttl_over_600_seconds() {
        let store = ChallengeStore::new();
        let result = store.store(ChallengeType::OtpHash, "id-2", json!({}), 601).await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn fresh_entry_exists_until_ttl_elapses() {
        let store = ChallengeStore::new();
        store.store(ChallengeType::OtpHash, "id-3", json!({}), 60).await.unwrap();
        assert!(store.exists(ChallengeType::OtpHash, "id-3").await);
        assert!(!store.exists(ChallengeType::OtpHash, "never-stored").await);
    }
}
