//! SessionStore (`spec.md` §4.E): per-session single-writer mutation.

use aegis_core::{OpError, OpResult};
use aegis_shard::ShardRouter;
use serde::{Deserialize, Serialize};

use crate::sharded::ShardedMap;

const DEFAULT_SHARD_COUNT: usize = 64;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub user_id: String,
    pub auth_time: i64,
    pub methods: Vec<String>,
    pub acr: Option<String>,
    pub amr: Option<Vec<String>>,
    pub created_at: i64,
    pub expires_at: i64,
    pub external_provider_id: Option<String>,
    pub external_provider_sub: Option<String>,
}

pub struct SessionStore {
    shards: ShardedMap<String, Session>,
}

impl SessionStore {
    #[must_use]
    pub fn new() -> Self {
        Self::with_shard_count(DEFAULT_SHARD_COUNT)
    }

    #[must_use]
    pub fn with_shard_count(shard_count: usize) -> Self {
        Self { shards: ShardedMap::new(shard_count) }
    }

    fn shard_for(&self, session_id: &str) -> usize {
        crate::sharded::hash_shard_index(session_id, self.shards.shard_count())
    }

    pub async fn create(&self, session: Session) -> OpResult<()> {
        let shard = self.shard_for(&session.id);
        let id = session.id.clone();
        self.shards
            .with_shard(shard, move |map| {
                if map.contains_key(&id) {
                    return Err(OpError::conflict(format!("session {id} already exists")));
                }
                map.insert(id, session);
                Ok(())
            })
            .await
    }

    /// Fetch a session, applying expiration on read: an expired row is
    /// removed and reported as `not_found` rather than returned stale.
    pub async fn get(&self, session_id: &str) -> OpResult<Session> {
        let shard = self.shard_for(session_id);
        self.shards
            .with_shard(shard, |map| match map.get(session_id) {
                None => Err(OpError::not_found(format!("session {session_id} not found"))),
                Some(session) if aegis_core::clock::is_expired(session.expires_at) => {
                    map.remove(session_id);
                    Err(OpError::not_found(format!("session {session_id} expired")))
                }
                Some(session) => Ok(session.clone()),
            })
            .await
    }

    /// Extend `expires_at` on a live session.
    pub async fn touch(&self, session_id: &str, new_expires_at: i64) -> OpResult<()> {
        let shard = self.shard_for(session_id);
        self.shards
            .with_shard(shard, |map| match map.get_mut(session_id) {
                None => Err(OpError::not_found(format!("session {session_id} not found"))),
                Some(session) => {
                    session.expires_at = new_expires_at;
                    Ok(())
                }
            })
            .await
    }

    pub async fn delete(&self, session_id: &str) -> OpResult<()> {
        let shard = self.shard_for(session_id);
        self.shards
            .with_shard(shard, |map| {
                map.remove(session_id);
                Ok(())
            })
            .await
    }

    /// Terminate every session bound to `(provider_id, provider_sub)` —
    /// used by backchannel logout fan-out (`spec.md` §4.N). Scans every
    /// shard; acceptable since BCL is a rare, not latency-critical path.
    pub async fn terminate_by_external_identity(
        &self,
        provider_id: &str,
        provider_sub: &str,
    ) -> usize {
        let mut terminated = 0;
        for shard_index in 0..self.shards.shard_count() {
            terminated += self
                .shards
                .with_shard(shard_index, |map| {
                    let now = aegis_core::clock::now_millis();
                    let to_remove: Vec<String> = map
                        .values()
                        .filter(|s| {
                            s.external_provider_id.as_deref() == Some(provider_id)
                                && s.external_provider_sub.as_deref() == Some(provider_sub)
                                && s.expires_at > now
                        })
                        .map(|s| s.id.clone())
                        .collect();
                    for id in &to_remove {
                        map.remove(id);
                    }
                    to_remove.len()
                })
                .await;
        }
        terminated
    }
}

impl Default for SessionStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Build a session id and route it through `router`'s current session
/// generation, returning the sharded id ready for [`SessionStore::create`].
pub async fn mint_session_id(router: &ShardRouter, random_suffix: &str) -> String {
    let config = router.config(aegis_shard::Domain::Session).await;
    let shard_index = crate::sharded::hash_shard_index(random_suffix, config.current_shard_count as usize) as u32;
    aegis_shard::ids::build_session_id(config.current_generation, shard_index, random_suffix)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session(id: &str) -> Session {
        Session {
            id: id.to_string(),
            user_id: "user-1".to_string(),
            auth_time: 0,
            methods: vec!["pwd".to_string()],
            acr: None,
            amr: None,
            created_at: aegis_core::clock::now_millis(),
            expires_at: aegis_core::clock::expires_in(3600),
            external_provider_id: None,
            external_provider_sub: None,
        }
    }

    #[tokio::test]
    async fn create_then_get_round_trips() {
        let store = SessionStore::new();
        store.create(session("sess-1")).await.unwrap();
        let fetched = store.get("sess-1").await.unwrap();
        assert_eq!(fetched.user_id, "user-1");
    }

    #[tokio::test]
    async fn create_rejects_duplicate_id() {
        let store = SessionStore::new();
        store.create(session("sess-1")).await.unwrap();
        assert!(store.create(session("sess-1")).await.is_err());
    }

    #[tokio::test]
    async fn expired_session_is_not_found_and_removed() {
        let store = SessionStore::new();
        let mut s = session("sess-2");
        s.expires_at = aegis_core::clock::now_millis() - 1;
        store.create(s).await.unwrap();
        assert!(store.get("sess-2").await.is_err());
        assert!(store.get("sess-2").await.is_err());
    }

    #[tokio::test]
    async fn terminate_by_external_identity_removes_matching_sessions() {
        let store = SessionStore::new();
        let mut s = session("sess-3");
        s.external_provider_id = Some("google".to_string());
        s.external_provider_sub = Some("sub-123".to_string());
        store.create(s).await.unwrap();

        let count = store.terminate_by_external_identity("google", "sub-123").await;
        assert_eq!(count, 1);
        assert!(store.get("sess-3").await.is_err());
    }
}
