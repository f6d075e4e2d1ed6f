//! RevocationIndex (`spec.md` §4.G): O(1) revoked-jti lookup, sharded by
//! the jti's embedded shard id (falling back to legacy hash-modulo for
//! pre-sharding jtis).

use aegis_core::{OpError, OpResult};
use serde::{Deserialize, Serialize};

use crate::sharded::ShardedMap;

const DEFAULT_SHARD_COUNT: usize = aegis_shard::LEGACY_SHARD_COUNT as usize;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RevokedRecord {
    pub jti: String,
    pub revoked_at: i64,
    pub reason: String,
    pub expires_at: i64,
}

pub struct RevocationIndex {
    shards: ShardedMap<String, RevokedRecord>,
}

impl RevocationIndex {
    #[must_use]
    pub fn new() -> Self {
        Self::with_shard_count(DEFAULT_SHARD_COUNT)
    }

    #[must_use]
    pub fn with_shard_count(shard_count: usize) -> Self {
        Self { shards: ShardedMap::new(shard_count) }
    }

    fn shard_for(&self, jti: &str) -> usize {
        let location = aegis_shard::ids::parse_refresh_jti(jti);
        (location.shard_index as usize) % self.shards.shard_count()
    }

    pub async fn revoke(&self, jti: &str, reason: &str, expires_at: i64) -> OpResult<()> {
        let shard = self.shard_for(jti);
        let record = RevokedRecord {
            jti: jti.to_string(),
            revoked_at: aegis_core::clock::now_millis(),
            reason: reason.to_string(),
            expires_at,
        };
        self.shards
            .with_shard(shard, |map| {
                map.insert(jti.to_string(), record);
                Ok(())
            })
            .await
    }

    /// `true` if `jti` has an unexpired revocation record. Expired
    /// records are swept lazily on read, same as the other actors.
    pub async fn is_revoked(&self, jti: &str) -> bool {
        let shard = self.shard_for(jti);
        self.shards
            .with_shard(shard, |map| match map.get(jti) {
                None => false,
                Some(record) if aegis_core::clock::is_expired(record.expires_at) => {
                    map.remove(jti);
                    false
                }
                Some(_) => true,
            })
            .await
    }
}

impl Default for RevocationIndex {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn revoked_jti_is_reported() {
        let index = RevocationIndex::new();
        index.revoke("rt1_5_fam_3", "admin_revoke", aegis_core::clock::expires_in(3600)).await.unwrap();
        assert!(index.is_revoked("rt1_5_fam_3").await);
        assert!(!index.is_revoked("rt1_5_fam_4").await);
    }

    #[tokio::test]
    async fn expired_revocation_stops_reporting_revoked() {
        let index = RevocationIndex::new();
        index.revoke("rt1_5_fam_3", "admin_revoke", aegis_core::clock::now_millis() - 1).await.unwrap();
        assert!(!index.is_revoked("rt1_5_fam_3").await);
    }

    #[tokio::test]
    async fn legacy_jti_without_embedded_shard_still_routes() {
        let index = RevocationIndex::new();
        index.revoke("legacy-opaque-jti", "admin_revoke", aegis_core::clock::expires_in(60)).await.unwrap();
        assert!(index.is_revoked("legacy-opaque-jti").await);
    }
}
