//! `ShardRouter`: the per-domain generation/shard config cache plus the
//! routing rules built on top of it (`spec.md` §4.C).

use std::sync::Arc;
use std::time::{Duration, Instant};

use aegis_core::{OpError, OpResult};
use dashmap::DashMap;
use tracing::{info, warn};

use crate::config::{RegionDistribution, RegionShare, ShardGenerationConfig};
use crate::domain::Domain;
use crate::ids::{self, ShardLocation};
use crate::store::ShardConfigStore;

/// How long a cached config is served after a failed fetch from the
/// backing store, per the §4.C failure model.
const CACHE_FALLBACK_TTL: Duration = Duration::from_secs(5 * 60);

struct CachedConfig {
    config: ShardGenerationConfig,
    fetched_at: Instant,
}

/// Routes sessions, refresh-token families, revocation lookups, and
/// region assignment through each domain's current generation.
///
/// Config reads are served from an in-process cache backed by
/// [`ShardConfigStore`]; a store outage degrades to the last good value
/// for up to [`CACHE_FALLBACK_TTL`] rather than failing routing outright,
/// and a domain with no config yet present falls back to
/// [`ShardGenerationConfig::initial`] with one shard.
pub struct ShardRouter {
    store: Arc<dyn ShardConfigStore>,
    cache: DashMap<Domain, CachedConfig>,
    region_distributions: DashMap<u32, RegionDistribution>,
}

impl ShardRouter {
    #[must_use]
    pub fn new(store: Arc<dyn ShardConfigStore>) -> Self {
        Self {
            store,
            cache: DashMap::new(),
            region_distributions: DashMap::new(),
        }
    }

    /// Current config for `domain`, refreshing from the store and falling
    /// back to a stale cache entry (or the hardcoded default) on failure.
    pub async fn config(&self, domain: Domain) -> ShardGenerationConfig {
        match self.store.load(domain).await {
            Ok(Some(fresh)) => {
                self.cache.insert(domain, CachedConfig { config: fresh.clone(), fetched_at: Instant::now() });
                fresh
            }
            Ok(None) => ShardGenerationConfig::initial(1, "default"),
            Err(err) => {
                if let Some(cached) = self.cache.get(&domain) {
                    if cached.fetched_at.elapsed() <= CACHE_FALLBACK_TTL {
                        warn!(?domain, error = %err, "shard config fetch failed, serving cached value");
                        return cached.config.clone();
                    }
                    warn!(?domain, error = %err, "shard config fetch failed and cache is stale past TTL");
                }
                ShardGenerationConfig::initial(1, "default")
            }
        }
    }

    /// Increase or decrease a domain's shard count, advancing its
    /// generation. Single-writer with optimistic retry: on a conflicting
    /// concurrent write, the caller's desired `new_shard_count` is
    /// reapplied on top of the fresher config and resubmitted once.
    pub async fn reshard(
        &self,
        domain: Domain,
        new_shard_count: u32,
        updated_by: &str,
    ) -> OpResult<ShardGenerationConfig> {
        let mut config = self.config(domain).await;
        let expected_generation = config.current_generation;
        config.reshard(new_shard_count, updated_by);

        match self.store.save(domain, expected_generation, &config).await {
            Ok(()) => {
                info!(?domain, generation = config.current_generation, shard_count = new_shard_count, "resharded");
                self.cache.insert(domain, CachedConfig { config: config.clone(), fetched_at: Instant::now() });
                Ok(config)
            }
            Err(_conflict) => {
                let mut retry = self.config(domain).await;
                let retry_expected = retry.current_generation;
                retry.reshard(new_shard_count, updated_by);
                self.store.save(domain, retry_expected, &retry).await.map_err(|e| {
                    OpError::conflict(format!("reshard retry failed for {domain:?}: {e}"))
                })?;
                self.cache.insert(domain, CachedConfig { config: retry.clone(), fetched_at: Instant::now() });
                Ok(retry)
            }
        }
    }

    /// `instance = "{domain}-g{gen}-s{shardIndex}"` for a freshly minted
    /// identifier at the domain's current generation.
    pub async fn instance_for_new(&self, domain: Domain, shard_index: u32) -> String {
        let config = self.config(domain).await;
        ids::instance_name(domain, config.current_generation, shard_index)
    }

    /// Resolve an existing identifier's shard location (embedded prefix,
    /// falling back to legacy hash-modulo), validating the embedded
    /// generation is still known (current or within history).
    pub async fn locate_session(&self, session_id: &str) -> OpResult<ShardLocation> {
        self.locate(Domain::Session, ids::parse_session_id(session_id)).await
    }

    pub async fn locate_refresh(&self, jti: &str) -> OpResult<ShardLocation> {
        self.locate(Domain::Refresh, ids::parse_refresh_jti(jti)).await
    }

    async fn locate(&self, domain: Domain, location: ShardLocation) -> OpResult<ShardLocation> {
        if let Some(generation) = location.generation {
            let config = self.config(domain).await;
            if !config.is_known_generation(generation) {
                return Err(OpError::invalid_grant(format!(
                    "{domain:?} identifier references unknown generation {generation}"
                )));
            }
        }
        Ok(location)
    }

    /// Which region owns `shard_index` for the region domain's current
    /// generation, given `regionDistribution` percentages.
    ///
    /// The distribution is memoized per generation since it only changes
    /// on resharding, not on every lookup.
    pub async fn region_for_shard(
        &self,
        shares: &[RegionShare],
        shard_index: u32,
    ) -> OpResult<String> {
        let config = self.config(Domain::Region).await;
        if let Some(cached) = self.region_distributions.get(&config.current_generation) {
            return cached
                .region_for(shard_index)
                .map(str::to_string)
                .ok_or_else(|| OpError::invalid_request(format!("shard {shard_index} has no region")));
        }

        let distribution = RegionDistribution::build(shares, config.current_shard_count)
            .map_err(OpError::invalid_request)?;
        let region = distribution
            .region_for(shard_index)
            .map(str::to_string)
            .ok_or_else(|| OpError::invalid_request(format!("shard {shard_index} has no region")));
        self.region_distributions.insert(config.current_generation, distribution);
        region
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::store::InMemoryShardConfigStore;

    fn router() -> ShardRouter {
        ShardRouter::new(Arc::new(InMemoryShardConfigStore::new()))
    }

    #[tokio::test]
    async fn missing_config_defaults_to_one_shard() {
        let router = router();
        let config = router.config(Domain::Session).await;
        assert_eq!(config.current_shard_count, 1);
    }

    #[tokio::test]
    async fn instance_for_new_uses_current_generation() {
        let router = router();
        router.reshard(Domain::Session, 8, "ops").await.unwrap();
        let instance = router.instance_for_new(Domain::Session, 3).await;
        assert_eq!(instance, "session-g1-s3");
    }

    #[tokio::test]
    async fn locate_rejects_unknown_generation() {
        let router = router();
        let result = router.locate_session("g99_s0_random").await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn locate_accepts_current_generation() {
        let router = router();
        router.reshard(Domain::Session, 8, "ops").await.unwrap();
        let id = ids::build_session_id(1, 3, "random");
        let location = router.locate_session(&id).await.unwrap();
        assert_eq!(location.shard_index, 3);
    }

    #[tokio::test]
    async fn legacy_identifiers_always_resolve() {
        let router = router();
        let location = router.locate_session("pre-sharding-legacy-id").await.unwrap();
        assert!(location.is_legacy());
    }

    #[tokio::test]
    async fn region_for_shard_uses_distribution() {
        let router = router();
        router.reshard(Domain::Region, 10, "ops").await.unwrap();
        let shares = vec![
            RegionShare { region: "us".into(), percentage: 70 },
            RegionShare { region: "eu".into(), percentage: 30 },
        ];
        let region = router.region_for_shard(&shares, 0).await.unwrap();
        assert!(region == "us" || region == "eu");
    }
}
