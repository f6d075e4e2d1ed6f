//! Narrow persistence seam for [`ShardGenerationConfig`]. The concrete
//! backing store (KV or SQL) lives outside this workspace; implement this
//! trait to plug one in.

use async_trait::async_trait;

use crate::config::ShardGenerationConfig;
use crate::domain::Domain;

/// Loads and persists per-domain shard layout.
///
/// `save` takes the generation the caller last observed so the store can
/// reject a write racing against a concurrent resharding with a conflict,
/// matching the optimistic-retry write model `spec.md` §4.C specifies.
#[async_trait]
pub trait ShardConfigStore: Send + Sync {
    async fn load(&self, domain: Domain) -> Result<Option<ShardGenerationConfig>, aegis_core::OpError>;

    async fn save(
        &self,
        domain: Domain,
        expected_generation: u32,
        config: &ShardGenerationConfig,
    ) -> Result<(), aegis_core::OpError>;
}

/// In-memory store, useful for tests and as the default when no external
/// backing store is wired up.
#[derive(Default)]
pub struct InMemoryShardConfigStore {
    configs: parking_lot::RwLock<std::collections::HashMap<Domain, ShardGenerationConfig>>,
}

impl InMemoryShardConfigStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ShardConfigStore for InMemoryShardConfigStore {
    async fn load(&self, domain: Domain) -> Result<Option<ShardGenerationConfig>, aegis_core::OpError> {
        Ok(self.configs.read().get(&domain).cloned())
    }

    async fn save(
        &self,
        domain: Domain,
        expected_generation: u32,
        config: &ShardGenerationConfig,
    ) -> Result<(), aegis_core::OpError> {
        let mut configs = self.configs.write();
        if let Some(existing) = configs.get(&domain)
            && existing.current_generation != expected_generation
        {
            return Err(aegis_core::OpError::conflict(format!(
                "shard config for {:?} was updated concurrently (expected generation {expected_generation}, found {})",
                domain, existing.current_generation
            )));
        }
        configs.insert(domain, config.clone());
        Ok(())
    }
}
