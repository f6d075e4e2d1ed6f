//! # aegis-shard
//!
//! Generation-based shard routing shared by the session, refresh-token,
//! revocation, and region domains: [`ShardRouter`] resolves identifiers to
//! the single-writer actor instance that owns them and lets shard count
//! change online without invalidating tokens minted under a prior
//! generation.

pub mod config;
pub mod domain;
pub mod ids;
pub mod router;
pub mod store;

pub use config::{PreviousGeneration, RegionDistribution, RegionShare, ShardGenerationConfig};
pub use domain::Domain;
pub use ids::{ShardLocation, LEGACY_SHARD_COUNT};
pub use router::ShardRouter;
pub use store::{InMemoryShardConfigStore, ShardConfigStore};
