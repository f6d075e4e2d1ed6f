//! Generic single-writer shard: a fixed-size pool of `tokio::sync::Mutex`
//! guarded maps, one per shard index, giving "serialized through a
//! single-writer actor" semantics (`spec.md` §5) without a literal
//! message-passing actor runtime — the mutex IS the mailbox, and nothing
//! inside a shard needs its own locking.

use std::collections::HashMap;
use std::hash::Hash;

use tokio::sync::Mutex;

/// A pool of `shard_count` independently-locked maps. Callers pick a shard
/// index (typically derived from [`aegis_shard::ShardRouter`] or a local
/// hash) and every mutation against that index serializes behind the same
/// mutex, matching the single-writer-per-key model.
pub struct ShardedMap<K, V> {
    shards: Vec<Mutex<HashMap<K, V>>>,
}

impl<K: Eq + Hash, V> ShardedMap<K, V> {
    #[must_use]
    pub fn new(shard_count: usize) -> Self {
        let mut shards = Vec::with_capacity(shard_count.max(1));
        shards.resize_with(shard_count.max(1), || Mutex::new(HashMap::new()));
        Self { shards }
    }

    #[must_use]
    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Run `f` against the shard owning `shard_index`, holding that
    /// shard's mutex for the duration — every other caller targeting the
    /// same shard queues behind it.
    pub async fn with_shard<R>(
        &self,
        shard_index: usize,
        f: impl FnOnce(&mut HashMap<K, V>) -> R,
    ) -> R {
        let mut guard = self.shards[shard_index % self.shards.len()].lock().await;
        f(&mut guard)
    }
}

/// FNV-1a hash of a key string, used to pick a shard index for stores
/// that don't route through `aegis_shard`'s generation protocol (e.g.
/// `ChallengeStore`, whose ids are opaque with no embedded shard).
#[must_use]
pub fn hash_shard_index(key: &str, shard_count: usize) -> usize {
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in key.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01B3);
    }
    (hash as usize) % shard_count.max(1)
}
