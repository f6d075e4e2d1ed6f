//! Builds and parses the generation/shard prefixes embedded in session ids
//! and refresh-token jtis (`spec.md` §3).

use crate::domain::Domain;

/// A resolved `(generation, shard)` pair, either decoded from an embedded
/// identifier prefix or computed via the legacy hash-modulo fallback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ShardLocation {
    pub generation: Option<u32>,
    pub shard_index: u32,
}

impl ShardLocation {
    #[must_use]
    pub fn is_legacy(&self) -> bool {
        self.generation.is_none()
    }
}

/// Number of shards a legacy (pre-sharding) identifier is hashed across.
pub const LEGACY_SHARD_COUNT: u32 = 64;

fn legacy_shard(identifier: &str) -> u32 {
    // FNV-1a: fast, stable across process restarts (no process-seeded
    // hasher), good enough distribution for routing a fixed legacy pool.
    let mut hash: u64 = 0xcbf2_9ce4_8422_2325;
    for byte in identifier.as_bytes() {
        hash ^= u64::from(*byte);
        hash = hash.wrapping_mul(0x0000_0100_0000_01B3);
    }
    (hash % u64::from(LEGACY_SHARD_COUNT)) as u32
}

/// Build a session id of the form `g{gen}_s{shard}_{random}`.
#[must_use]
pub fn build_session_id(generation: u32, shard_index: u32, random_suffix: &str) -> String {
    format!("g{generation}_s{shard_index}_{random_suffix}")
}

/// Parse a session id, returning the embedded shard location or the
/// legacy hash-modulo fallback if no `g{..}_s{..}_` prefix is present.
#[must_use]
pub fn parse_session_id(id: &str) -> ShardLocation {
    if let Some(location) = parse_gen_shard_prefix(id, "g", "s") {
        return location;
    }
    ShardLocation { generation: None, shard_index: legacy_shard(id) }
}

/// Build a refresh-token jti of the form `rt{gen}_{shard}_{family}_{seq}`.
#[must_use]
pub fn build_refresh_jti(generation: u32, shard_index: u32, family_id: &str, seq: u64) -> String {
    format!("rt{generation}_{shard_index}_{family_id}_{seq}")
}

/// Parse a refresh-token jti's embedded `(generation, shard)`, falling
/// back to legacy hash-modulo routing for jtis minted before sharding.
#[must_use]
pub fn parse_refresh_jti(jti: &str) -> ShardLocation {
    let Some(rest) = jti.strip_prefix("rt") else {
        return ShardLocation { generation: None, shard_index: legacy_shard(jti) };
    };
    let mut parts = rest.splitn(2, '_');
    let Some(gen_str) = parts.next() else {
        return ShardLocation { generation: None, shard_index: legacy_shard(jti) };
    };
    let Some(remainder) = parts.next() else {
        return ShardLocation { generation: None, shard_index: legacy_shard(jti) };
    };
    let Some((shard_str, _family_seq)) = remainder.split_once('_') else {
        return ShardLocation { generation: None, shard_index: legacy_shard(jti) };
    };

    match (gen_str.parse::<u32>(), shard_str.parse::<u32>()) {
        (Ok(generation), Ok(shard_index)) => {
            ShardLocation { generation: Some(generation), shard_index }
        }
        _ => ShardLocation { generation: None, shard_index: legacy_shard(jti) },
    }
}

fn parse_gen_shard_prefix(id: &str, gen_tag: &str, shard_tag: &str) -> Option<ShardLocation> {
    let rest = id.strip_prefix(gen_tag)?;
    let (gen_str, rest) = rest.split_once('_')?;
    let rest = rest.strip_prefix(shard_tag)?;
    let (shard_str, _) = rest.split_once('_')?;
    Some(ShardLocation {
        generation: Some(gen_str.parse().ok()?),
        shard_index: shard_str.parse().ok()?,
    })
}

/// The single-writer actor instance name a `(domain, shard)` pair routes
/// to: `"{domain}-g{gen}-s{shardIndex}"`.
#[must_use]
pub fn instance_name(domain: Domain, generation: u32, shard_index: u32) -> String {
    format!("{}-g{generation}-s{shard_index}", domain.as_str())
}
