//! `ShardGenerationConfig` and the region-distribution table that `spec.md`
//! §3/§4.C describe for the session, refresh, revocation, and region
//! domains.

use std::collections::VecDeque;

use serde::{Deserialize, Serialize};

/// Bound on `previous_generations`; older entries are dropped once a new
/// resharding pushes the FIFO past this length.
pub const MAX_PREVIOUS_GENERATIONS: usize = 5;

/// A retired generation, kept around so readers minted under it keep
/// resolving to a valid shard.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct PreviousGeneration {
    pub generation: u32,
    pub shard_count: u32,
    pub deprecated_at: i64,
}

/// Per-domain shard layout, versioned by generation.
///
/// Incrementing `current_shard_count` bumps `current_generation` and
/// pushes the prior `(generation, shard_count)` pair onto
/// `previous_generations` rather than overwriting it, so identifiers
/// minted under the old layout keep routing correctly until the entry
/// ages out of the bounded FIFO.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ShardGenerationConfig {
    pub current_generation: u32,
    pub current_shard_count: u32,
    pub previous_generations: VecDeque<PreviousGeneration>,
    pub updated_at: i64,
    pub updated_by: String,
}

impl ShardGenerationConfig {
    #[must_use]
    pub fn initial(shard_count: u32, updated_by: impl Into<String>) -> Self {
        Self {
            current_generation: 0,
            current_shard_count: shard_count,
            previous_generations: VecDeque::new(),
            updated_at: aegis_core::clock::now_millis(),
            updated_by: updated_by.into(),
        }
    }

    /// Resharding: move the current layout into history and activate
    /// `new_shard_count` as the next generation.
    pub fn reshard(&mut self, new_shard_count: u32, updated_by: impl Into<String>) {
        let now = aegis_core::clock::now_millis();
        self.previous_generations.push_front(PreviousGeneration {
            generation: self.current_generation,
            shard_count: self.current_shard_count,
            deprecated_at: now,
        });
        self.previous_generations.truncate(MAX_PREVIOUS_GENERATIONS);

        self.current_generation += 1;
        self.current_shard_count = new_shard_count;
        self.updated_at = now;
        self.updated_by = updated_by.into();
    }

    /// Shard count that was active for `generation`, if still known.
    #[must_use]
    pub fn shard_count_for_generation(&self, generation: u32) -> Option<u32> {
        if generation == self.current_generation {
            return Some(self.current_shard_count);
        }
        self.previous_generations
            .iter()
            .find(|g| g.generation == generation)
            .map(|g| g.shard_count)
    }

    /// Whether `generation` is still routable (current or retained history).
    #[must_use]
    pub fn is_known_generation(&self, generation: u32) -> bool {
        self.shard_count_for_generation(generation).is_some()
    }
}

/// A region's share of the shard space, expressed as a percentage.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct RegionShare {
    pub region: String,
    pub percentage: u8,
}

/// Proportional mapping from shard index to region, derived once per
/// [`ShardGenerationConfig`] generation for the `Region` domain.
///
/// Built from contiguous ranges sized to each region's percentage of
/// `shard_count`; every region with a non-zero percentage is guaranteed
/// at least one shard, and percentages must sum to exactly 100.
#[derive(Debug, Clone)]
pub struct RegionDistribution {
    // Ascending upper bound (exclusive) of each region's shard range,
    // paired with the region name.
    ranges: Vec<(u32, String)>,
    shard_count: u32,
}

impl RegionDistribution {
    /// Build contiguous shard ranges from `shares`.
    ///
    /// # Errors
    /// Returns an error message if percentages don't sum to 100, or if
    /// `shard_count` is too small to give every non-zero-percentage region
    /// at least one shard.
    pub fn build(shares: &[RegionShare], shard_count: u32) -> Result<Self, String> {
        let total: u32 = shares.iter().map(|s| u32::from(s.percentage)).sum();
        if total != 100 {
            return Err(format!("region percentages must sum to 100, got {total}"));
        }

        let nonzero = shares.iter().filter(|s| s.percentage > 0).count() as u32;
        if shard_count < nonzero {
            return Err(format!(
                "{shard_count} shards cannot give {nonzero} non-zero regions at least one shard each"
            ));
        }

        // Largest-remainder allocation: give each region floor(pct% of
        // shard_count) shards, then distribute the leftover shards to the
        // regions with the largest fractional remainder, guaranteeing
        // every non-zero region at least one shard.
        let mut allocations: Vec<(usize, u32, u32)> = shares
            .iter()
            .enumerate()
            .map(|(i, s)| {
                let exact = u64::from(s.percentage) * u64::from(shard_count);
                let base = (exact / 100) as u32;
                let remainder = (exact % 100) as u32;
                (i, base.max(u32::from(s.percentage > 0)), remainder)
            })
            .collect();

        let allocated: u32 = allocations.iter().map(|(_, n, _)| n).sum();
        let mut leftover = shard_count.saturating_sub(allocated) as i64;

        allocations.sort_by(|a, b| b.2.cmp(&a.2));
        let mut idx = 0;
        while leftover > 0 && !allocations.is_empty() {
            allocations[idx % allocations.len()].1 += 1;
            leftover -= 1;
            idx += 1;
        }
        allocations.sort_by_key(|(i, _, _)| *i);

        let mut ranges = Vec::with_capacity(shares.len());
        let mut cursor = 0u32;
        for (i, count, _) in allocations {
            if count == 0 {
                continue;
            }
            cursor += count;
            ranges.push((cursor, shares[i].region.clone()));
        }

        Ok(Self { ranges, shard_count })
    }

    /// Look up the region owning `shard_index`.
    #[must_use]
    pub fn region_for(&self, shard_index: u32) -> Option<&str> {
        if shard_index >= self.shard_count {
            return None;
        }
        self.ranges
            .iter()
            .find(|(upper, _)| shard_index < *upper)
            .map(|(_, region)| region.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reshard_moves_current_into_history() {
        let mut config = ShardGenerationConfig::initial(4, "ops");
        config.reshard(8, "ops");
        assert_eq!(config.current_generation, 1);
        assert_eq!(config.current_shard_count, 8);
        assert_eq!(config.previous_generations.len(), 1);
        assert_eq!(config.previous_generations[0].shard_count, 4);
    }

    #[test]
    fn previous_generations_bounded_fifo() {
        let mut config = ShardGenerationConfig::initial(1, "ops");
        for n in 2..10 {
            config.reshard(n, "ops");
        }
        assert_eq!(config.previous_generations.len(), MAX_PREVIOUS_GENERATIONS);
    }

    #[test]
    fn known_generation_covers_current_and_history() {
        let mut config = ShardGenerationConfig::initial(4, "ops");
        config.reshard(8, "ops");
        assert!(config.is_known_generation(1));
        assert!(config.is_known_generation(0));
        assert!(!config.is_known_generation(99));
    }

    #[test]
    fn region_distribution_rejects_bad_total() {
        let shares = vec![
            RegionShare { region: "us".into(), percentage: 60 },
            RegionShare { region: "eu".into(), percentage: 30 },
        ];
        assert!(RegionDistribution::build(&shares, 10).is_err());
    }

    #[test]
    fn region_distribution_gives_every_nonzero_region_a_shard() {
        let shares = vec![
            RegionShare { region: "us".into(), percentage: 90 },
            RegionShare { region: "eu".into(), percentage: 5 },
            RegionShare { region: "apac".into(), percentage: 5 },
        ];
        let dist = RegionDistribution::build(&shares, 10).unwrap();
        let regions: std::collections::HashSet<_> =
            (0..10).filter_map(|i| dist.region_for(i)).collect();
        assert_eq!(regions.len(), 3);
    }

    #[test]
    fn region_distribution_covers_every_shard() {
        let shares = vec![
            RegionShare { region: "us".into(), percentage: 50 },
            RegionShare { region: "eu".into(), percentage: 50 },
        ];
        let dist = RegionDistribution::build(&shares, 16).unwrap();
        for i in 0..16 {
            assert!(dist.region_for(i).is_some(), "shard {i} unassigned");
        }
    }
}
