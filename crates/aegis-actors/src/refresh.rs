//! RefreshRotator (`spec.md` §4.F): per-family refresh-token rotation with
//! reuse detection. The family is the single-writer unit — all jtis in a
//! family share one shard slot so rotation and reuse detection never race
//! across actors.

use aegis_core::{OpError, OpResult};
use serde::{Deserialize, Serialize};

use crate::sharded::{hash_shard_index, ShardedMap};

const DEFAULT_SHARD_COUNT: usize = 64;
/// A single concurrent retry of the same rotation is tolerated within
/// this window, per §4.F's idempotent-retry allowance.
const ROTATION_GRACE_SECONDS: i64 = 30;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RefreshTokenFamily {
    pub family_id: String,
    pub user_id: String,
    pub client_id: String,
    pub scope: String,
    pub generation: u32,
    pub shard_index: u32,
    /// `seq -> (jti, is_revoked, expires_at, rotated_at)`, newest last.
    pub members: Vec<FamilyMember>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FamilyMember {
    pub jti: String,
    pub seq: u64,
    pub is_revoked: bool,
    pub expires_at: i64,
    pub rotated_at: Option<i64>,
}

impl RefreshTokenFamily {
    fn latest(&self) -> &FamilyMember {
        self.members.last().expect("a family always has at least one member")
    }
}

pub struct RefreshRotator {
    shards: ShardedMap<String, RefreshTokenFamily>,
}

/// Outcome of a rotation attempt.
pub enum RotationOutcome {
    Rotated { new_jti: String },
    /// The presented jti raced a just-completed rotation inside the grace
    /// window — the caller gets the same new jti back rather than a
    /// fresh one, so a duplicate client retry is idempotent.
    GraceWindowReplay { new_jti: String },
}

impl RefreshRotator {
    #[must_use]
    pub fn new() -> Self {
        Self::with_shard_count(DEFAULT_SHARD_COUNT)
    }

    #[must_use]
    pub fn with_shard_count(shard_count: usize) -> Self {
        Self { shards: ShardedMap::new(shard_count) }
    }

    fn shard_for(&self, family_id: &str) -> usize {
        hash_shard_index(family_id, self.shards.shard_count())
    }

    /// Register a brand-new family with its first member (seq 0).
    pub async fn create_family(&self, family: RefreshTokenFamily) -> OpResult<()> {
        let shard = self.shard_for(&family.family_id);
        let id = family.family_id.clone();
        self.shards
            .with_shard(shard, move |map| {
                if map.contains_key(&id) {
                    return Err(OpError::conflict(format!("refresh family {id} already exists")));
                }
                map.insert(id, family);
                Ok(())
            })
            .await
    }

    /// Rotate `old_jti`. If it is not the family's current latest member,
    /// the entire family is revoked (reuse detected) and `invalid_grant`
    /// is returned — *unless* `old_jti` is the member that was itself
    /// just superseded by the current latest within
    /// [`ROTATION_GRACE_SECONDS`], in which case this is a duplicate
    /// client retry of the same rotation and the already-minted latest
    /// jti is returned again instead of revoking the family.
    pub async fn rotate(
        &self,
        family_id: &str,
        old_jti: &str,
        mint_jti: impl FnOnce(u64) -> String,
    ) -> OpResult<RotationOutcome> {
        let shard = self.shard_for(family_id);
        self.shards
            .with_shard(shard, |map| {
                let family = map
                    .get_mut(family_id)
                    .ok_or_else(|| OpError::not_found(format!("refresh family {family_id} not found")))?;

                let latest = family.latest().clone();

                if latest.is_revoked {
                    return Err(OpError::invalid_grant("reused_refresh_token"));
                }

                if latest.jti == old_jti {
                    let next_seq = latest.seq + 1;
                    let new_jti = mint_jti(next_seq);
                    let now = aegis_core::clock::now_millis();

                    if let Some(current) = family.members.last_mut() {
                        current.rotated_at = Some(now);
                    }
                    family.members.push(FamilyMember {
                        jti: new_jti.clone(),
                        seq: next_seq,
                        is_revoked: false,
                        expires_at: latest.expires_at,
                        rotated_at: None,
                    });
                    return Ok(RotationOutcome::Rotated { new_jti });
                }

                // `old_jti` is not the current latest. If it is the member
                // immediately preceding latest (i.e. the one latest itself
                // superseded) and that supersession happened within the
                // grace window, this is a same-request retry racing the
                // first rotation's response — not reuse.
                let len = family.members.len();
                if len >= 2 {
                    let predecessor = &family.members[len - 2];
                    if predecessor.jti == old_jti {
                        if let Some(rotated_at) = predecessor.rotated_at {
                            let now = aegis_core::clock::now_millis();
                            if now - rotated_at <= ROTATION_GRACE_SECONDS * 1000 {
                                return Ok(RotationOutcome::GraceWindowReplay { new_jti: latest.jti.clone() });
                            }
                        }
                    }
                }

                // old_jti is a superseded member outside any grace window:
                // reuse detected, revoke every member in the family.
                for member in &mut family.members {
                    member.is_revoked = true;
                }
                Err(OpError::invalid_grant("reused_refresh_token"))
            })
            .await
    }

    /// Revoke specific jtis; any jti that is not its family's latest
    /// member takes down the whole family (same reuse-detection rule as
    /// `rotate`).
    pub async fn batch_revoke(&self, family_id: &str, jtis: &[String], _reason: &str) -> OpResult<()> {
        let shard = self.shard_for(family_id);
        self.shards
            .with_shard(shard, |map| {
                let family = map
                    .get_mut(family_id)
                    .ok_or_else(|| OpError::not_found(format!("refresh family {family_id} not found")))?;

                let latest_jti = family.latest().jti.clone();
                let revoke_whole_family = jtis.iter().any(|jti| *jti != latest_jti);

                for member in &mut family.members {
                    if revoke_whole_family || jtis.contains(&member.jti) {
                        member.is_revoked = true;
                    }
                }
                Ok(())
            })
            .await
    }

    /// Fetch a family's current state, e.g. so a caller that just
    /// rotated a jti can recover the `user_id`/`client_id`/`scope` to
    /// mint a matching access token.
    pub async fn get_family(&self, family_id: &str) -> OpResult<RefreshTokenFamily> {
        let shard = self.shard_for(family_id);
        self.shards
            .with_shard(shard, |map| {
                map.get(family_id)
                    .cloned()
                    .ok_or_else(|| OpError::not_found(format!("refresh family {family_id} not found")))
            })
            .await
    }

    pub async fn is_family_revoked(&self, family_id: &str) -> OpResult<bool> {
        let shard = self.shard_for(family_id);
        self.shards
            .with_shard(shard, |map| {
                map.get(family_id)
                    .map(|f| f.members.iter().all(|m| m.is_revoked))
                    .ok_or_else(|| OpError::not_found(format!("refresh family {family_id} not found")))
            })
            .await
    }
}

impl Default for RefreshRotator {
    fn default() -> Self {
        Self::new()
    }
}

/// Convenience to bootstrap a family plus its first member, keyed by
/// the jti's own shard-embedded `family_id` component.
#[must_use]
pub fn new_family(
    family_id: impl Into<String>,
    user_id: impl Into<String>,
    client_id: impl Into<String>,
    scope: impl Into<String>,
    generation: u32,
    shard_index: u32,
    first_jti: impl Into<String>,
    expires_at: i64,
) -> RefreshTokenFamily {
    RefreshTokenFamily {
        family_id: family_id.into(),
        user_id: user_id.into(),
        client_id: client_id.into(),
        scope: scope.into(),
        generation,
        shard_index,
        members: vec![FamilyMember {
            jti: first_jti.into(),
            seq: 0,
            is_revoked: false,
            expires_at,
            rotated_at: None,
        }],
    }
}
