//! # aegis-actors
//!
//! The durable single-writer actors `spec.md` §4.D–§4.G describe:
//! [`challenge::ChallengeStore`], [`session::SessionStore`],
//! [`refresh::RefreshRotator`], and [`revocation::RevocationIndex`]. Each
//! is implemented as a fixed pool of mutex-guarded shards
//! ([`sharded::ShardedMap`]) rather than a literal message-passing actor
//! runtime — the mutex is the mailbox, and nothing inside a shard needs
//! its own locking.

pub mod challenge;
pub mod refresh;
pub mod revocation;
pub mod session;
pub mod sharded;

pub use challenge::{ChallengeStore, ChallengeType};
pub use refresh::{FamilyMember, RefreshRotator, RefreshTokenFamily, RotationOutcome};
pub use revocation::{RevocationIndex, RevokedRecord};
pub use session::{Session, SessionStore};
