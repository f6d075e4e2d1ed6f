//! The four sharding domains `spec.md` §4.C tracks independently.

use serde::{Deserialize, Serialize};

/// A domain whose identifiers embed a generation/shard pair.
///
/// Session, refresh, and revocation each shard their own identifier
/// namespace; region is sharded the same way but maps shard index to a
/// physical region instead of an actor instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Domain {
    Session,
    Refresh,
    Revocation,
    Region,
}

impl Domain {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Session => "session",
            Self::Refresh => "refresh",
            Self::Revocation => "revocation",
            Self::Region => "region",
        }
    }

    pub const ALL: [Domain; 4] = [Self::Session, Self::Refresh, Self::Revocation, Self::Region];
}
