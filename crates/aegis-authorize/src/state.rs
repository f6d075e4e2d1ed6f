//! Authorization-engine state machine (`spec.md` §4.K): `init →
//! authenticating → consent? → approved → finalized | denied | error`,
//! with idempotent re-entry for replay within the request's TTL.

use aegis_core::{OpError, OpResult};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthorizationState {
    Init,
    Authenticating,
    Consent,
    Approved,
    Finalized,
    Denied,
    Error,
}

impl AuthorizationState {
    /// Whether `next` is a legal transition from `self`. Re-entering the
    /// same state is always legal (idempotent replay within TTL); once a
    /// request reaches a terminal state (`Finalized`/`Denied`/`Error`) no
    /// further transition is permitted, only replay of the same state.
    #[must_use]
    pub fn can_transition_to(self, next: Self) -> bool {
        if self == next {
            return true;
        }
        match self {
            Self::Init => matches!(next, Self::Authenticating | Self::Error),
            Self::Authenticating => matches!(next, Self::Consent | Self::Approved | Self::Denied | Self::Error),
            Self::Consent => matches!(next, Self::Approved | Self::Denied | Self::Error),
            Self::Approved => matches!(next, Self::Finalized | Self::Error),
            Self::Finalized | Self::Denied | Self::Error => false,
        }
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Finalized | Self::Denied | Self::Error)
    }
}

/// Validate and apply a transition, returning `conflict` if `next` isn't
/// reachable from `current`.
///
/// # Errors
/// Returns `conflict` when the transition is illegal.
pub fn transition(current: AuthorizationState, next: AuthorizationState) -> OpResult<AuthorizationState> {
    if current.can_transition_to(next) {
        Ok(next)
    } else {
        Err(OpError::conflict(format!("cannot transition authorization state from {current:?} to {next:?}")))
    }
}
