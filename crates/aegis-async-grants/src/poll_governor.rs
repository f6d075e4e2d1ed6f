//! Shared per-client polling throttle for DeviceFlow and CIBAEngine
//! (`spec.md` §4.L, §4.M): reject polls faster than the advertised
//! `interval`, and escalate repeated violations to `slow_down` with a
//! growing interval, mirroring the token-bucket-per-key shape
//! `turbomcp-auth::rate_limit::RateLimiter` uses for login/token
//! endpoints, specialized to a single fixed-interval-with-backoff rule
//! instead of a windowed request count.

use std::sync::atomic::{AtomicI64, Ordering};

use aegis_core::clock;
use dashmap::DashMap;

/// Added to a poller's effective interval every time it violates the
/// current one, per `spec.md` §4.L ("on repeated violations return
/// `slow_down` and add `SLOW_DOWN_INCREMENT` to interval").
pub const SLOW_DOWN_INCREMENT_SECONDS: i64 = 5;

/// Violations tolerated before `slow_down` escalates the interval
/// permanently, rather than being reported once and forgiven.
const VIOLATIONS_BEFORE_ESCALATION: u32 = 1;

struct PollState {
    interval_seconds: AtomicI64,
    last_poll_at: AtomicI64,
    violation_streak: std::sync::atomic::AtomicU32,
}

/// Outcome of a poll attempt against the governor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollDecision {
    Allowed,
    SlowDown { new_interval_seconds: i64 },
}

pub struct PollGovernor {
    state: DashMap<String, PollState>,
}

impl PollGovernor {
    #[must_use]
    pub fn new() -> Self {
        Self { state: DashMap::new() }
    }

    /// Register a fresh pollable grant (device_code or auth_req_id) with
    /// its initial advertised interval.
    pub fn register(&self, key: impl Into<String>, initial_interval_seconds: i64) {
        self.state.insert(
            key.into(),
            PollState {
                interval_seconds: AtomicI64::new(initial_interval_seconds),
                last_poll_at: AtomicI64::new(0),
                violation_streak: std::sync::atomic::AtomicU32::new(0),
            },
        );
    }

    /// Check whether a poll against `key` respects the current interval.
    /// A poll arriving before the previous one plus the interval elapsed
    /// counts as a violation; enough violations escalate the interval and
    /// the caller must return `slow_down` to the client.
    #[must_use]
    pub fn poll(&self, key: &str) -> PollDecision {
        let Some(entry) = self.state.get(key) else {
            return PollDecision::Allowed;
        };
        let now = clock::now_millis() / 1000;
        let interval = entry.interval_seconds.load(Ordering::SeqCst);
        let last = entry.last_poll_at.swap(now, Ordering::SeqCst);

        if last != 0 && now - last < interval {
            let streak = entry.violation_streak.fetch_add(1, Ordering::SeqCst) + 1;
            if streak >= VIOLATIONS_BEFORE_ESCALATION {
                let new_interval = interval + SLOW_DOWN_INCREMENT_SECONDS;
                entry.interval_seconds.store(new_interval, Ordering::SeqCst);
                return PollDecision::SlowDown { new_interval_seconds: new_interval };
            }
        } else {
            entry.violation_streak.store(0, Ordering::SeqCst);
        }
        PollDecision::Allowed
    }

    pub fn forget(&self, key: &str) {
        self.state.remove(key);
    }

    #[must_use]
    pub fn current_interval(&self, key: &str) -> Option<i64> {
        self.state.get(key).map(|e| e.interval_seconds.load(Ordering::SeqCst))
    }
}

impl Default for PollGovernor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_poll_is_always_allowed() {
        let gov = PollGovernor::new();
        gov.register("dc-1", 5);
        assert_eq!(gov.poll("dc-1"), PollDecision::Allowed);
    }

    #[test]
    fn rapid_repoll_triggers_slow_down() {
        let gov = PollGovernor::new();
        gov.register("dc-1", 5);
        assert_eq!(gov.poll("dc-1"), PollDecision::Allowed);
        match gov.poll("dc-1") {
            PollDecision::SlowDown { new_interval_seconds } => assert_eq!(new_interval_seconds, 10),
            PollDecision::Allowed => panic!("expected slow_down on immediate repoll"),
        }
    }

    #[test]
    fn unregistered_key_is_allowed() {
        let gov = PollGovernor::new();
        assert_eq!(gov.poll("unknown"), PollDecision::Allowed);
    }
}
