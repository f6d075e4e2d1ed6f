//! Scope grant and consent decisions (`spec.md` §4.P). A
//! [`ConsentCache`] remembers which scopes a user has already approved
//! for a client so a returning client only has to prompt for the
//! incremental difference — the same principle the teacher's
//! incremental-authorization `WWW-Authenticate` challenge exists to
//! communicate to an OAuth client, applied here on the provider side
//! that decides whether to issue that challenge at all.

use std::collections::HashSet;
use std::time::Duration;

use dashmap::DashMap;

/// Outcome of evaluating a requested scope set against what's already
/// been granted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopeDecision {
    /// Every requested scope is already granted; no consent prompt needed.
    AlreadyGranted,
    /// At least one requested scope has never been granted.
    ConsentRequired { missing: Vec<String> },
}

#[must_use]
pub fn evaluate_scopes(requested: &[String], previously_granted: &HashSet<String>) -> ScopeDecision {
    let missing: Vec<String> =
        requested.iter().filter(|s| !previously_granted.contains(*s)).cloned().collect();
    if missing.is_empty() {
        ScopeDecision::AlreadyGranted
    } else {
        ScopeDecision::ConsentRequired { missing }
    }
}

#[derive(Clone)]
struct Grant {
    scopes: HashSet<String>,
    granted_at: std::time::Instant,
}

/// Per-process cache of `(user_id, client_id) -> granted scopes`.
///
/// A plain [`DashMap`] rather than `moka`: entries accumulate (a later
/// grant widens the set) rather than expire independently, so a bounded
/// TTL cache would have to special-case merge-on-reinsert; `DashMap`'s
/// entry API handles that directly and the cache is small (bounded by
/// active user×client pairs, not by request volume).
pub struct ConsentCache {
    grants: DashMap<(String, String), Grant>,
    ttl: Duration,
}

impl ConsentCache {
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self { grants: DashMap::new(), ttl }
    }

    /// Scopes previously granted by `user_id` to `client_id`, or an
    /// empty set if none or the entry has aged out of `ttl`.
    #[must_use]
    pub fn granted_scopes(&self, user_id: &str, client_id: &str) -> HashSet<String> {
        let key = (user_id.to_string(), client_id.to_string());
        match self.grants.get(&key) {
            Some(entry) if entry.granted_at.elapsed() < self.ttl => entry.scopes.clone(),
            _ => HashSet::new(),
        }
    }

    /// Record that `user_id` approved `scopes` for `client_id`,
    /// widening any prior grant rather than replacing it.
    pub fn record_grant(&self, user_id: &str, client_id: &str, scopes: &[String]) {
        let key = (user_id.to_string(), client_id.to_string());
        self.grants
            .entry(key)
            .and_modify(|g| {
                g.scopes.extend(scopes.iter().cloned());
                g.granted_at = std::time::Instant::now();
            })
            .or_insert_with(|| Grant {
                scopes: scopes.iter().cloned().collect(),
                granted_at: std::time::Instant::now(),
            });
    }

    /// Evaluate `requested` against the cached grant for this pair.
    #[must_use]
    pub fn evaluate(&self, user_id: &str, client_id: &str, requested: &[String]) -> ScopeDecision {
        evaluate_scopes(requested, &self.granted_scopes(user_id, client_id))
    }

    pub fn revoke(&self, user_id: &str, client_id: &str) {
        self.grants.remove(&(user_id.to_string(), client_id.to_string()));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_grant_covers_requested_scopes() {
        let cache = ConsentCache::new(Duration::from_secs(3600));
        cache.record_grant("user-1", "client-1", &["openid".to_string(), "email".to_string()]);
        let decision = cache.evaluate("user-1", "client-1", &["openid".to_string()]);
        assert_eq!(decision, ScopeDecision::AlreadyGranted);
    }

    #[test]
    fn missing_scope_requires_consent() {
        let cache = ConsentCache::new(Duration::from_secs(3600));
        cache.record_grant("user-1", "client-1", &["openid".to_string()]);
        let decision = cache.evaluate("user-1", "client-1", &["openid".to_string(), "profile".to_string()]);
        assert_eq!(decision, ScopeDecision::ConsentRequired { missing: vec!["profile".to_string()] });
    }

    #[test]
    fn second_grant_widens_rather_than_replaces() {
        let cache = ConsentCache::new(Duration::from_secs(3600));
        cache.record_grant("user-1", "client-1", &["openid".to_string()]);
        cache.record_grant("user-1", "client-1", &["profile".to_string()]);
        let scopes = cache.granted_scopes("user-1", "client-1");
        assert!(scopes.contains("openid") && scopes.contains("profile"));
    }

    #[test]
    fn expired_grant_is_treated_as_absent() {
        let cache = ConsentCache::new(Duration::from_millis(0));
        cache.record_grant("user-1", "client-1", &["openid".to_string()]);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.granted_scopes("user-1", "client-1").is_empty());
    }

    #[test]
    fn revoke_clears_the_entry() {
        let cache = ConsentCache::new(Duration::from_secs(3600));
        cache.record_grant("user-1", "client-1", &["openid".to_string()]);
        cache.revoke("user-1", "client-1");
        assert!(cache.granted_scopes("user-1", "client-1").is_empty());
    }
}
