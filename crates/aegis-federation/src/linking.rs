//! `LinkedIdentity` (`spec.md` §3): unique on `(provider_id,
//! provider_user_id)`. Federated sign-in resolves a `(provider, sub)`
//! pair to a user id (sign-in), offers linking by email match, or
//! registers a new user — see [`crate::engine::FederationEngine::callback`].

use std::collections::HashMap;

use aegis_core::{clock, OpError, OpResult};
use dashmap::DashMap;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinkedIdentity {
    pub user_id: String,
    pub provider_id: String,
    pub provider_user_id: String,
    pub tokens_encrypted: Option<String>,
    pub raw_attributes: serde_json::Value,
    pub linked_at: i64,
    pub last_used_at: i64,
}

/// Keyed by `(provider_id, provider_user_id)` for the uniqueness
/// invariant, with a secondary `user_id -> keys` index for backchannel
/// logout fan-out (which only knows `(provider_id, sub)`, so the primary
/// index already covers it, but BCL also needs to enumerate every linked
/// provider for a user when clearing tokens on account deletion).
pub struct LinkedIdentityStore {
    by_provider: DashMap<(String, String), LinkedIdentity>,
    by_user: DashMap<String, Vec<(String, String)>>,
}

impl LinkedIdentityStore {
    #[must_use]
    pub fn new() -> Self {
        Self { by_provider: DashMap::new(), by_user: DashMap::new() }
    }

    fn key(provider_id: &str, provider_user_id: &str) -> (String, String) {
        (provider_id.to_string(), provider_user_id.to_string())
    }

    /// Link `user_id` to `(provider_id, provider_user_id)`. Rejects if
    /// that external identity is already linked to a *different* user;
    /// re-linking the same user is idempotent (refreshes attributes).
    pub fn link(
        &self,
        user_id: &str,
        provider_id: &str,
        provider_user_id: &str,
        raw_attributes: serde_json::Value,
        tokens_encrypted: Option<String>,
    ) -> OpResult<()> {
        let key = Self::key(provider_id, provider_user_id);
        if let Some(existing) = self.by_provider.get(&key) {
            if existing.user_id != user_id {
                return Err(OpError::conflict(format!(
                    "{provider_id}:{provider_user_id} is already linked to a different user"
                )));
            }
        }

        let now = clock::now_millis();
        self.by_provider.insert(
            key.clone(),
            LinkedIdentity {
                user_id: user_id.to_string(),
                provider_id: provider_id.to_string(),
                provider_user_id: provider_user_id.to_string(),
                tokens_encrypted,
                raw_attributes,
                linked_at: now,
                last_used_at: now,
            },
        );
        self.by_user.entry(user_id.to_string()).or_default().push(key);
        Ok(())
    }

    #[must_use]
    pub fn find(&self, provider_id: &str, provider_user_id: &str) -> Option<LinkedIdentity> {
        self.by_provider.get(&Self::key(provider_id, provider_user_id)).map(|r| r.clone())
    }

    /// Touch `last_used_at` on successful sign-in through a linked
    /// identity.
    pub fn touch(&self, provider_id: &str, provider_user_id: &str) {
        if let Some(mut entry) = self.by_provider.get_mut(&Self::key(provider_id, provider_user_id)) {
            entry.last_used_at = clock::now_millis();
        }
    }

    #[must_use]
    pub fn list_by_user(&self, user_id: &str) -> Vec<LinkedIdentity> {
        self.by_user
            .get(user_id)
            .map(|keys| keys.iter().filter_map(|k| self.by_provider.get(k).map(|r| r.clone())).collect())
            .unwrap_or_default()
    }

    /// Clear `tokens_encrypted` on the row matching `(provider_id,
    /// provider_user_id)`, used by backchannel logout (`spec.md` §4.N:
    /// "clear `tokens` on matching LinkedIdentity rows"). Returns whether
    /// a row was found.
    pub fn clear_tokens(&self, provider_id: &str, provider_user_id: &str) -> bool {
        match self.by_provider.get_mut(&Self::key(provider_id, provider_user_id)) {
            Some(mut entry) => {
                entry.tokens_encrypted = None;
                true
            }
            None => false,
        }
    }
}

impl Default for LinkedIdentityStore {
    fn default() -> Self {
        Self::new()
    }
}

/// The outcome of resolving a normalized claim set against the link
/// store: whether a known identity exists already, or a new one should
/// be registered/offered for linking.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Resolution {
    SignedIn { user_id: String },
    LinkOffered { candidate_user_id: String },
    NewUser,
}

/// Resolve `(provider_id, provider_sub)` against the store: an existing
/// link signs in directly; otherwise an email match against
/// `existing_user_by_email` offers linking; otherwise a new user is
/// needed.
#[must_use]
pub fn resolve(
    store: &LinkedIdentityStore,
    provider_id: &str,
    provider_sub: &str,
    normalized: &HashMap<String, String>,
    existing_user_by_email: Option<&str>,
) -> Resolution {
    if let Some(identity) = store.find(provider_id, provider_sub) {
        return Resolution::SignedIn { user_id: identity.user_id };
    }
    if let Some(email) = normalized.get("email") {
        if let Some(candidate) = existing_user_by_email {
            if existing_user_by_email == Some(email) || candidate == email {
                return Resolution::LinkOffered { candidate_user_id: candidate.to_string() };
            }
        }
    }
    Resolution::NewUser
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn link_then_find_round_trips() {
        let store = LinkedIdentityStore::new();
        store.link("user-1", "google", "sub-abc", json!({}), None).unwrap();
        let found = store.find("google", "sub-abc").unwrap();
        assert_eq!(found.user_id, "user-1");
    }

    #[test]
    fn link_rejects_reassignment_to_different_user() {
        let store = LinkedIdentityStore::new();
        store.link("user-1", "google", "sub-abc", json!({}), None).unwrap();
        assert!(store.link("user-2", "google", "sub-abc", json!({}), None).is_err());
    }

    #[test]
    fn relinking_same_user_is_idempotent() {
        let store = LinkedIdentityStore::new();
        store.link("user-1", "google", "sub-abc", json!({"a": 1}), None).unwrap();
        store.link("user-1", "google", "sub-abc", json!({"a": 2}), None).unwrap();
        assert_eq!(store.find("google", "sub-abc").unwrap().raw_attributes, json!({"a": 2}));
    }

    #[test]
    fn clear_tokens_clears_existing_row() {
        let store = LinkedIdentityStore::new();
        store.link("user-1", "google", "sub-abc", json!({}), Some("enc".to_string())).unwrap();
        assert!(store.clear_tokens("google", "sub-abc"));
        assert_eq!(store.find("google", "sub-abc").unwrap().tokens_encrypted, None);
    }

    #[test]
    fn resolve_signs_in_existing_link() {
        let store = LinkedIdentityStore::new();
        store.link("user-1", "google", "sub-abc", json!({}), None).unwrap();
        let resolution = resolve(&store, "google", "sub-abc", &HashMap::new(), None);
        assert_eq!(resolution, Resolution::SignedIn { user_id: "user-1".to_string() });
    }

    #[test]
    fn resolve_offers_link_on_email_match() {
        let store = LinkedIdentityStore::new();
        let mut normalized = HashMap::new();
        normalized.insert("email".to_string(), "a@example.com".to_string());
        let resolution = resolve(&store, "google", "sub-new", &normalized, Some("a@example.com"));
        assert_eq!(resolution, Resolution::LinkOffered { candidate_user_id: "a@example.com".to_string() });
    }

    #[test]
    fn resolve_falls_back_to_new_user() {
        let store = LinkedIdentityStore::new();
        let resolution = resolve(&store, "google", "sub-new", &HashMap::new(), None);
        assert_eq!(resolution, Resolution::NewUser);
    }
}
