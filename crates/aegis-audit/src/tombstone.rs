//! GDPR deletion tombstones (`spec.md` §3 "Tombstone", §4.R): created on
//! user deletion with a retention window, blocking re-registration of
//! the same email (by blind index, never the plaintext) until the
//! tombstone expires, and a retention cleanup job supporting dry-run
//! (`SPEC_FULL.md` §2: "tombstone dry-run report").

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::info;

/// Default retention period for a tombstone, in days (`spec.md` §4.R).
pub const DEFAULT_RETENTION_DAYS: i64 = 90;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Tombstone {
    pub id: String,
    pub tenant_id: String,
    pub email_blind_index: Option<String>,
    pub deleted_at: i64,
    pub deleted_by: Option<String>,
    pub deletion_reason: String,
    pub retention_until: i64,
    pub metadata: Option<serde_json::Value>,
}

#[derive(Default)]
pub struct TombstoneStore {
    by_id: DashMap<String, Tombstone>,
}

impl TombstoneStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a new tombstone, defaulting its retention window to
    /// [`DEFAULT_RETENTION_DAYS`] from now.
    pub fn create(
        &self,
        tenant_id: &str,
        email_blind_index: Option<String>,
        deleted_by: Option<String>,
        deletion_reason: &str,
        retention_days: i64,
        metadata: Option<serde_json::Value>,
    ) -> Tombstone {
        let now = aegis_core::clock::now_millis();
        let tombstone = Tombstone {
            id: uuid::Uuid::new_v4().to_string(),
            tenant_id: tenant_id.to_string(),
            email_blind_index,
            deleted_at: now,
            deleted_by,
            deletion_reason: deletion_reason.to_string(),
            retention_until: now + retention_days.saturating_mul(86_400_000),
            metadata,
        };
        info!(
            target: "audit::tombstone",
            tombstone_id = %tombstone.id,
            tenant_id = %tombstone.tenant_id,
            retention_until = tombstone.retention_until,
            "tombstone created"
        );
        self.by_id.insert(tombstone.id.clone(), tombstone.clone());
        tombstone
    }

    /// Whether `blind_index` is under active retention within `tenant_id`,
    /// blocking re-registration of that email.
    #[must_use]
    pub fn is_email_in_tombstone(&self, blind_index: &str, tenant_id: &str) -> bool {
        let now = aegis_core::clock::now_millis();
        self.by_id.iter().any(|entry| {
            let t = entry.value();
            t.tenant_id == tenant_id
                && t.email_blind_index.as_deref() == Some(blind_index)
                && t.retention_until > now
        })
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    /// Run the retention cleanup job: deletes every tombstone whose
    /// `retention_until` has passed. When `dry_run` is set, nothing is
    /// deleted and the report describes what *would* be deleted.
    pub fn cleanup_expired(&self, dry_run: bool) -> CleanupReport {
        let now = aegis_core::clock::now_millis();
        let expired: Vec<String> = self
            .by_id
            .iter()
            .filter(|entry| entry.value().retention_until <= now)
            .map(|entry| entry.key().clone())
            .collect();

        if !dry_run {
            for id in &expired {
                self.by_id.remove(id);
            }
        }

        let report = CleanupReport { dry_run, deleted_count: expired.len(), deleted_ids: expired };
        info!(
            target: "audit::tombstone",
            dry_run = report.dry_run,
            deleted_count = report.deleted_count,
            "tombstone cleanup job ran"
        );
        report
    }
}

/// Structured report from [`TombstoneStore::cleanup_expired`], useful
/// both as a real deletion summary and, under `dry_run`, as a preview.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CleanupReport {
    pub dry_run: bool,
    pub deleted_count: usize,
    pub deleted_ids: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fresh_tombstone_blocks_reregistration() {
        let store = TombstoneStore::new();
        store.create("tenant-1", Some("blind-abc".to_string()), None, "user_requested", DEFAULT_RETENTION_DAYS, None);
        assert!(store.is_email_in_tombstone("blind-abc", "tenant-1"));
    }

    #[test]
    fn tombstone_in_another_tenant_does_not_block() {
        let store = TombstoneStore::new();
        store.create("tenant-1", Some("blind-abc".to_string()), None, "user_requested", DEFAULT_RETENTION_DAYS, None);
        assert!(!store.is_email_in_tombstone("blind-abc", "tenant-2"));
    }

    #[test]
    fn expired_tombstone_no_longer_blocks() {
        let store = TombstoneStore::new();
        store.create("tenant-1", Some("blind-abc".to_string()), None, "user_requested", -1, None);
        assert!(!store.is_email_in_tombstone("blind-abc", "tenant-1"));
    }

    #[test]
    fn dry_run_cleanup_reports_without_deleting() {
        let store = TombstoneStore::new();
        store.create("tenant-1", Some("blind-abc".to_string()), None, "user_requested", -1, None);
        let report = store.cleanup_expired(true);
        assert_eq!(report.deleted_count, 1);
        assert!(report.dry_run);
        assert_eq!(store.len(), 1, "dry run must not actually delete");
    }

    #[test]
    fn real_cleanup_deletes_expired_rows() {
        let store = TombstoneStore::new();
        store.create("tenant-1", Some("blind-abc".to_string()), None, "user_requested", -1, None);
        store.create("tenant-1", Some("blind-def".to_string()), None, "user_requested", DEFAULT_RETENTION_DAYS, None);
        let report = store.cleanup_expired(false);
        assert_eq!(report.deleted_count, 1);
        assert_eq!(store.len(), 1);
        assert!(store.is_email_in_tombstone("blind-def", "tenant-1"));
    }
}
