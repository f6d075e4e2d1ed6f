//! Immutable audit trail for state-changing admin actions (`spec.md`
//! §4.R, §3 "`Settings`"/"`Client`" mutations, registration, tombstone
//! creation): every entry is appended once and never mutated, and is
//! also emitted as a structured `tracing` event under the `audit::admin`
//! target so a log pipeline captures it independently of whatever reads
//! [`AuditLog::list_for_target`] (`SPEC_FULL.md` §2: "audit-as-tracing-span
//! for read-heavy surfaces").

use dashmap::DashMap;
use serde::{Deserialize, Serialize};
use tracing::info;

/// One immutable audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub id: String,
    pub actor: String,
    pub action: String,
    pub target: String,
    pub before: Option<serde_json::Value>,
    pub after: Option<serde_json::Value>,
    pub ts: i64,
}

/// Append-only audit trail, indexed by target for lookup. Appends are
/// `DashMap`-sharded and never touch existing entries — there is no
/// update or delete method, by design.
#[derive(Default)]
pub struct AuditLog {
    by_target: DashMap<String, Vec<AuditRecord>>,
}

impl AuditLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a record for `target`, emitting it to `tracing` under
    /// `audit::admin` at the same time.
    pub fn append(
        &self,
        actor: &str,
        action: &str,
        target: &str,
        before: Option<serde_json::Value>,
        after: Option<serde_json::Value>,
    ) -> AuditRecord {
        let record = AuditRecord {
            id: uuid::Uuid::new_v4().to_string(),
            actor: actor.to_string(),
            action: action.to_string(),
            target: target.to_string(),
            before,
            after,
            ts: aegis_core::clock::now_millis(),
        };

        info!(
            target: "audit::admin",
            audit_id = %record.id,
            actor = %record.actor,
            action = %record.action,
            target = %record.target,
            "admin action recorded"
        );

        self.by_target.entry(target.to_string()).or_default().push(record.clone());
        record
    }

    #[must_use]
    pub fn list_for_target(&self, target: &str) -> Vec<AuditRecord> {
        self.by_target.get(target).map(|entries| entries.clone()).unwrap_or_default()
    }

    #[must_use]
    pub fn total_records(&self) -> usize {
        self.by_target.iter().map(|entry| entry.value().len()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_is_retrievable_by_target() {
        let log = AuditLog::new();
        log.append("admin-1", "client.disable", "client-1", None, Some(serde_json::json!({"enabled": false})));
        let records = log.list_for_target("client-1");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].action, "client.disable");
    }

    #[test]
    fn unrelated_target_is_empty() {
        let log = AuditLog::new();
        log.append("admin-1", "client.disable", "client-1", None, None);
        assert!(log.list_for_target("client-2").is_empty());
    }

    #[test]
    fn repeated_appends_accumulate_in_order() {
        let log = AuditLog::new();
        log.append("admin-1", "settings.patch", "tenant-1", None, None);
        log.append("admin-2", "settings.patch", "tenant-1", None, None);
        let records = log.list_for_target("tenant-1");
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].actor, "admin-1");
        assert_eq!(records[1].actor, "admin-2");
    }
}
