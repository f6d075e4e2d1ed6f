//! `SettingsStore` (`spec.md` §4.Q): holds one row per
//! `(scope, scope_id, category)`, resolves effective values across
//! scopes, and applies optimistic-concurrency patches.

use std::collections::HashMap;

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use tracing::info;

use crate::category::CategoryRegistry;
use crate::error::SettingsError;
use crate::settings::{EffectiveSettings, Scope, Settings, ValueSource};

/// A single `PATCH` request body (`spec.md` §4.Q):
/// `{ifMatch, set?, clear?, disable?}`. `disable` removes the row
/// entirely, falling back to inherited/default values on the next read.
#[derive(Debug, Clone, Default)]
pub struct SettingsPatch {
    pub if_match: Option<String>,
    pub set: HashMap<String, serde_json::Value>,
    pub clear: Vec<String>,
    pub disable: bool,
}

#[derive(Debug, Clone)]
pub struct PatchOutcome {
    pub version: String,
    /// Keys from `set`/`clear` that aren't declared by the category and
    /// were therefore ignored.
    pub rejected: Vec<String>,
}

pub struct SettingsStore {
    categories: CategoryRegistry,
    rows: DashMap<(Scope, String, String), Settings>,
}

impl SettingsStore {
    #[must_use]
    pub fn new(categories: CategoryRegistry) -> Self {
        Self { categories, rows: DashMap::new() }
    }

    fn key(scope: Scope, scope_id: &str, category: &str) -> (Scope, String, String) {
        (scope, scope_id.to_string(), category.to_string())
    }

    /// Read the raw row for one scope, without layering. Platform scope
    /// is read-only from the caller's perspective but this accessor
    /// doesn't enforce that — `patch` does.
    #[must_use]
    pub fn get(&self, scope: Scope, scope_id: &str, category: &str) -> Option<Settings> {
        self.rows.get(&Self::key(scope, scope_id, category)).map(|r| r.value().clone())
    }

    /// Resolve the effective values for `category` as seen by
    /// `client_id` under `tenant_id`: `client → tenant → platform →
    /// category_defaults`, tracking where each key's value came from.
    ///
    /// # Errors
    /// Returns [`SettingsError::UnknownCategory`] if `category` isn't
    /// registered.
    pub fn effective(
        &self,
        category: &str,
        client_id: Option<&str>,
        tenant_id: &str,
    ) -> Result<EffectiveSettings, SettingsError> {
        let def = self.categories.get(category).ok_or_else(|| SettingsError::UnknownCategory(category.to_string()))?;

        let mut values = HashMap::new();
        let mut sources = HashMap::new();
        for (key, default) in &def.defaults {
            values.insert(key.clone(), default.clone());
            sources.insert(key.clone(), ValueSource::Default);
        }

        let platform = self.get(Scope::Platform, "platform", category);
        apply_layer(&mut values, &mut sources, platform.as_ref(), ValueSource::Inherit, def);

        let tenant = self.get(Scope::Tenant, tenant_id, category);
        let tenant_source = if client_id.is_some() { ValueSource::Inherit } else { ValueSource::Kv };
        apply_layer(&mut values, &mut sources, tenant.as_ref(), tenant_source, def);

        if let Some(client_id) = client_id {
            let client = self.get(Scope::Client, client_id, category);
            apply_layer(&mut values, &mut sources, client.as_ref(), ValueSource::Kv, def);
        }

        Ok(EffectiveSettings { category: category.to_string(), values, sources })
    }

    /// Apply a patch atomically.
    ///
    /// # Errors
    /// - [`SettingsError::UnknownCategory`] if not registered.
    /// - [`SettingsError::PlatformOnlyCategory`] if `category` is
    ///   platform-only but `scope != Platform`.
    /// - [`SettingsError::Conflict`] if `patch.if_match` doesn't match
    ///   the row's current version (a missing row's current version is
    ///   treated as the empty string, so the first write to a scope
    ///   must pass `if_match: None` or `""`).
    pub fn patch(
        &self,
        scope: Scope,
        scope_id: &str,
        category: &str,
        patch: SettingsPatch,
    ) -> Result<PatchOutcome, SettingsError> {
        let def = self.categories.get(category).ok_or_else(|| SettingsError::UnknownCategory(category.to_string()))?;
        if def.platform_only && scope != Scope::Platform {
            return Err(SettingsError::PlatformOnlyCategory(category.to_string()));
        }

        // Held for the whole check-then-write below: `DashMap::entry`
        // locks the row's shard for the entry's lifetime, so the
        // `ifMatch` comparison and the eventual insert are one atomic
        // operation instead of two separate lock acquisitions a
        // concurrent patch could interleave with.
        let key = Self::key(scope, scope_id, category);
        let entry = self.rows.entry(key);

        let current_version = match &entry {
            Entry::Occupied(occupied) => occupied.get().version.clone(),
            Entry::Vacant(_) => String::new(),
        };
        let expected = patch.if_match.clone().unwrap_or_default();
        if expected != current_version {
            return Err(SettingsError::Conflict { expected, current: current_version });
        }

        if patch.disable {
            if let Entry::Occupied(occupied) = entry {
                occupied.remove();
            }
            info!(?scope, scope_id, category, "settings row disabled");
            return Ok(PatchOutcome { version: String::new(), rejected: Vec::new() });
        }

        let known = def.known_keys();
        let mut rejected = Vec::new();
        let mut values = match &entry {
            Entry::Occupied(occupied) => occupied.get().values.clone(),
            Entry::Vacant(_) => HashMap::new(),
        };

        for (set_key, value) in patch.set {
            if known.contains(set_key.as_str()) {
                values.insert(set_key, value);
            } else {
                rejected.push(set_key);
            }
        }
        for clear_key in patch.clear {
            if known.contains(clear_key.as_str()) {
                values.remove(&clear_key);
            } else {
                rejected.push(clear_key);
            }
        }

        let version = aegis_core::canonical::canonical_version(&serde_json::Value::Object(values.clone()));
        entry.insert(Settings { scope, scope_id: scope_id.to_string(), category: category.to_string(), values, version: version.clone() });
        info!(?scope, scope_id, category, %version, "settings row updated");

        Ok(PatchOutcome { version, rejected })
    }
}

fn apply_layer(
    values: &mut HashMap<String, serde_json::Value>,
    sources: &mut HashMap<String, ValueSource>,
    row: Option<&Settings>,
    source: ValueSource,
    def: &crate::category::CategoryDef,
) {
    let Some(row) = row else { return };
    for key in def.known_keys() {
        if let Some(value) = row.values.get(key) {
            values.insert(key.to_string(), value.clone());
            sources.insert(key.to_string(), source);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::category::CategoryDef;

    fn store() -> SettingsStore {
        SettingsStore::new(CategoryRegistry::new().with_standard_categories())
    }

    #[test]
    fn effective_falls_back_to_category_defaults() {
        let store = store();
        let effective = store.effective("session_policy", None, "tenant-1").unwrap();
        assert_eq!(effective.values["max_age_seconds"], serde_json::json!(86400));
        assert_eq!(effective.sources["max_age_seconds"], ValueSource::Default);
    }

    #[test]
    fn tenant_patch_overrides_default() {
        let store = store();
        store
            .patch(
                Scope::Tenant,
                "tenant-1",
                "session_policy",
                SettingsPatch { set: [("require_mfa".to_string(), serde_json::json!(true))].into(), ..Default::default() },
            )
            .unwrap();
        let effective = store.effective("session_policy", None, "tenant-1").unwrap();
        assert_eq!(effective.values["require_mfa"], serde_json::json!(true));
        assert_eq!(effective.sources["require_mfa"], ValueSource::Kv);
    }

    #[test]
    fn client_overrides_tenant_which_overrides_platform() {
        let store = store();
        store
            .patch(
                Scope::Tenant,
                "tenant-1",
                "session_policy",
                SettingsPatch { set: [("max_age_seconds".to_string(), serde_json::json!(3600))].into(), ..Default::default() },
            )
            .unwrap();
        store
            .patch(
                Scope::Client,
                "client-1",
                "session_policy",
                SettingsPatch { set: [("max_age_seconds".to_string(), serde_json::json!(60))].into(), ..Default::default() },
            )
            .unwrap();
        let effective = store.effective("session_policy", Some("client-1"), "tenant-1").unwrap();
        assert_eq!(effective.values["max_age_seconds"], serde_json::json!(60));
        assert_eq!(effective.sources["max_age_seconds"], ValueSource::Kv);
    }

    #[test]
    fn conflicting_if_match_is_rejected() {
        let store = store();
        store
            .patch(
                Scope::Tenant,
                "tenant-1",
                "session_policy",
                SettingsPatch { set: [("require_mfa".to_string(), serde_json::json!(true))].into(), ..Default::default() },
            )
            .unwrap();
        let result = store.patch(
            Scope::Tenant,
            "tenant-1",
            "session_policy",
            SettingsPatch {
                if_match: Some("stale".to_string()),
                set: [("require_mfa".to_string(), serde_json::json!(false))].into(),
                ..Default::default()
            },
        );
        assert!(matches!(result, Err(SettingsError::Conflict { .. })));
    }

    #[test]
    fn unknown_key_is_rejected_not_stored() {
        let store = store();
        let outcome = store
            .patch(
                Scope::Tenant,
                "tenant-1",
                "session_policy",
                SettingsPatch { set: [("not_a_real_key".to_string(), serde_json::json!(1))].into(), ..Default::default() },
            )
            .unwrap();
        assert_eq!(outcome.rejected, vec!["not_a_real_key".to_string()]);
    }

    #[test]
    fn platform_only_category_rejected_at_tenant_scope() {
        let store = store();
        let result = store.patch(Scope::Tenant, "tenant-1", "infrastructure", SettingsPatch::default());
        assert!(matches!(result, Err(SettingsError::PlatformOnlyCategory(_))));
    }

    #[test]
    fn unregistered_category_errors() {
        let store = SettingsStore::new(CategoryRegistry::new().register(CategoryDef::new("custom", false)));
        assert!(store.effective("nonexistent", None, "tenant-1").is_err());
    }

    #[test]
    fn disable_removes_the_row() {
        let store = store();
        let outcome = store
            .patch(
                Scope::Tenant,
                "tenant-1",
                "session_policy",
                SettingsPatch { set: [("require_mfa".to_string(), serde_json::json!(true))].into(), ..Default::default() },
            )
            .unwrap();
        store
            .patch(
                Scope::Tenant,
                "tenant-1",
                "session_policy",
                SettingsPatch { if_match: Some(outcome.version), disable: true, ..Default::default() },
            )
            .unwrap();
        assert!(store.get(Scope::Tenant, "tenant-1", "session_policy").is_none());
    }
}
