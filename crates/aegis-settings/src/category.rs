//! Category declarations (`spec.md` §4.Q): each category names its
//! valid keys and their default values. A value not named by its
//! category is rejected ("unknown keys are rejected"); a category
//! whose `platform_only` flag is set may only be read/written at
//! `Scope::Platform` ("requesting them at tenant scope returns 400").

use std::collections::HashMap;

/// A single category's typed default values. Validation here is
/// key-membership, not per-value type-checking: `spec.md` leaves the
/// concrete value schema to the category owner, so this crate enforces
/// the shape (known keys only) and leaves value semantics to callers.
#[derive(Debug, Clone)]
pub struct CategoryDef {
    pub name: String,
    pub platform_only: bool,
    pub defaults: HashMap<String, serde_json::Value>,
}

impl CategoryDef {
    #[must_use]
    pub fn new(name: impl Into<String>, platform_only: bool) -> Self {
        Self { name: name.into(), platform_only, defaults: HashMap::new() }
    }

    #[must_use]
    pub fn with_default(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.defaults.insert(key.into(), value);
        self
    }

    #[must_use]
    pub fn known_keys(&self) -> std::collections::HashSet<&str> {
        self.defaults.keys().map(String::as_str).collect()
    }
}

/// The set of categories this deployment knows about. Platform-seeded
/// at startup; not mutated at runtime (new categories require a
/// redeploy, same as the teacher's config schema).
#[derive(Debug, Clone, Default)]
pub struct CategoryRegistry {
    categories: HashMap<String, CategoryDef>,
}

impl CategoryRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn register(mut self, category: CategoryDef) -> Self {
        self.categories.insert(category.name.clone(), category);
        self
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<&CategoryDef> {
        self.categories.get(name)
    }

    /// The platform-seeded categories this repo ships with
    /// (`infrastructure` and `encryption` are platform-only per
    /// `spec.md` §4.Q; `branding` and `session_policy` are
    /// tenant-overridable).
    #[must_use]
    pub fn with_standard_categories(self) -> Self {
        self.register(
            CategoryDef::new("infrastructure", true)
                .with_default("max_connections", serde_json::json!(100))
                .with_default("request_timeout_ms", serde_json::json!(5000)),
        )
        .register(
            CategoryDef::new("encryption", true)
                .with_default("rotation_overlap_seconds", serde_json::json!(300)),
        )
        .register(
            CategoryDef::new("branding", false)
                .with_default("display_name", serde_json::json!(null))
                .with_default("logo_url", serde_json::json!(null)),
        )
        .register(
            CategoryDef::new("session_policy", false)
                .with_default("max_age_seconds", serde_json::json!(86400))
                .with_default("require_mfa", serde_json::json!(false)),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn standard_categories_include_platform_only_ones() {
        let registry = CategoryRegistry::new().with_standard_categories();
        assert!(registry.get("infrastructure").unwrap().platform_only);
        assert!(!registry.get("branding").unwrap().platform_only);
    }

    #[test]
    fn unknown_category_is_absent() {
        let registry = CategoryRegistry::new().with_standard_categories();
        assert!(registry.get("nonexistent").is_none());
    }
}
