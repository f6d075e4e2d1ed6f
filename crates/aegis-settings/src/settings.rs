//! The `Settings` row (`spec.md` §3) and the effective-value view a
//! read returns, tracking which layer each key came from.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Scope {
    Platform,
    Tenant,
    Client,
}

/// A single persisted settings row at one scope/category.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    pub scope: Scope,
    pub scope_id: String,
    pub category: String,
    pub values: serde_json::Map<String, serde_json::Value>,
    pub version: String,
}

/// Where an effective key's value came from, per `spec.md` §4.Q: "Reads
/// return `{category, scope, version, values, sources: key→(kv|default|env|inherit)}`".
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ValueSource {
    /// Set explicitly at the scope being read.
    Kv,
    /// Not set anywhere; category default.
    Default,
    /// Set via environment-variable override (see `aegis`'s config layer).
    Env,
    /// Inherited from a broader scope (client inherits tenant inherits platform).
    Inherit,
}

/// The resolved view of a category for one client/tenant, after
/// applying the `client → tenant → platform → category_defaults`
/// resolution order.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EffectiveSettings {
    pub category: String,
    pub values: HashMap<String, serde_json::Value>,
    pub sources: HashMap<String, ValueSource>,
}
