//! # aegis-settings
//!
//! `SettingsStore` (`spec.md` §4.Q): three-scope layered settings
//! (platform/tenant/client) with optimistic concurrency, typed
//! category validation ([`category`]), and source-tracked effective
//! reads ([`settings`], [`store`]).

pub mod category;
pub mod error;
pub mod settings;
pub mod store;

pub use category::{CategoryDef, CategoryRegistry};
pub use error::SettingsError;
pub use settings::{EffectiveSettings, Scope, Settings, ValueSource};
pub use store::{PatchOutcome, SettingsPatch, SettingsStore};
