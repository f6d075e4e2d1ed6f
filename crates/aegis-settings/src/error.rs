//! Leaf error type for settings reads/writes, converted to
//! [`aegis_core::OpError`] at the crate boundary.

use aegis_core::{OpError, OpErrorKind};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SettingsError {
    #[error("unknown category: {0}")]
    UnknownCategory(String),
    #[error("category {0:?} is platform-only")]
    PlatformOnlyCategory(String),
    #[error("version conflict: expected {expected}, current is {current}")]
    Conflict { expected: String, current: String },
    #[error("no settings row for scope")]
    NotFound,
}

impl From<SettingsError> for OpError {
    fn from(err: SettingsError) -> Self {
        let kind = match &err {
            SettingsError::Conflict { .. } => OpErrorKind::Conflict,
            SettingsError::NotFound => OpErrorKind::NotFound,
            SettingsError::UnknownCategory(_) | SettingsError::PlatformOnlyCategory(_) => {
                OpErrorKind::InvalidRequest
            }
        };
        OpError::new(kind, err.to_string()).with_component("aegis-settings")
    }
}
