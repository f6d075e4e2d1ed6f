//! # aegis
//!
//! The facade crate: the single place a host process links against to
//! run the whole provider. It owns process-wide configuration
//! ([`config`]) and the one `tracing_subscriber` bootstrap
//! ([`telemetry`]), and wires every engine crate in the workspace into
//! [`provider::Provider`]. It contains no protocol logic of its own —
//! that all lives in `aegis-authorize`, `aegis-tokens`,
//! `aegis-federation`, and the rest of the `aegis-*` crates this crate
//! depends on.

pub mod config;
pub mod provider;
pub mod telemetry;

pub use config::{AegisConfig, ConfigError};
pub use provider::{Provider, ProviderDeps};
