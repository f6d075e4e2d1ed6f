//! # aegis-audit
//!
//! `AuditAndTombstones` (`spec.md` §4.R): an append-only admin-action
//! audit trail ([`audit`]) and GDPR deletion tombstones with retention
//! and dry-run cleanup ([`tombstone`]).

pub mod audit;
pub mod tombstone;

pub use audit::{AuditLog, AuditRecord};
pub use tombstone::{CleanupReport, Tombstone, TombstoneStore, DEFAULT_RETENTION_DAYS};
