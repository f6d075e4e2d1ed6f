//! The one `tracing_subscriber` initialization entry point for the
//! whole workspace (`SPEC_FULL.md` §1.1). Every other crate only emits
//! `tracing` events; nothing else installs a global subscriber, so a
//! host embedding `aegis` as a library can skip this and install its
//! own instead.

use tracing_subscriber::{EnvFilter, fmt, prelude::*};

/// Install a `fmt` subscriber filtered by `RUST_LOG` (defaulting to
/// `info` when unset). Call once, near the top of `main`.
///
/// # Panics
/// Panics if a global subscriber has already been installed — calling
/// this more than once per process is a programming error.
pub fn init() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .init();
}

/// Like [`init`], but returns a `Result` instead of panicking —
/// for hosts that may call this more than once (tests, embedders that
/// already ran `init` themselves).
pub fn try_init() -> Result<(), tracing_subscriber::util::TryInitError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::registry().with(filter).with(fmt::layer().with_target(true)).try_init()
}
