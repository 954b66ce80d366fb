//! Structured logging setup.
//!
//! INFO for normal pipeline steps, WARN for load-shedding and retryable
//! glitches, ERROR for job failures — the levels `tracing` macros are called
//! at throughout the workspace (spec §7).

use tracing_subscriber::EnvFilter;

/// Installs the global `tracing` subscriber. Respects `RUST_LOG`; defaults
/// to `info` when unset, matching the teacher's daemon binaries.
pub fn init() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_target(true)
        .init();
}
