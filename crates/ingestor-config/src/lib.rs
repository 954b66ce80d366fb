//! Environment-sourced settings and structured logging setup (spec §6),
//! collapsed to env-only from the teacher's layered global/project/env
//! config loader since the spec declares environment as the sole source.

pub mod logging;
mod settings;

pub use settings::Settings;
