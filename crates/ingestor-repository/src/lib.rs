//! Relational persistence for the ingestion pipeline (spec §4.D).
//!
//! The six-operation `Repository` trait is grounded in the teacher pack's
//! `async_trait`-based `JobsRepository` (`ferrex-core::persistence::jobs`);
//! `PostgresRepository` backs it with `sqlx::PgPool`, `InMemoryRepository`
//! backs it with a `Mutex`-guarded map for pipeline tests that shouldn't
//! need a live Postgres instance.

mod memory;
mod postgres;

pub use memory::InMemoryRepository;
pub use postgres::PostgresRepository;

use async_trait::async_trait;
use ingestor_model::{FileRef, Indicator, IndicatorKind, Job, JobId, JobStatus, Result};
use std::collections::HashMap;
use std::path::Path;

/// Hides a relational store behind six transactional, idempotent
/// operations (spec §4.D).
#[async_trait]
pub trait Repository: Send + Sync {
    /// Existence probe on `processed_files` by remote key.
    async fn exists_by_remote_id(&self, key: &str) -> Result<bool>;

    /// Existence probe on `processed_files` by content fingerprint.
    async fn exists_by_fingerprint(&self, fingerprint: &str) -> Result<bool>;

    /// Inserts on remote key; on conflict, touches `last_seen_at`.
    async fn record_processed_file(
        &self,
        file: &FileRef,
        fingerprint: &str,
        storage_path: &Path,
    ) -> Result<()>;

    /// Inserts a job row; on conflict, no-op.
    async fn log_job(&self, job: &Job) -> Result<()>;

    /// Updates status/error; coalesces fingerprint (never overwrites a
    /// previously set fingerprint with `None`); always touches `updated_at`.
    async fn update_job(
        &self,
        job_id: JobId,
        status: JobStatus,
        error: Option<String>,
        fingerprint: Option<String>,
    ) -> Result<()>;

    /// Inserts keyed by (kind, value, source fingerprint, source line); on
    /// conflict touches `last_seen_at` and returns `false`; on insert
    /// returns `true`.
    async fn upsert_indicator(&self, indicator: &Indicator) -> Result<bool>;

    /// Reporting only: total indicators recorded per kind.
    async fn count_indicators_by_kind(&self) -> Result<HashMap<IndicatorKind, i64>>;
}
