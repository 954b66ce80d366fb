use crate::Repository;
use async_trait::async_trait;
use chrono::Utc;
use ingestor_model::{FileRef, IngestError, Indicator, IndicatorKind, Job, JobId, JobStatus, Result};
use sqlx::postgres::PgPoolOptions;
use sqlx::{PgPool, Row};
use std::collections::HashMap;
use std::path::Path;
use std::time::Duration;

/// Postgres-backed `Repository`. Connection pooling (min 1, max 10 per
/// spec §5) is opaque to callers; failures are classified into
/// `IngestError::NotConnected`, `Transient`, or `Constraint`.
#[derive(Clone)]
pub struct PostgresRepository {
    pool: PgPool,
}

impl PostgresRepository {
    /// Connects and runs pending migrations.
    pub async fn connect(database_url: &str) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .min_connections(1)
            .max_connections(10)
            .acquire_timeout(Duration::from_secs(10))
            .connect(database_url)
            .await
            .map_err(|e| IngestError::Config(format!("failed to connect to database: {e}")))?;

        sqlx::migrate!("./migrations")
            .run(&pool)
            .await
            .map_err(|e| IngestError::Config(format!("migration failed: {e}")))?;

        Ok(Self { pool })
    }

    /// Wraps an already-open pool (used by embedding binaries that manage
    /// pool lifetime themselves).
    pub fn from_pool(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Closes the connection pool. Called after worker/listener teardown
    /// during shutdown (spec §5).
    pub async fn close(&self) {
        self.pool.close().await;
    }
}

fn map_sqlx_err(e: sqlx::Error) -> IngestError {
    match &e {
        sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
            IngestError::Transient(e.to_string())
        }
        sqlx::Error::Database(db_err) if db_err.is_unique_violation() => {
            IngestError::Constraint(e.to_string())
        }
        _ => IngestError::Transient(e.to_string()),
    }
}

#[async_trait]
impl Repository for PostgresRepository {
    async fn exists_by_remote_id(&self, key: &str) -> Result<bool> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM processed_files WHERE remote_file_id = $1) AS present")
            .bind(key)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(row.try_get::<bool, _>("present").map_err(map_sqlx_err)?)
    }

    async fn exists_by_fingerprint(&self, fingerprint: &str) -> Result<bool> {
        let row = sqlx::query("SELECT EXISTS(SELECT 1 FROM processed_files WHERE file_hash = $1) AS present")
            .bind(fingerprint)
            .fetch_one(&self.pool)
            .await
            .map_err(map_sqlx_err)?;
        Ok(row.try_get::<bool, _>("present").map_err(map_sqlx_err)?)
    }

    async fn record_processed_file(
        &self,
        file: &FileRef,
        fingerprint: &str,
        storage_path: &Path,
    ) -> Result<()> {
        let now = Utc::now();
        sqlx::query(
            "INSERT INTO processed_files
                (remote_file_id, channel_id, channel_title, filename, size_bytes, file_hash, storage_path, first_seen_at, last_seen_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT (remote_file_id) DO UPDATE SET last_seen_at = EXCLUDED.last_seen_at",
        )
        .bind(file.remote_key.as_str())
        .bind(file.channel_id)
        .bind(&file.channel_title)
        .bind(&file.filename)
        .bind(file.size_bytes as i64)
        .bind(fingerprint)
        .bind(storage_path.to_string_lossy().to_string())
        .bind(now)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(())
    }

    async fn log_job(&self, job: &Job) -> Result<()> {
        sqlx::query(
            "INSERT INTO processing_jobs
                (job_id, remote_file_id, channel_id, filename, status, error, file_hash, created_at, updated_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
             ON CONFLICT (job_id) DO NOTHING",
        )
        .bind(job.job_id.0)
        .bind(job.file.remote_key.as_str())
        .bind(job.file.channel_id)
        .bind(&job.file.filename)
        .bind(job.status.as_str())
        .bind(&job.error)
        .bind(&job.fingerprint)
        .bind(job.created_at)
        .bind(job.updated_at)
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(())
    }

    async fn update_job(
        &self,
        job_id: JobId,
        status: JobStatus,
        error: Option<String>,
        fingerprint: Option<String>,
    ) -> Result<()> {
        sqlx::query(
            "UPDATE processing_jobs
             SET status = $2, error = $3, file_hash = COALESCE($4, file_hash), updated_at = $5
             WHERE job_id = $1",
        )
        .bind(job_id.0)
        .bind(status.as_str())
        .bind(error)
        .bind(fingerprint)
        .bind(Utc::now())
        .execute(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        Ok(())
    }

    async fn upsert_indicator(&self, indicator: &Indicator) -> Result<bool> {
        let row = sqlx::query(
            "INSERT INTO extracted_indicators
                (kind, value, source_fingerprint, source_relative_path, source_line, channel_id, first_seen_at, last_seen_at)
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
             ON CONFLICT (kind, value, source_fingerprint, source_line)
             DO UPDATE SET last_seen_at = EXCLUDED.last_seen_at
             RETURNING (xmax = 0) AS was_inserted",
        )
        .bind(indicator.kind.as_str())
        .bind(&indicator.value)
        .bind(&indicator.source_fingerprint)
        .bind(&indicator.source_relative_path)
        .bind(indicator.source_line)
        .bind(indicator.channel_id)
        .bind(indicator.first_seen_at)
        .bind(indicator.last_seen_at)
        .fetch_one(&self.pool)
        .await
        .map_err(map_sqlx_err)?;

        row.try_get::<bool, _>("was_inserted").map_err(map_sqlx_err)
    }

    async fn count_indicators_by_kind(&self) -> Result<HashMap<IndicatorKind, i64>> {
        let rows = sqlx::query("SELECT kind, COUNT(*) AS total FROM extracted_indicators GROUP BY kind")
            .fetch_all(&self.pool)
            .await
            .map_err(map_sqlx_err)?;

        let mut counts = HashMap::new();
        for row in rows {
            let kind: String = row.try_get("kind").map_err(map_sqlx_err)?;
            let total: i64 = row.try_get("total").map_err(map_sqlx_err)?;
            if let Some(kind) = parse_indicator_kind(&kind) {
                counts.insert(kind, total);
            }
        }

        Ok(counts)
    }
}

fn parse_indicator_kind(s: &str) -> Option<IndicatorKind> {
    match s {
        "domain" => Some(IndicatorKind::Domain),
        "email" => Some(IndicatorKind::Email),
        "ipv4" => Some(IndicatorKind::Ipv4),
        _ => None,
    }
}
