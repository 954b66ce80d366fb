use ingestor_cas::ContentStore;
use ingestor_ioc::IocScanner;
use ingestor_model::{FileRef, IngestError, Job, JobId, JobStatus, Result};
use ingestor_remote::RemoteSource;
use ingestor_repository::Repository;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;

use crate::dedup::Deduper;
use crate::metrics::Metrics;

/// Shutdown time budget bounding worker drain on cancellation (spec §5).
const SHUTDOWN_BUDGET: Duration = Duration::from_secs(30);

/// The coordinator (spec §4.I): a bounded queue between the
/// [`RemoteSource`] producer and a fixed-size pool of workers, each
/// running the `ENTERED -> ... -> COMPLETED` state machine for one
/// [`FileRef`] at a time.
pub struct Pipeline {
    remote: Arc<dyn RemoteSource>,
    repository: Arc<dyn Repository>,
    store: ContentStore,
    scanner: Arc<IocScanner>,
    deduper: Deduper,
    worker_count: usize,
    metrics: Arc<Metrics>,
}

impl Pipeline {
    pub fn new(
        remote: Arc<dyn RemoteSource>,
        repository: Arc<dyn Repository>,
        store: ContentStore,
        scanner: IocScanner,
        worker_count: usize,
    ) -> Self {
        Self {
            deduper: Deduper::new(repository.clone()),
            remote,
            repository,
            store,
            scanner: Arc::new(scanner),
            worker_count,
            metrics: Arc::new(Metrics::new()),
        }
    }

    pub fn metrics(&self) -> Arc<Metrics> {
        self.metrics.clone()
    }

    /// Runs the producer/worker pipeline until `shutdown` is cancelled.
    /// The queue is bounded to `3 * worker_count`; the semaphore bounds
    /// in-flight jobs to `worker_count` (spec §4.I, §5).
    pub async fn run(self: Arc<Self>, channel_ids: Vec<i64>, shutdown: CancellationToken) -> Result<()> {
        let queue_capacity = 3 * self.worker_count;
        let (tx, mut rx) = mpsc::channel::<FileRef>(queue_capacity);
        let semaphore = Arc::new(Semaphore::new(self.worker_count));

        let remote = self.remote.clone();
        let listener_shutdown = shutdown.clone();
        let mut listener = tokio::spawn(async move {
            tokio::select! {
                res = remote.listen(tx, channel_ids) => res,
                _ = listener_shutdown.cancelled() => Ok(()),
            }
        });

        let mut jobs: JoinSet<()> = JoinSet::new();

        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    tracing::info!("shutdown signal received, draining in-flight jobs");
                    break;
                }
                received = rx.recv() => {
                    match received {
                        Some(file_ref) => {
                            let Ok(permit) = semaphore.clone().acquire_owned().await else {
                                break;
                            };
                            let pipeline = self.clone();
                            let job_shutdown = shutdown.clone();
                            jobs.spawn(async move {
                                let _permit = permit;
                                tokio::select! {
                                    () = pipeline.process(file_ref) => {}
                                    () = job_shutdown.cancelled() => {
                                        tracing::warn!("job cancelled mid-flight by shutdown, leaving last recorded status");
                                    }
                                }
                            });
                        }
                        None => break,
                    }
                }
            }
        }

        drop(rx);

        let drained = tokio::time::timeout(SHUTDOWN_BUDGET, async {
            while jobs.join_next().await.is_some() {}
        })
        .await;

        if drained.is_err() {
            tracing::warn!("shutdown budget exceeded, aborting remaining jobs");
            jobs.abort_all();
            while jobs.join_next().await.is_some() {}
        }

        listener.abort();
        let _ = listener.await;

        Ok(())
    }

    /// Single catch site for a job's entire procedure (spec §7
    /// "Propagation: exactly one catch site per job at the worker
    /// boundary"). Cancellation propagates without being recorded FAILED.
    async fn process(&self, file: FileRef) {
        let job = Job::new(file.clone());
        let job_id = job.job_id;

        if let Err(e) = self.repository.log_job(&job).await {
            tracing::error!(error = %e, "failed to log job, aborting this attempt");
            return;
        }
        tracing::info!(job_id = %job_id, filename = %file.filename, "job entered");

        if let Err(e) = self.run_job(&file, job_id).await {
            if e.is_cancellation() {
                tracing::warn!(job_id = %job_id, "job cancelled, leaving last recorded status");
                return;
            }

            let message = e.to_job_error();
            tracing::error!(job_id = %job_id, error = %message, "job failed");
            self.metrics.increment_failed();
            if let Err(update_err) = self
                .repository
                .update_job(job_id, JobStatus::Failed, Some(message), None)
                .await
            {
                tracing::error!(job_id = %job_id, error = %update_err, "failed to record job failure");
            }
        }
    }

    /// Stages 3-9 of the per-job procedure (spec §4.I).
    async fn run_job(&self, file: &FileRef, job_id: JobId) -> Result<()> {
        if !self.deduper.should_process_by_remote(file).await? {
            tracing::info!(job_id = %job_id, "deduplicated by remote identity");
            self.metrics.increment_deduplicated();
            self.repository.update_job(job_id, JobStatus::Completed, None, None).await?;
            return Ok(());
        }

        let scratch_dir = self.new_scratch_dir().await?;
        let sanitized = ingestor_pathguard::sanitize_filename(&file.filename);
        let temp_path = scratch_dir.join(&sanitized);

        if let Err(e) = self.remote.download(&file.remote_key, &temp_path).await {
            let _ = tokio::fs::remove_file(&temp_path).await;
            let _ = self.cleanup_scratch(scratch_dir.clone()).await;
            return Err(e);
        }

        let dedup_result = self.deduper.should_process_by_content(&temp_path).await;
        let (proceed, fingerprint) = match dedup_result {
            Ok(result) => result,
            Err(e) => {
                let _ = self.cleanup_scratch(scratch_dir.clone()).await;
                return Err(e);
            }
        };

        if !proceed {
            tracing::info!(job_id = %job_id, fingerprint = %fingerprint, "deduplicated by content fingerprint");
            self.cleanup_scratch(scratch_dir.clone()).await?;
            self.metrics.increment_deduplicated();
            self.repository
                .update_job(job_id, JobStatus::Completed, None, Some(fingerprint))
                .await?;
            return Ok(());
        }

        let final_path = match self.persist(temp_path, fingerprint.clone(), file.filename.clone()).await {
            Ok(path) => path,
            Err(e) => {
                let _ = self.cleanup_scratch(scratch_dir.clone()).await;
                return Err(e);
            }
        };
        self.cleanup_scratch(scratch_dir).await?;
        self.repository.record_processed_file(file, &fingerprint, &final_path).await?;
        self.repository
            .update_job(job_id, JobStatus::Completed, None, Some(fingerprint.clone()))
            .await?;
        tracing::info!(job_id = %job_id, path = %final_path.display(), "file persisted");

        let extraction_dir = self.new_scratch_dir().await?;
        let extract_result = self
            .extract_and_scan(final_path, extraction_dir.clone(), fingerprint, file.channel_id)
            .await;
        let _ = self.cleanup_scratch(extraction_dir).await;
        let indicator_count = extract_result?;

        self.repository.update_job(job_id, JobStatus::Completed, None, None).await?;
        self.metrics.increment_processed();
        self.metrics.add_indicators_found(indicator_count);
        tracing::info!(job_id = %job_id, indicators = indicator_count, "job completed");

        Ok(())
    }

    /// Stage 8: extraction (bomb/traversal guarded) then IOC scanning,
    /// both CPU/IO heavy enough to offload per spec §5.
    async fn extract_and_scan(
        &self,
        archive_path: PathBuf,
        extraction_dir: PathBuf,
        fingerprint: String,
        channel_id: i64,
    ) -> Result<u64> {
        let extract_dir = extraction_dir.clone();
        tokio::task::spawn_blocking(move || ingestor_extract::extract(&archive_path, &extract_dir))
            .await
            .map_err(join_err)??;

        let scanner = self.scanner.clone();
        let indicators = tokio::task::spawn_blocking(move || {
            scanner.scan_directory(&extraction_dir, &fingerprint, channel_id)
        })
        .await
        .map_err(join_err)??;

        let count = indicators.len() as u64;
        for indicator in &indicators {
            self.repository.upsert_indicator(indicator).await?;
        }

        Ok(count)
    }

    async fn new_scratch_dir(&self) -> Result<PathBuf> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.new_scratch_dir())
            .await
            .map_err(join_err)?
    }

    async fn persist(&self, temp_path: PathBuf, fingerprint: String, original_name: String) -> Result<PathBuf> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.persist(&temp_path, &fingerprint, &original_name))
            .await
            .map_err(join_err)?
    }

    async fn cleanup_scratch(&self, dir: PathBuf) -> Result<()> {
        let store = self.store.clone();
        tokio::task::spawn_blocking(move || store.cleanup_scratch(&dir))
            .await
            .map_err(join_err)?
    }
}

fn join_err(e: tokio::task::JoinError) -> IngestError {
    IngestError::Io(std::io::Error::other(e))
}
