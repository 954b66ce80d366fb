use crate::Repository;
use async_trait::async_trait;
use chrono::Utc;
use ingestor_model::{FileRef, Indicator, IndicatorKind, Job, JobId, JobStatus, Result};
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::Mutex;

#[derive(Default)]
struct State {
    processed_by_remote: HashSet<String>,
    processed_by_fingerprint: HashSet<String>,
    jobs: HashMap<JobId, Job>,
    indicators: HashMap<(&'static str, String, String, i64), Indicator>,
}

/// In-memory `Repository` fake, analogous to the teacher's
/// `vrift-config::testing` fixtures. Lets `ingestor-pipeline` tests run
/// without a live Postgres instance.
#[derive(Default)]
pub struct InMemoryRepository {
    state: Mutex<State>,
}

impl InMemoryRepository {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Repository for InMemoryRepository {
    async fn exists_by_remote_id(&self, key: &str) -> Result<bool> {
        let state = self.state.lock().unwrap();
        Ok(state.processed_by_remote.contains(key))
    }

    async fn exists_by_fingerprint(&self, fingerprint: &str) -> Result<bool> {
        let state = self.state.lock().unwrap();
        Ok(state.processed_by_fingerprint.contains(fingerprint))
    }

    async fn record_processed_file(
        &self,
        file: &FileRef,
        fingerprint: &str,
        _storage_path: &Path,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.processed_by_remote.insert(file.remote_key.as_str().to_string());
        state.processed_by_fingerprint.insert(fingerprint.to_string());
        Ok(())
    }

    async fn log_job(&self, job: &Job) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        state.jobs.entry(job.job_id).or_insert_with(|| job.clone());
        Ok(())
    }

    async fn update_job(
        &self,
        job_id: JobId,
        status: JobStatus,
        error: Option<String>,
        fingerprint: Option<String>,
    ) -> Result<()> {
        let mut state = self.state.lock().unwrap();
        if let Some(job) = state.jobs.get_mut(&job_id) {
            job.status = status;
            job.error = error;
            if fingerprint.is_some() {
                job.fingerprint = fingerprint;
            }
            job.updated_at = Utc::now();
        }
        Ok(())
    }

    async fn upsert_indicator(&self, indicator: &Indicator) -> Result<bool> {
        let mut state = self.state.lock().unwrap();
        let key = (
            indicator.kind.as_str(),
            indicator.value.clone(),
            indicator.source_fingerprint.clone(),
            indicator.source_line,
        );
        match state.indicators.get_mut(&key) {
            Some(existing) => {
                existing.last_seen_at = indicator.last_seen_at;
                Ok(false)
            }
            None => {
                state.indicators.insert(key, indicator.clone());
                Ok(true)
            }
        }
    }

    async fn count_indicators_by_kind(&self) -> Result<HashMap<IndicatorKind, i64>> {
        let state = self.state.lock().unwrap();
        let mut counts = HashMap::new();
        for indicator in state.indicators.values() {
            *counts.entry(indicator.kind).or_insert(0) += 1;
        }
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ingestor_model::RemoteKey;

    fn sample_file(remote_suffix: i64) -> FileRef {
        FileRef {
            remote_key: RemoteKey::new(1, remote_suffix, 3),
            channel_id: 1,
            channel_title: "chan".into(),
            filename: "a.zip".into(),
            size_bytes: 10,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn record_then_exists_by_remote_and_fingerprint() {
        let repo = InMemoryRepository::new();
        let file = sample_file(1);
        assert!(!repo.exists_by_remote_id(file.remote_key.as_str()).await.unwrap());

        repo.record_processed_file(&file, "fp123", Path::new("/tmp/a")).await.unwrap();

        assert!(repo.exists_by_remote_id(file.remote_key.as_str()).await.unwrap());
        assert!(repo.exists_by_fingerprint("fp123").await.unwrap());
        assert!(!repo.exists_by_fingerprint("other").await.unwrap());
    }

    #[tokio::test]
    async fn update_job_coalesces_fingerprint() {
        let repo = InMemoryRepository::new();
        let job = Job::new(sample_file(2));
        let job_id = job.job_id;
        repo.log_job(&job).await.unwrap();

        repo.update_job(job_id, JobStatus::Processing, None, Some("fp".into()))
            .await
            .unwrap();
        repo.update_job(job_id, JobStatus::Completed, None, None).await.unwrap();

        let state = repo.state.lock().unwrap();
        let stored = state.jobs.get(&job_id).unwrap();
        assert_eq!(stored.status, JobStatus::Completed);
        assert_eq!(stored.fingerprint.as_deref(), Some("fp"));
    }

    #[tokio::test]
    async fn upsert_indicator_reports_insert_then_update() {
        let repo = InMemoryRepository::new();
        let indicator = Indicator::new(IndicatorKind::Domain, "evil.example", "fp", "notes.txt", 3, 1);

        assert!(repo.upsert_indicator(&indicator).await.unwrap());
        assert!(!repo.upsert_indicator(&indicator).await.unwrap());

        let counts = repo.count_indicators_by_kind().await.unwrap();
        assert_eq!(counts.get(&IndicatorKind::Domain), Some(&1));
    }
}
