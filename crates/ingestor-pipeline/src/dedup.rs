use ingestor_model::{FileRef, Result};
use ingestor_repository::Repository;
use std::path::Path;
use std::sync::Arc;

/// Pure policy over [`Repository`] (spec §4.E). Both stages are advisory:
/// final idempotence rests on the repository's upsert constraints, so a
/// race between two workers ends with one insert and one `last_seen`
/// touch rather than a correctness problem here.
pub struct Deduper {
    repository: Arc<dyn Repository>,
}

impl Deduper {
    pub fn new(repository: Arc<dyn Repository>) -> Self {
        Self { repository }
    }

    /// Stage 1: pre-download check by remote identity.
    pub async fn should_process_by_remote(&self, file: &FileRef) -> Result<bool> {
        let exists = self.repository.exists_by_remote_id(file.remote_key.as_str()).await?;
        Ok(!exists)
    }

    /// Stage 2: post-download check by content fingerprint. Computes the
    /// fingerprint as a side effect since the caller needs it either way
    /// (to record on the job, or to persist the file).
    pub async fn should_process_by_content(&self, file_path: &Path) -> Result<(bool, String)> {
        let fingerprint = ingestor_hash::hash_file(file_path.to_path_buf()).await?;
        let exists = self.repository.exists_by_fingerprint(&fingerprint).await?;
        Ok((!exists, fingerprint))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use ingestor_model::RemoteKey;
    use ingestor_repository::InMemoryRepository;
    use std::io::Write;

    fn sample_file() -> FileRef {
        FileRef {
            remote_key: RemoteKey::new(1, 2, 3),
            channel_id: 1,
            channel_title: "chan".into(),
            filename: "a.zip".into(),
            size_bytes: 10,
            timestamp: Utc::now(),
        }
    }

    #[tokio::test]
    async fn should_process_by_remote_is_false_once_recorded() {
        let repo = Arc::new(InMemoryRepository::new());
        let deduper = Deduper::new(repo.clone());
        let file = sample_file();

        assert!(deduper.should_process_by_remote(&file).await.unwrap());

        repo.record_processed_file(&file, "fp", Path::new("/tmp/x")).await.unwrap();
        assert!(!deduper.should_process_by_remote(&file).await.unwrap());
    }

    #[tokio::test]
    async fn should_process_by_content_is_false_once_fingerprint_recorded() {
        let repo = Arc::new(InMemoryRepository::new());
        let deduper = Deduper::new(repo.clone());

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("a.bin");
        std::fs::File::create(&path).unwrap().write_all(b"content").unwrap();

        let (proceed, fingerprint) = deduper.should_process_by_content(&path).await.unwrap();
        assert!(proceed);

        repo.record_processed_file(&sample_file(), &fingerprint, Path::new("/tmp/x")).await.unwrap();

        let (proceed_again, fingerprint_again) = deduper.should_process_by_content(&path).await.unwrap();
        assert!(!proceed_again);
        assert_eq!(fingerprint, fingerprint_again);
    }
}
