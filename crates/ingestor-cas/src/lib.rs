//! Content-addressed storage for downloaded and extracted files (spec §4.C).
//!
//! Layout mirrors the teacher CAS's 2-char fan-out
//! (`root/<fp[..2]>/<fp[2..4]>/<fingerprint>/<sanitized_name>`), swapping the
//! BLAKE3 hash for the BLAKE2b fingerprint produced by `ingestor-hash` and
//! nesting the original filename under the fingerprint directory so the same
//! content persisted under two different remote names doesn't collide.

use ingestor_model::{IngestError, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use uuid::Uuid;

/// EXDEV: rename(2) across filesystems. `std::io::ErrorKind` has no stable
/// variant for this, so we match the raw errno directly.
const EXDEV: i32 = 18;

#[derive(Debug, Clone)]
pub struct ContentStore {
    root: PathBuf,
    scratch_root: PathBuf,
}

impl ContentStore {
    /// Opens (creating if absent) a content store rooted at `root`, with a
    /// `.tmp` scratch area alongside it for in-flight downloads and
    /// extractions.
    pub fn new(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        let scratch_root = root.join(".tmp");
        fs::create_dir_all(&root)?;
        fs::create_dir_all(&scratch_root)?;
        Ok(Self { root, scratch_root })
    }

    /// Allocates a fresh scratch directory for a single attachment's
    /// download + extraction lifecycle. Callers own its cleanup via
    /// [`ContentStore::cleanup_scratch`].
    pub fn new_scratch_dir(&self) -> Result<PathBuf> {
        let dir = self.scratch_root.join(format!("scratch-{}", Uuid::new_v4()));
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }

    fn blob_dir(&self, fingerprint: &str) -> PathBuf {
        let l1 = &fingerprint[..2];
        let l2 = &fingerprint[2..4];
        self.root.join(l1).join(l2).join(fingerprint)
    }

    /// Moves `scratch_path` into its content-addressed home. If the
    /// fingerprint is already present (another job persisted the same
    /// content first), the existing blob wins and `scratch_path` is
    /// discarded — persisting is idempotent rather than a race.
    pub fn persist(
        &self,
        scratch_path: &Path,
        fingerprint: &str,
        original_name: &str,
    ) -> Result<PathBuf> {
        let sanitized = ingestor_pathguard::sanitize_filename(original_name);
        let dir = self.blob_dir(fingerprint);
        fs::create_dir_all(&dir)?;
        let dest = dir.join(&sanitized);

        if dest.exists() {
            let _ = fs::remove_file(scratch_path);
            return Ok(dest);
        }

        match fs::rename(scratch_path, &dest) {
            Ok(()) => Ok(dest),
            Err(e) if e.raw_os_error() == Some(EXDEV) => {
                fs::copy(scratch_path, &dest)?;
                fs::remove_file(scratch_path)?;
                Ok(dest)
            }
            Err(e) => {
                if dest.exists() {
                    let _ = fs::remove_file(scratch_path);
                    Ok(dest)
                } else {
                    Err(IngestError::Io(e))
                }
            }
        }
    }

    /// Removes a scratch directory and everything under it. Safe to call on
    /// a directory that no longer exists.
    pub fn cleanup_scratch(&self, dir: &Path) -> Result<()> {
        match fs::remove_dir_all(dir) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(IngestError::Io(e)),
        }
    }

    /// Sweeps the scratch area for entries whose modification time is older
    /// than `max_age`, removing them. Guards against scratch directories
    /// orphaned by a crash mid-job. Returns the number of entries removed.
    pub fn purge_scratch_older_than(&self, max_age: Duration) -> Result<usize> {
        let now = SystemTime::now();
        let mut removed = 0;

        for entry in fs::read_dir(&self.scratch_root)? {
            let entry = entry?;
            let metadata = entry.metadata()?;
            let modified = metadata.modified()?;
            let age = now.duration_since(modified).unwrap_or_default();
            if age > max_age {
                let path = entry.path();
                if metadata.is_dir() {
                    fs::remove_dir_all(&path)?;
                } else {
                    fs::remove_file(&path)?;
                }
                removed += 1;
            }
        }

        Ok(removed)
    }
}
