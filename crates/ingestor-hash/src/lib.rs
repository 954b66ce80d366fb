//! Streaming BLAKE2b-256 content fingerprinting (spec §4.A).
//!
//! Hashing is CPU-bound; [`hash_file`] offloads the streaming loop to a
//! blocking thread so it never stalls the tokio scheduler, matching how
//! the teacher workspace offloads CAS ingest work via `spawn_blocking`.

use blake2::digest::{Update, VariableOutput};
use blake2::Blake2bVar;
use ingestor_model::{IngestError, Result};
use std::io::Read;
use std::path::{Path, PathBuf};

/// BLAKE2b output width in bytes (256 bits), per spec §4.A.
pub const DIGEST_SIZE: usize = 32;
/// Recommended streaming chunk size, per spec §4.A.
pub const CHUNK_SIZE: usize = 64 * 1024;

/// Computes the fingerprint synchronously. Never loads the whole file into
/// memory. Call from a blocking context only; async callers should use
/// [`hash_file`].
pub fn hash_file_sync(path: &Path) -> Result<String> {
    let mut file = std::fs::File::open(path)?;
    let mut hasher = Blake2bVar::new(DIGEST_SIZE).expect("32 is a valid BLAKE2b output size");
    let mut buf = [0u8; CHUNK_SIZE];

    loop {
        let n = file.read(&mut buf)?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
    }

    let mut digest = [0u8; DIGEST_SIZE];
    hasher
        .finalize_variable(&mut digest)
        .expect("buffer sized to the requested digest output");
    Ok(to_hex(&digest))
}

/// Async entry point used by the pipeline: offloads the blocking hash loop
/// so the caller's executor stays responsive (spec §5).
pub async fn hash_file(path: PathBuf) -> Result<String> {
    tokio::task::spawn_blocking(move || hash_file_sync(&path))
        .await
        .map_err(|join_err| IngestError::Io(std::io::Error::other(join_err)))?
}

fn to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{b:02x}")).collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn fingerprint_is_64_char_lowercase_hex() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.bin");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"some archive bytes")
            .unwrap();

        let digest = hash_file_sync(&path).unwrap();
        assert_eq!(digest.len(), 64);
        assert!(digest.chars().all(|c| c.is_ascii_hexdigit() && !c.is_ascii_uppercase()));
    }

    #[test]
    fn identical_bytes_yield_identical_fingerprint_on_reread() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.bin");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"deterministic content")
            .unwrap();

        let first = hash_file_sync(&path).unwrap();
        let second = hash_file_sync(&path).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn differing_bytes_yield_differing_fingerprints() {
        let dir = tempfile::tempdir().unwrap();
        let a = dir.path().join("a.bin");
        let b = dir.path().join("b.bin");
        std::fs::File::create(&a).unwrap().write_all(b"alpha").unwrap();
        std::fs::File::create(&b).unwrap().write_all(b"beta").unwrap();

        assert_ne!(hash_file_sync(&a).unwrap(), hash_file_sync(&b).unwrap());
    }

    #[test]
    fn hashes_larger_than_one_chunk_without_loading_fully() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("big.bin");
        let mut file = std::fs::File::create(&path).unwrap();
        let chunk = vec![0xAB_u8; CHUNK_SIZE];
        for _ in 0..3 {
            file.write_all(&chunk).unwrap();
        }
        drop(file);

        let digest = hash_file_sync(&path).unwrap();
        assert_eq!(digest.len(), 64);
    }

    #[tokio::test]
    async fn async_hash_matches_sync_hash() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("sample.bin");
        std::fs::File::create(&path)
            .unwrap()
            .write_all(b"async path")
            .unwrap();

        let sync_digest = hash_file_sync(&path).unwrap();
        let async_digest = hash_file(path).await.unwrap();
        assert_eq!(sync_digest, async_digest);
    }
}
