//! Bomb- and traversal-guarded archive extraction (spec §4.F).
//!
//! All member-name validations (path traversal, entry count, declared
//! size) run in a pre-pass over the archive's listing before a single byte
//! is written, so a hostile archive fails closed rather than partially
//! extracting. The `.zip` path is a direct use of the `zip` crate (see the
//! `zip`/`stencila` manifests in the reference pack for real-world usage);
//! `.rar` support via the `unrar` crate is not grounded in the teacher
//! workspace or the rest of the pack — no example repo extracts RAR — and
//! is noted as an ecosystem addition in DESIGN.md.

use ingestor_model::{IngestError, Result};
use std::fs::{self, File};
use std::io;
use std::path::{Path, PathBuf};

/// Spec §4.F: more than this many entries is a bomb-by-count.
const MAX_ENTRY_COUNT: usize = 1000;
/// Spec §4.F: more than this many declared uncompressed bytes is a
/// bomb-by-size.
const MAX_TOTAL_SIZE: u64 = 10 * 1024 * 1024 * 1024;

/// Extracts `archive_path` into `target`, which must already exist.
/// Dispatches on file extension; anything other than `.zip`/`.rar` is
/// `UnsupportedFormat`.
pub fn extract(archive_path: &Path, target: &Path) -> Result<()> {
    let suffix = archive_path
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_lowercase())
        .unwrap_or_default();

    match suffix.as_str() {
        "zip" => extract_zip(archive_path, target),
        "rar" => extract_rar(archive_path, target),
        other => Err(IngestError::UnsupportedFormat(format!(
            "unsupported archive suffix: .{other}"
        ))),
    }
}

struct PlannedEntry {
    index: usize,
    dest: PathBuf,
    is_dir: bool,
}

fn extract_zip(archive_path: &Path, target: &Path) -> Result<()> {
    let file = File::open(archive_path)?;
    let mut archive = zip::ZipArchive::new(file)
        .map_err(|e| IngestError::UnsafeArchive(format!("cannot open zip archive: {e}")))?;

    let entry_count = archive.len();
    if entry_count > MAX_ENTRY_COUNT {
        return Err(IngestError::UnsafeArchive(format!(
            "zip archive has {entry_count} entries, exceeds limit of {MAX_ENTRY_COUNT}"
        )));
    }

    let mut total_size: u64 = 0;
    let mut planned = Vec::with_capacity(entry_count);

    for index in 0..entry_count {
        let entry = archive
            .by_index(index)
            .map_err(|e| IngestError::UnsafeArchive(format!("corrupt zip entry at index {index}: {e}")))?;

        total_size = total_size.saturating_add(entry.size());
        if total_size > MAX_TOTAL_SIZE {
            return Err(IngestError::UnsafeArchive(format!(
                "zip archive declared size exceeds {MAX_TOTAL_SIZE} bytes"
            )));
        }

        if is_symlink(entry.unix_mode()) {
            continue;
        }

        let Some(name) = entry.enclosed_name() else {
            return Err(IngestError::UnsafeArchive(format!(
                "zip entry has an unrepresentable name: {}",
                entry.name()
            )));
        };

        let dest = ingestor_pathguard::validate_safe_path(target, &name)?;
        planned.push(PlannedEntry {
            index,
            dest,
            is_dir: entry.is_dir(),
        });
    }

    for planned_entry in planned {
        if planned_entry.is_dir {
            fs::create_dir_all(&planned_entry.dest)?;
            continue;
        }

        if let Some(parent) = planned_entry.dest.parent() {
            fs::create_dir_all(parent)?;
        }

        let mut entry = archive
            .by_index(planned_entry.index)
            .map_err(|e| IngestError::UnsafeArchive(format!("corrupt zip entry: {e}")))?;
        let mut out = File::create(&planned_entry.dest)?;
        io::copy(&mut entry, &mut out)?;
    }

    Ok(())
}

/// `S_IFLNK` per the zip `unix_mode()` convention used for POSIX symlink
/// entries. Spec §4.F: symlinks are skipped rather than honored.
fn is_symlink(unix_mode: Option<u32>) -> bool {
    const S_IFLNK: u32 = 0o120000;
    matches!(unix_mode, Some(mode) if mode & 0o170000 == S_IFLNK)
}

fn extract_rar(archive_path: &Path, target: &Path) -> Result<()> {
    let listing = unrar::Archive::new(archive_path)
        .list()
        .map_err(|e| IngestError::UnsafeArchive(format!("cannot list rar archive: {e}")))?;

    let mut entry_count: usize = 0;
    let mut total_size: u64 = 0;

    for header in listing {
        let header =
            header.map_err(|e| IngestError::UnsafeArchive(format!("corrupt rar entry: {e}")))?;

        if header.is_directory() {
            continue;
        }

        entry_count += 1;
        if entry_count > MAX_ENTRY_COUNT {
            return Err(IngestError::UnsafeArchive(format!(
                "rar archive has more than {MAX_ENTRY_COUNT} entries"
            )));
        }

        total_size = total_size.saturating_add(header.unpacked_size);
        if total_size > MAX_TOTAL_SIZE {
            return Err(IngestError::UnsafeArchive(format!(
                "rar archive declared size exceeds {MAX_TOTAL_SIZE} bytes"
            )));
        }

        ingestor_pathguard::validate_safe_path(target, &header.filename)?;
    }

    let processor = unrar::Archive::new(archive_path)
        .extract_to(target)
        .map_err(|e| IngestError::UnsafeArchive(format!("cannot extract rar archive: {e}")))?;

    for header in processor {
        header.map_err(|e| IngestError::UnsafeArchive(format!("rar extraction failed: {e}")))?;
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use zip::write::{SimpleFileOptions, ZipWriter};
    use zip::CompressionMethod;

    fn build_zip(path: &Path, entries: &[(&str, &[u8])]) {
        let file = File::create(path).unwrap();
        let mut writer = ZipWriter::new(file);
        let options = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);
        for (name, contents) in entries {
            writer.start_file(*name, options).unwrap();
            writer.write_all(contents).unwrap();
        }
        writer.finish().unwrap();
    }

    #[test]
    fn extracts_nested_members_to_target() {
        let workdir = tempfile::tempdir().unwrap();
        let archive_path = workdir.path().join("sample.zip");
        build_zip(&archive_path, &[("notes/readme.txt", b"hello")]);

        let target = workdir.path().join("out");
        fs::create_dir_all(&target).unwrap();

        extract(&archive_path, &target).unwrap();

        let extracted = target.join("notes").join("readme.txt");
        assert_eq!(fs::read(extracted).unwrap(), b"hello");
    }

    #[test]
    fn rejects_traversal_member_before_writing_anything() {
        let workdir = tempfile::tempdir().unwrap();
        let archive_path = workdir.path().join("evil.zip");
        build_zip(
            &archive_path,
            &[("safe.txt", b"ok"), ("../../escape.txt", b"pwn")],
        );

        let target = workdir.path().join("out");
        fs::create_dir_all(&target).unwrap();

        let err = extract(&archive_path, &target).unwrap_err();
        assert!(matches!(err, IngestError::UnsafeArchive(_)) || matches!(err, IngestError::Traversal(_)));
        assert!(!target.join("safe.txt").exists());
    }

    #[test]
    fn rejects_entry_count_bomb() {
        let workdir = tempfile::tempdir().unwrap();
        let archive_path = workdir.path().join("bomb.zip");
        let entries: Vec<(String, Vec<u8>)> = (0..1001)
            .map(|i| (format!("file-{i}.txt"), b"x".to_vec()))
            .collect();
        let entry_refs: Vec<(&str, &[u8])> = entries.iter().map(|(n, c)| (n.as_str(), c.as_slice())).collect();
        build_zip(&archive_path, &entry_refs);

        let target = workdir.path().join("out");
        fs::create_dir_all(&target).unwrap();

        let err = extract(&archive_path, &target).unwrap_err();
        assert!(matches!(err, IngestError::UnsafeArchive(_)));
    }

    #[test]
    fn rejects_unsupported_suffix() {
        let workdir = tempfile::tempdir().unwrap();
        let archive_path = workdir.path().join("archive.tar.gz");
        fs::write(&archive_path, b"not really a tarball").unwrap();
        let target = workdir.path().join("out");
        fs::create_dir_all(&target).unwrap();

        let err = extract(&archive_path, &target).unwrap_err();
        assert!(matches!(err, IngestError::UnsupportedFormat(_)));
    }
}
