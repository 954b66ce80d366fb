//! Filename sanitization and traversal-safe path validation (spec §4.B).
//!
//! Grounded in the teacher workspace's `vrift-config::path::is_within_directory`
//! (canonicalize both sides, then `starts_with`); extended here with a lexical
//! `..`/`.` resolution pass so a candidate path can be validated against an
//! extraction root before the member it names has been written to disk.

use ingestor_model::{IngestError, Result};
use std::path::{Component, Path, PathBuf};

const MAX_FILENAME_BYTES: usize = 255;

/// Sanitizes an untrusted filename (from a remote attachment or an archive
/// member) down to a safe, bounded string. Keeps ASCII alphanumerics,
/// `_`, `-`, `.`, and space; everything else becomes `_`. Falls back to
/// `"unnamed_file"` if sanitizing leaves nothing. Truncated to 255 bytes on
/// a UTF-8 boundary.
pub fn sanitize_filename(name: &str) -> String {
    let replaced: String = name
        .chars()
        .map(|c| if is_allowed(c) { c } else { '_' })
        .collect();

    let trimmed = replaced.trim();
    let safe = if trimmed.is_empty() { "unnamed_file" } else { trimmed };
    truncate_to_byte_limit(safe, MAX_FILENAME_BYTES)
}

fn is_allowed(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ' ')
}

fn truncate_to_byte_limit(s: &str, limit: usize) -> String {
    if s.len() <= limit {
        return s.to_string();
    }
    let mut end = limit;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    s[..end].to_string()
}

/// Resolves `relative` against `base_dir` and confirms it cannot escape
/// `base_dir`, without requiring `relative` to exist. `base_dir` must
/// already exist; archive members routinely don't. Rejects absolute member
/// paths outright; resolves `..`/`.` segments and symlinks in whatever
/// prefix of the joined path already exists on disk, then lexically
/// resolves the remaining (not-yet-extracted) suffix — so a symlink
/// planted by a malicious archive can't be used to dodge the check by
/// pointing an ancestor directory outside the root before the rest of the
/// path is written.
pub fn validate_safe_path(base_dir: &Path, relative: &Path) -> Result<PathBuf> {
    if relative.is_absolute() {
        return Err(IngestError::Traversal(format!(
            "archive member path is absolute: {}",
            relative.display()
        )));
    }

    let canonical_base = base_dir.canonicalize()?;
    let joined = canonical_base.join(relative);
    let resolved = best_effort_canonicalize(&joined)?;

    if resolved.starts_with(&canonical_base) {
        Ok(resolved)
    } else {
        Err(IngestError::Traversal(format!(
            "archive member escapes extraction directory: {}",
            relative.display()
        )))
    }
}

/// Canonicalizes the longest existing ancestor of `path` (resolving real
/// symlinks along the way) and lexically applies the remaining,
/// not-yet-existing components on top.
fn best_effort_canonicalize(path: &Path) -> Result<PathBuf> {
    let mut existing = path.to_path_buf();
    let mut pending: Vec<Component> = Vec::new();

    while !existing.exists() {
        let component = existing
            .file_name()
            .map(|_| existing.components().next_back().expect("non-empty path"));
        match (component, existing.parent()) {
            (Some(component), Some(parent)) if !parent.as_os_str().is_empty() => {
                pending.push(component);
                existing = parent.to_path_buf();
            }
            _ => break,
        }
    }

    let mut resolved = existing.canonicalize()?;
    for component in pending.into_iter().rev() {
        match component {
            Component::ParentDir => {
                resolved.pop();
            }
            Component::CurDir => {}
            other => resolved.push(other.as_os_str()),
        }
    }

    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sanitize_keeps_allowed_characters_untouched() {
        assert_eq!(sanitize_filename("report-final_v2.txt"), "report-final_v2.txt");
    }

    #[test]
    fn sanitize_replaces_disallowed_characters() {
        assert_eq!(sanitize_filename("../../etc/passwd"), ".._.._etc_passwd");
        assert_eq!(sanitize_filename("caf\u{e9}.zip"), "caf_.zip");
    }

    #[test]
    fn sanitize_falls_back_when_everything_is_stripped() {
        assert_eq!(sanitize_filename("\u{1f600}\u{1f600}"), "unnamed_file");
    }

    #[test]
    fn validate_resolves_symlink_in_existing_ancestor() {
        let dir = tempfile::tempdir().unwrap();
        let outside = tempfile::tempdir().unwrap();
        let root = dir.path().join("root");
        std::fs::create_dir(&root).unwrap();

        #[cfg(unix)]
        {
            let link = root.join("escape");
            std::os::unix::fs::symlink(outside.path(), &link).unwrap();
            let err = validate_safe_path(&root, Path::new("escape/payload.txt")).unwrap_err();
            assert!(matches!(err, IngestError::Traversal(_)));
        }
    }

    #[test]
    fn sanitize_truncates_to_255_bytes() {
        let long_name = "a".repeat(400);
        let sanitized = sanitize_filename(&long_name);
        assert_eq!(sanitized.len(), 255);
    }

    #[test]
    fn validate_accepts_simple_nested_member() {
        let dir = tempfile::tempdir().unwrap();
        let resolved = validate_safe_path(dir.path(), Path::new("sub/dir/file.txt")).unwrap();
        assert!(resolved.starts_with(dir.path().canonicalize().unwrap()));
    }

    #[test]
    fn validate_rejects_absolute_member_path() {
        let dir = tempfile::tempdir().unwrap();
        let err = validate_safe_path(dir.path(), Path::new("/etc/passwd")).unwrap_err();
        assert!(matches!(err, IngestError::Traversal(_)));
    }

    #[test]
    fn validate_rejects_parent_dir_escape() {
        let dir = tempfile::tempdir().unwrap();
        let err = validate_safe_path(dir.path(), Path::new("../../outside.txt")).unwrap_err();
        assert!(matches!(err, IngestError::Traversal(_)));
    }

    #[test]
    fn validate_rejects_escape_hidden_inside_nested_parent_dirs() {
        let dir = tempfile::tempdir().unwrap();
        let err =
            validate_safe_path(dir.path(), Path::new("sub/../../escape.txt")).unwrap_err();
        assert!(matches!(err, IngestError::Traversal(_)));
    }
}
