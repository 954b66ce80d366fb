use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Composite remote identity: `{channel_id}_{message_id}_{document_id}`.
///
/// Sufficient on its own to answer "already processed?" via a single
/// indexed lookup (spec §3 invariants).
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
pub struct RemoteKey(String);

impl RemoteKey {
    pub fn new(channel_id: i64, message_id: i64, document_id: i64) -> Self {
        Self(format!("{channel_id}_{message_id}_{document_id}"))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Recovers the channel and message id so the original message can be
    /// refetched (spec §4.I step 4). The document id is not needed for that.
    pub fn parse_channel_and_message(&self) -> Option<(i64, i64)> {
        let mut parts = self.0.split('_');
        let channel_id = parts.next()?.parse().ok()?;
        let message_id = parts.next()?.parse().ok()?;
        Some((channel_id, message_id))
    }
}

impl fmt::Display for RemoteKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<String> for RemoteKey {
    fn from(value: String) -> Self {
        Self(value)
    }
}

/// Immutable event describing a candidate archive surfaced by a
/// `RemoteSource`. Created on message receipt; consumed by the pipeline.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct FileRef {
    pub remote_key: RemoteKey,
    pub channel_id: i64,
    pub channel_title: String,
    pub filename: String,
    pub size_bytes: u64,
    pub timestamp: DateTime<Utc>,
}

impl FileRef {
    pub fn is_supported_archive(&self, max_size_bytes: u64) -> bool {
        if self.size_bytes > max_size_bytes {
            return false;
        }
        let lower = self.filename.to_lowercase();
        lower.ends_with(".zip") || lower.ends_with(".rar")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn remote_key_round_trips() {
        let key = RemoteKey::new(-100123, 456, 789);
        assert_eq!(key.as_str(), "-100123_456_789");
        assert_eq!(key.parse_channel_and_message(), Some((-100123, 456)));
    }

    #[test]
    fn archive_filter_rejects_oversized_and_non_archives() {
        let base = FileRef {
            remote_key: RemoteKey::new(1, 2, 3),
            channel_id: 1,
            channel_title: "chan".into(),
            filename: "dump.zip".into(),
            size_bytes: 10,
            timestamp: Utc::now(),
        };
        assert!(base.is_supported_archive(100));
        assert!(!base.is_supported_archive(5));

        let not_archive = FileRef {
            filename: "dump.txt".into(),
            ..base
        };
        assert!(!not_archive.is_supported_archive(100));
    }
}
