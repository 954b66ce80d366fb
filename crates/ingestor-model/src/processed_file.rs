use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Persistent record of a file that has reached stage 7 of the pipeline
/// (spec §3, §4.D). Primary identity is the remote file key; reappearance
/// of the same key touches `last_seen_at` rather than inserting a new row.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ProcessedFile {
    pub remote_key: String,
    pub channel_id: i64,
    pub channel_title: String,
    pub filename: String,
    pub size_bytes: i64,
    pub fingerprint: String,
    pub storage_path: String,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}
