use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of indicator of compromise extracted by the scanner (spec §4.G).
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum IndicatorKind {
    Domain,
    Email,
    Ipv4,
}

impl IndicatorKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            IndicatorKind::Domain => "domain",
            IndicatorKind::Email => "email",
            IndicatorKind::Ipv4 => "ipv4",
        }
    }
}

impl fmt::Display for IndicatorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Persistent record. Identity is the tuple (kind, value, source
/// fingerprint, source line) — stable under re-scan of the same source
/// (spec §3 invariants).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct Indicator {
    pub kind: IndicatorKind,
    pub value: String,
    pub source_fingerprint: String,
    pub source_relative_path: String,
    pub source_line: i64,
    pub channel_id: i64,
    pub first_seen_at: DateTime<Utc>,
    pub last_seen_at: DateTime<Utc>,
}

impl Indicator {
    pub fn new(
        kind: IndicatorKind,
        value: impl Into<String>,
        source_fingerprint: impl Into<String>,
        source_relative_path: impl Into<String>,
        source_line: i64,
        channel_id: i64,
    ) -> Self {
        let now = Utc::now();
        Self {
            kind,
            value: value.into(),
            source_fingerprint: source_fingerprint.into(),
            source_relative_path: source_relative_path.into(),
            source_line,
            channel_id,
            first_seen_at: now,
            last_seen_at: now,
        }
    }
}
