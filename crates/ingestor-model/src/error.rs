use thiserror::Error;

/// Shared error taxonomy (spec §7). Each crate's narrower error type
/// (`CasError`, `ExtractError`, `RemoteError`, `RepositoryError`) converts
/// into this at the pipeline boundary via `From`.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("{0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Integrity(String),

    #[error("{0}")]
    UnsafeArchive(String),

    #[error("{0}")]
    UnsupportedFormat(String),

    #[error("{0}")]
    Traversal(String),

    #[error("repository not connected")]
    NotConnected,

    #[error("{0}")]
    Transient(String),

    #[error("{0}")]
    Constraint(String),

    #[error("{0}")]
    Config(String),

    #[error("{0}")]
    Download(String),

    #[error("cancelled")]
    Cancelled,
}

impl IngestError {
    /// Short tag used to build the `"<kind>: <message>"` job error column
    /// (spec §4.I step 9, §7).
    pub fn kind_str(&self) -> &'static str {
        match self {
            IngestError::Io(_) => "IoError",
            IngestError::Integrity(_) => "IntegrityError",
            IngestError::UnsafeArchive(_) => "UnsafeArchive",
            IngestError::UnsupportedFormat(_) => "UnsupportedFormat",
            IngestError::Traversal(_) => "TraversalError",
            IngestError::NotConnected => "NotConnected",
            IngestError::Transient(_) => "TransientError",
            IngestError::Constraint(_) => "ConstraintError",
            IngestError::Config(_) => "ConfigError",
            IngestError::Download(_) => "DownloadError",
            IngestError::Cancelled => "Cancelled",
        }
    }

    /// Is this a cancellation, which must propagate rather than be recorded
    /// as FAILED (spec §7 Propagation)?
    pub fn is_cancellation(&self) -> bool {
        matches!(self, IngestError::Cancelled)
    }

    /// Builds the `processing_jobs.error` column value, truncated to 200
    /// chars (spec §4.I step 9).
    pub fn to_job_error(&self) -> String {
        let combined = format!("{}: {}", self.kind_str(), self);
        if combined.chars().count() > 200 {
            combined.chars().take(200).collect()
        } else {
            combined
        }
    }
}

pub type Result<T> = std::result::Result<T, IngestError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn job_error_is_truncated_to_200_chars() {
        let long = "x".repeat(500);
        let err = IngestError::Integrity(long);
        let rendered = err.to_job_error();
        assert_eq!(rendered.chars().count(), 200);
        assert!(rendered.starts_with("IntegrityError: "));
    }

    #[test]
    fn cancellation_is_flagged() {
        assert!(IngestError::Cancelled.is_cancellation());
        assert!(!IngestError::NotConnected.is_cancellation());
    }
}
