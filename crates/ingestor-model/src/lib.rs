//! Shared domain types for the archive ingestion pipeline: the remote
//! file event (`FileRef`), the mutable per-attempt record (`Job`), the two
//! persistent record shapes (`ProcessedFile`, `Indicator`), and the error
//! taxonomy every other crate in the workspace converges on.

mod error;
mod file_ref;
mod indicator;
mod job;
mod processed_file;

pub use error::{IngestError, Result};
pub use file_ref::{FileRef, RemoteKey};
pub use indicator::{Indicator, IndicatorKind};
pub use job::{Job, JobId, JobStatus};
pub use processed_file::ProcessedFile;
