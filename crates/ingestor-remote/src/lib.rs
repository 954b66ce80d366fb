//! Remote chat source contract (spec §4.H): the only thing the pipeline
//! depends on is this trait. Production wires [`TelegramSource`]; tests
//! wire [`FakeRemoteSource`].

mod fake;
mod telegram;

pub use fake::FakeRemoteSource;
pub use telegram::TelegramSource;

use async_trait::async_trait;
use ingestor_model::{FileRef, RemoteKey, Result};
use std::path::Path;
use tokio::sync::mpsc;

/// Subscribes to chat channels and fetches archive attachments by remote
/// reference. Thin and contract-only (spec §1 "out of scope", §4.H):
/// the core pipeline never depends on a concrete chat SDK, only on this.
#[async_trait]
pub trait RemoteSource: Send + Sync {
    /// Session setup. Idempotent: calling twice while already connected is
    /// a no-op.
    async fn connect(&self) -> Result<()>;

    /// Session teardown. Safe to call when not connected.
    async fn disconnect(&self) -> Result<()>;

    /// Maps configured channel names to opaque numeric ids.
    async fn resolve_channels(&self, names: &[String]) -> Result<Vec<i64>>;

    /// Subscribes to new-message events on `channel_ids`, pushing a
    /// [`FileRef`] onto `sender` for every qualifying archive attachment.
    /// Runs until the underlying session disconnects or is cancelled by
    /// the caller dropping the future.
    async fn listen(&self, sender: mpsc::Sender<FileRef>, channel_ids: Vec<i64>) -> Result<()>;

    /// Re-fetches the message named by `remote_key` and downloads its
    /// document to `dest_path`, validating the resulting byte length
    /// against the declared size (spec §4.H `download`).
    async fn download(&self, remote_key: &RemoteKey, dest_path: &Path) -> Result<()>;
}
