use async_trait::async_trait;
use ingestor_model::{FileRef, IngestError, RemoteKey, Result};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;
use tokio::sync::mpsc;

use crate::RemoteSource;

/// In-memory `RemoteSource` fake for pipeline tests (spec §9 "Dynamic
/// dispatch over external clients": production wires concrete adapters,
/// tests wire fakes).
pub struct FakeRemoteSource {
    connected: Mutex<bool>,
    channel_ids: HashMap<String, i64>,
    queued: Mutex<Vec<FileRef>>,
    contents: Mutex<HashMap<String, Vec<u8>>>,
}

impl FakeRemoteSource {
    pub fn new() -> Self {
        Self {
            connected: Mutex::new(false),
            channel_ids: HashMap::new(),
            queued: Mutex::new(Vec::new()),
            contents: Mutex::new(HashMap::new()),
        }
    }

    pub fn with_channel(mut self, name: impl Into<String>, id: i64) -> Self {
        self.channel_ids.insert(name.into(), id);
        self
    }

    /// Registers a `FileRef` to be pushed to the queue on the next
    /// [`RemoteSource::listen`] call, along with the bytes `download`
    /// should materialize at the destination path.
    pub fn enqueue(&self, file: FileRef, content: Vec<u8>) {
        self.contents
            .lock()
            .unwrap()
            .insert(file.remote_key.as_str().to_string(), content);
        self.queued.lock().unwrap().push(file);
    }
}

impl Default for FakeRemoteSource {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl RemoteSource for FakeRemoteSource {
    async fn connect(&self) -> Result<()> {
        *self.connected.lock().unwrap() = true;
        Ok(())
    }

    async fn disconnect(&self) -> Result<()> {
        *self.connected.lock().unwrap() = false;
        Ok(())
    }

    async fn resolve_channels(&self, names: &[String]) -> Result<Vec<i64>> {
        names
            .iter()
            .map(|name| {
                self.channel_ids
                    .get(name)
                    .copied()
                    .ok_or_else(|| IngestError::Config(format!("unknown fake channel: {name}")))
            })
            .collect()
    }

    async fn listen(&self, sender: mpsc::Sender<FileRef>, channel_ids: Vec<i64>) -> Result<()> {
        let queued = std::mem::take(&mut *self.queued.lock().unwrap());
        for file in queued {
            if !channel_ids.contains(&file.channel_id) {
                continue;
            }
            if sender.send(file).await.is_err() {
                return Ok(());
            }
        }
        Ok(())
    }

    async fn download(&self, remote_key: &RemoteKey, dest_path: &Path) -> Result<()> {
        let contents = self.contents.lock().unwrap();
        let bytes = contents
            .get(remote_key.as_str())
            .ok_or_else(|| IngestError::Download(format!("no fake content registered for {remote_key}")))?
            .clone();
        drop(contents);

        std::fs::write(dest_path, &bytes)?;
        Ok(())
    }
}
