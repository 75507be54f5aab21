//! Host interface receiving documents and checkpoints.

use crate::error::{SyncError, SyncResult};
use alfsync_protocol::DocumentDescriptor;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// The environment a [`SyncEngine`](crate::SyncEngine) runs in.
///
/// The host receives the dispatched documents and owns the persisted
/// checkpoint token.
pub trait SyncHost: Send + Sync {
    /// Ingests (creates or replaces) a document.
    fn upsert(&self, descriptor: &DocumentDescriptor) -> SyncResult<()>;

    /// Removes the document with the given uuid.
    fn delete(&self, uuid: &str) -> SyncResult<()>;

    /// Returns the token persisted by the previous run, if any.
    fn load_checkpoint(&self) -> SyncResult<Option<String>>;

    /// Persists the token for the next run.
    fn save_checkpoint(&self, token: &str) -> SyncResult<()>;
}

/// A single dispatch signal sent to a host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "action", rename_all = "lowercase")]
pub enum DispatchEvent {
    /// A document was ingested.
    Upsert(DocumentDescriptor),
    /// A document was removed.
    Delete {
        /// The removed document's uuid.
        uuid: String,
    },
}

/// An in-memory sync host for testing.
#[derive(Debug, Default)]
pub struct MemorySyncHost {
    checkpoint: RwLock<Option<String>>,
    events: RwLock<Vec<DispatchEvent>>,
}

impl MemorySyncHost {
    /// Creates a new memory sync host.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a host whose previous run persisted `token`.
    pub fn with_checkpoint(token: impl Into<String>) -> Self {
        let host = Self::default();
        *host.checkpoint.write() = Some(token.into());
        host
    }

    /// Gets all dispatch events in order.
    pub fn events(&self) -> Vec<DispatchEvent> {
        self.events.read().clone()
    }

    /// Gets the persisted token.
    pub fn checkpoint(&self) -> Option<String> {
        self.checkpoint.read().clone()
    }
}

impl SyncHost for MemorySyncHost {
    fn upsert(&self, descriptor: &DocumentDescriptor) -> SyncResult<()> {
        self.events
            .write()
            .push(DispatchEvent::Upsert(descriptor.clone()));
        Ok(())
    }

    fn delete(&self, uuid: &str) -> SyncResult<()> {
        self.events.write().push(DispatchEvent::Delete {
            uuid: uuid.to_string(),
        });
        Ok(())
    }

    fn load_checkpoint(&self) -> SyncResult<Option<String>> {
        Ok(self.checkpoint.read().clone())
    }

    fn save_checkpoint(&self, token: &str) -> SyncResult<()> {
        *self.checkpoint.write() = Some(token.to_string());
        Ok(())
    }
}

/// A host that writes dispatch events as JSON lines and keeps the
/// checkpoint token in a file.
///
/// # Example
///
/// ```ignore
/// let host = FileSyncHost::new("alfresco.checkpoint", std::io::stdout());
/// let engine = SyncEngine::new(config, feed, host);
/// engine.synchronize()?;
/// ```
pub struct FileSyncHost<W: Write + Send> {
    checkpoint_path: PathBuf,
    output: parking_lot::Mutex<W>,
}

impl<W: Write + Send> FileSyncHost<W> {
    /// Creates a host persisting its checkpoint at `checkpoint_path`.
    pub fn new(checkpoint_path: impl Into<PathBuf>, output: W) -> Self {
        Self {
            checkpoint_path: checkpoint_path.into(),
            output: parking_lot::Mutex::new(output),
        }
    }

    /// Returns the checkpoint file path.
    pub fn checkpoint_path(&self) -> &Path {
        &self.checkpoint_path
    }

    /// Consumes the host, returning the output writer.
    pub fn into_output(self) -> W {
        self.output.into_inner()
    }

    fn write_event(&self, event: &DispatchEvent) -> SyncResult<()> {
        let line = serde_json::to_string(event).map_err(|e| SyncError::Host(e.to_string()))?;
        let mut output = self.output.lock();
        writeln!(output, "{}", line)?;
        output.flush()?;
        Ok(())
    }
}

impl<W: Write + Send> SyncHost for FileSyncHost<W> {
    fn upsert(&self, descriptor: &DocumentDescriptor) -> SyncResult<()> {
        self.write_event(&DispatchEvent::Upsert(descriptor.clone()))
    }

    fn delete(&self, uuid: &str) -> SyncResult<()> {
        self.write_event(&DispatchEvent::Delete {
            uuid: uuid.to_string(),
        })
    }

    fn load_checkpoint(&self) -> SyncResult<Option<String>> {
        match fs::read_to_string(&self.checkpoint_path) {
            Ok(token) => Ok(Some(token.trim().to_string())),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn save_checkpoint(&self, token: &str) -> SyncResult<()> {
        // Write-then-rename keeps the token atomic
        let tmp = self.checkpoint_path.with_extension("tmp");
        fs::write(&tmp, token)?;
        fs::rename(&tmp, &self.checkpoint_path)?;
        Ok(())
    }
}
