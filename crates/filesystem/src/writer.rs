//! Buffered write handle.

use std::sync::Arc;

use rusty_gcsfs_common::{GcsError, GcsPath};
use rusty_gcsfs_storage::ResumableUpload;
use tracing::warn;

use crate::fs::FsShared;

/// Write handle for one object.
///
/// Appended bytes accumulate locally; `sync`, `flush`, or `close` runs
/// the resumable upload, replacing the whole object with the buffer and
/// producing a new generation. `close()` is the contract for
/// persisting: a handle dropped dirty only logs a warning, because
/// nothing can await inside drop.
pub struct GcsWriter {
    shared: Arc<FsShared>,
    path: GcsPath,
    uri: String,
    buffer: Vec<u8>,
    dirty: bool,
}

impl std::fmt::Debug for GcsWriter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GcsWriter")
            .field("path", &self.path)
            .field("uri", &self.uri)
            .field("buffer_len", &self.buffer.len())
            .field("dirty", &self.dirty)
            .finish()
    }
}

impl GcsWriter {
    /// A fresh handle is dirty even with an empty buffer: closing a
    /// never-appended writer still uploads, truncating the object.
    pub(crate) fn new(shared: Arc<FsShared>, path: GcsPath, initial: Vec<u8>) -> Self {
        let uri: String = path.to_uri();
        Self {
            shared,
            path,
            uri,
            buffer: initial,
            dirty: true,
        }
    }

    /// The full `gs://` URI this handle writes.
    pub fn uri(&self) -> &str {
        &self.uri
    }

    /// Current buffered length in bytes.
    pub fn tell(&self) -> u64 {
        self.buffer.len() as u64
    }

    /// Append bytes to the local buffer.
    pub fn append(&mut self, data: &[u8]) {
        self.buffer.extend_from_slice(data);
        self.dirty = true;
    }

    /// Upload the buffer when dirty; no-op otherwise.
    pub async fn flush(&mut self) -> Result<(), GcsError> {
        self.sync().await
    }

    /// Upload the buffer when dirty; no-op otherwise.
    pub async fn sync(&mut self) -> Result<(), GcsError> {
        if !self.dirty {
            return Ok(());
        }
        ResumableUpload::new(&self.shared.client, &self.path.bucket, &self.path.object)
            .run(&self.buffer)
            .await?;
        // Invalidate before reporting success so no reader can observe
        // pre-write cache state afterwards.
        self.shared.invalidate_file(&self.uri);
        self.dirty = false;
        Ok(())
    }

    /// Flush any dirty state and consume the handle.
    pub async fn close(mut self) -> Result<(), GcsError> {
        self.sync().await
    }
}

impl Drop for GcsWriter {
    fn drop(&mut self) {
        if self.dirty && !self.buffer.is_empty() {
            warn!(
                uri = %self.uri,
                buffered = self.buffer.len(),
                "write handle dropped with unflushed data; close() persists it"
            );
        }
    }
}
