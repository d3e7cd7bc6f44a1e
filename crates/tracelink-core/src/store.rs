//! Append-only trace persistence.

use std::path::{Path, PathBuf};

use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;

use crate::error::StorageError;

/// Appends received frames to a trace file, byte-for-byte.
///
/// Frames are written exactly as they arrived (never re-encoded), one
/// complete frame per [`append`](Self::append) call, so a reader of the
/// file at any instant sees only whole frames. The file handle is owned
/// exclusively by the ingestion task; nothing else writes to it.
#[derive(Debug)]
pub struct TraceWriter {
    file: File,
    path: PathBuf,
    frames_written: u64,
}

impl TraceWriter {
    /// Open (or create) the trace file for appending.
    pub async fn create(path: impl AsRef<Path>) -> Result<Self, StorageError> {
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .append(true)
            .create(true)
            .open(&path)
            .await
            .map_err(|source| StorageError::Open { path: path.clone(), source })?;
        Ok(Self { file, path, frames_written: 0 })
    }

    /// Append one complete frame.
    pub async fn append(&mut self, frame: &[u8]) -> Result<(), StorageError> {
        self.file
            .write_all(frame)
            .await
            .map_err(|source| StorageError::Write { path: self.path.clone(), source })?;
        self.frames_written += 1;
        Ok(())
    }

    /// Flush, sync and release the file.
    pub async fn close(mut self) -> Result<(), StorageError> {
        self.file
            .flush()
            .await
            .map_err(|source| StorageError::Flush { path: self.path.clone(), source })?;
        self.file
            .sync_all()
            .await
            .map_err(|source| StorageError::Flush { path: self.path.clone(), source })
    }

    /// Frames appended so far.
    pub fn frames_written(&self) -> u64 {
        self.frames_written
    }

    /// Path of the trace file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}
