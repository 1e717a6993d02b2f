// src/sink.rs
//
// Destinations for committed event lines.
// The writer is the only caller, so sinks take `&mut self` and need no locking
// of their own.

use async_trait::async_trait;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tokio::io::AsyncWriteExt;

use crate::error::SinkError;

#[async_trait]
pub trait EventSink: Send {
    /// Persist one record line (no trailing newline).
    async fn write_line(&mut self, line: &str) -> Result<(), SinkError>;

    /// Release the destination. Called once by the writer on exit.
    async fn close(&mut self) {}

    /// Human-readable destination, for log lines and the banner
    fn describe(&self) -> String;
}

// ============================================================================
// File Sink
// ============================================================================

/// Appends records to a text file, flushing after every line so a crash
/// loses at most the line in flight.
///
/// The file is opened lazily. After a failed write the handle is dropped and
/// the next line reopens the file, so a transient failure (full disk, removed
/// mount) costs only the lines written while it lasted.
pub struct FileSink {
    path: PathBuf,
    file: Option<tokio::fs::File>,
}

impl FileSink {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        FileSink {
            path: path.into(),
            file: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn open(&self) -> Result<tokio::fs::File, SinkError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                tokio::fs::create_dir_all(parent)
                    .await
                    .map_err(|source| SinkError::Open {
                        path: self.path.display().to_string(),
                        source,
                    })?;
            }
        }
        tokio::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .await
            .map_err(|source| SinkError::Open {
                path: self.path.display().to_string(),
                source,
            })
    }
}

#[async_trait]
impl EventSink for FileSink {
    async fn write_line(&mut self, line: &str) -> Result<(), SinkError> {
        let mut file = match self.file.take() {
            Some(file) => file,
            None => self.open().await?,
        };

        let mut buf = Vec::with_capacity(line.len() + 1);
        buf.extend_from_slice(line.as_bytes());
        buf.push(b'\n');

        let result = async {
            file.write_all(&buf).await?;
            file.flush().await
        }
        .await;

        // A failed handle is dropped here and the next line reopens the file
        result.map_err(SinkError::Write)?;
        self.file = Some(file);
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(mut file) = self.file.take() {
            if let Err(e) = file.sync_all().await {
                tlog!("[Sink] Failed to sync {}: {}", self.path.display(), e);
            }
        }
    }

    fn describe(&self) -> String {
        self.path.display().to_string()
    }
}

// ============================================================================
// Memory Sink
// ============================================================================

/// Keeps lines in memory. Clones share the same buffer, so a caller can keep
/// one half and hand the other to the writer.
#[derive(Clone, Default)]
pub struct MemorySink {
    lines: Arc<Mutex<Vec<String>>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of everything written so far
    pub fn lines(&self) -> Vec<String> {
        self.lines.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

#[async_trait]
impl EventSink for MemorySink {
    async fn write_line(&mut self, line: &str) -> Result<(), SinkError> {
        self.lines
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(line.to_string());
        Ok(())
    }

    fn describe(&self) -> String {
        "memory".to_string()
    }
}
