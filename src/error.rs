// src/error.rs
//
// Error types for the tap.
// Per-port faults (LinkError) stay inside the reader that hit them; only
// TapError reaches the owning process.

use thiserror::Error;

/// Process-level failures. Anything here ends the run with a non-zero status.
#[derive(Debug, Error)]
pub enum TapError {
    #[error("no serial ports configured")]
    NoPorts,

    #[error("none of the {count} configured ports could be opened")]
    AllPortsFailed { count: usize },

    #[error("configuration error: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

/// Per-port link failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum LinkError {
    /// Device missing, busy or not permitted. Retried by the reconnect loop.
    #[error("port unavailable: {0}")]
    Unavailable(String),

    /// The port rejected its settings (bad baud, unsupported framing).
    /// Fatal when it happens on the first open attempt.
    #[error("port misconfigured: {0}")]
    Misconfigured(String),

    /// Read failed on an open port.
    #[error("read error: {0}")]
    Io(String),
}

impl LinkError {
    pub fn is_misconfiguration(&self) -> bool {
        matches!(self, LinkError::Misconfigured(_))
    }
}

#[cfg(any(target_os = "windows", target_os = "macos", target_os = "linux"))]
impl From<serialport::Error> for LinkError {
    fn from(e: serialport::Error) -> Self {
        match e.kind() {
            serialport::ErrorKind::InvalidInput => LinkError::Misconfigured(e.description),
            serialport::ErrorKind::NoDevice | serialport::ErrorKind::Unknown => {
                LinkError::Unavailable(e.description)
            }
            serialport::ErrorKind::Io(std::io::ErrorKind::PermissionDenied)
            | serialport::ErrorKind::Io(std::io::ErrorKind::NotFound) => {
                LinkError::Unavailable(e.description)
            }
            serialport::ErrorKind::Io(_) => LinkError::Io(e.description),
        }
    }
}

impl From<std::io::Error> for LinkError {
    fn from(e: std::io::Error) -> Self {
        LinkError::Io(e.to_string())
    }
}

/// Sink write failures. Logged by the writer, never fatal.
#[derive(Debug, Error)]
pub enum SinkError {
    #[error("failed to open sink {path}: {source}")]
    Open {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to write sink: {0}")]
    Write(#[from] std::io::Error),
}
