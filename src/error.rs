// src/error.rs

//! Error types shared by the core, the daemon and the client

use crate::coordinator::ClientId;
use std::path::PathBuf;
use thiserror::Error;

/// Errors returned by lockmgr operations
#[derive(Error, Debug)]
pub enum Error {
    /// Caller tried to release or write without holding the lock
    #[error("client {client_id} does not hold the lock")]
    NotHolder { client_id: ClientId },

    /// Resource name failed validation; no I/O was attempted
    #[error("invalid resource name '{name}': {reason}")]
    InvalidResource { name: String, reason: String },

    /// Underlying filesystem operation failed
    #[error("failed to {op} {}: {source}", .path.display())]
    FileOperation {
        op: &'static str,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The single write call did not take the whole payload
    #[error("short write to {}: wrote {written} of {expected} bytes", .path.display())]
    ShortWrite {
        path: PathBuf,
        written: usize,
        expected: usize,
    },

    /// Invalid configuration
    #[error("configuration error: {0}")]
    Config(String),

    /// Connection or protocol failure talking to the daemon
    #[error("transport error: {0}")]
    Transport(String),

    /// Error reported by the daemon
    #[error("daemon error ({status}): {detail}")]
    Remote {
        kind: ErrorKind,
        status: u16,
        detail: String,
    },
}

/// Coarse classification that callers branch on
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Caller is not the lock holder
    Permission,
    /// Malformed or out-of-range resource name
    Validation,
    /// Storage failure (open, write, sync)
    Io,
    /// Bad configuration
    Config,
    /// Could not reach or understand the daemon
    Transport,
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NotHolder { .. } => ErrorKind::Permission,
            Error::InvalidResource { .. } => ErrorKind::Validation,
            Error::FileOperation { .. } | Error::ShortWrite { .. } => ErrorKind::Io,
            Error::Config(_) => ErrorKind::Config,
            Error::Transport(_) => ErrorKind::Transport,
            Error::Remote { kind, .. } => *kind,
        }
    }

    pub(crate) fn file_op(op: &'static str, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Error::FileOperation {
            op,
            path: path.into(),
            source,
        }
    }
}

/// Result type alias for lockmgr operations
pub type Result<T> = std::result::Result<T, Error>;
