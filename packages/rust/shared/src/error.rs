//! Error types for kbsync.
//!
//! Library crates use [`KbSyncError`] via `thiserror`.
//! The CLI wraps this with `color-eyre` for rich diagnostics.

use std::path::PathBuf;

/// Top-level error type for all kbsync operations.
#[derive(Debug, thiserror::Error)]
pub enum KbSyncError {
    /// Configuration loading or validation error.
    #[error("config error: {message}")]
    Config { message: String },

    /// A remote call did not complete (connect, timeout, body read).
    #[error("transport error: {0}")]
    Transport(String),

    /// The remote service answered with a structured error payload.
    #[error("remote error (HTTP {status}): {message}")]
    Remote { status: u16, message: String },

    /// No category could be found for a procedure's parent directory.
    #[error("unresolved parent category for {path}")]
    UnresolvedParent { path: String },

    /// Filesystem I/O error.
    #[error("I/O error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// Malformed input (change list, URL, response shape, ...).
    #[error("validation error: {message}")]
    Validation { message: String },

    /// The git subprocess failed or produced unusable output.
    #[error("git error: {0}")]
    Git(String),
}

/// Convenience alias used throughout the codebase.
pub type Result<T> = std::result::Result<T, KbSyncError>;

impl KbSyncError {
    /// Create a config error from any displayable message.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config {
            message: msg.into(),
        }
    }

    /// Create a validation error from any displayable message.
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation {
            message: msg.into(),
        }
    }

    /// Create a remote error from a status code and message.
    pub fn remote(status: u16, msg: impl Into<String>) -> Self {
        Self::Remote {
            status,
            message: msg.into(),
        }
    }

    /// Wrap a `std::io::Error` with a path for context.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}
