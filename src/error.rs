//! Centralized error types for mailvault.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// All errors produced by the mailvault library.
#[derive(Error, Debug)]
pub enum ArchiveError {
    /// I/O error with the associated file path.
    #[error("I/O error on '{path}': {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    /// The mailbox source does not exist.
    #[error("Mailbox not found: {0}")]
    MailboxNotFound(PathBuf),

    /// The mailbox exists but could not be read or parsed.
    #[error("Mailbox '{path}' is unreadable: {reason}")]
    MailboxUnreadable { path: PathBuf, reason: String },

    /// The privileged reader did not finish within its time limit.
    #[error("Privileged read of '{path}' timed out after {timeout:?}")]
    ReaderTimeout { path: PathBuf, timeout: Duration },

    /// The privileged reader exited with a non-zero status.
    #[error("Privileged read of '{path}' failed ({status}): {stderr}")]
    ReaderFailed {
        path: PathBuf,
        status: String,
        stderr: String,
    },

    /// The index file exists but is not a valid JSON index.
    #[error("Corrupt index '{path}': {reason}")]
    IndexParse { path: PathBuf, reason: String },

    /// Persisting the index failed; the previous index is untouched.
    #[error("Could not write index '{path}': {reason}")]
    IndexWrite { path: PathBuf, reason: String },

    /// A message's archive file could not be written.
    #[error("Could not write archive file '{path}': {source}")]
    ArchiveWrite {
        path: PathBuf,
        source: std::io::Error,
    },

    /// An attachment could not be stored.
    #[error("Could not store attachment '{path}': {reason}")]
    AttachmentWrite { path: PathBuf, reason: String },

    /// No index entry exists for the given key.
    #[error("Email ID '{0}' not found")]
    EntryNotFound(String),

    /// An update was requested with no fields to change.
    #[error("No updates provided; pass action_todo and/or action_taken")]
    NothingToUpdate,

    /// The configuration is inconsistent.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

/// Convenience alias for `Result<T, ArchiveError>`.
pub type Result<T> = std::result::Result<T, ArchiveError>;

impl ArchiveError {
    /// Create an `Io` variant from a path and an `io::Error`.
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }

    /// Whether this error means a mailbox source could not be scanned.
    pub fn is_mailbox_unreadable(&self) -> bool {
        matches!(
            self,
            Self::MailboxNotFound(_)
                | Self::MailboxUnreadable { .. }
                | Self::ReaderTimeout { .. }
                | Self::ReaderFailed { .. }
        )
    }
}

/// Allow `?` on `std::io::Error` when no path context is available
/// (rare, prefer `ArchiveError::io`).
impl From<std::io::Error> for ArchiveError {
    fn from(source: std::io::Error) -> Self {
        Self::Io {
            path: PathBuf::from("<unknown>"),
            source,
        }
    }
}
