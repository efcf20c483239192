//! Error types for the log engine.

use std::io;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in log operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Storage backend error.
    #[error("storage error: {0}")]
    Storage(#[from] proglog_storage::StorageError),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// No segment holds the requested offset, or its index has no entry for it.
    #[error("offset out of range: {offset}")]
    OffsetNotFound {
        /// The offset that was requested.
        offset: u64,
    },

    /// The index cannot take another entry.
    ///
    /// The log consumes this by rolling over to a new segment.
    #[error("index full: no room for another entry within {max_bytes} bytes")]
    IndexFull {
        /// Configured maximum index size.
        max_bytes: u64,
    },

    /// An index entry was requested that has not been written.
    #[error("index entry {entry} out of range: index holds {entries} entries")]
    IndexOutOfRange {
        /// The requested entry number.
        entry: u64,
        /// Number of entries currently in the index.
        entries: u64,
    },

    /// Segment files are inconsistent in a way recovery cannot repair.
    #[error("log corrupted: {message}")]
    Corrupted {
        /// Description of the corruption.
        message: String,
    },

    /// Configuration values cannot produce a working log.
    #[error("invalid configuration: {message}")]
    InvalidConfig {
        /// Description of the problem.
        message: String,
    },

    /// Another process holds the log directory.
    #[error("log locked: another process has exclusive access")]
    LogLocked,
}

impl CoreError {
    /// Creates an offset not found error.
    pub fn offset_not_found(offset: u64) -> Self {
        Self::OffsetNotFound { offset }
    }

    /// Creates a corruption error.
    pub fn corrupted(message: impl Into<String>) -> Self {
        Self::Corrupted {
            message: message.into(),
        }
    }

    /// Creates an invalid configuration error.
    pub fn invalid_config(message: impl Into<String>) -> Self {
        Self::InvalidConfig {
            message: message.into(),
        }
    }

    /// Returns `true` if the error means the offset is simply not in the log.
    ///
    /// Front ends map this to a "not found" response instead of an internal
    /// error.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::OffsetNotFound { .. })
    }
}
