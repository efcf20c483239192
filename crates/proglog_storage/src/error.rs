//! Storage backend errors.

use std::io;
use thiserror::Error;

/// Result alias used by every backend operation.
pub type StorageResult<T> = Result<T, StorageError>;

/// Failure of a backend operation.
#[derive(Debug, Error)]
pub enum StorageError {
    /// The underlying file operation failed.
    #[error("storage I/O failed: {0}")]
    Io(#[from] io::Error),

    /// A read asked for bytes the backend does not hold.
    #[error("read of {len} bytes at {offset} runs past backend size {size}")]
    ReadPastEnd {
        /// First byte requested.
        offset: u64,
        /// Number of bytes requested.
        len: usize,
        /// Backend size at the time of the read.
        size: u64,
    },

    /// A truncation asked the backend to grow.
    #[error("cannot truncate {size}-byte backend to {requested} bytes")]
    TruncateBeyondEnd {
        /// Requested new size.
        requested: u64,
        /// Backend size at the time of the call.
        size: u64,
    },

    /// The handle no longer accepts writes.
    #[error("storage handle is closed")]
    Closed,
}

impl StorageError {
    /// Returns `true` for reads past the end of the backend.
    ///
    /// Recovery treats these as a short file rather than a hard failure.
    #[must_use]
    pub fn is_read_past_end(&self) -> bool {
        matches!(self, Self::ReadPastEnd { .. })
    }
}
