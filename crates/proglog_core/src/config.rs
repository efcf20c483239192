//! Log configuration.

use crate::error::{CoreError, CoreResult};
use crate::index::ENTRY_WIDTH;

/// Configuration for opening a log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Store size in bytes at which a segment is considered full.
    pub max_store_bytes: u64,

    /// Index size in bytes at which a segment is considered full.
    ///
    /// Index files are pre-allocated to this size while open.
    pub max_index_bytes: u64,

    /// Offset assigned to the first record of a brand-new log.
    pub initial_offset: u64,

    /// Whether to create the log directory if it doesn't exist.
    pub create_if_missing: bool,

    /// Whether to fsync the active segment after every append.
    pub sync_on_append: bool,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_store_bytes: 1024 * 1024 * 1024, // 1 GiB
            max_index_bytes: 10 * 1024 * 1024,   // 10 MiB
            initial_offset: 0,
            create_if_missing: true,
            sync_on_append: false,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the per-segment store size cap.
    #[must_use]
    pub const fn max_store_bytes(mut self, size: u64) -> Self {
        self.max_store_bytes = size;
        self
    }

    /// Sets the per-segment index size cap.
    #[must_use]
    pub const fn max_index_bytes(mut self, size: u64) -> Self {
        self.max_index_bytes = size;
        self
    }

    /// Sets the first offset of a brand-new log.
    #[must_use]
    pub const fn initial_offset(mut self, offset: u64) -> Self {
        self.initial_offset = offset;
        self
    }

    /// Sets whether to create the log directory if missing.
    #[must_use]
    pub const fn create_if_missing(mut self, value: bool) -> Self {
        self.create_if_missing = value;
        self
    }

    /// Sets whether to fsync after every append.
    #[must_use]
    pub const fn sync_on_append(mut self, value: bool) -> Self {
        self.sync_on_append = value;
        self
    }

    /// Checks that the caps can hold at least one record per segment.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidConfig`] if `max_store_bytes` is zero or
    /// `max_index_bytes` is smaller than one index entry.
    pub fn validate(&self) -> CoreResult<()> {
        if self.max_store_bytes == 0 {
            return Err(CoreError::invalid_config("max_store_bytes must be non-zero"));
        }
        if self.max_index_bytes < ENTRY_WIDTH {
            return Err(CoreError::invalid_config(format!(
                "max_index_bytes must hold at least one {ENTRY_WIDTH}-byte entry, got {}",
                self.max_index_bytes
            )));
        }
        Ok(())
    }
}
