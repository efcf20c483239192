//! The byte-level backend a store writes through.

use crate::error::StorageResult;

/// An append-only byte sink with positional reads.
///
/// A backend knows nothing about records, length prefixes or offsets; it
/// hands out byte positions and returns bytes. Implementations:
///
/// - [`crate::FileBackend`]: buffered file, the production backend
/// - [`crate::InMemoryBackend`]: heap buffer for tests
///
/// # Contract
///
/// - `append` returns the position of the first byte written, which always
///   equals `size()` just before the call.
/// - `read_at` sees every earlier `append`, including bytes an
///   implementation still holds in a write buffer.
/// - After `sync` returns, every earlier `append` survives a crash.
pub trait StorageBackend: Send + Sync {
    /// Returns `len` bytes starting at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::ReadPastEnd`] if the range ends past
    /// `size()`, or an I/O error.
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>>;

    /// Appends `data` and returns the position it starts at.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the write fails.
    fn append(&mut self, data: &[u8]) -> StorageResult<u64>;

    /// Hands buffered bytes to the operating system without syncing.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the flush fails.
    fn flush(&mut self) -> StorageResult<()>;

    /// Returns the logical size, i.e. the position of the next append.
    ///
    /// # Errors
    ///
    /// Returns an error if the size cannot be determined.
    fn size(&self) -> StorageResult<u64>;

    /// Flushes, then makes every appended byte durable.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the flush or sync fails.
    fn sync(&mut self) -> StorageResult<()>;

    /// Drops every byte at or after `new_size`.
    ///
    /// Recovery uses this to cut a torn record off the end of a store.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StorageError::TruncateBeyondEnd`] if `new_size` is
    /// larger than the current size, or an I/O error.
    fn truncate(&mut self, new_size: u64) -> StorageResult<()>;
}
