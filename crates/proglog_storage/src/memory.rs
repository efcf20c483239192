//! Heap-backed storage for tests.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};

/// A backend that keeps its bytes in a `Vec<u8>`.
///
/// Nothing is buffered, so `flush` is a no-op. `sync` only bumps a counter
/// that tests can read back through [`InMemoryBackend::sync_count`].
///
/// ```rust
/// use proglog_storage::{InMemoryBackend, StorageBackend};
///
/// let mut backend = InMemoryBackend::new();
/// assert_eq!(backend.append(b"abc").unwrap(), 0);
/// assert_eq!(backend.append(b"de").unwrap(), 3);
/// assert_eq!(backend.read_at(2, 2).unwrap(), b"cd");
/// ```
#[derive(Debug, Default)]
pub struct InMemoryBackend {
    bytes: RwLock<Vec<u8>>,
    syncs: AtomicUsize,
}

impl InMemoryBackend {
    /// Creates an empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a backend that already holds `bytes`, as if reopened.
    #[must_use]
    pub fn with_data(bytes: Vec<u8>) -> Self {
        Self {
            bytes: RwLock::new(bytes),
            ..Self::default()
        }
    }

    /// Returns a copy of the stored bytes.
    #[must_use]
    pub fn data(&self) -> Vec<u8> {
        self.bytes.read().clone()
    }

    /// Returns how many times `sync` has been called.
    #[must_use]
    pub fn sync_count(&self) -> usize {
        self.syncs.load(Ordering::Relaxed)
    }
}

impl StorageBackend for InMemoryBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let bytes = self.bytes.read();
        let size = bytes.len() as u64;
        let end = offset.saturating_add(len as u64);
        if end > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }
        Ok(bytes[offset as usize..end as usize].to_vec())
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let bytes = self.bytes.get_mut();
        let at = bytes.len() as u64;
        bytes.extend_from_slice(data);
        Ok(at)
    }

    fn flush(&mut self) -> StorageResult<()> {
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.bytes.read().len() as u64)
    }

    fn sync(&mut self) -> StorageResult<()> {
        self.syncs.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let bytes = self.bytes.get_mut();
        let size = bytes.len() as u64;
        if new_size > size {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size,
            });
        }
        bytes.truncate(new_size as usize);
        Ok(())
    }
}
