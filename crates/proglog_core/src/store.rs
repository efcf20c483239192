//! Record store: length-prefixed records in one backend.
//!
//! ## Store Record Format
//!
//! ```text
//! | length (8, big-endian) | payload (length) |
//! ```
//!
//! Records are written back to back with no padding. The store knows
//! nothing about offsets; callers address records by the byte position of
//! their length prefix.

use crate::error::{CoreError, CoreResult};
use parking_lot::Mutex;
use proglog_storage::{FileBackend, StorageBackend, StorageError};
use std::path::Path;

/// Width of the length prefix in front of every record.
pub const LEN_WIDTH: u64 = 8;

/// Append-only store of length-prefixed records.
///
/// One mutex serializes appends, reads, and flushes, so positions handed
/// out by [`Store::append`] are strictly increasing and every read sees all
/// earlier appends.
pub struct Store {
    backend: Mutex<Box<dyn StorageBackend>>,
}

impl Store {
    /// Creates a store over an existing backend.
    ///
    /// The backend's current size is where the next record goes.
    pub fn new(backend: Box<dyn StorageBackend>) -> Self {
        Self {
            backend: Mutex::new(backend),
        }
    }

    /// Opens or creates a file-backed store.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path) -> CoreResult<Self> {
        let backend = FileBackend::open(path)?;
        Ok(Self::new(Box::new(backend)))
    }

    /// Appends a record.
    ///
    /// Returns the total number of bytes written (prefix plus payload) and
    /// the position of the record's length prefix.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend write fails.
    pub fn append(&self, record: &[u8]) -> CoreResult<(u64, u64)> {
        let mut frame = Vec::with_capacity(LEN_WIDTH as usize + record.len());
        frame.extend_from_slice(&(record.len() as u64).to_be_bytes());
        frame.extend_from_slice(record);

        let mut backend = self.backend.lock();
        let position = backend.append(&frame)?;

        Ok((frame.len() as u64, position))
    }

    /// Reads the record whose length prefix starts at `position`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::Storage`] if `position` is out of range or the
    /// record runs past the end of the store.
    pub fn read(&self, position: u64) -> CoreResult<Vec<u8>> {
        let backend = self.backend.lock();

        let len = read_len(&**backend, position)?;
        let len = usize::try_from(len).map_err(|_| {
            CoreError::corrupted(format!("record at {position} too large: {len} bytes"))
        })?;

        Ok(backend.read_at(position + LEN_WIDTH, len)?)
    }

    /// Reads raw store bytes at `offset` into `buf`.
    ///
    /// Returns the number of bytes read, which is less than `buf.len()` only
    /// when the store ends first.
    ///
    /// # Errors
    ///
    /// Returns an error if `offset` is past the end of the store.
    pub fn read_at(&self, buf: &mut [u8], offset: u64) -> CoreResult<usize> {
        let backend = self.backend.lock();
        let size = backend.size()?;

        if offset > size {
            return Err(StorageError::ReadPastEnd {
                offset,
                len: buf.len(),
                size,
            }
            .into());
        }

        let n = (buf.len() as u64).min(size - offset) as usize;
        let data = backend.read_at(offset, n)?;
        buf[..n].copy_from_slice(&data);

        Ok(n)
    }

    /// Returns the logical size of the store, buffered bytes included.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot report its size.
    pub fn size(&self) -> CoreResult<u64> {
        Ok(self.backend.lock().size()?)
    }

    /// Returns the position just past the record starting at `position`.
    ///
    /// Returns `None` if the record is torn, i.e. its prefix or payload runs
    /// past the end of the store.
    pub(crate) fn record_end(&self, position: u64) -> CoreResult<Option<u64>> {
        let backend = self.backend.lock();
        let size = backend.size()?;
        if position.saturating_add(LEN_WIDTH) > size {
            return Ok(None);
        }

        let len = read_len(&**backend, position)?;
        let end = position
            .checked_add(LEN_WIDTH)
            .and_then(|p| p.checked_add(len))
            .filter(|end| *end <= size);
        Ok(end)
    }

    /// Cuts the store back to `size` bytes.
    pub(crate) fn truncate(&self, size: u64) -> CoreResult<()> {
        self.backend.lock().truncate(size)?;
        Ok(())
    }

    /// Flushes buffered records and syncs them to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush or sync fails.
    pub fn sync(&self) -> CoreResult<()> {
        self.backend.lock().sync()?;
        Ok(())
    }

    /// Persists buffered records ahead of releasing the store.
    ///
    /// The underlying handle is released when the store is dropped. Closing
    /// twice is harmless.
    ///
    /// # Errors
    ///
    /// Returns an error if the flush or sync fails.
    pub fn close(&self) -> CoreResult<()> {
        self.sync()
    }
}

impl std::fmt::Debug for Store {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Store")
            .field("size", &self.size().ok())
            .finish_non_exhaustive()
    }
}

fn read_len(backend: &dyn StorageBackend, position: u64) -> CoreResult<u64> {
    let prefix = backend.read_at(position, LEN_WIDTH as usize)?;
    let mut len = [0u8; LEN_WIDTH as usize];
    len.copy_from_slice(&prefix);
    Ok(u64::from_be_bytes(len))
}

#[cfg(test)]
mod tests {
    use super::*;
    use proglog_storage::InMemoryBackend;
    use std::sync::Arc;
    use std::thread;
    use tempfile::tempdir;

    const WRITE: &[u8] = b"hello world";
    const WIDTH: u64 = WRITE.len() as u64 + LEN_WIDTH;

    fn memory_store() -> Store {
        Store::new(Box::new(InMemoryBackend::new()))
    }

    #[test]
    fn append_returns_width_and_position() {
        let store = memory_store();

        for i in 0..3u64 {
            let (n, pos) = store.append(WRITE).unwrap();
            assert_eq!(n, WIDTH);
            assert_eq!(pos, WIDTH * i);
        }
        assert_eq!(store.size().unwrap(), WIDTH * 3);
    }

    #[test]
    fn read_returns_each_record() {
        let store = memory_store();
        let (_, first) = store.append(b"first").unwrap();
        let (_, second) = store.append(b"").unwrap();
        let (_, third) = store.append(b"third record").unwrap();

        assert_eq!(store.read(first).unwrap(), b"first");
        assert!(store.read(second).unwrap().is_empty());
        assert_eq!(store.read(third).unwrap(), b"third record");
    }

    #[test]
    fn length_prefix_is_big_endian() {
        let mut store_backend: Box<dyn StorageBackend> = Box::new(InMemoryBackend::new());
        store_backend.append(&[0, 0, 0, 0, 0, 0, 0, 3, b'a', b'b', b'c']).unwrap();

        let store = Store::new(store_backend);
        assert_eq!(store.read(0).unwrap(), b"abc");
    }

    #[test]
    fn read_at_returns_raw_bytes() {
        let store = memory_store();
        store.append(WRITE).unwrap();

        let mut prefix = [0u8; LEN_WIDTH as usize];
        let n = store.read_at(&mut prefix, 0).unwrap();
        assert_eq!(n, LEN_WIDTH as usize);
        assert_eq!(u64::from_be_bytes(prefix), WRITE.len() as u64);

        let mut payload = vec![0u8; 64];
        let n = store.read_at(&mut payload, LEN_WIDTH).unwrap();
        assert_eq!(&payload[..n], WRITE);
    }

    #[test]
    fn read_out_of_range_fails() {
        let store = memory_store();
        store.append(WRITE).unwrap();

        assert!(matches!(
            store.read(WIDTH),
            Err(CoreError::Storage(StorageError::ReadPastEnd { .. }))
        ));
        assert!(store.read_at(&mut [0u8; 4], WIDTH + 1).is_err());
    }

    #[test]
    fn torn_record_is_detected() {
        let mut backend: Box<dyn StorageBackend> = Box::new(InMemoryBackend::new());
        // Prefix claims 100 bytes but only 3 follow.
        backend.append(&100u64.to_be_bytes()).unwrap();
        backend.append(b"abc").unwrap();

        let store = Store::new(backend);
        assert!(store.read(0).is_err());
        assert_eq!(store.record_end(0).unwrap(), None);
        assert_eq!(store.record_end(8).unwrap(), None);
    }

    #[test]
    fn file_store_reads_unflushed_records() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0.store");

        let store = Store::open(&path).unwrap();
        let (_, pos) = store.append(WRITE).unwrap();

        assert_eq!(std::fs::metadata(&path).unwrap().len(), 0);
        assert_eq!(store.read(pos).unwrap(), WRITE);
    }

    #[test]
    fn file_store_recovers_size_on_reopen() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("0.store");

        {
            let store = Store::open(&path).unwrap();
            store.append(WRITE).unwrap();
            store.append(WRITE).unwrap();
            store.close().unwrap();
            store.close().unwrap();
        }

        let store = Store::open(&path).unwrap();
        assert_eq!(store.size().unwrap(), WIDTH * 2);

        let (_, pos) = store.append(b"after restart").unwrap();
        assert_eq!(pos, WIDTH * 2);
        assert_eq!(store.read(WIDTH).unwrap(), WRITE);
        assert_eq!(store.read(pos).unwrap(), b"after restart");
    }

    #[test]
    fn concurrent_appends_get_distinct_positions() {
        let store = Arc::new(memory_store());

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let store = Arc::clone(&store);
                thread::spawn(move || {
                    (0..50)
                        .map(|i| {
                            let record = format!("t{t}-r{i}").into_bytes();
                            let (_, pos) = store.append(&record).unwrap();
                            (pos, record)
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut written: Vec<(u64, Vec<u8>)> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        written.sort_by_key(|(pos, _)| *pos);
        written.dedup_by_key(|(pos, _)| *pos);
        assert_eq!(written.len(), 200);

        for (pos, record) in written {
            assert_eq!(store.read(pos).unwrap(), record);
        }
    }
}
