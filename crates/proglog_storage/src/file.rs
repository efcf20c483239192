//! Buffered file backend.
//!
//! Appends collect in a write buffer and reach the file in batches. A read
//! flushes the buffer before touching the file, so readers always observe
//! every earlier append, buffered or not.

use crate::backend::StorageBackend;
use crate::error::{StorageError, StorageResult};
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, BufWriter, Read, Seek, SeekFrom, Write};
use std::mem;
use std::path::{Path, PathBuf};

/// Default capacity of the write buffer in front of the file.
pub const DEFAULT_BUFFER_CAPACITY: usize = 8 * 1024;

struct FileState {
    writer: BufWriter<File>,
    /// Logical size: bytes in the file plus bytes still in `writer`.
    size: u64,
    capacity: usize,
    /// Set when a failed write could not be undone.
    closed: bool,
}

impl FileState {
    /// Brings the file plus buffer back to exactly `at` bytes after a
    /// failed write.
    ///
    /// Bytes the failed write left in the file are cut off. Earlier bytes
    /// that were still buffered are buffered again.
    fn rewind(&mut self, at: u64) -> io::Result<()> {
        let fresh = BufWriter::with_capacity(self.capacity, self.writer.get_ref().try_clone()?);
        let (file, pending) = mem::replace(&mut self.writer, fresh).into_parts();
        let pending = pending.unwrap_or_else(|panicked| panicked.into_inner());

        let on_disk = file.metadata()?.len();
        if on_disk > at {
            file.set_len(at)?;
        } else if on_disk < at {
            let missing = at - on_disk;
            if missing > pending.len() as u64 {
                return Err(io::Error::new(
                    io::ErrorKind::InvalidData,
                    "write buffer no longer holds appended bytes",
                ));
            }
            self.writer.write_all(&pending[..missing as usize])?;
        }
        Ok(())
    }
}

/// A file opened for appending, with a write buffer and positional reads.
///
/// The file is opened in append mode, so the cursor movement of a read never
/// redirects a later write. One mutex covers the buffer, the file cursor and
/// the logical size.
///
/// A write that fails partway is rolled back, so the next append still
/// starts at the old logical size. If the rollback fails too, the backend
/// refuses further writes with [`StorageError::Closed`].
///
/// # Example
///
/// ```no_run
/// use proglog_storage::{FileBackend, StorageBackend};
/// use std::path::Path;
///
/// let mut backend = FileBackend::open(Path::new("0.store"))?;
/// let at = backend.append(b"record bytes")?;
/// assert_eq!(backend.read_at(at, 6)?, b"record");
/// backend.sync()?;
/// # Ok::<(), proglog_storage::StorageError>(())
/// ```
pub struct FileBackend {
    path: PathBuf,
    state: Mutex<FileState>,
}

impl FileBackend {
    /// Opens `path`, creating it if missing.
    ///
    /// An existing file's length becomes the starting size, so a reopened
    /// store continues after its last byte.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn open(path: &Path) -> StorageResult<Self> {
        Self::with_capacity(path, DEFAULT_BUFFER_CAPACITY)
    }

    /// Opens `path` with a write buffer of `capacity` bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened or created.
    pub fn with_capacity(path: &Path, capacity: usize) -> StorageResult<Self> {
        let file = OpenOptions::new()
            .read(true)
            .append(true)
            .create(true)
            .open(path)?;
        let size = file.metadata()?.len();

        Ok(Self {
            path: path.to_path_buf(),
            state: Mutex::new(FileState {
                writer: BufWriter::with_capacity(capacity, file),
                size,
                capacity,
                closed: false,
            }),
        })
    }

    /// Returns the file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Returns the number of appended bytes not yet handed to the file.
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.state.lock().writer.buffer().len()
    }
}

impl StorageBackend for FileBackend {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        let mut state = self.state.lock();
        let size = state.size;
        if offset.saturating_add(len as u64) > size {
            return Err(StorageError::ReadPastEnd { offset, len, size });
        }
        if len == 0 {
            return Ok(Vec::new());
        }

        state.writer.flush()?;
        let file = state.writer.get_mut();
        file.seek(SeekFrom::Start(offset))?;

        let mut buf = vec![0u8; len];
        file.read_exact(&mut buf)?;
        Ok(buf)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let state = self.state.get_mut();
        if state.closed {
            return Err(StorageError::Closed);
        }

        let at = state.size;
        if let Err(error) = state.writer.write_all(data) {
            if state.rewind(at).is_err() {
                state.closed = true;
            }
            return Err(error.into());
        }
        state.size += data.len() as u64;
        Ok(at)
    }

    fn flush(&mut self) -> StorageResult<()> {
        let state = self.state.get_mut();
        if state.closed {
            return Err(StorageError::Closed);
        }
        state.writer.flush()?;
        Ok(())
    }

    fn size(&self) -> StorageResult<u64> {
        Ok(self.state.lock().size)
    }

    fn sync(&mut self) -> StorageResult<()> {
        let state = self.state.get_mut();
        if state.closed {
            return Err(StorageError::Closed);
        }
        state.writer.flush()?;
        state.writer.get_ref().sync_all()?;
        Ok(())
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        let state = self.state.get_mut();
        if state.closed {
            return Err(StorageError::Closed);
        }
        if new_size > state.size {
            return Err(StorageError::TruncateBeyondEnd {
                requested: new_size,
                size: state.size,
            });
        }

        state.writer.flush()?;
        let file = state.writer.get_ref();
        file.set_len(new_size)?;
        file.sync_all()?;
        state.size = new_size;
        Ok(())
    }
}

impl std::fmt::Debug for FileBackend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("FileBackend")
            .field("path", &self.path)
            .field("size", &state.size)
            .field("buffered", &state.writer.buffer().len())
            .finish()
    }
}
