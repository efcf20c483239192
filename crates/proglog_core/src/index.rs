//! Segment index: fixed-width `(relative offset, position)` entries.
//!
//! ## Index Entry Format
//!
//! ```text
//! | relative_offset (4, big-endian) | position (8, big-endian) |
//! ```
//!
//! Entry `n` lives at byte `n * ENTRY_WIDTH`, so lookups are pure arithmetic.
//! The index is dense: entry `n` always carries relative offset `n`.
//!
//! While open, the file is pre-allocated to the configured maximum so the
//! entry region never has to grow. A clean close trims the file back to the
//! bytes actually used. A file left pre-allocated by a crash is recovered by
//! scanning for the first entry that breaks the dense numbering.

use crate::error::{CoreError, CoreResult};
use parking_lot::Mutex;
use proglog_storage::StorageError;
use std::fs::{File, OpenOptions};
use std::io::{BufReader, ErrorKind, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Width of the relative offset field.
pub const OFFSET_WIDTH: u64 = 4;
/// Width of the store position field.
pub const POSITION_WIDTH: u64 = 8;
/// Width of one index entry on disk.
pub const ENTRY_WIDTH: u64 = OFFSET_WIDTH + POSITION_WIDTH;

/// One index entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexEntry {
    /// Record offset relative to the segment's base offset.
    pub relative_offset: u32,
    /// Store position of the record's length prefix.
    pub position: u64,
}

impl IndexEntry {
    /// Creates an entry.
    #[must_use]
    pub const fn new(relative_offset: u32, position: u64) -> Self {
        Self {
            relative_offset,
            position,
        }
    }

    fn encode(self) -> [u8; ENTRY_WIDTH as usize] {
        let mut buf = [0u8; ENTRY_WIDTH as usize];
        buf[..OFFSET_WIDTH as usize].copy_from_slice(&self.relative_offset.to_be_bytes());
        buf[OFFSET_WIDTH as usize..].copy_from_slice(&self.position.to_be_bytes());
        buf
    }

    fn decode(buf: &[u8; ENTRY_WIDTH as usize]) -> Self {
        let mut offset = [0u8; OFFSET_WIDTH as usize];
        let mut position = [0u8; POSITION_WIDTH as usize];
        offset.copy_from_slice(&buf[..OFFSET_WIDTH as usize]);
        position.copy_from_slice(&buf[OFFSET_WIDTH as usize..]);
        Self::new(u32::from_be_bytes(offset), u64::from_be_bytes(position))
    }
}

struct IndexState {
    file: File,
    /// Bytes of real entries; everything past this is pre-allocated slack.
    size: u64,
    closed: bool,
}

/// Fixed-width offset index for one segment.
pub struct Index {
    path: PathBuf,
    max_bytes: u64,
    state: Mutex<IndexState>,
}

impl Index {
    /// Opens or creates an index file capped at `max_bytes`.
    ///
    /// Existing entries are counted, then the file is pre-allocated to
    /// `max_bytes`.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be opened, scanned, or resized.
    pub fn open(path: &Path, max_bytes: u64) -> CoreResult<Self> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        let len = file.metadata()?.len();
        let entries = count_entries(&mut file, len)?;
        let size = entries * ENTRY_WIDTH;

        file.set_len(max_bytes.max(size))?;

        Ok(Self {
            path: path.to_path_buf(),
            max_bytes,
            state: Mutex::new(IndexState {
                file,
                size,
                closed: false,
            }),
        })
    }

    /// Appends an entry after the last one.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IndexFull`] if the entry would not fit within the
    /// configured maximum, or an I/O error if the write fails.
    pub fn write(&self, entry: IndexEntry) -> CoreResult<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Err(StorageError::Closed.into());
        }
        if state.size + ENTRY_WIDTH > self.max_bytes {
            return Err(CoreError::IndexFull {
                max_bytes: self.max_bytes,
            });
        }

        let at = state.size;
        state.file.seek(SeekFrom::Start(at))?;
        state.file.write_all(&entry.encode())?;
        state.size += ENTRY_WIDTH;

        Ok(())
    }

    /// Reads entry `n` (0-based).
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IndexOutOfRange`] if `n` has not been written.
    pub fn read(&self, n: u64) -> CoreResult<IndexEntry> {
        let mut state = self.state.lock();
        let entries = state.size / ENTRY_WIDTH;
        if n >= entries {
            return Err(CoreError::IndexOutOfRange { entry: n, entries });
        }
        read_entry(&mut state.file, n)
    }

    /// Reads the most recent entry.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IndexOutOfRange`] if the index is empty.
    pub fn read_last(&self) -> CoreResult<IndexEntry> {
        let mut state = self.state.lock();
        let entries = state.size / ENTRY_WIDTH;
        if entries == 0 {
            return Err(CoreError::IndexOutOfRange { entry: 0, entries });
        }
        read_entry(&mut state.file, entries - 1)
    }

    /// Drops every entry from `n` onwards.
    ///
    /// The dropped region is zeroed so a later crash recovery scan cannot
    /// resurrect it.
    pub(crate) fn truncate_entries(&self, n: u64) -> CoreResult<()> {
        let mut state = self.state.lock();
        let new_size = (n * ENTRY_WIDTH).min(state.size);
        let dropped = state.size - new_size;
        if dropped == 0 {
            return Ok(());
        }

        state.file.seek(SeekFrom::Start(new_size))?;
        state.file.write_all(&vec![0u8; dropped as usize])?;
        state.size = new_size;
        Ok(())
    }

    /// Returns `true` if another entry fits within the maximum size.
    #[must_use]
    pub fn has_room(&self) -> bool {
        self.state.lock().size + ENTRY_WIDTH <= self.max_bytes
    }

    /// Returns the number of bytes of real entries.
    #[must_use]
    pub fn size(&self) -> u64 {
        self.state.lock().size
    }

    /// Returns the number of entries.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.size() / ENTRY_WIDTH
    }

    /// Returns `true` if the index holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.size() == 0
    }

    /// Returns the configured maximum size in bytes.
    #[must_use]
    pub fn max_bytes(&self) -> u64 {
        self.max_bytes
    }

    /// Returns the index file path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Syncs written entries to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    pub fn sync(&self) -> CoreResult<()> {
        self.state.lock().file.sync_all()?;
        Ok(())
    }

    /// Syncs the entries and trims the pre-allocated slack off the file.
    ///
    /// Later writes fail; reads keep working until the index is dropped.
    /// Closing twice is harmless.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync or resize fails.
    pub fn close(&self) -> CoreResult<()> {
        let mut state = self.state.lock();
        if state.closed {
            return Ok(());
        }

        state.file.sync_all()?;
        state.file.set_len(state.size)?;
        state.file.sync_all()?;
        state.closed = true;
        Ok(())
    }
}

#[cfg(test)]
impl Index {
    /// Accepts writes again after [`Index::close`].
    pub(crate) fn resume_writes(&self) {
        self.state.lock().closed = false;
    }
}

impl Drop for Index {
    fn drop(&mut self) {
        let state = self.state.get_mut();
        if !state.closed {
            // Best effort; a failed trim is repaired by the next open's scan.
            let _ = state.file.set_len(state.size);
        }
    }
}

impl std::fmt::Debug for Index {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Index")
            .field("path", &self.path)
            .field("max_bytes", &self.max_bytes)
            .field("entries", &self.len())
            .finish()
    }
}

fn read_entry(file: &mut File, n: u64) -> CoreResult<IndexEntry> {
    let mut buf = [0u8; ENTRY_WIDTH as usize];
    file.seek(SeekFrom::Start(n * ENTRY_WIDTH))?;
    file.read_exact(&mut buf)?;
    Ok(IndexEntry::decode(&buf))
}

/// Counts the leading run of entries numbered `0, 1, 2, ...`.
fn count_entries(file: &mut File, len: u64) -> CoreResult<u64> {
    let whole = len / ENTRY_WIDTH;
    if whole == 0 {
        return Ok(0);
    }

    file.seek(SeekFrom::Start(0))?;
    let mut reader = BufReader::new(file);
    let mut buf = [0u8; ENTRY_WIDTH as usize];

    for n in 0..whole {
        match reader.read_exact(&mut buf) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::UnexpectedEof => return Ok(n),
            Err(e) => return Err(e.into()),
        }
        if u64::from(IndexEntry::decode(&buf).relative_offset) != n {
            return Ok(n);
        }
    }

    Ok(whole)
}
