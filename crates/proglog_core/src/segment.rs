//! Segments: one store plus one index over a contiguous offset range.
//!
//! A segment serves offsets `[base_offset, next_offset)`. Appends go to the
//! store first, then the index; `next_offset` is published only after both
//! writes succeed, so a reader never sees an offset without its entry.
//!
//! ## Recovery
//!
//! Opening a segment reconciles its two files:
//!
//! - Index entries whose record is missing or torn in the store are dropped
//!   (the index is written unbuffered, the store is buffered, so a crash can
//!   leave the index ahead).
//! - Complete records after the last indexed one are re-indexed; these are
//!   appends whose index write never happened.
//! - A torn record at the store tail is cut off.

use crate::config::Config;
use crate::dir::{index_path, store_path};
use crate::error::{CoreError, CoreResult};
use crate::index::{Index, IndexEntry};
use crate::store::Store;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use tracing::{debug, warn};

/// A bounded unit of the log.
///
/// Appends must be serialized by the caller; [`crate::Log`] holds its write
/// lock around every append. Reads may run concurrently with an append.
pub struct Segment {
    base_offset: u64,
    next_offset: AtomicU64,
    store: Store,
    index: Index,
    store_path: PathBuf,
    max_store_bytes: u64,
}

impl Segment {
    /// Opens or creates the segment starting at `base_offset` in `dir`.
    ///
    /// # Errors
    ///
    /// Returns an error if either file cannot be opened or the recovery pass
    /// fails.
    pub fn open(dir: &Path, base_offset: u64, config: &Config) -> CoreResult<Self> {
        let store_path = store_path(dir, base_offset);
        let store = Store::open(&store_path)?;
        let index = Index::open(&index_path(dir, base_offset), config.max_index_bytes)?;

        let segment = Self {
            base_offset,
            next_offset: AtomicU64::new(base_offset),
            store,
            index,
            store_path,
            max_store_bytes: config.max_store_bytes,
        };
        segment.recover()?;

        debug!(
            base_offset,
            next_offset = segment.next_offset(),
            "opened segment"
        );
        Ok(segment)
    }

    fn recover(&self) -> CoreResult<()> {
        // Drop entries pointing at records the store does not fully hold.
        let mut dropped = 0u64;
        let mut indexed_end = 0u64;
        while let Some(last) = self.last_entry()? {
            match self.store.record_end(last.position)? {
                Some(end) => {
                    indexed_end = end;
                    break;
                }
                None => {
                    self.index.truncate_entries(u64::from(last.relative_offset))?;
                    dropped += 1;
                }
            }
        }
        if dropped > 0 {
            warn!(
                base_offset = self.base_offset,
                dropped, "dropped index entries past the end of the store"
            );
        }

        // Re-index complete records the index never learned about.
        let store_size = self.store.size()?;
        let mut position = indexed_end;
        let mut reindexed = 0u64;
        while position < store_size && self.index.has_room() {
            let Some(end) = self.store.record_end(position)? else {
                break;
            };
            let relative = u32::try_from(self.index.len())
                .map_err(|_| CoreError::corrupted("segment holds more than u32::MAX records"))?;
            self.index.write(IndexEntry::new(relative, position))?;
            position = end;
            reindexed += 1;
        }
        if reindexed > 0 {
            warn!(
                base_offset = self.base_offset,
                reindexed, "re-indexed records missing from the index"
            );
        }

        if position < store_size {
            warn!(
                base_offset = self.base_offset,
                bytes = store_size - position,
                "truncating unreadable store tail"
            );
            self.store.truncate(position)?;
        }

        let next_offset = match self.last_entry()? {
            Some(last) => self.base_offset + u64::from(last.relative_offset) + 1,
            None => self.base_offset,
        };
        self.next_offset.store(next_offset, Ordering::Release);
        Ok(())
    }

    fn last_entry(&self) -> CoreResult<Option<IndexEntry>> {
        if self.index.is_empty() {
            return Ok(None);
        }
        self.index.read_last().map(Some)
    }

    /// Appends a record and returns its offset.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IndexFull`] without writing anything if the index
    /// has no room. If the store write succeeds but the index write fails,
    /// the record stays in the store unindexed and the index error is
    /// returned; the offset is not consumed.
    pub fn append(&self, record: &[u8]) -> CoreResult<u64> {
        let index_full = || CoreError::IndexFull {
            max_bytes: self.index.max_bytes(),
        };
        if !self.index.has_room() {
            return Err(index_full());
        }

        let offset = self.next_offset.load(Ordering::Acquire);
        let relative = u32::try_from(offset - self.base_offset).map_err(|_| index_full())?;

        let (_, position) = self.store.append(record)?;
        self.index.write(IndexEntry::new(relative, position))?;

        self.next_offset.store(offset + 1, Ordering::Release);
        Ok(offset)
    }

    /// Reads the record at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::OffsetNotFound`] if the offset is outside this
    /// segment or missing from its index.
    pub fn read(&self, offset: u64) -> CoreResult<Vec<u8>> {
        if !self.contains(offset) {
            return Err(CoreError::offset_not_found(offset));
        }

        let entry = self
            .index
            .read(offset - self.base_offset)
            .map_err(|e| match e {
                CoreError::IndexOutOfRange { .. } => CoreError::offset_not_found(offset),
                other => other,
            })?;

        self.store.read(entry.position)
    }

    /// Returns `true` once the store or the index has reached its cap.
    #[must_use]
    pub fn is_maxed(&self) -> bool {
        let store_full = self
            .store
            .size()
            .map_or(true, |size| size >= self.max_store_bytes);
        store_full || !self.index.has_room()
    }

    /// Returns `true` if `offset` lies in `[base_offset, next_offset)`.
    #[must_use]
    pub fn contains(&self, offset: u64) -> bool {
        offset >= self.base_offset && offset < self.next_offset()
    }

    /// Returns the offset of the segment's first record.
    #[must_use]
    pub fn base_offset(&self) -> u64 {
        self.base_offset
    }

    /// Returns the offset the next append will receive.
    #[must_use]
    pub fn next_offset(&self) -> u64 {
        self.next_offset.load(Ordering::Acquire)
    }

    /// Returns the number of records in the segment.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.next_offset() - self.base_offset
    }

    /// Returns `true` if the segment holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Returns the store size in bytes, buffered bytes included.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot report its size.
    pub fn store_size(&self) -> CoreResult<u64> {
        self.store.size()
    }

    pub(crate) fn store(&self) -> &Store {
        &self.store
    }

    /// Flushes and syncs both files.
    ///
    /// # Errors
    ///
    /// Returns an error if either sync fails.
    pub fn sync(&self) -> CoreResult<()> {
        self.store.sync()?;
        self.index.sync()
    }

    /// Persists the store and trims the index file.
    ///
    /// # Errors
    ///
    /// Returns an error if either file cannot be closed cleanly.
    pub fn close(&self) -> CoreResult<()> {
        self.store.close()?;
        self.index.close()?;
        debug!(base_offset = self.base_offset, "closed segment");
        Ok(())
    }

    /// Closes the segment and deletes both of its files.
    ///
    /// A file that is already gone counts as deleted, so a removal that
    /// failed halfway can be retried.
    ///
    /// # Errors
    ///
    /// Returns an error if closing or deleting fails.
    pub fn remove(&self) -> CoreResult<()> {
        self.close()?;
        remove_if_present(&self.store_path)?;
        remove_if_present(self.index.path())?;
        debug!(base_offset = self.base_offset, "removed segment");
        Ok(())
    }
}

fn remove_if_present(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        other => other,
    }
}

impl std::fmt::Debug for Segment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Segment")
            .field("base_offset", &self.base_offset)
            .field("next_offset", &self.next_offset())
            .field("max_store_bytes", &self.max_store_bytes)
            .finish_non_exhaustive()
    }
}
