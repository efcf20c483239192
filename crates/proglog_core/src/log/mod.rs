//! The log: an ordered list of segments behind one append/read API.
//!
//! ## Segment Layout
//!
//! ```text
//! | segment [0, 3) | segment [3, 6) | segment [6, next) <- active
//! ```
//!
//! Segments are sorted by base offset and their ranges are contiguous. Only
//! the last segment accepts appends; it rolls over to a new segment at
//! `next_offset` once its store or index reaches its cap. Because the check
//! runs after the write, a segment may exceed its store cap by one record.
//!
//! ## Locking
//!
//! Appends and truncation hold the write lock on the segment list. Reads
//! hold the read lock only long enough to find and clone the owning
//! segment, then read without it.

mod reader;

use crate::config::Config;
use crate::dir::LogDir;
use crate::error::{CoreError, CoreResult};
use crate::segment::Segment;
use parking_lot::RwLock;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

pub use reader::LogReader;

/// A segmented, append-only record log.
///
/// `Log` is `Send + Sync`; share it behind an [`Arc`] to append and read from
/// many threads.
///
/// # Example
///
/// ```rust,no_run
/// use proglog_core::{Config, Log};
/// use std::path::Path;
///
/// let log = Log::open(Path::new("data/log"), Config::default())?;
/// let offset = log.append(b"hello world")?;
/// assert_eq!(log.read(offset)?, b"hello world");
/// log.close()?;
/// # Ok::<(), proglog_core::CoreError>(())
/// ```
pub struct Log {
    dir: LogDir,
    config: Config,
    segments: RwLock<Vec<Arc<Segment>>>,
}

impl Log {
    /// Opens the log in `path`, recovering every segment found there.
    ///
    /// A directory without segments gets a fresh segment at
    /// `config.initial_offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid, the directory cannot
    /// be created or locked, any segment fails to open, or the segments on
    /// disk do not form one contiguous range.
    pub fn open(path: &Path, config: Config) -> CoreResult<Self> {
        config.validate()?;
        let dir = LogDir::open(path, config.create_if_missing)?;
        let segments = load_segments(&dir, &config)?;

        let log = Self {
            dir,
            config,
            segments: RwLock::new(segments),
        };

        info!(
            dir = %path.display(),
            segment_count = log.segment_count(),
            lowest_offset = log.lowest_offset(),
            next_offset = log.next_offset(),
            "opened log"
        );
        Ok(log)
    }

    /// Appends a record and returns its offset.
    ///
    /// # Errors
    ///
    /// Returns an error if the record cannot be written. If the store write
    /// succeeded but the index write failed, the stored bytes stay
    /// unreachable and the offset is not consumed.
    pub fn append(&self, record: &[u8]) -> CoreResult<u64> {
        let mut segments = self.segments.write();

        let mut active = active_segment(&segments)?;
        if active.is_maxed() {
            // A rollover deferred by an earlier failure, or a full segment
            // found on open.
            active = self.roll(&mut segments)?;
        }

        let offset = match active.append(record) {
            Ok(offset) => offset,
            Err(CoreError::IndexFull { .. }) => {
                active = self.roll(&mut segments)?;
                active.append(record)?
            }
            Err(e) => return Err(e),
        };

        if self.config.sync_on_append {
            active.sync()?;
        }

        if active.is_maxed() {
            // The record is stored; a failed rollover is retried by the
            // next append.
            if let Err(error) = self.roll(&mut segments) {
                warn!(%error, offset, "rollover failed");
            }
        }

        Ok(offset)
    }

    /// Retires the active segment and starts a new one at its next offset.
    fn roll(&self, segments: &mut Vec<Arc<Segment>>) -> CoreResult<Arc<Segment>> {
        let old = active_segment(segments)?;
        if old.is_empty() {
            return Ok(old);
        }

        // Seal the old segment before any file of the new one exists: once a
        // later segment follows it, recovery can no longer shorten it.
        old.close()?;

        let base_offset = old.next_offset();
        let segment = Arc::new(Segment::open(self.dir.path(), base_offset, &self.config)?);
        segments.push(Arc::clone(&segment));
        self.dir.sync()?;

        info!(
            old_base_offset = old.base_offset(),
            new_base_offset = base_offset,
            "rolled over to new segment"
        );
        Ok(segment)
    }

    /// Reads the record at `offset`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::OffsetNotFound`] if no segment holds `offset`.
    pub fn read(&self, offset: u64) -> CoreResult<Vec<u8>> {
        let segment = {
            let segments = self.segments.read();
            let owner = segments.partition_point(|s| s.base_offset() <= offset);
            if owner == 0 {
                return Err(CoreError::offset_not_found(offset));
            }
            Arc::clone(&segments[owner - 1])
        };

        segment.read(offset)
    }

    /// Removes every segment whose records all lie below `lowest`.
    ///
    /// The active segment is always kept, so the log never runs out of
    /// segments.
    ///
    /// # Errors
    ///
    /// Returns an error if a segment's files cannot be deleted. Segments
    /// removed before the failure stay removed.
    pub fn truncate(&self, lowest: u64) -> CoreResult<()> {
        let mut segments = self.segments.write();

        let sealed = segments.len().saturating_sub(1);
        let expired = segments[..sealed]
            .iter()
            .take_while(|s| s.next_offset() <= lowest)
            .count();

        for _ in 0..expired {
            segments[0].remove()?;
            segments.remove(0);
        }

        if expired > 0 {
            self.dir.sync()?;
        }

        info!(
            lowest,
            removed = expired,
            remaining = segments.len(),
            "truncated log"
        );
        Ok(())
    }

    /// Returns the lowest offset the log still holds.
    #[must_use]
    pub fn lowest_offset(&self) -> u64 {
        self.segments
            .read()
            .first()
            .map_or(self.config.initial_offset, |s| s.base_offset())
    }

    /// Returns the highest offset assigned so far, or `None` if the log holds
    /// no readable record.
    #[must_use]
    pub fn highest_offset(&self) -> Option<u64> {
        let segments = self.segments.read();
        let lowest = segments.first()?.base_offset();
        let next = segments.last()?.next_offset();
        (next > lowest).then(|| next - 1)
    }

    /// Returns the offset the next append will receive.
    #[must_use]
    pub fn next_offset(&self) -> u64 {
        self.segments
            .read()
            .last()
            .map_or(self.config.initial_offset, |s| s.next_offset())
    }

    /// Returns the number of segments.
    #[must_use]
    pub fn segment_count(&self) -> usize {
        self.segments.read().len()
    }

    /// Returns the base offsets of all segments, ascending.
    #[must_use]
    pub fn segment_base_offsets(&self) -> Vec<u64> {
        self.segments.read().iter().map(|s| s.base_offset()).collect()
    }

    /// Returns the log directory.
    #[must_use]
    pub fn dir(&self) -> &Path {
        self.dir.path()
    }

    /// Returns the configuration the log was opened with.
    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns a reader over the raw store bytes of every segment, in order.
    ///
    /// The reader sees the segments present when it was created.
    #[must_use]
    pub fn reader(&self) -> LogReader {
        LogReader::new(self.segments.read().clone())
    }

    /// Flushes and syncs the active segment.
    ///
    /// # Errors
    ///
    /// Returns an error if the sync fails.
    pub fn sync(&self) -> CoreResult<()> {
        let segments = self.segments.read();
        active_segment(&segments)?.sync()
    }

    fn close_segments(&self) -> CoreResult<()> {
        for segment in self.segments.read().iter() {
            segment.close()?;
        }
        Ok(())
    }

    /// Closes every segment and releases the directory lock.
    ///
    /// # Errors
    ///
    /// Returns an error if any segment fails to close.
    pub fn close(self) -> CoreResult<()> {
        self.close_segments()?;
        info!(dir = %self.dir.path().display(), "closed log");
        Ok(())
    }

    /// Closes the log and deletes its directory.
    ///
    /// # Errors
    ///
    /// Returns an error if closing or deleting fails.
    pub fn remove(self) -> CoreResult<()> {
        self.close_segments()?;
        let path: PathBuf = self.dir.path().to_path_buf();
        drop(self);

        fs::remove_dir_all(&path)?;
        info!(dir = %path.display(), "removed log");
        Ok(())
    }

    /// Deletes all data and reopens the log empty at `initial_offset`.
    ///
    /// # Errors
    ///
    /// Returns an error if removing or reopening fails.
    pub fn reset(self) -> CoreResult<Self> {
        let path = self.dir.path().to_path_buf();
        let config = self.config.clone();
        self.remove()?;
        Self::open(&path, config)
    }
}

impl std::fmt::Debug for Log {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Log")
            .field("dir", &self.dir.path())
            .field("segment_count", &self.segment_count())
            .field("lowest_offset", &self.lowest_offset())
            .field("next_offset", &self.next_offset())
            .finish_non_exhaustive()
    }
}

fn active_segment(segments: &[Arc<Segment>]) -> CoreResult<Arc<Segment>> {
    segments
        .last()
        .cloned()
        .ok_or_else(|| CoreError::corrupted("log has no active segment"))
}

fn load_segments(dir: &LogDir, config: &Config) -> CoreResult<Vec<Arc<Segment>>> {
    let mut segments = Vec::new();
    for base_offset in dir.segment_base_offsets()? {
        segments.push(Arc::new(Segment::open(dir.path(), base_offset, config)?));
    }

    if segments.is_empty() {
        let segment = Segment::open(dir.path(), config.initial_offset, config)?;
        segments.push(Arc::new(segment));
        dir.sync()?;
    }

    for pair in segments.windows(2) {
        let (prev, next) = (&pair[0], &pair[1]);
        if prev.next_offset() != next.base_offset() {
            return Err(CoreError::corrupted(format!(
                "segment {} ends at offset {} but the next segment starts at {}",
                prev.base_offset(),
                prev.next_offset(),
                next.base_offset()
            )));
        }
    }

    Ok(segments)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dir::store_path;
    use crate::index::ENTRY_WIDTH;
    use crate::store::LEN_WIDTH;
    use std::io::Read;
    use std::mem;
    use std::thread;
    use tempfile::tempdir;

    const WRITE: &[u8] = b"hello world";
    const WIDTH: u64 = WRITE.len() as u64 + LEN_WIDTH;

    fn small_config() -> Config {
        Config::new()
            .max_store_bytes(1024)
            .max_index_bytes(ENTRY_WIDTH * 3)
    }

    #[test]
    fn append_and_read_first_records() {
        let dir = tempdir().unwrap();
        let log = Log::open(dir.path(), Config::default()).unwrap();

        assert_eq!(log.append(b"hello world").unwrap(), 0);
        assert_eq!(log.read(0).unwrap(), b"hello world");

        assert_eq!(log.append(b"goodbye").unwrap(), 1);
        assert_eq!(log.read(1).unwrap(), b"goodbye");
        assert_eq!(log.read(0).unwrap(), b"hello world");
    }

    #[test]
    fn read_past_end_is_not_found() {
        let dir = tempdir().unwrap();
        let log = Log::open(dir.path(), Config::default()).unwrap();
        log.append(WRITE).unwrap();
        log.append(WRITE).unwrap();

        let err = log.read(999_999).unwrap_err();
        assert!(matches!(err, CoreError::OffsetNotFound { offset: 999_999 }));
        assert!(log.read(2).unwrap_err().is_not_found());
    }

    #[test]
    fn offsets_start_at_initial_offset() {
        let dir = tempdir().unwrap();
        let log = Log::open(dir.path(), Config::new().initial_offset(16)).unwrap();

        assert_eq!(log.lowest_offset(), 16);
        assert_eq!(log.highest_offset(), None);

        for expected in 16..26 {
            assert_eq!(log.append(WRITE).unwrap(), expected);
        }
        assert_eq!(log.highest_offset(), Some(25));
        assert!(log.read(15).unwrap_err().is_not_found());
    }

    #[test]
    fn store_cap_rolls_after_two_records() {
        let dir = tempdir().unwrap();
        let config = Config::new().max_store_bytes(WIDTH * 2);
        let log = Log::open(dir.path(), config).unwrap();

        for expected in 0..3 {
            assert_eq!(log.append(WRITE).unwrap(), expected);
        }

        assert_eq!(log.segment_count(), 2);
        assert_eq!(log.segment_base_offsets(), vec![0, 2]);
        for offset in 0..3 {
            assert_eq!(log.read(offset).unwrap(), WRITE);
        }
    }

    #[test]
    fn index_cap_rolls_over() {
        let dir = tempdir().unwrap();
        let log = Log::open(dir.path(), small_config()).unwrap();

        for expected in 0..7 {
            assert_eq!(log.append(WRITE).unwrap(), expected);
        }

        assert_eq!(log.segment_base_offsets(), vec![0, 3, 6]);
        for offset in 0..7 {
            assert_eq!(log.read(offset).unwrap(), WRITE);
        }
    }

    #[test]
    fn truncate_removes_old_segments() {
        let dir = tempdir().unwrap();
        let log = Log::open(dir.path(), small_config()).unwrap();
        for _ in 0..7 {
            log.append(WRITE).unwrap();
        }

        log.truncate(4).unwrap();

        assert_eq!(log.lowest_offset(), 3);
        assert_eq!(log.segment_base_offsets(), vec![3, 6]);
        for offset in 0..3 {
            assert!(log.read(offset).unwrap_err().is_not_found());
        }
        for offset in 4..7 {
            assert_eq!(log.read(offset).unwrap(), WRITE);
        }
        assert!(!dir.path().join("0.store").exists());
        assert!(!dir.path().join("0.index").exists());
    }

    #[test]
    fn truncate_tolerates_segment_files_already_gone() {
        let dir = tempdir().unwrap();
        let log = Log::open(dir.path(), small_config()).unwrap();
        for _ in 0..7 {
            log.append(WRITE).unwrap();
        }
        fs::remove_file(dir.path().join("0.store")).unwrap();

        log.truncate(3).unwrap();
        assert_eq!(log.segment_base_offsets(), vec![3, 6]);
        assert!(!dir.path().join("0.index").exists());

        log.truncate(6).unwrap();
        assert_eq!(log.segment_base_offsets(), vec![6]);
    }

    #[test]
    fn failed_rollover_leaves_sealed_segment_recoverable() {
        let dir = tempdir().unwrap();
        let config = Config::new().max_store_bytes(WIDTH * 2);
        let log = Log::open(dir.path(), config.clone()).unwrap();

        // Squat on the next store path so the new segment cannot be created.
        fs::create_dir(store_path(dir.path(), 2)).unwrap();
        assert_eq!(log.append(WRITE).unwrap(), 0);
        assert_eq!(log.append(WRITE).unwrap(), 1);
        assert_eq!(log.segment_count(), 1);

        // Crash: release the lock but never flush or close the segments.
        let Log { dir: log_dir, segments, .. } = log;
        drop(log_dir);
        mem::forget(segments);
        fs::remove_dir(store_path(dir.path(), 2)).unwrap();

        let log = Log::open(dir.path(), config).unwrap();
        assert_eq!(log.next_offset(), 2);
        assert_eq!(log.read(0).unwrap(), WRITE);
        assert_eq!(log.read(1).unwrap(), WRITE);
        assert_eq!(log.append(WRITE).unwrap(), 2);
        assert_eq!(log.segment_base_offsets(), vec![0, 2]);
    }

    #[test]
    fn truncate_keeps_active_segment() {
        let dir = tempdir().unwrap();
        let log = Log::open(dir.path(), small_config()).unwrap();
        for _ in 0..4 {
            log.append(WRITE).unwrap();
        }

        log.truncate(u64::MAX).unwrap();

        assert_eq!(log.segment_base_offsets(), vec![3]);
        assert_eq!(log.read(3).unwrap(), WRITE);
        assert_eq!(log.append(WRITE).unwrap(), 4);
    }

    #[test]
    fn reopen_preserves_offsets_and_records() {
        let dir = tempdir().unwrap();

        {
            let log = Log::open(dir.path(), small_config()).unwrap();
            for _ in 0..5 {
                log.append(WRITE).unwrap();
            }
            log.close().unwrap();
        }

        let log = Log::open(dir.path(), small_config()).unwrap();
        assert_eq!(log.lowest_offset(), 0);
        assert_eq!(log.highest_offset(), Some(4));
        for offset in 0..5 {
            assert_eq!(log.read(offset).unwrap(), WRITE);
        }
        assert_eq!(log.append(WRITE).unwrap(), 5);
    }

    #[test]
    fn reopen_ignores_initial_offset_for_existing_log() {
        let dir = tempdir().unwrap();

        {
            let log = Log::open(dir.path(), Config::default()).unwrap();
            log.append(WRITE).unwrap();
            log.close().unwrap();
        }

        let log = Log::open(dir.path(), Config::new().initial_offset(100)).unwrap();
        assert_eq!(log.lowest_offset(), 0);
        assert_eq!(log.append(WRITE).unwrap(), 1);
    }

    #[test]
    fn second_open_is_locked() {
        let dir = tempdir().unwrap();
        let _log = Log::open(dir.path(), Config::default()).unwrap();

        assert!(matches!(
            Log::open(dir.path(), Config::default()),
            Err(CoreError::LogLocked)
        ));
    }

    #[test]
    fn invalid_config_fails_open() {
        let dir = tempdir().unwrap();
        let config = Config::new().max_index_bytes(ENTRY_WIDTH - 1);

        assert!(matches!(
            Log::open(dir.path(), config),
            Err(CoreError::InvalidConfig { .. })
        ));
    }

    #[test]
    fn gap_between_segments_fails_open() {
        let dir = tempdir().unwrap();

        {
            let log = Log::open(dir.path(), small_config()).unwrap();
            for _ in 0..4 {
                log.append(WRITE).unwrap();
            }
            log.close().unwrap();
        }
        // Lose the last record of the first segment.
        let index = dir.path().join("0.index");
        let file = fs::OpenOptions::new().write(true).open(&index).unwrap();
        file.set_len(ENTRY_WIDTH * 2).unwrap();
        let store = dir.path().join("0.store");
        let file = fs::OpenOptions::new().write(true).open(&store).unwrap();
        file.set_len(WIDTH * 2).unwrap();

        assert!(matches!(
            Log::open(dir.path(), small_config()),
            Err(CoreError::Corrupted { .. })
        ));
    }

    #[test]
    fn reader_concatenates_stores() {
        let dir = tempdir().unwrap();
        let log = Log::open(dir.path(), small_config()).unwrap();
        for _ in 0..4 {
            log.append(WRITE).unwrap();
        }

        let mut raw = Vec::new();
        log.reader().read_to_end(&mut raw).unwrap();
        assert_eq!(raw.len() as u64, WIDTH * 4);

        for chunk in raw.chunks(WIDTH as usize) {
            let len = u64::from_be_bytes(chunk[..8].try_into().unwrap());
            assert_eq!(len, WRITE.len() as u64);
            assert_eq!(&chunk[8..], WRITE);
        }
    }

    #[test]
    fn reset_empties_the_log() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log");
        let log = Log::open(&path, small_config().initial_offset(10)).unwrap();
        for _ in 0..5 {
            log.append(WRITE).unwrap();
        }

        let log = log.reset().unwrap();
        assert_eq!(log.segment_count(), 1);
        assert_eq!(log.lowest_offset(), 10);
        assert_eq!(log.highest_offset(), None);
        assert_eq!(log.append(WRITE).unwrap(), 10);
    }

    #[test]
    fn remove_deletes_directory() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("log");
        let log = Log::open(&path, Config::default()).unwrap();
        log.append(WRITE).unwrap();

        log.remove().unwrap();
        assert!(!path.exists());
    }

    #[test]
    fn sync_on_append_persists_each_record() {
        let dir = tempdir().unwrap();
        let log = Log::open(dir.path(), Config::new().sync_on_append(true)).unwrap();
        log.append(WRITE).unwrap();

        let on_disk = fs::metadata(dir.path().join("0.store")).unwrap().len();
        assert_eq!(on_disk, WIDTH);
    }

    #[test]
    fn concurrent_appends_are_gap_free() {
        let dir = tempdir().unwrap();
        let log = Arc::new(Log::open(dir.path(), small_config()).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|t| {
                let log = Arc::clone(&log);
                thread::spawn(move || {
                    (0..25)
                        .map(|i| {
                            let record = format!("thread {t} record {i}").into_bytes();
                            let offset = log.append(&record).unwrap();
                            assert_eq!(log.read(offset).unwrap(), record);
                            (offset, record)
                        })
                        .collect::<Vec<_>>()
                })
            })
            .collect();

        let mut written: Vec<_> = handles
            .into_iter()
            .flat_map(|h| h.join().unwrap())
            .collect();
        written.sort_by_key(|(offset, _)| *offset);

        let offsets: Vec<u64> = written.iter().map(|(offset, _)| *offset).collect();
        assert_eq!(offsets, (0..100).collect::<Vec<_>>());
        for (offset, record) in written {
            assert_eq!(log.read(offset).unwrap(), record);
        }
    }

    mod proptests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(24))]

            #[test]
            fn records_survive_rollover_and_reopen(
                records in prop::collection::vec(prop::collection::vec(any::<u8>(), 0..64), 1..40),
                max_store_bytes in 16u64..256,
                max_entries in 1u64..6,
            ) {
                let dir = tempdir().unwrap();
                let config = Config::new()
                    .max_store_bytes(max_store_bytes)
                    .max_index_bytes(ENTRY_WIDTH * max_entries);

                {
                    let log = Log::open(dir.path(), config.clone()).unwrap();
                    for (expected, record) in records.iter().enumerate() {
                        prop_assert_eq!(log.append(record).unwrap(), expected as u64);
                    }
                    log.close().unwrap();
                }

                let log = Log::open(dir.path(), config).unwrap();
                prop_assert_eq!(log.highest_offset(), Some(records.len() as u64 - 1));
                for (offset, record) in records.iter().enumerate() {
                    prop_assert_eq!(&log.read(offset as u64).unwrap(), record);
                }
            }
        }
    }
}
