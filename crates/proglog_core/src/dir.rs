//! Log directory management.
//!
//! This module handles the file system layout of one log:
//!
//! ```text
//! <log_dir>/
//! ├─ LOCK              # Advisory lock for single-process access
//! ├─ 0.store           # Records of the segment starting at offset 0
//! ├─ 0.index           # Index of the segment starting at offset 0
//! ├─ 1024.store
//! └─ 1024.index
//! ```
//!
//! Segment files are named by their base offset. The LOCK file ensures only
//! one process attaches to the directory at a time.

use crate::error::{CoreError, CoreResult};
use fs2::FileExt;
use std::collections::BTreeSet;
use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use tracing::warn;

/// File names within the log directory.
const LOCK_FILE: &str = "LOCK";

/// Extension of store files.
pub const STORE_EXTENSION: &str = "store";
/// Extension of index files.
pub const INDEX_EXTENSION: &str = "index";

/// Returns the store file path for the segment at `base_offset`.
#[must_use]
pub fn store_path(dir: &Path, base_offset: u64) -> PathBuf {
    dir.join(format!("{base_offset}.{STORE_EXTENSION}"))
}

/// Returns the index file path for the segment at `base_offset`.
#[must_use]
pub fn index_path(dir: &Path, base_offset: u64) -> PathBuf {
    dir.join(format!("{base_offset}.{INDEX_EXTENSION}"))
}

/// Manages the log directory and its exclusive lock.
///
/// Only one `LogDir` can exist per directory at a time; the lock is released
/// when it is dropped.
#[derive(Debug)]
pub struct LogDir {
    /// Root directory path.
    path: PathBuf,
    /// Lock file handle (held for exclusive access).
    _lock_file: File,
}

impl LogDir {
    /// Opens or creates a log directory and takes its lock.
    ///
    /// # Errors
    ///
    /// Returns an error if:
    /// - The directory doesn't exist and `create_if_missing` is false
    /// - The path exists but is not a directory
    /// - Another process holds the lock (returns `LogLocked`)
    /// - I/O errors occur
    pub fn open(path: &Path, create_if_missing: bool) -> CoreResult<Self> {
        if !path.exists() {
            if create_if_missing {
                fs::create_dir_all(path)?;
            } else {
                return Err(CoreError::invalid_config(format!(
                    "log directory does not exist: {}",
                    path.display()
                )));
            }
        }

        if !path.is_dir() {
            return Err(CoreError::invalid_config(format!(
                "path is not a directory: {}",
                path.display()
            )));
        }

        let lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path.join(LOCK_FILE))?;

        if lock_file.try_lock_exclusive().is_err() {
            return Err(CoreError::LogLocked);
        }

        Ok(Self {
            path: path.to_path_buf(),
            _lock_file: lock_file,
        })
    }

    /// Returns the path to the log directory.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Lists the base offsets of every segment on disk, ascending.
    ///
    /// A segment counts if either of its files exists; the missing half is
    /// recreated when the segment opens. Files with other names are ignored.
    pub fn segment_base_offsets(&self) -> CoreResult<Vec<u64>> {
        let mut offsets = BTreeSet::new();

        for entry in fs::read_dir(&self.path)? {
            let path = entry?.path();
            let Some(ext) = path.extension().and_then(|e| e.to_str()) else {
                continue;
            };
            if ext != STORE_EXTENSION && ext != INDEX_EXTENSION {
                continue;
            }

            match path
                .file_stem()
                .and_then(|s| s.to_str())
                .and_then(|s| s.parse::<u64>().ok())
            {
                Some(base_offset) => {
                    offsets.insert(base_offset);
                }
                None => warn!(
                    path = %path.display(),
                    "ignoring segment file with unparseable base offset"
                ),
            }
        }

        Ok(offsets.into_iter().collect())
    }

    /// Syncs the directory so created or deleted segment files are durable.
    #[cfg(unix)]
    pub fn sync(&self) -> CoreResult<()> {
        File::open(&self.path)?.sync_all()?;
        Ok(())
    }

    /// Syncs the directory so created or deleted segment files are durable.
    #[cfg(not(unix))]
    pub fn sync(&self) -> CoreResult<()> {
        // NTFS journals metadata; directories cannot be fsynced here.
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn open_creates_directory() {
        let temp = tempdir().unwrap();
        let log_path = temp.path().join("new_log");

        let dir = LogDir::open(&log_path, true).unwrap();
        assert!(log_path.is_dir());
        assert_eq!(dir.path(), log_path);
    }

    #[test]
    fn open_fails_if_not_exists_and_no_create() {
        let temp = tempdir().unwrap();
        let result = LogDir::open(&temp.path().join("missing"), false);
        assert!(matches!(result, Err(CoreError::InvalidConfig { .. })));
    }

    #[test]
    fn open_fails_on_regular_file() {
        let temp = tempdir().unwrap();
        let file_path = temp.path().join("not_a_dir");
        fs::write(&file_path, b"x").unwrap();

        assert!(LogDir::open(&file_path, true).is_err());
    }

    #[test]
    fn lock_prevents_second_open() {
        let temp = tempdir().unwrap();

        let _dir1 = LogDir::open(temp.path(), true).unwrap();
        let result = LogDir::open(temp.path(), true);
        assert!(matches!(result, Err(CoreError::LogLocked)));
    }

    #[test]
    fn lock_released_on_drop() {
        let temp = tempdir().unwrap();

        {
            let _dir = LogDir::open(temp.path(), true).unwrap();
        }

        let _dir2 = LogDir::open(temp.path(), true).unwrap();
    }

    #[test]
    fn scans_base_offsets_sorted_and_deduplicated() {
        let temp = tempdir().unwrap();
        let dir = LogDir::open(temp.path(), true).unwrap();

        for base in [1024u64, 0, 16] {
            fs::write(store_path(temp.path(), base), b"").unwrap();
            fs::write(index_path(temp.path(), base), b"").unwrap();
        }
        // Index without its store still names a segment.
        fs::write(index_path(temp.path(), 4096), b"").unwrap();
        fs::write(temp.path().join("notes.txt"), b"").unwrap();
        fs::write(temp.path().join("abc.store"), b"").unwrap();

        assert_eq!(dir.segment_base_offsets().unwrap(), vec![0, 16, 1024, 4096]);
    }

    #[test]
    fn segment_paths() {
        let base = Path::new("/var/log/proglog");
        assert_eq!(store_path(base, 42), base.join("42.store"));
        assert_eq!(index_path(base, 42), base.join("42.index"));
    }
}
