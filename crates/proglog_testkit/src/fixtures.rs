//! Test fixtures and log helpers.
//!
//! Provides convenience functions for setting up test logs
//! and common test scenarios.

use proglog_core::{Config, Log, ENTRY_WIDTH};
use std::path::Path;
use tempfile::TempDir;

/// A test log in a temporary directory with automatic cleanup.
pub struct TestLog {
    log: Option<Log>,
    config: Config,
    temp_dir: TempDir,
}

impl TestLog {
    /// Creates a test log with the default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates a test log with small caps so a handful of records forces
    /// rollover.
    pub fn small() -> Self {
        Self::with_config(small_config())
    }

    /// Creates a test log with the given configuration.
    pub fn with_config(config: Config) -> Self {
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let log = Log::open(temp_dir.path(), config.clone()).expect("Failed to open test log");

        Self {
            log: Some(log),
            config,
            temp_dir,
        }
    }

    /// Returns the log directory.
    pub fn path(&self) -> &Path {
        self.temp_dir.path()
    }

    /// Returns the configuration used to open the log.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Closes the log and opens it again from disk.
    pub fn reopen(&mut self) {
        self.close_in_place();
        let log = Log::open(self.temp_dir.path(), self.config.clone())
            .expect("Failed to reopen test log");
        self.log = Some(log);
    }

    /// Closes the log, leaving the files on disk until the fixture drops.
    ///
    /// Use this before editing segment files by hand; call [`TestLog::reopen`]
    /// afterwards to run recovery.
    pub fn close_in_place(&mut self) {
        if let Some(log) = self.log.take() {
            log.close().expect("Failed to close test log");
        }
    }

    /// Drops the log without closing it.
    pub fn drop_in_place(&mut self) {
        self.log = None;
    }
}

impl Default for TestLog {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestLog {
    type Target = Log;

    fn deref(&self) -> &Self::Target {
        self.log.as_ref().expect("Test log is closed")
    }
}

/// Returns a configuration that holds at most three records per segment.
pub fn small_config() -> Config {
    Config::new()
        .max_store_bytes(64 * 1024)
        .max_index_bytes(ENTRY_WIDTH * 3)
}

/// Returns a deterministic record payload for `i`.
pub fn record_for(i: u64) -> Vec<u8> {
    format!("record-{i}").into_bytes()
}

/// Runs a test with a temporary log using the default configuration.
///
/// # Example
///
/// ```rust
/// use proglog_testkit::with_temp_log;
///
/// with_temp_log(|log| {
///     assert_eq!(log.append(b"hello world").unwrap(), 0);
/// });
/// ```
pub fn with_temp_log<F, R>(f: F) -> R
where
    F: FnOnce(&Log) -> R,
{
    let test_log = TestLog::new();
    f(&test_log)
}

/// Runs a test with a temporary log using `config`.
pub fn with_temp_log_config<F, R>(config: Config, f: F) -> R
where
    F: FnOnce(&Log) -> R,
{
    let test_log = TestLog::with_config(config);
    f(&test_log)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates a log holding `count` records produced by [`record_for`].
    pub fn populated_log(count: u64, config: Config) -> TestLog {
        let test_log = TestLog::with_config(config);
        let base = test_log.config().initial_offset;

        for i in 0..count {
            let offset = test_log
                .append(&record_for(base + i))
                .expect("Failed to append record");
            assert_eq!(offset, base + i);
        }

        test_log
    }

    /// Creates a log spread over `segments` full segments of the small
    /// configuration, plus an empty active segment.
    pub fn multi_segment_log(segments: u64) -> TestLog {
        populated_log(segments * 3, small_config())
    }
}
