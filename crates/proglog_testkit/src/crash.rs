//! Crash recovery scenarios.
//!
//! Each scenario writes a small log, closes it, damages the files the way an
//! interrupted process would, and reopens. Recovery passes when every
//! complete record reads back and the next append lands right after them.
//!
//! ```rust,ignore
//! use proglog_testkit::crash::CrashRecoveryHarness;
//!
//! let mut harness = CrashRecoveryHarness::new()?;
//! harness.run_all();
//! assert!(harness.all_passed(), "{harness}");
//! ```

use crate::fixtures::record_for;
use proglog_core::{index_path, store_path, Config, CoreError, Log, ENTRY_WIDTH};
use proglog_storage::{StorageBackend, StorageError, StorageResult};
use std::fmt;
use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

/// Records written before the damage is applied.
const RECORDS: u64 = 10;

/// Damage applied to a closed log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CrashPoint {
    /// Index file left at its pre-allocated size with a zeroed tail.
    PreallocatedIndex,
    /// Store ends in a record cut off mid-write.
    TornStoreTail,
    /// Store holds a complete record the index never saw.
    UnindexedRecord,
    /// Index lost entries the store still holds.
    TruncatedIndex,
}

impl CrashPoint {
    /// Every crash point, in the order [`CrashRecoveryHarness::run_all`] uses.
    pub const ALL: [CrashPoint; 4] = [
        CrashPoint::PreallocatedIndex,
        CrashPoint::TornStoreTail,
        CrashPoint::UnindexedRecord,
        CrashPoint::TruncatedIndex,
    ];
}

/// Outcome of one recovery scenario.
#[derive(Debug, Clone)]
pub struct RecoveryReport {
    /// Scenario name.
    pub scenario: String,
    /// Records that should be readable after reopening.
    pub expected_records: u64,
    /// Records that actually read back intact.
    pub recovered_records: u64,
    /// Why the scenario failed, if it did.
    pub failure: Option<String>,
}

impl RecoveryReport {
    fn ok(scenario: &str, records: u64) -> Self {
        Self {
            scenario: scenario.to_owned(),
            expected_records: records,
            recovered_records: records,
            failure: None,
        }
    }

    fn failed(scenario: &str, expected: u64, recovered: u64, why: impl Into<String>) -> Self {
        Self {
            scenario: scenario.to_owned(),
            expected_records: expected,
            recovered_records: recovered,
            failure: Some(why.into()),
        }
    }

    /// Returns `true` if recovery was complete.
    #[must_use]
    pub fn passed(&self) -> bool {
        self.failure.is_none()
    }
}

/// A backend that stops writing after a byte budget runs out.
///
/// The append that crosses the budget writes its leading bytes and then
/// fails, leaving a torn tail exactly like a process killed mid-`write`.
#[derive(Debug)]
pub struct FaultyBackend<B> {
    inner: B,
    budget: Option<u64>,
    written: u64,
    fail_syncs: bool,
    tripped: bool,
}

impl<B: StorageBackend> FaultyBackend<B> {
    /// Wraps `inner` with no faults armed.
    pub fn new(inner: B) -> Self {
        Self {
            inner,
            budget: None,
            written: 0,
            fail_syncs: false,
            tripped: false,
        }
    }

    /// Fails every write once `bytes` bytes have gone through.
    #[must_use]
    pub fn fail_after(mut self, bytes: u64) -> Self {
        self.budget = Some(bytes);
        self
    }

    /// Makes `flush` and `sync` fail.
    #[must_use]
    pub fn fail_syncs(mut self) -> Self {
        self.fail_syncs = true;
        self
    }

    /// Returns `true` once an injected fault has fired.
    #[must_use]
    pub fn tripped(&self) -> bool {
        self.tripped
    }

    fn fault(&mut self, during: &str) -> StorageError {
        self.tripped = true;
        io::Error::new(io::ErrorKind::Other, format!("injected fault during {during}")).into()
    }
}

impl<B: StorageBackend> StorageBackend for FaultyBackend<B> {
    fn read_at(&self, offset: u64, len: usize) -> StorageResult<Vec<u8>> {
        self.inner.read_at(offset, len)
    }

    fn append(&mut self, data: &[u8]) -> StorageResult<u64> {
        let Some(budget) = self.budget else {
            return self.inner.append(data);
        };

        let left = budget.saturating_sub(self.written);
        if (data.len() as u64) <= left {
            self.written += data.len() as u64;
            return self.inner.append(data);
        }

        if left > 0 {
            let _ = self.inner.append(&data[..left as usize]);
            self.written = budget;
        }
        Err(self.fault("append"))
    }

    fn flush(&mut self) -> StorageResult<()> {
        if self.fail_syncs {
            return Err(self.fault("flush"));
        }
        self.inner.flush()
    }

    fn size(&self) -> StorageResult<u64> {
        self.inner.size()
    }

    fn sync(&mut self) -> StorageResult<()> {
        if self.fail_syncs {
            return Err(self.fault("sync"));
        }
        self.inner.sync()
    }

    fn truncate(&mut self, new_size: u64) -> StorageResult<()> {
        self.inner.truncate(new_size)
    }
}

/// Runs crash scenarios against a log in a private temp directory.
pub struct CrashRecoveryHarness {
    config: Config,
    reports: Vec<RecoveryReport>,
    dir: TempDir,
}

impl CrashRecoveryHarness {
    /// Creates a harness with a fresh temp directory.
    ///
    /// # Errors
    ///
    /// Returns an error if the temp directory cannot be created.
    pub fn new() -> io::Result<Self> {
        Ok(Self {
            config: Config::new()
                .max_store_bytes(64 * 1024)
                .max_index_bytes(ENTRY_WIDTH * 64),
            reports: Vec::new(),
            dir: TempDir::new()?,
        })
    }

    /// Returns the log directory the scenarios use.
    #[must_use]
    pub fn log_dir(&self) -> PathBuf {
        self.dir.path().join("log")
    }

    /// Returns every report collected so far.
    #[must_use]
    pub fn reports(&self) -> &[RecoveryReport] {
        &self.reports
    }

    fn clear(&self) -> io::Result<()> {
        let dir = self.log_dir();
        if dir.exists() {
            std::fs::remove_dir_all(dir)?;
        }
        Ok(())
    }

    /// Writes [`RECORDS`] records into a fresh single-segment log and closes it.
    fn write_closed_log(&self) -> Result<u64, CoreError> {
        self.clear()?;
        let log = Log::open(&self.log_dir(), self.config.clone())?;
        for i in 0..RECORDS {
            log.append(&record_for(i))?;
        }
        let base = log.lowest_offset();
        log.close()?;
        Ok(base)
    }

    /// Damages the segment at `base` and returns the record the damage adds.
    fn inject(&self, point: CrashPoint, dir: &Path, base: u64) -> io::Result<Option<Vec<u8>>> {
        let open_store = || OpenOptions::new().append(true).open(store_path(dir, base));
        let open_index = || OpenOptions::new().write(true).open(index_path(dir, base));

        match point {
            CrashPoint::PreallocatedIndex => {
                open_index()?.set_len(self.config.max_index_bytes)?;
                Ok(None)
            }
            CrashPoint::TornStoreTail => {
                let mut store = open_store()?;
                store.write_all(&100u64.to_be_bytes())?;
                store.write_all(b"torn")?;
                Ok(None)
            }
            CrashPoint::UnindexedRecord => {
                let orphan = b"orphan".to_vec();
                let mut store = open_store()?;
                store.write_all(&(orphan.len() as u64).to_be_bytes())?;
                store.write_all(&orphan)?;
                Ok(Some(orphan))
            }
            CrashPoint::TruncatedIndex => {
                open_index()?.set_len(ENTRY_WIDTH * 4)?;
                Ok(None)
            }
        }
    }

    /// Runs one crash scenario and records its report.
    pub fn run(&mut self, point: CrashPoint) -> RecoveryReport {
        let scenario = format!("recovers from {point:?}");
        let report = match self.run_inner(point) {
            Ok(Ok(expected)) => RecoveryReport::ok(&scenario, expected),
            Ok(Err((expected, recovered, why))) => {
                RecoveryReport::failed(&scenario, expected, recovered, why)
            }
            Err(e) => RecoveryReport::failed(&scenario, RECORDS, 0, e.to_string()),
        };
        self.reports.push(report.clone());
        report
    }

    #[allow(clippy::type_complexity)]
    fn run_inner(&self, point: CrashPoint) -> Result<Result<u64, (u64, u64, String)>, CoreError> {
        let base = self.write_closed_log()?;
        let extra = self.inject(point, &self.log_dir(), base)?;
        let log = Log::open(&self.log_dir(), self.config.clone())?;

        let mut expected: Vec<Vec<u8>> = (0..RECORDS).map(record_for).collect();
        expected.extend(extra);
        let count = expected.len() as u64;

        let recovered = log.next_offset() - base;
        if recovered != count {
            return Ok(Err((count, recovered, "wrong record count".into())));
        }

        for (i, record) in expected.iter().enumerate() {
            let offset = base + i as u64;
            match log.read(offset) {
                Ok(data) if &data == record => {}
                Ok(_) => return Ok(Err((count, i as u64, format!("record {offset} differs")))),
                Err(e) => return Ok(Err((count, i as u64, e.to_string()))),
            }
        }

        let appended = log.append(b"after recovery")?;
        if appended != base + count || log.read(appended)? != b"after recovery" {
            return Ok(Err((count, count, "append after recovery misplaced".into())));
        }

        log.close()?;
        Ok(Ok(count))
    }

    /// Drops a `sync_on_append` log without closing it and checks that
    /// every record survives the reopen.
    pub fn run_dropped_log(&mut self) -> RecoveryReport {
        let scenario = "records survive dropping an unclosed log";
        let recovered = (|| -> Result<u64, CoreError> {
            self.clear()?;
            {
                let config = self.config.clone().sync_on_append(true);
                let log = Log::open(&self.log_dir(), config)?;
                for i in 0..RECORDS {
                    log.append(&record_for(i))?;
                }
            }

            let log = Log::open(&self.log_dir(), self.config.clone())?;
            let mut intact = 0;
            for i in 0..RECORDS {
                if log.read(i)? == record_for(i) {
                    intact += 1;
                }
            }
            Ok(intact)
        })();

        let report = match recovered {
            Ok(n) if n == RECORDS => RecoveryReport::ok(scenario, RECORDS),
            Ok(n) => RecoveryReport::failed(scenario, RECORDS, n, "records lost"),
            Err(e) => RecoveryReport::failed(scenario, RECORDS, 0, e.to_string()),
        };
        self.reports.push(report.clone());
        report
    }

    /// Runs every crash point plus the dropped-log scenario.
    pub fn run_all(&mut self) -> &[RecoveryReport] {
        for point in CrashPoint::ALL {
            self.run(point);
        }
        self.run_dropped_log();
        &self.reports
    }

    /// Returns `true` if every report so far passed.
    #[must_use]
    pub fn all_passed(&self) -> bool {
        self.reports.iter().all(RecoveryReport::passed)
    }
}

impl fmt::Display for CrashRecoveryHarness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let passed = self.reports.iter().filter(|r| r.passed()).count();
        writeln!(f, "crash recovery: {passed}/{} passed", self.reports.len())?;
        for report in &self.reports {
            match &report.failure {
                None => writeln!(f, "  ok   {}", report.scenario)?,
                Some(why) => writeln!(
                    f,
                    "  FAIL {} ({}/{} records: {why})",
                    report.scenario, report.recovered_records, report.expected_records
                )?,
            }
        }
        Ok(())
    }
}

impl fmt::Debug for CrashRecoveryHarness {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CrashRecoveryHarness")
            .field("log_dir", &self.log_dir())
            .field("reports", &self.reports.len())
            .finish()
    }
}
