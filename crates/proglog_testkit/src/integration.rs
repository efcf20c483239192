//! Cross-crate integration test helpers.
//!
//! Provides a model-tracking harness that checks a real log against the
//! records it is expected to hold.

use crate::fixtures::TestLog;
use crate::generators::LogOp;
use proglog_core::Config;
use proglog_storage::StorageBackend;
use std::collections::BTreeMap;

/// A test harness for integration testing.
pub struct IntegrationHarness {
    /// The log under test.
    pub log: TestLog,
    /// Records the log should hold, by offset.
    records: BTreeMap<u64, Vec<u8>>,
}

impl IntegrationHarness {
    /// Creates a new integration harness with the default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates a new integration harness with `config`.
    pub fn with_config(config: Config) -> Self {
        Self {
            log: TestLog::with_config(config),
            records: BTreeMap::new(),
        }
    }

    /// Appends a record and tracks it for later verification.
    ///
    /// Panics if the offset is not the one after the previous append.
    pub fn append(&mut self, record: Vec<u8>) -> u64 {
        let expected = self.log.next_offset();
        let offset = self.log.append(&record).expect("Failed to append record");
        assert_eq!(offset, expected, "Offsets must be assigned contiguously");

        self.records.insert(offset, record);
        offset
    }

    /// Reads a record and verifies it matches the tracked value.
    pub fn read_and_verify(&self, offset: u64) -> Vec<u8> {
        let actual = self.log.read(offset).expect("Failed to read record");
        if let Some(expected) = self.records.get(&offset) {
            assert_eq!(&actual, expected, "Record mismatch at offset {offset}");
        }
        actual
    }

    /// Truncates the log and drops tracked records that are gone.
    pub fn truncate(&mut self, lowest: u64) {
        self.log.truncate(lowest).expect("Failed to truncate");
        let retained = self.log.lowest_offset();
        self.records = self.records.split_off(&retained);
    }

    /// Closes and reopens the log.
    pub fn reopen(&mut self) {
        self.log.reopen();
    }

    /// Applies one generated operation.
    pub fn apply(&mut self, op: &LogOp) {
        match op {
            LogOp::Append(record) => {
                self.append(record.clone());
            }
            LogOp::Read(n) => {
                if let Some(offset) = self.nth_offset(*n) {
                    self.read_and_verify(offset);
                }
            }
            LogOp::Truncate(n) => {
                if let Some(offset) = self.nth_offset(*n) {
                    self.truncate(offset);
                }
            }
            LogOp::Reopen => self.reopen(),
        }
    }

    fn nth_offset(&self, n: usize) -> Option<u64> {
        if self.records.is_empty() {
            return None;
        }
        self.records.keys().nth(n % self.records.len()).copied()
    }

    /// Verifies all tracked records are in the log and nothing else is.
    pub fn verify_all(&self) {
        for (offset, expected) in &self.records {
            let actual = self.log.read(*offset).expect("Failed to read record");
            assert_eq!(&actual, expected, "Record mismatch at offset {offset}");
        }

        let lowest = self.log.lowest_offset();
        if lowest > 0 {
            assert!(self.log.read(lowest - 1).unwrap_err().is_not_found());
        }
        assert!(self
            .log
            .read(self.log.next_offset())
            .unwrap_err()
            .is_not_found());

        if let Some((&last, _)) = self.records.iter().next_back() {
            assert_eq!(self.log.highest_offset(), Some(last));
        }
    }

    /// Returns the count of tracked records.
    pub fn tracked_count(&self) -> usize {
        self.records.len()
    }
}

impl Default for IntegrationHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// Test storage integration.
pub mod storage {
    use super::*;
    use proglog_core::{Store, LEN_WIDTH};

    /// Tests that the storage backend properly persists data.
    pub fn test_storage_persistence(backend: &mut dyn StorageBackend, data: &[u8]) {
        let offset = backend.append(data).expect("Failed to append");
        backend.flush().expect("Failed to flush");

        let retrieved = backend.read_at(offset, data.len()).expect("Failed to read");
        assert_eq!(data, &retrieved[..], "Retrieved data should match");
    }

    /// Tests that a store frames records on top of `backend`.
    pub fn test_store_framing(backend: Box<dyn StorageBackend>, records: &[Vec<u8>]) {
        let start = backend.size().expect("Failed to get size");
        let store = Store::new(backend);

        let mut expected_position = start;
        let mut positions = Vec::with_capacity(records.len());
        for record in records {
            let (n, position) = store.append(record).expect("Failed to append");
            assert_eq!(position, expected_position);
            assert_eq!(n, LEN_WIDTH + record.len() as u64);
            expected_position += n;
            positions.push(position);
        }

        for (position, record) in positions.into_iter().zip(records) {
            assert_eq!(&store.read(position).expect("Failed to read"), record);
        }
        assert_eq!(store.size().expect("Failed to get size"), expected_position);
    }
}

/// Test segment rollover integration.
pub mod rollover {
    use proglog_core::Log;

    /// Verifies that segment ranges are contiguous and cover every retained
    /// offset.
    pub fn test_segment_ranges(log: &Log) {
        let bases = log.segment_base_offsets();
        assert!(!bases.is_empty(), "Log must always have a segment");
        assert_eq!(bases[0], log.lowest_offset());
        assert!(bases.windows(2).all(|w| w[0] < w[1]));

        // The last base is where the active segment starts; every offset
        // before it belongs to an earlier segment.
        let next = log.next_offset();
        assert!(*bases.last().expect("non-empty") <= next);
        for offset in log.lowest_offset()..next {
            log.read(offset).expect("Retained offset must be readable");
        }
    }
}
