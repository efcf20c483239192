//! Property-based test generators using proptest.
//!
//! Provides strategies for generating records and log configurations.

use proglog_core::{Config, ENTRY_WIDTH, LEN_WIDTH};
use proptest::prelude::*;

/// Strategy for generating a single record (arbitrary bytes, possibly empty).
pub fn record_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..1024)
}

/// Strategy for generating a short record.
pub fn small_record_strategy() -> impl Strategy<Value = Vec<u8>> {
    prop::collection::vec(any::<u8>(), 0..64)
}

/// Strategy for generating a batch of up to `max` short records.
pub fn record_batch_strategy(max: usize) -> impl Strategy<Value = Vec<Vec<u8>>> {
    prop::collection::vec(small_record_strategy(), 1..=max.max(1))
}

/// Strategy for generating configurations with small caps, so that
/// generated batches span several segments.
pub fn small_config_strategy() -> impl Strategy<Value = Config> {
    (LEN_WIDTH..512, 1u64..8, 0u64..1_000).prop_map(|(store, entries, initial)| {
        Config::new()
            .max_store_bytes(store)
            .max_index_bytes(ENTRY_WIDTH * entries)
            .initial_offset(initial)
    })
}

/// Operations applied to a log in model-based tests.
#[derive(Debug, Clone)]
pub enum LogOp {
    /// Append a record.
    Append(Vec<u8>),
    /// Read back the record `n` positions after the lowest tracked offset.
    Read(usize),
    /// Truncate below the `n`th tracked offset.
    Truncate(usize),
    /// Close and reopen the log.
    Reopen,
}

/// Strategy for generating one log operation, weighted towards appends.
pub fn log_op_strategy() -> impl Strategy<Value = LogOp> {
    prop_oneof![
        6 => small_record_strategy().prop_map(LogOp::Append),
        3 => any::<usize>().prop_map(LogOp::Read),
        1 => any::<usize>().prop_map(LogOp::Truncate),
        1 => Just(LogOp::Reopen),
    ]
}

/// Strategy for generating a sequence of log operations.
pub fn log_ops_strategy(max: usize) -> impl Strategy<Value = Vec<LogOp>> {
    prop::collection::vec(log_op_strategy(), 1..=max.max(1))
}

/// Returns a proptest config with the given number of cases.
pub fn config_with_cases(cases: u32) -> ProptestConfig {
    ProptestConfig::with_cases(cases)
}
