//! Benchmark utilities.

use proglog_core::{Config, Log};
use rand::Rng;
use std::path::Path;

/// Generate random record data of the specified size.
pub fn random_data(size: usize) -> Vec<u8> {
    let mut rng = rand::thread_rng();
    (0..size).map(|_| rng.gen()).collect()
}

/// Generate a batch of random records with the specified payload size.
pub fn random_records(count: usize, size: usize) -> Vec<Vec<u8>> {
    (0..count).map(|_| random_data(size)).collect()
}

/// Generate `count` offsets in `[lowest, lowest + span)` in random order.
pub fn random_offsets(count: usize, lowest: u64, span: u64) -> Vec<u64> {
    let mut rng = rand::thread_rng();
    (0..count).map(|_| lowest + rng.gen_range(0..span)).collect()
}

/// Opens a log in `dir` and fills it with `count` random records.
pub fn populated_log(dir: &Path, config: Config, count: usize, size: usize) -> Log {
    let log = Log::open(dir, config).expect("Failed to open log");
    let record = random_data(size);
    for _ in 0..count {
        log.append(&record).expect("Failed to append");
    }
    log
}
