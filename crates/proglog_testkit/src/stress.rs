//! Load generators for the log.
//!
//! Each run returns a [`StressTestResult`]; the concurrent runs also check
//! that offsets stay unique and gap-free under contention.

use proglog_core::Log;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

/// Outcome of one stress run.
#[derive(Debug, Clone, PartialEq)]
pub struct StressTestResult {
    /// Calls that returned `Ok`.
    pub successful_ops: usize,
    /// Calls that returned an error.
    pub failed_ops: usize,
    /// Wall-clock time of the measured phase.
    pub elapsed: Duration,
}

impl StressTestResult {
    fn new(successful_ops: usize, failed_ops: usize, elapsed: Duration) -> Self {
        Self {
            successful_ops,
            failed_ops,
            elapsed,
        }
    }

    /// Returns every call made, successful or not.
    pub fn total_ops(&self) -> usize {
        self.successful_ops + self.failed_ops
    }

    /// Returns calls per second, or zero for an instant run.
    pub fn throughput(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.total_ops() as f64 / secs
        } else {
            0.0
        }
    }
}

impl std::fmt::Display for StressTestResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{} ops ({} failed) in {:?}, {:.0} ops/sec",
            self.total_ops(),
            self.failed_ops,
            self.elapsed,
            self.throughput()
        )
    }
}

/// Shape of a stress run.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Operations per thread.
    pub operations: usize,
    /// Worker threads for the concurrent runs.
    pub threads: usize,
    /// Payload size of every appended record.
    pub record_size: usize,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            operations: 10_000,
            threads: 4,
            record_size: 256,
        }
    }
}

/// Appends `config.operations` records from the calling thread.
pub fn stress_sequential_appends(log: &Log, config: &StressConfig) -> StressTestResult {
    let record = vec![0xABu8; config.record_size];

    let start = Instant::now();
    let successful = (0..config.operations)
        .filter(|_| log.append(&record).is_ok())
        .count();

    StressTestResult::new(successful, config.operations - successful, start.elapsed())
}

/// Reads retained offsets round-robin, seeding the log first if it is empty.
pub fn stress_sequential_reads(log: &Log, config: &StressConfig) -> StressTestResult {
    let record = vec![0xABu8; config.record_size];
    if log.highest_offset().is_none() {
        for _ in 0..config.operations {
            let _ = log.append(&record);
        }
    }

    let lowest = log.lowest_offset();
    let span = log
        .highest_offset()
        .map_or(1, |highest| highest - lowest + 1);

    let start = Instant::now();
    let successful = (0..config.operations as u64)
        .filter(|i| log.read(lowest + i % span).is_ok())
        .count();

    StressTestResult::new(successful, config.operations - successful, start.elapsed())
}

/// Run a concurrent append stress test.
///
/// Every thread appends `config.operations` records. Returns the result and
/// the sorted list of offsets handed out.
pub fn stress_concurrent_appends(
    log: Arc<Log>,
    config: &StressConfig,
) -> (StressTestResult, Vec<u64>) {
    let failed = Arc::new(AtomicUsize::new(0));

    let start = Instant::now();
    let handles: Vec<_> = (0..config.threads)
        .map(|t| {
            let log = Arc::clone(&log);
            let failed = Arc::clone(&failed);
            let operations = config.operations;
            let record = vec![t as u8; config.record_size];

            thread::spawn(move || {
                let mut offsets = Vec::with_capacity(operations);
                for _ in 0..operations {
                    match log.append(&record) {
                        Ok(offset) => offsets.push(offset),
                        Err(_) => {
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                    }
                }
                offsets
            })
        })
        .collect();

    let mut offsets: Vec<u64> = handles
        .into_iter()
        .flat_map(|h| h.join().expect("Append thread panicked"))
        .collect();
    let duration = start.elapsed();
    offsets.sort_unstable();

    let result = StressTestResult::new(offsets.len(), failed.load(Ordering::Relaxed), duration);
    (result, offsets)
}

/// Run appenders and readers side by side.
///
/// Readers only read offsets that a completed append has already returned,
/// so every read must succeed.
pub fn stress_concurrent_read_write(log: Arc<Log>, config: &StressConfig) -> StressTestResult {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let writers = (config.threads / 2).max(1);
    let readers = config.threads.saturating_sub(writers).max(1);

    let first = log.append(&[0u8; 1]).expect("Failed to seed log");
    successful.fetch_add(1, Ordering::Relaxed);

    let start = Instant::now();
    let mut handles = Vec::with_capacity(writers + readers);

    for w in 0..writers {
        let log = Arc::clone(&log);
        let successful = Arc::clone(&successful);
        let failed = Arc::clone(&failed);
        let operations = config.operations;
        let record = vec![w as u8; config.record_size];

        handles.push(thread::spawn(move || {
            for _ in 0..operations {
                match log.append(&record) {
                    Ok(_) => successful.fetch_add(1, Ordering::Relaxed),
                    Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                };
            }
        }));
    }

    for r in 0..readers {
        let log = Arc::clone(&log);
        let successful = Arc::clone(&successful);
        let failed = Arc::clone(&failed);
        let operations = config.operations as u64;

        handles.push(thread::spawn(move || {
            for i in 0..operations {
                let Some(highest) = log.highest_offset() else {
                    continue;
                };
                let offset = first + (i * 31 + r as u64) % (highest - first + 1);
                match log.read(offset) {
                    Ok(_) => successful.fetch_add(1, Ordering::Relaxed),
                    Err(_) => failed.fetch_add(1, Ordering::Relaxed),
                };
            }
        }));
    }

    for handle in handles {
        handle.join().expect("Stress thread panicked");
    }

    StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        start.elapsed(),
    )
}
