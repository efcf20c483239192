//! Storage backend and store benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use proglog_bench::utils::random_data;
use proglog_core::Store;
use proglog_storage::{FileBackend, InMemoryBackend, StorageBackend};
use tempfile::TempDir;

const PAYLOAD_SIZES: [usize; 3] = [256, 1024, 4096];

fn append_loop<B: StorageBackend>(backend: &mut B, data: &[u8]) -> u64 {
    backend.append(black_box(data)).unwrap()
}

/// Raw backend appends: the heap buffer against the buffered file.
fn bench_backend_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("backend_append");
    group.sample_size(50);

    for size in PAYLOAD_SIZES {
        let data = random_data(size);
        group.throughput(Throughput::Bytes(size as u64));

        group.bench_with_input(BenchmarkId::new("inmemory", size), &data, |b, data| {
            let mut backend = InMemoryBackend::new();
            b.iter(|| black_box(append_loop(&mut backend, data)));
        });

        group.bench_with_input(BenchmarkId::new("file", size), &data, |b, data| {
            let dir = TempDir::new().unwrap();
            let mut backend = FileBackend::open(&dir.path().join("bench.store")).unwrap();
            b.iter(|| black_box(append_loop(&mut backend, data)));
        });
    }

    group.finish();
}

/// A read right behind a write forces the file buffer to drain every time.
fn bench_file_read_after_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_read_after_append");
    group.sample_size(50);

    for size in PAYLOAD_SIZES {
        let data = random_data(size);
        group.throughput(Throughput::Bytes(size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), &data, |b, data| {
            let dir = TempDir::new().unwrap();
            let mut backend = FileBackend::open(&dir.path().join("bench.store")).unwrap();

            b.iter(|| {
                let at = backend.append(data).unwrap();
                black_box(backend.read_at(at, data.len()).unwrap())
            });
        });
    }

    group.finish();
}

/// One append plus `fsync` per iteration.
fn bench_file_sync(c: &mut Criterion) {
    let mut group = c.benchmark_group("file_sync");
    group.sample_size(20);

    let temp_dir = TempDir::new().unwrap();
    let mut backend = FileBackend::open(&temp_dir.path().join("bench.store")).unwrap();
    let data = random_data(1024);

    group.bench_function("after_1kb_write", |b| {
        b.iter(|| {
            backend.append(&data).unwrap();
            backend.sync().unwrap();
        });
    });

    group.finish();
}

/// Length-prefixed appends through a store on each backend.
fn bench_store_append(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_append");

    for size in [64, 1024].iter() {
        group.throughput(Throughput::Bytes(*size as u64));

        group.bench_with_input(BenchmarkId::new("inmemory", size), size, |b, &size| {
            let store = Store::new(Box::new(InMemoryBackend::new()));
            let data = random_data(size);

            b.iter(|| black_box(store.append(black_box(&data)).unwrap()));
        });

        group.bench_with_input(BenchmarkId::new("file", size), size, |b, &size| {
            let temp_dir = TempDir::new().unwrap();
            let store = Store::open(&temp_dir.path().join("bench.store")).unwrap();
            let data = random_data(size);

            b.iter(|| black_box(store.append(black_box(&data)).unwrap()));
        });
    }

    group.finish();
}

/// Scattered store reads over a synced file.
fn bench_store_random_read(c: &mut Criterion) {
    let mut group = c.benchmark_group("store_random_read");

    let record_size = 256;
    let record_count = 1000;

    group.bench_function("file_1000_records", |b| {
        let temp_dir = TempDir::new().unwrap();
        let store = Store::open(&temp_dir.path().join("bench.store")).unwrap();
        let data = random_data(record_size);

        let positions: Vec<u64> = (0..record_count)
            .map(|_| store.append(&data).unwrap().1)
            .collect();
        store.sync().unwrap();

        let mut order = positions.iter().cycle().step_by(7);
        b.iter(|| {
            let position = *order.next().unwrap();
            black_box(store.read(black_box(position)).unwrap())
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_backend_append,
    bench_file_read_after_append,
    bench_file_sync,
    bench_store_append,
    bench_store_random_read,
);

criterion_main!(benches);
