// Insert performance benchmarks for the extendible hashing index

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use exhash::{Error, HashIndex, IndexDescriptor, Options, Record};
use std::hint::black_box;
use tempfile::TempDir;

fn sample(id: i32) -> Record {
    Record::new(id, "Yannis", "Ioannidis", "Athens").unwrap()
}

/// Insert, tolerating the documented directory-full failure mode so skewed
/// random draws cannot abort the run.
fn insert_lossy(index: &HashIndex, desc: IndexDescriptor, id: i32) {
    match index.insert(desc, sample(id)) {
        Ok(()) | Err(Error::ResourceExhausted(_)) => {}
        Err(e) => panic!("unexpected insert error: {}", e),
    }
}

fn benchmark_insert_with_splits(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_with_splits");

    for size in [50, 100, 200].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let temp_dir = TempDir::new().unwrap();
                let path = temp_dir.path().join("bench.db");
                let index = HashIndex::new(Options::default()).unwrap();
                index.create_index(&path, 1).unwrap();
                let desc = index.open_index(&path).unwrap();

                use rand::Rng;
                let mut rng = rand::rng();

                for _ in 0..size {
                    insert_lossy(&index, desc, rng.random_range(0..1_000_000));
                }

                index.close_index(desc).unwrap();
                black_box(&index);
            });
        });
    }

    group.finish();
}

fn benchmark_insert_prefanned(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_prefanned");

    // Creating at the maximum depth takes doubling off the insert path.
    for size in [50, 100, 200].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let temp_dir = TempDir::new().unwrap();
                let path = temp_dir.path().join("bench.db");
                let index = HashIndex::new(Options::default()).unwrap();
                index.create_index(&path, 5).unwrap();
                let desc = index.open_index(&path).unwrap();

                use rand::Rng;
                let mut rng = rand::rng();

                for _ in 0..size {
                    insert_lossy(&index, desc, rng.random_range(0..1_000_000));
                }

                index.close_index(desc).unwrap();
                black_box(&index);
            });
        });
    }

    group.finish();
}

fn benchmark_insert_sequential_ids(c: &mut Criterion) {
    let mut group = c.benchmark_group("insert_sequential_ids");

    for size in [50, 100, 200].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                let temp_dir = TempDir::new().unwrap();
                let path = temp_dir.path().join("bench.db");
                let index = HashIndex::new(Options::default()).unwrap();
                index.create_index(&path, 2).unwrap();
                let desc = index.open_index(&path).unwrap();

                for id in 0..size {
                    insert_lossy(&index, desc, id);
                }

                index.close_index(desc).unwrap();
                black_box(&index);
            });
        });
    }

    group.finish();
}

fn benchmark_create_index(c: &mut Criterion) {
    let mut group = c.benchmark_group("create_index");

    // Creation cost grows with the initial directory: 2^depth bucket blocks.
    for depth in [0u32, 2, 5].iter() {
        group.bench_with_input(BenchmarkId::from_parameter(depth), depth, |b, &depth| {
            b.iter(|| {
                let temp_dir = TempDir::new().unwrap();
                let path = temp_dir.path().join("bench.db");
                let index = HashIndex::new(Options::default()).unwrap();
                index.create_index(&path, depth).unwrap();
                black_box(&index);
            });
        });
    }

    group.finish();
}

criterion_group!(
    benches,
    benchmark_insert_with_splits,
    benchmark_insert_prefanned,
    benchmark_insert_sequential_ids,
    benchmark_create_index
);
criterion_main!(benches);
