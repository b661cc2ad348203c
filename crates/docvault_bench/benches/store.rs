//! Document store benchmarks.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use docvault_bench::{disk_store, generate_documents, memory_store, random_data};
use docvault_core::{Config, Metadata};

/// Benchmark first saves of new documents.
fn bench_first_save(c: &mut Criterion) {
    let mut group = c.benchmark_group("first_save");

    for size in [64, 1024, 16 * 1024].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let store = memory_store(Config::default());
            let data = random_data(size);
            let mut n = 0u64;

            b.iter(|| {
                n += 1;
                store
                    .save(&format!("docs/{n}.bin"), black_box(data.clone()), Metadata::new())
                    .unwrap();
            });
        });
    }
    group.finish();
}

/// Benchmark overwrites, which snapshot and prune backups on every save.
fn bench_overwrite(c: &mut Criterion) {
    let mut group = c.benchmark_group("overwrite");

    for max_backups in [1, 5, 20].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(max_backups),
            max_backups,
            |b, &max_backups| {
                let store = memory_store(Config::default().max_backups(max_backups));
                let data = random_data(1024);
                store.save("doc.bin", data.clone(), Metadata::new()).unwrap();

                b.iter(|| {
                    store
                        .save("doc.bin", black_box(data.clone()), Metadata::new())
                        .unwrap();
                });
            },
        );
    }
    group.finish();
}

/// Benchmark batch saves.
fn bench_batch_save(c: &mut Criterion) {
    let mut group = c.benchmark_group("batch_save");

    for batch_size in [10, 100].iter() {
        group.throughput(Throughput::Elements(*batch_size as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(batch_size),
            batch_size,
            |b, &batch_size| {
                let store = memory_store(Config::default());

                // Pre-generate documents
                let documents = generate_documents("batch", batch_size, 256);

                b.iter(|| {
                    let result = store.batch_save(black_box(documents.clone()));
                    assert_eq!(result.failed, 0);
                });
            },
        );
    }
    group.finish();
}

/// Benchmark saves against the real filesystem, with and without
/// directory syncs.
fn bench_disk_save(c: &mut Criterion) {
    let mut group = c.benchmark_group("disk_save");
    group.sample_size(20);

    for sync in [false, true].iter() {
        let name = if *sync { "synced_dirs" } else { "unsynced_dirs" };
        group.bench_function(name, |b| {
            let (_dir, store) = disk_store(Config::default().sync_directories(*sync));
            let data = random_data(4096);

            b.iter(|| {
                store
                    .save("doc.bin", black_box(data.clone()), Metadata::new())
                    .unwrap();
            });
        });
    }
    group.finish();
}

/// Benchmark restoring the latest backup.
fn bench_restore(c: &mut Criterion) {
    c.bench_function("restore_latest", |b| {
        let store = memory_store(Config::default());
        store.save("doc.bin", random_data(1024), Metadata::new()).unwrap();
        store.save("doc.bin", random_data(1024), Metadata::new()).unwrap();

        b.iter(|| {
            let info = store.restore_from_backup(black_box("doc.bin"), None).unwrap();
            black_box(info);
        });
    });
}

criterion_group!(
    benches,
    bench_first_save,
    bench_overwrite,
    bench_batch_save,
    bench_disk_save,
    bench_restore,
);

criterion_main!(benches);
