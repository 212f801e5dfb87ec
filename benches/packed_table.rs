//! Packed-table benchmarks for remora
//!
//! These benchmarks measure the hot paths of the storage engine: lookups
//! against short and long keys, misses, and put/delete/overwrite churn.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use rand::RngCore;

use remora::storage::Region;
use remora::PackedTable;

const BUFFER_SIZE: usize = 16 * 1024 * 1024;

fn random_pairs(count: usize) -> Vec<(Vec<u8>, Vec<u8>)> {
    let mut rng = rand::thread_rng();
    let mut pairs = Vec::with_capacity(count);
    for _ in 0..count {
        let mut key = vec![0u8; (rng.next_u32() % 31 + 1) as usize];
        rng.fill_bytes(&mut key);
        let mut val = vec![0u8; (rng.next_u32() % 4096 + 1) as usize];
        rng.fill_bytes(&mut val);
        pairs.push((key, val));
    }
    pairs.sort();
    pairs.dedup_by(|a, b| a.0 == b.0);
    pairs
}

fn bench_lookup(c: &mut Criterion) {
    let mut group = c.benchmark_group("packed_table_lookup");

    let mut short_key = vec![0u8; 32];
    let mut long_key = vec![0u8; 1024];
    let mut val = vec![0u8; 12345];
    let mut rng = rand::thread_rng();
    rng.fill_bytes(&mut short_key);
    rng.fill_bytes(&mut long_key);
    rng.fill_bytes(&mut val);

    let mut table = PackedTable::new(Region::anon(BUFFER_SIZE).unwrap(), 0);
    table.put(&short_key, &val).unwrap();
    table.put(&long_key, &val).unwrap();

    group.bench_function("has_short_key", |b| {
        b.iter(|| table.has(black_box(&short_key)))
    });
    group.bench_function("has_long_key", |b| {
        b.iter(|| table.has(black_box(&long_key)))
    });
    group.bench_function("get_hit", |b| {
        b.iter(|| table.get(black_box(&short_key)).map(<[u8]>::len))
    });

    let mut missing = short_key.clone();
    missing[0] ^= 0xff;
    group.bench_function("get_miss", |b| {
        b.iter(|| table.get(black_box(&missing)).is_some())
    });

    group.finish();
}

fn bench_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("packed_table_churn");
    let pairs = random_pairs(1024);

    group.bench_function("fill", |b| {
        let mut table = PackedTable::new(Region::anon(BUFFER_SIZE).unwrap(), 0);
        b.iter(|| {
            table.reset();
            for (key, val) in &pairs {
                black_box(table.put(key, val).is_ok());
            }
        })
    });

    group.bench_function("fill_and_delete", |b| {
        let mut table = PackedTable::new(Region::anon(BUFFER_SIZE).unwrap(), 0);
        b.iter(|| {
            table.reset();
            for (key, val) in &pairs {
                black_box(table.put(key, val).is_ok());
            }
            for (key, _) in &pairs {
                black_box(table.delete(key));
            }
        })
    });

    group.bench_function("fill_and_overwrite", |b| {
        let mut table = PackedTable::new(
            Region::anon(BUFFER_SIZE).unwrap(),
            BUFFER_SIZE / 4,
        );
        b.iter(|| {
            table.reset();
            for (key, val) in &pairs {
                black_box(table.put(key, val).is_ok());
            }
            for (key, val) in &pairs {
                black_box(table.put(key, val).is_ok());
            }
        })
    });

    group.finish();
}

criterion_group!(benches, bench_lookup, bench_churn);
criterion_main!(benches);
