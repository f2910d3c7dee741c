//! Reconciliation pass benchmarks.

use bpfmap_caps::{MapDef, MapKind};
use bpfmap_sync::{EntryCache, MapState, MemoryMap, run_pass};
use criterion::{
    BatchSize, BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main,
};

fn setup(entries: u32) -> (MapState, MemoryMap) {
    let def = MapDef::new(MapKind::Hash, 4, 8, 4096);
    let state = MapState::new("bench", def, def);
    let map = MemoryMap::new(def).expect("failed to create map");

    {
        let mut cache = state.lock_cache();
        for i in 0..entries {
            cache.insert(&i.to_ne_bytes(), &u64::from(i).to_ne_bytes());
        }
    }
    (state, map)
}

/// Full passes over freshly inserted entries.
fn bench_insert_pass(c: &mut Criterion) {
    let mut group = c.benchmark_group("pass/insert");

    for entries in [64u32, 1024, 4096] {
        group.throughput(Throughput::Elements(u64::from(entries)));
        group.bench_with_input(BenchmarkId::from_parameter(entries), &entries, |b, &n| {
            b.iter_batched(
                || setup(n),
                |(state, map)| run_pass(black_box(&state), &map, 512),
                BatchSize::SmallInput,
            )
        });
    }

    group.finish();
}

/// A pass over a cache that is already in sync.
fn bench_idle_pass(c: &mut Criterion) {
    let (state, map) = setup(1024);
    run_pass(&state, &map, 512);

    c.bench_function("pass/in_sync_1024", |b| {
        b.iter(|| run_pass(black_box(&state), &map, 512))
    });
}

/// Cache bookkeeping without kernel calls.
fn bench_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("cache");

    group.bench_function("insert_delete", |b| {
        let mut cache = EntryCache::new();
        let key = 7u32.to_ne_bytes();
        let value = 9u64.to_ne_bytes();
        b.iter(|| {
            cache.insert(black_box(&key), black_box(&value));
            cache.delete(black_box(&key))
        })
    });

    group.finish();
}

criterion_group!(benches, bench_insert_pass, bench_idle_pass, bench_cache);
criterion_main!(benches);
