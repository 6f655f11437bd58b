//! Throughput Benchmark for kvstore
//!
//! This benchmark measures request round trips through the store runtime
//! under various workloads and backends.

use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use kvstore::adapter::{CacheAdapter, MemoryAdapter};
use kvstore::config::StoreConfig;
use kvstore::storage::{ExpiryConfig, Store};
use kvstore::Term;
use std::time::Duration;
use tokio::runtime::Runtime;

fn runtime() -> Runtime {
    tokio::runtime::Builder::new_multi_thread()
        .worker_threads(2)
        .enable_all()
        .build()
        .unwrap()
}

fn memory_store(rt: &Runtime, config: StoreConfig) -> Store {
    let _guard = rt.enter();
    Store::start(MemoryAdapter, Default::default(), config).unwrap()
}

fn cache_store(rt: &Runtime, adapter: CacheAdapter) -> Store {
    let _guard = rt.enter();
    Store::start(adapter, Default::default(), StoreConfig::new()).unwrap()
}

/// Benchmark PUT operations
fn bench_put(c: &mut Criterion) {
    let rt = runtime();
    let memory = memory_store(&rt, StoreConfig::new());
    let cache = cache_store(&rt, CacheAdapter::new());
    let packed = cache_store(&rt, CacheAdapter::compressed(6));

    let mut group = c.benchmark_group("put");
    group.throughput(Throughput::Elements(1));

    group.bench_function("memory_small", |b| {
        let mut i = 0u64;
        b.iter(|| {
            rt.block_on(memory.put(format!("key:{}", i), "small_value"))
                .unwrap();
            i += 1;
        });
    });

    let medium = Term::from("x".repeat(1024)); // 1KB value
    group.bench_function("cache_medium", |b| {
        let mut i = 0u64;
        b.iter(|| {
            rt.block_on(cache.put(format!("key:{}", i), medium.clone()))
                .unwrap();
            i += 1;
        });
    });

    group.bench_function("cache_medium_compressed", |b| {
        let mut i = 0u64;
        b.iter(|| {
            rt.block_on(packed.put(format!("key:{}", i), medium.clone()))
                .unwrap();
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark FETCH operations
fn bench_fetch(c: &mut Criterion) {
    let rt = runtime();
    let memory = memory_store(&rt, StoreConfig::new());
    let cache = cache_store(&rt, CacheAdapter::new());

    // Pre-populate with data
    rt.block_on(async {
        for i in 0..10_000 {
            memory.put(format!("key:{}", i), i).await.unwrap();
            cache.put(format!("key:{}", i), i).await.unwrap();
        }
    });

    let mut group = c.benchmark_group("fetch");
    group.throughput(Throughput::Elements(1));

    group.bench_function("memory_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            black_box(rt.block_on(memory.fetch(format!("key:{}", i % 10_000))).unwrap());
            i += 1;
        });
    });

    group.bench_function("cache_existing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            black_box(rt.block_on(cache.fetch(format!("key:{}", i % 10_000))).unwrap());
            i += 1;
        });
    });

    group.bench_function("memory_missing", |b| {
        let mut i = 0u64;
        b.iter(|| {
            black_box(rt.block_on(memory.fetch(format!("missing:{}", i))).unwrap());
            i += 1;
        });
    });

    group.finish();
}

/// Benchmark derived operations (several backend calls per request)
fn bench_derived(c: &mut Criterion) {
    let rt = runtime();
    let memory = memory_store(&rt, StoreConfig::new());
    let cache = cache_store(&rt, CacheAdapter::new());

    let mut group = c.benchmark_group("derived");
    group.throughput(Throughput::Elements(1));

    group.bench_function("increment_memory", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("counter:{}", i % 1000);
            black_box(rt.block_on(memory.increment(key, 1)).unwrap().unwrap());
            i += 1;
        });
    });

    group.bench_function("increment_cache", |b| {
        let mut i = 0u64;
        b.iter(|| {
            let key = format!("counter:{}", i % 1000);
            black_box(rt.block_on(cache.increment(key, 1)).unwrap().unwrap());
            i += 1;
        });
    });

    rt.block_on(async {
        for i in 0..1000 {
            memory.put(format!("item:{}", i), i).await.unwrap();
            cache.put(format!("item:{}", i), i).await.unwrap();
        }
    });
    let keys: Vec<Term> = (0..100).map(|i| Term::from(format!("item:{}", i))).collect();

    // Memory overrides take natively; cache derives it from fetches
    group.bench_function("take_100_memory", |b| {
        b.iter(|| black_box(rt.block_on(memory.take(keys.clone())).unwrap()));
    });

    group.bench_function("take_100_cache", |b| {
        b.iter(|| black_box(rt.block_on(cache.take(keys.clone())).unwrap()));
    });

    group.finish();
}

/// Benchmark concurrent callers on one store
fn bench_concurrent(c: &mut Criterion) {
    let rt = runtime();

    let mut group = c.benchmark_group("concurrent");
    group.measurement_time(Duration::from_secs(10));

    group.bench_function("4_tasks_mixed", |b| {
        b.iter(|| {
            let store = memory_store(&rt, StoreConfig::new());
            rt.block_on(async {
                let handles: Vec<_> = (0..4)
                    .map(|t| {
                        let store = store.clone();
                        tokio::spawn(async move {
                            for i in 0..1_000 {
                                let key = format!("key:{}:{}", t, i);
                                store.put(key.clone(), "value").await.unwrap();
                                store.fetch(key).await.unwrap();
                            }
                        })
                    })
                    .collect();

                for handle in handles {
                    handle.await.unwrap();
                }

                black_box(store.keys().await.unwrap().len());
                store.shutdown().await.unwrap();
            });
        });
    });

    group.finish();
}

/// Benchmark expiry operations
fn bench_expiry(c: &mut Criterion) {
    let rt = runtime();
    let store = memory_store(&rt, StoreConfig::new().with_expiry(ExpiryConfig::new()));

    let mut group = c.benchmark_group("expiry");
    group.throughput(Throughput::Elements(1));

    group.bench_function("put_and_expire", |b| {
        let mut i = 0u64;
        b.iter(|| {
            rt.block_on(store.put_and_expire(
                format!("key:{}", i),
                "value",
                Duration::from_secs(3600),
            ))
            .unwrap();
            i += 1;
        });
    });

    group.bench_function("expire_existing", |b| {
        // Pre-create keys
        rt.block_on(async {
            for i in 0..10_000 {
                store.put(format!("expire:{}", i), "value").await.unwrap();
            }
        });

        let mut i = 0u64;
        b.iter(|| {
            rt.block_on(store.expire(format!("expire:{}", i % 10_000), Duration::from_secs(3600)))
                .unwrap();
            i += 1;
        });
    });

    group.finish();
}

criterion_group!(
    benches,
    bench_put,
    bench_fetch,
    bench_derived,
    bench_concurrent,
    bench_expiry,
);

criterion_main!(benches);
