use criterion::{black_box, criterion_group, criterion_main, Criterion, Throughput};
use std::sync::Arc;
use tempfile::TempDir;
use tiercache::{Bytes, Cache, CacheConfig, CachesManager, MemoryCache, TieredCache};

fn bench_memory_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("memory_get");
    group.sample_size(50);
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_1kb_hit", |b| {
        let cache = MemoryCache::new(Some(1000), None);
        let data = Bytes::from(vec![b'x'; 1024]);

        let keys: Vec<String> = (0..100).map(|i| format!("key-{}", i)).collect();
        for key in &keys {
            cache.set(key, data.clone());
        }

        let mut counter = 0;
        b.iter(|| {
            black_box(cache.get(&keys[counter % 100]));
            counter += 1;
        });
    });

    group.finish();
}

fn bench_memory_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("memory_churn");
    group.sample_size(50);
    group.throughput(Throughput::Elements(1));

    group.bench_function("set_with_eviction", |b| {
        let cache = MemoryCache::new(None, Some(64 * 1024));
        let data = Bytes::from(vec![b'x'; 1024]);

        let mut counter = 0u64;
        b.iter(|| {
            black_box(cache.set(&format!("key-{}", counter), data.clone()));
            counter += 1;
        });
    });

    group.finish();
}

fn bench_disk_get(c: &mut Criterion) {
    let mut group = c.benchmark_group("disk_get");
    group.sample_size(20);
    group.throughput(Throughput::Elements(1));

    group.bench_function("get_1kb_through_manager", |b| {
        let dir = TempDir::new().unwrap();
        let tier = TieredCache::open(dir.path(), CacheConfig::default()).unwrap();
        let data = Bytes::from(vec![b'x'; 1024]);

        let keys: Vec<String> = (0..100).map(|i| format!("key-{}", i)).collect();
        for key in &keys {
            tier.disk().set(key, data.clone());
        }

        let manager = CachesManager::new();
        manager.add_backend(Arc::new(tier));

        let mut counter = 0;
        b.iter(|| {
            black_box(manager.data(&keys[counter % 100]));
            counter += 1;
        });
    });

    group.finish();
}

criterion_group!(benches, bench_memory_get, bench_memory_churn, bench_disk_get);
criterion_main!(benches);
