use criterion::{black_box, criterion_group, criterion_main, Criterion};

use callisto::lru::LRUCache;
use callisto::ring::HashRing;

fn lru_benchmarks(c: &mut Criterion) {
    c.bench_function("add into a bounded cache", |b| {
        let mut lru = LRUCache::new(64 * 1024);
        let mut index = 0usize;
        b.iter(|| {
            index += 1;
            lru.add(format!("key-{}", index % 4096), "X".repeat(64));
        });
    });

    c.bench_function("get a hot entry", |b| {
        let mut lru = LRUCache::new(64 * 1024);
        lru.add("hot".to_owned(), "X".repeat(64));
        b.iter(|| {
            black_box(lru.get(black_box("hot")));
        });
    });
}

fn ring_benchmarks(c: &mut Criterion) {
    c.bench_function("build a ring of 16 peers", |b| {
        let peers: Vec<String> = (0..16).map(|i| format!("http://node-{}:8001", i)).collect();
        b.iter(|| {
            let mut ring = HashRing::new(50);
            ring.add(&peers);
            black_box(ring);
        });
    });

    c.bench_function("route a key", |b| {
        let peers: Vec<String> = (0..16).map(|i| format!("http://node-{}:8001", i)).collect();
        let mut ring = HashRing::new(50);
        ring.add(&peers);
        b.iter(|| {
            black_box(ring.get(black_box("some-interesting-key")));
        });
    });
}

criterion_group!(benches, lru_benchmarks, ring_benchmarks);
criterion_main!(benches);
