//! Reference-counted cache benchmarks.

use criterion::{black_box, criterion_group, criterion_main, Criterion};
use strata_cache::{CacheError, CacheSource, RefCountCache};

struct Identity;

impl CacheSource for Identity {
    type Item = [u8; 64];
    type Error = CacheError;

    fn fetch(&self, key: u64) -> Result<[u8; 64], CacheError> {
        Ok([key as u8; 64])
    }

    fn evict(&self, _key: u64, _item: &[u8; 64]) -> Result<(), CacheError> {
        Ok(())
    }
}

fn hit_benchmark(c: &mut Criterion) {
    let cache = RefCountCache::new(Identity, 1024);
    for key in 0..512 {
        let _ = cache.get(key);
    }

    c.bench_function("refcount_hit_512", |b| {
        b.iter(|| {
            for key in 0..512 {
                if cache.get(key).is_ok() {
                    let _ = cache.release(key);
                }
            }
            black_box(cache.resident_count())
        })
    });
}

fn miss_benchmark(c: &mut Criterion) {
    c.bench_function("refcount_get_release_1000", |b| {
        b.iter(|| {
            let cache = RefCountCache::new(Identity, 1024);
            for key in 0..1000 {
                if cache.get(key).is_ok() {
                    let _ = cache.release(key);
                }
            }
            black_box(cache.stats().evictions())
        })
    });
}

criterion_group!(benches, hit_benchmark, miss_benchmark);
criterion_main!(benches);
