use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tiermem_core::{CacheHandler, DirectCache, FastCache, Result};

struct Identity;

impl CacheHandler<u64> for Identity {
    fn on_fault(&mut self, key: u64) -> Result<u64> {
        Ok(key)
    }

    fn on_flush(&mut self, _key: u64, _value: &mut u64) -> Result<()> {
        Ok(())
    }

    fn on_remove(&mut self, _key: u64, _value: u64) -> Result<()> {
        Ok(())
    }
}

fn bench_direct_cache(c: &mut Criterion) {
    let mut group = c.benchmark_group("direct_cache");

    for size in [64, 1024, 16384].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let mut cache = DirectCache::new(size).unwrap();
            b.iter(|| {
                for key in 0..size as u64 {
                    cache.set(key, key);
                }
                for key in 0..size as u64 {
                    black_box(cache.get(key));
                }
            });
        });
    }
    group.finish();
}

fn bench_fast_cache_hits(c: &mut Criterion) {
    let mut group = c.benchmark_group("fast_cache_hits");

    for size in [64, 1024, 16384].iter() {
        let mut cache = FastCache::new(*size).unwrap();
        let mut handler = Identity;
        for key in 0..*size as u64 {
            cache.get(key, &mut handler).unwrap();
        }

        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.iter(|| {
                for key in 0..size as u64 {
                    black_box(*cache.get(key, &mut handler).unwrap());
                }
            });
        });
    }
    group.finish();
}

fn bench_fast_cache_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("fast_cache_churn");

    // working set twice the capacity: every access misses and evicts
    for capacity in [32, 512].iter() {
        group.throughput(Throughput::Elements(*capacity as u64 * 2));
        group.bench_with_input(
            BenchmarkId::from_parameter(capacity),
            capacity,
            |b, &capacity| {
                let mut cache = FastCache::new(capacity).unwrap();
                let mut handler = Identity;
                b.iter(|| {
                    for key in 0..capacity as u64 * 2 {
                        if !cache.contains(key) && cache.count() >= capacity {
                            cache.evict(1, &mut handler).unwrap();
                        }
                        black_box(*cache.get(key, &mut handler).unwrap());
                    }
                });
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_direct_cache,
    bench_fast_cache_hits,
    bench_fast_cache_churn
);
criterion_main!(benches);
