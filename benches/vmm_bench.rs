use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use tempfile::TempDir;
use tiermem_core::{ConfigBuilder, Profile, Vmm};

fn open(dir: &TempDir, profile: Profile) -> Vmm {
    let config = ConfigBuilder::new(profile)
        .with_pagefile(dir.path().join("pagefile"))
        .with_sync_on_flush(false)
        .build()
        .unwrap();
    Vmm::create(config).unwrap()
}

fn bench_sequential_writes(c: &mut Criterion) {
    let mut group = c.benchmark_group("vmm_sequential_writes");

    for size in [64usize, 512, 4096].iter() {
        group.throughput(Throughput::Bytes(*size as u64 * 256));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let dir = TempDir::new().unwrap();
            let mut vmm = open(&dir, Profile::Small);
            let data = vec![0x5au8; size];
            b.iter(|| {
                for i in 0..256u64 {
                    vmm.write(i * size as u64, &data).unwrap();
                }
            });
        });
    }
    group.finish();
}

fn bench_hot_reads(c: &mut Criterion) {
    let mut group = c.benchmark_group("vmm_hot_reads");

    let dir = TempDir::new().unwrap();
    let mut vmm = open(&dir, Profile::Small);
    vmm.write(0, &[1u8; 1024]).unwrap();

    group.throughput(Throughput::Bytes(1024));
    group.bench_function("resident_1k", |b| {
        let mut buf = [0u8; 1024];
        b.iter(|| {
            vmm.read(0, &mut buf).unwrap();
            black_box(&buf);
        });
    });
    group.finish();
}

fn bench_scattered_access(c: &mut Criterion) {
    let mut group = c.benchmark_group("vmm_scattered");

    for profile in [Profile::Tiny, Profile::Small].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{:?}", profile)),
            profile,
            |b, &profile| {
                let dir = TempDir::new().unwrap();
                let mut vmm = open(&dir, profile);
                let limit = vmm.maximum_size() - 16;
                let mut buf = [0u8; 16];
                b.iter(|| {
                    // stride past every tier so misses reach the file
                    let mut address = 0;
                    while address < limit {
                        vmm.write(address, b"0123456789abcdef").unwrap();
                        vmm.read(address, &mut buf).unwrap();
                        address += 7919;
                    }
                });
            },
        );
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_sequential_writes,
    bench_hot_reads,
    bench_scattered_access
);
criterion_main!(benches);
