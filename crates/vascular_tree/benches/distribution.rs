mod common;

use std::hint::black_box;
use std::sync::atomic::AtomicU8;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use rand::rngs::StdRng;
use rand::SeedableRng;
use vascular_tree::distribution::{
    compare_sizes, distribute, CompareConfig, ConcurrentConfig, DistributionConfig, Gaussian90,
    Injection, Mode, SphereSizes,
};

const PARTICLES: u64 = 2_000;

fn modes() -> Vec<(&'static str, Mode)> {
    let sizes = SphereSizes::Gaussian90(Gaussian90::new(20e-6, 40e-6));
    vec![
        ("unembolized", Mode::Unembolized),
        ("embolized", Mode::Embolized),
        ("radiized", Mode::Radiized(sizes)),
        ("unradiized", Mode::Unradiized(sizes)),
        (
            "concurrent",
            Mode::Concurrent(
                ConcurrentConfig::default()
                    .with_sizes(sizes)
                    .with_injection(Injection::Instant)
                    .with_time_step(1e-4),
            ),
        ),
    ]
}

fn distribution_mode_benches(c: &mut Criterion) {
    let tree = common::balanced_tract_tree(10, 0xD15);
    let mut group = c.benchmark_group("distribution/modes");
    group.throughput(common::elements_throughput(PARTICLES as usize));
    for (name, mode) in modes() {
        let config = DistributionConfig::default().with_mode(mode);
        let mut rng = StdRng::seed_from_u64(0xA11CE);
        group.bench_with_input(BenchmarkId::from_parameter(name), &name, |b, _| {
            b.iter(|| {
                let d = distribute(&tree, PARTICLES, &config, &mut rng, &AtomicU8::new(0));
                black_box(d.map(|d| d.clusters.len()).unwrap_or(0));
            });
        });
    }
    group.finish();
}

fn compare_sizes_benches(c: &mut Criterion) {
    let mut group = c.benchmark_group("distribution/compare_sizes");
    for depth in [6u32, 10, 14] {
        let tree = common::balanced_tract_tree(depth, 0xC0FFEE ^ u64::from(depth));
        let config = CompareConfig::new(Gaussian90::new(20e-6, 30e-6), Gaussian90::new(30e-6, 40e-6))
            .with_trials(10_000);
        group.throughput(common::elements_throughput(config.trials));
        let mut rng = StdRng::seed_from_u64(0xBEEF);
        group.bench_with_input(BenchmarkId::from_parameter(depth), &depth, |b, _| {
            b.iter(|| black_box(compare_sizes(&tree, &config, &mut rng).map(|r| r.between)));
        });
    }
    group.finish();
}

criterion_group! {
    name = benches;
    config = common::default_criterion();
    targets = distribution_mode_benches, compare_sizes_benches
}
criterion_main!(benches);
