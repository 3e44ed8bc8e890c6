mod common;

use std::hint::black_box;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use glam::DVec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use vascular_tree::geometry::Aabb;
use vascular_tree::spatial::{Octree, SegmentItem};
use vascular_tree::vessel::VesselId;

const SIZES: [usize; 4] = [1_000, 10_000, 50_000, 200_000];

fn point(rng: &mut StdRng) -> DVec3 {
    let mut u = || (rng.next_u64() >> 11) as f64 / (1u64 << 53) as f64;
    DVec3::new(u(), u(), u())
}

fn segments(n: usize, seed: u64) -> Vec<SegmentItem> {
    let mut rng = StdRng::seed_from_u64(seed);
    (0..n)
        .map(|i| {
            let start = point(&mut rng);
            let end = start + (point(&mut rng) - 0.5) * 0.02;
            SegmentItem::new(VesselId(i as u32), start, end)
        })
        .collect()
}

fn filled(items: &[SegmentItem]) -> Octree<SegmentItem> {
    let mut tree = Octree::new(Aabb::from_corners(DVec3::splat(-0.1), DVec3::splat(1.1)));
    for item in items {
        tree.insert(*item);
    }
    tree
}

fn octree_insert_benches(c: &mut Criterion) {
    let mut group = c.benchmark_group("octree/insert");
    for &n in &SIZES {
        let items = segments(n, 0x0C7 ^ n as u64);
        group.throughput(common::elements_throughput(n));
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| black_box(filled(&items).len()));
        });
    }
    group.finish();
}

fn octree_query_benches(c: &mut Criterion) {
    let mut group = c.benchmark_group("octree/n_nearest_30");
    for &n in &SIZES {
        let tree = filled(&segments(n, 0x0C7 ^ n as u64));
        let mut rng = StdRng::seed_from_u64(0xBEEF ^ n as u64);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                let p = point(&mut rng);
                let found = tree.n_nearest(p, 30, |s, q| s.forward_distance_squared(q));
                black_box(found.len());
            });
        });
    }
    group.finish();

    let mut group = c.benchmark_group("octree/nearest");
    for &n in &SIZES {
        let tree = filled(&segments(n, 0x0C7 ^ n as u64));
        let mut rng = StdRng::seed_from_u64(0xF00D ^ n as u64);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                let p = point(&mut rng);
                black_box(tree.nearest(p, |s, q| Some(s.distance_squared(q))));
            });
        });
    }
    group.finish();
}

criterion_group! {
    name = benches;
    config = common::default_criterion();
    targets = octree_insert_benches, octree_query_benches
}
criterion_main!(benches);
