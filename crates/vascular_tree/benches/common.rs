use std::time::Duration;

use criterion::{Criterion, Throughput};
use glam::DVec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use vascular_tree::distribution::{FlowVessel, TractTree};
use vascular_tree::tree::{BinaryTree, NodeId, Side};
use vascular_tree::vessel::VesselId;

pub const SAMPLE_SIZE: usize = 20;
pub const WARM_UP: Duration = Duration::from_secs(1);
pub const MEASUREMENT_TIME: Duration = Duration::from_secs(2);

pub fn default_criterion() -> Criterion {
    Criterion::default()
        .configure_from_args()
        .sample_size(SAMPLE_SIZE)
        .warm_up_time(WARM_UP)
        .measurement_time(MEASUREMENT_TIME)
}

pub fn elements_throughput(elements: usize) -> Throughput {
    Throughput::Elements(elements.max(1) as u64)
}

#[allow(dead_code)]
fn unit(rng: &mut StdRng) -> f64 {
    (rng.next_u64() >> 11) as f64 / (1u64 << 53) as f64
}

/// A full binary tree of `depth` levels with Murray radii and halving flows, growing along +z.
#[allow(dead_code)]
pub fn balanced_tract_tree(depth: u32, seed: u64) -> TractTree {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut next = 0u32;
    let mut id = || {
        next += 1;
        VesselId(next)
    };
    let radius = |level: u32| 1e-3 * 0.5f64.powf(f64::from(level) / 3.0);
    let flow = |level: u32| 1e-6 * 0.5f64.powi(level as i32);

    let root_end = DVec3::new(0.0, 0.0, 2e-3);
    let mut tree = BinaryTree::with_root(FlowVessel::new(id(), DVec3::ZERO, root_end, radius(0), flow(0)));
    let mut frontier: Vec<(NodeId, u32)> = tree.root().map(|r| (r, 0)).into_iter().collect();
    while let Some((n, level)) = frontier.pop() {
        if level + 1 >= depth {
            continue;
        }
        let start = tree[n].end;
        let len = 2e-3 * 0.8f64.powi(level as i32 + 1);
        for side in [Side::Left, Side::Right] {
            let jitter = DVec3::new(unit(&mut rng) - 0.5, unit(&mut rng) - 0.5, 1.0);
            let end = start + jitter.normalize() * len;
            let child = tree.set_child(
                n,
                side,
                FlowVessel::new(id(), start, end, radius(level + 1), flow(level + 1)),
            );
            frontier.push((child, level + 1));
        }
    }
    TractTree::from_tree(tree).expect("valid benchmark tree")
}
