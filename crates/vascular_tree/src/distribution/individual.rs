//! One particle at a time, with flow depletion.
use std::sync::atomic::AtomicU8;

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::distribution::flow_tree::TractTree;
use crate::distribution::overlay::{FlowOverlay, Traversal};
use crate::distribution::sampler::SphereSizes;
use crate::distribution::{report, Distribution, SphereLocation};
use crate::error::Result;
use crate::growth::lattice::CELL_THICKNESS;
use crate::random::rand01;

/// Particle diameter assumed for tract capacity and cluster spacing.
pub const DEFAULT_SPHERE_DIAMETER: f64 = 27.5e-6;

/// Particles closer than this along the tree belong to the same cluster.
pub const CLUSTER_DISTANCE: f64 = 200e-6;

/// Inserts `count` particles one after another.
///
/// A particle stops in a tract, in a vessel already holding a particle, or in the first vessel
/// narrower than itself. The vessel it stops in loses `flow / spheres_per_tract` of its flow,
/// so later particles avoid it. An infinite `spheres_per_tract` keeps the flow constant.
///
/// Sizes are drawn from a separate generator seeded once from `rng`.
pub fn individual(
    tree: &TractTree,
    count: u64,
    straight_ratio: f64,
    spheres_per_tract: f64,
    sizes: Option<&SphereSizes>,
    rng: &mut dyn Rng,
    progress: &AtomicU8,
) -> Result<Distribution> {
    let mut overlay = FlowOverlay::new(tree, straight_ratio);
    let mut counts = vec![0u64; tree.capacity()];
    let mut size_rng = StdRng::seed_from_u64(rng.next_u64());

    for i in 0..count {
        let radius = sizes.map_or(0.0, |s| s.sample(&mut size_rng));
        overlay.traverse(|visit, flow| {
            let here = &mut counts[visit.node.index()];
            if visit.is_leaf() || *here > 0 || visit.vessel.radius < radius {
                *here += 1;
                *flow = (*flow - visit.vessel.flow / spheres_per_tract).max(0.0);
                return Traversal::Stop;
            }
            let p_left = visit.left.map_or(0.0, |c| c.p);
            if visit.right.is_some() && rand01(rng) > p_left {
                Traversal::Right
            } else {
                Traversal::Left
            }
        })?;
        report(progress, 100 * i / count.max(1));
    }

    let per_tract = if spheres_per_tract.is_finite() {
        spheres_per_tract
    } else {
        CELL_THICKNESS / DEFAULT_SPHERE_DIAMETER
    };
    let spheres = sphere_list(tree, &overlay, &mut counts, per_tract);
    let clusters = determine_clusters(tree, &counts, DEFAULT_SPHERE_DIAMETER);
    Ok(Distribution { spheres, clusters })
}

/// Spreads the particles of every vessel along it from the end backwards, at most
/// `ceil(length · spheres_per_metre)` per vessel. The excess is pushed to the children in the
/// proportion of their branch probabilities; a tract keeps whatever it receives.
fn sphere_list(
    tree: &TractTree,
    overlay: &FlowOverlay<'_>,
    counts: &mut [u64],
    spheres_per_tract: f64,
) -> Vec<SphereLocation> {
    let per_metre = spheres_per_tract / CELL_THICKNESS;
    let mut out = Vec::new();
    for &n in tree.pre_order() {
        let c = counts[n.index()];
        if c == 0 {
            continue;
        }
        let v = tree.vessel(n);
        let max_here = ((v.length() * per_metre).ceil() as u64).max(1);
        if c > max_here {
            let extra = c - max_here;
            match (tree.left(n), tree.right(n)) {
                (Some(l), Some(r)) => {
                    let to_left = ((overlay.p(l) * extra as f64).ceil() as u64).min(extra);
                    counts[l.index()] += to_left;
                    counts[r.index()] += extra - to_left;
                    counts[n.index()] = max_here;
                }
                (Some(l), None) | (None, Some(l)) => {
                    counts[l.index()] += extra;
                    counts[n.index()] = max_here;
                }
                (None, None) => {}
            }
        }
        let step = (v.end - v.start).normalize_or_zero() / per_metre;
        out.extend((0..counts[n.index()]).map(|i| SphereLocation {
            position: v.end - i as f64 * step,
            vessel: v.owner,
        }));
    }
    out
}

/// Groups particles bottom-up: the particles of a vessel join those of its parent while the
/// free length between them stays below [`CLUSTER_DISTANCE`].
pub(crate) fn determine_clusters(tree: &TractTree, counts: &[u64], diameter: f64) -> Vec<u64> {
    let mut pending: Vec<Option<(f64, u64)>> = vec![None; tree.capacity()];
    let mut clusters = Vec::new();
    for &n in tree.post_order() {
        let (prev_dist, mut spheres) = pending[n.index()].unwrap_or((0.0, 0));
        let here = counts[n.index()];
        let length = tree.vessel(n).length();
        let dist = if here == 0 {
            length + prev_dist
        } else {
            spheres += here;
            length - here as f64 * diameter
        };
        if spheres == 0 {
            continue;
        }
        match tree.parent(n) {
            Some(p) if dist <= CLUSTER_DISTANCE => merge(&mut pending[p.index()], dist, spheres),
            _ => clusters.push(spheres),
        }
    }
    clusters
}

fn merge(slot: &mut Option<(f64, u64)>, dist: f64, spheres: u64) {
    *slot = Some(match *slot {
        Some((d, s)) => (d.max(dist), s + spheres),
        None => (dist, spheres),
    });
}
