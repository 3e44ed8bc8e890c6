//! Whole-population split without flow feedback.
use std::sync::atomic::AtomicU8;

use rand::Rng;

use crate::distribution::flow_tree::TractTree;
use crate::distribution::overlay::FlowOverlay;
use crate::distribution::{report, Distribution, SphereLocation};
use crate::random::binomial;

/// Splits `count` particles binomially at every bifurcation; a lone child takes everything.
/// Particles rest at the end of the tract they arrive in and every non-empty tract is one
/// cluster.
pub fn unembolized(
    tree: &TractTree,
    count: u64,
    straight_ratio: f64,
    rng: &mut dyn Rng,
    progress: &AtomicU8,
) -> Distribution {
    let overlay = FlowOverlay::new(tree, straight_ratio);
    let mut counts = vec![0u64; tree.capacity()];
    counts[tree.root().index()] = count;

    let order = tree.pre_order();
    for (i, &n) in order.iter().enumerate() {
        let here = counts[n.index()];
        match (tree.left(n), tree.right(n)) {
            (Some(l), Some(r)) => {
                let left = binomial(here, overlay.p(l), rng);
                counts[l.index()] = left;
                counts[r.index()] = here - left;
                counts[n.index()] = 0;
            }
            (Some(l), None) | (None, Some(l)) => {
                counts[l.index()] = here;
                counts[n.index()] = 0;
            }
            (None, None) => {}
        }
        report(progress, (100 * i / order.len()) as u64);
    }

    let mut out = Distribution::default();
    for &n in order {
        let c = counts[n.index()];
        if c == 0 {
            continue;
        }
        let v = tree.vessel(n);
        out.clusters.push(c);
        out.spheres.extend((0..c).map(|_| SphereLocation {
            position: v.end,
            vessel: v.owner,
        }));
    }
    out
}

#[cfg(test)]
mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::distribution::flow_tree::tests::fixture;

    #[test]
    fn particles_only_rest_in_tracts() {
        let tree = fixture();
        let mut rng = StdRng::seed_from_u64(5);
        let d = unembolized(&tree, 1_000, 0.6, &mut rng, &AtomicU8::new(0));
        assert_eq!(d.spheres.len(), 1_000);
        assert_eq!(d.clustered(), 1_000);
        let tract_ends: Vec<_> = tree.tracts().map(|t| t.end).collect();
        for s in &d.spheres {
            assert!(tract_ends.contains(&s.position));
        }
    }

    #[test]
    fn split_follows_flow() {
        let tree = fixture();
        let mut rng = StdRng::seed_from_u64(9);
        let n = 20_000;
        let d = unembolized(&tree, n, 0.5, &mut rng, &AtomicU8::new(0));
        let in_five = d
            .spheres
            .iter()
            .filter(|s| s.vessel.0 == 8 || s.vessel.0 == 9)
            .count() as f64;
        let expected = 0.99 * 0.55 / 0.99 * n as f64;
        assert!((in_five / expected - 1.0).abs() < 0.05, "{in_five} vs {expected}");
    }

    #[test]
    fn zero_particles_give_empty_result() {
        let tree = fixture();
        let mut rng = StdRng::seed_from_u64(1);
        let d = unembolized(&tree, 0, 0.6, &mut rng, &AtomicU8::new(0));
        assert!(d.spheres.is_empty());
        assert!(d.clusters.is_empty());
    }
}
