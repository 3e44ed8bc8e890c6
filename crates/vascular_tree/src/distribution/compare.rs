//! How far apart two particle size populations come to rest.
use glam::DVec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::distribution::flow_tree::TractTree;
use crate::distribution::overlay::{FlowOverlay, Traversal};
use crate::distribution::sampler::Gaussian90;
use crate::error::{Error, Result};
use crate::random::rand01;

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct CompareConfig {
    pub trials: usize,
    pub straight_ratio: f64,
    /// Diameters of the first population.
    pub first: Gaussian90,
    /// Diameters of the second population.
    pub second: Gaussian90,
}

impl Default for CompareConfig {
    fn default() -> Self {
        Self {
            trials: 100_000,
            straight_ratio: 0.6,
            first: Gaussian90::new(20e-6, 30e-6),
            second: Gaussian90::new(30e-6, 40e-6),
        }
    }
}

impl CompareConfig {
    pub fn new(first: Gaussian90, second: Gaussian90) -> Self {
        Self {
            first,
            second,
            ..Self::default()
        }
    }

    pub fn with_trials(mut self, trials: usize) -> Self {
        self.trials = trials;
        self
    }

    pub fn with_straight_ratio(mut self, straight_ratio: f64) -> Self {
        self.straight_ratio = straight_ratio;
        self
    }

    /// Validates the configuration, returning an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if self.trials == 0 {
            return Err(Error::InvalidConfig("trials must be > 0".into()));
        }
        if !(0.0..=1.0).contains(&self.straight_ratio) {
            return Err(Error::InvalidConfig(
                "straight_ratio must be within [0, 1]".into(),
            ));
        }
        self.first.validate()?;
        self.second.validate()
    }
}

/// Mean distances in metres.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SizeComparison {
    /// From where the first population stops to the end of the path.
    pub first_to_end: f64,
    /// From where the second population stops to the end of the path.
    pub second_to_end: f64,
    /// Between the stopping points of the two populations.
    pub between: f64,
}

/// Sends one particle of each population down the same random path and measures where each
/// would have stopped: at the start of the first vessel narrower than the particle, or of the
/// terminal tract.
///
/// Seeds and radii are drawn up front from `rng`, so the result does not depend on how the
/// trials are scheduled across threads.
pub fn compare_sizes(
    tree: &TractTree,
    config: &CompareConfig,
    rng: &mut dyn Rng,
) -> Result<SizeComparison> {
    config.validate()?;
    let n = config.trials;
    let seeds: Vec<u64> = (0..n).map(|_| rng.next_u64()).collect();
    let radii0: Vec<f64> = (0..n).map(|_| config.first.sample(rng) / 2.0).collect();
    let radii1: Vec<f64> = (0..n).map(|_| config.second.sample(rng) / 2.0).collect();

    let overlay = FlowOverlay::new(tree, config.straight_ratio);
    info!("Comparing {} paths", n);
    let sums = (0..n)
        .into_par_iter()
        .map(|i| trial(&overlay, seeds[i], radii0[i], radii1[i]))
        .try_reduce(|| DVec3::ZERO, |a, b| Ok(a + b))?;

    let means = sums / n as f64;
    Ok(SizeComparison {
        first_to_end: means.x,
        second_to_end: means.y,
        between: means.z,
    })
}

fn trial(overlay: &FlowOverlay<'_>, seed: u64, r0: f64, r1: f64) -> Result<DVec3> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut stop0 = None;
    let mut stop1 = None;
    let mut last = DVec3::ZERO;
    overlay.traverse_read_only(|visit| {
        let start = visit.vessel.start;
        last = start;
        let terminal = visit.left.is_none();
        if stop0.is_none() && (terminal || visit.vessel.radius < r0) {
            stop0 = Some(start);
        }
        if stop1.is_none() && (terminal || visit.vessel.radius < r1) {
            stop1 = Some(start);
        }
        match (visit.left, visit.right) {
            (Some(l), Some(_)) if rand01(&mut rng) > l.p => Traversal::Right,
            (Some(_), _) => Traversal::Left,
            _ => Traversal::Abort,
        }
    })?;
    let (Some(p0), Some(p1)) = (stop0, stop1) else {
        return Err(Error::Traversal("path ended without a stopping point".into()));
    };
    Ok(DVec3::new(
        last.distance(p0),
        last.distance(p1),
        p0.distance(p1),
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::flow_tree::tests::fixture;
    use crate::units::um;

    fn config() -> CompareConfig {
        CompareConfig::new(Gaussian90::new(um(15.0), um(35.0)), Gaussian90::new(um(15.0), um(35.0)))
            .with_trials(2_000)
    }

    #[test]
    fn result_does_not_depend_on_scheduling() {
        let tree = fixture();
        let a = compare_sizes(&tree, &config(), &mut StdRng::seed_from_u64(3)).unwrap();
        let b = compare_sizes(&tree, &config(), &mut StdRng::seed_from_u64(3)).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn identical_sizes_stop_together() {
        let tree = fixture();
        let c = CompareConfig::new(Gaussian90::new(um(24.0), um(24.0)), Gaussian90::new(um(24.0), um(24.0)))
            .with_trials(500);
        let r = compare_sizes(&tree, &c, &mut StdRng::seed_from_u64(1)).unwrap();
        assert_eq!(r.between, 0.0);
        assert!((r.first_to_end - r.second_to_end).abs() < 1e-15);
    }

    #[test]
    fn larger_particles_stop_earlier() {
        let tree = fixture();
        let c = CompareConfig::new(Gaussian90::new(um(2.0), um(4.0)), Gaussian90::new(um(60.0), um(80.0)))
            .with_trials(2_000);
        let r = compare_sizes(&tree, &c, &mut StdRng::seed_from_u64(8)).unwrap();
        assert!(r.second_to_end > r.first_to_end);
        assert!(r.between > 0.0);
    }

    #[test]
    fn zero_trials_are_rejected() {
        let tree = fixture();
        let c = config().with_trials(0);
        assert!(compare_sizes(&tree, &c, &mut StdRng::seed_from_u64(1)).is_err());
    }
}
