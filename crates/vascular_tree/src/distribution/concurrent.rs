//! Time-stepped transport of all particles at once.
//!
//! Particles are injected at the root and advance along their vessel by the distance the blood
//! covers in one step. A particle that reaches the end of a vessel moves into a child it fits
//! into, or stops and occludes the vessel when it fits into none. Occluded vessels carry no flow
//! for the rest of the run.
use std::sync::atomic::AtomicU8;

use rand::Rng;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::distribution::flow_tree::TractTree;
use crate::distribution::individual::determine_clusters;
use crate::distribution::overlay::FlowOverlay;
use crate::distribution::sampler::SphereSizes;
use crate::distribution::{report, Distribution, SphereLocation};
use crate::error::{Error, Result};
use crate::random::{bernoulli, poisson};
use crate::tree::NodeId;

/// Shortest vessel taken into account for the time step; also the distance the fastest blood
/// covers in one step.
pub const MIN_VESSEL_LENGTH: f64 = 25e-6;

/// How particles enter the root.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Injection {
    /// Constant rate over `duration` seconds, Poisson distributed per step.
    Poisson { duration: f64 },
    /// Every particle in the first step.
    Instant,
}

impl Default for Injection {
    fn default() -> Self {
        Self::Poisson { duration: 10.0 }
    }
}

#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ConcurrentConfig {
    pub sizes: SphereSizes,
    pub injection: Injection,
    /// Fixed step in seconds instead of the one derived from the fastest vessel.
    pub time_step: Option<f64>,
    /// Safety bound on the number of steps.
    pub max_steps: u64,
}

impl Default for ConcurrentConfig {
    fn default() -> Self {
        Self {
            sizes: SphereSizes::default(),
            injection: Injection::default(),
            time_step: None,
            max_steps: 100_000_000,
        }
    }
}

impl ConcurrentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_sizes(mut self, sizes: SphereSizes) -> Self {
        self.sizes = sizes;
        self
    }

    pub fn with_injection(mut self, injection: Injection) -> Self {
        self.injection = injection;
        self
    }

    pub fn with_time_step(mut self, step: f64) -> Self {
        self.time_step = Some(step);
        self
    }

    pub fn with_max_steps(mut self, max_steps: u64) -> Self {
        self.max_steps = max_steps;
        self
    }

    /// Validates the configuration, returning an error if invalid.
    pub fn validate(&self) -> Result<()> {
        self.sizes.validate()?;
        if let Injection::Poisson { duration } = self.injection {
            if !(duration > 0.0) {
                return Err(Error::InvalidConfig("injection duration must be > 0".into()));
            }
        }
        if let Some(step) = self.time_step {
            if !(step > 0.0) {
                return Err(Error::InvalidConfig("time_step must be > 0".into()));
            }
        }
        if self.max_steps == 0 {
            return Err(Error::InvalidConfig("max_steps must be > 0".into()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy)]
struct Sphere {
    /// Position along the vessel in `[0, 1]`.
    location: f64,
    radius: f64,
    /// Share of the step still available to this particle.
    time_fraction: f64,
}

struct VesselState {
    spheres: Vec<Sphere>,
    cross_section: f64,
    length: f64,
    occluded: bool,
}

/// Largest step such that the fastest blood in any vessel longer than [`MIN_VESSEL_LENGTH`]
/// moves at most that length.
pub fn time_step(tree: &TractTree) -> Result<f64> {
    let max_speed = tree
        .pre_order()
        .iter()
        .map(|&n| tree.vessel(n))
        .filter(|v| v.length() > MIN_VESSEL_LENGTH)
        .map(|v| v.flow / (std::f64::consts::PI * v.radius * v.radius))
        .fold(0.0, f64::max);
    if !(max_speed > 0.0) || !max_speed.is_finite() {
        return Err(Error::InvalidConfig(
            "tree has no vessel with flow to derive a time step from".into(),
        ));
    }
    Ok(MIN_VESSEL_LENGTH / max_speed)
}

pub fn concurrent(
    tree: &TractTree,
    count: u64,
    straight_ratio: f64,
    config: &ConcurrentConfig,
    rng: &mut dyn Rng,
    progress: &AtomicU8,
) -> Result<Distribution> {
    let mut overlay = FlowOverlay::new(tree, straight_ratio);
    let mut state: Vec<Option<VesselState>> = (0..tree.capacity()).map(|_| None).collect();
    for &n in tree.pre_order() {
        let v = tree.vessel(n);
        state[n.index()] = Some(VesselState {
            spheres: Vec::new(),
            cross_section: std::f64::consts::PI * v.radius * v.radius,
            length: v.length(),
            occluded: false,
        });
    }

    let step = match config.time_step {
        Some(step) => step,
        None => time_step(tree)?,
    };
    info!("Time step: {:e} s", step);

    let mut waiting = count;
    let mut steps = 0u64;
    let mut radius_sum = 0.0;
    loop {
        let injected = match config.injection {
            Injection::Instant => waiting,
            Injection::Poisson { duration } => {
                poisson(count as f64 * step / duration, rng).min(waiting)
            }
        };
        waiting -= injected;
        if let Some(root) = state[tree.root().index()].as_mut() {
            for _ in 0..injected {
                let radius = config.sizes.sample(rng) / 2.0;
                radius_sum += radius;
                root.spheres.push(Sphere {
                    location: 0.0,
                    radius,
                    time_fraction: 1.0,
                });
            }
        }

        let moving = advance(tree, &mut overlay, &mut state, step, rng);
        overlay.update_flows_except(|n| state[n.index()].as_ref().is_some_and(|s| s.occluded));

        steps += 1;
        if count > 0 {
            report(progress, 100 - 100 * (waiting + moving) / count);
        }
        if waiting == 0 && moving == 0 {
            break;
        }
        if steps >= config.max_steps {
            warn!(
                "Stopping transport after {} steps with {} particles waiting and {} moving.",
                steps, waiting, moving
            );
            break;
        }
    }
    debug!("Transport finished after {} steps", steps);

    let mut out = Distribution::default();
    let mut counts = vec![0u64; tree.capacity()];
    for &n in tree.pre_order() {
        let Some(s) = state[n.index()].as_ref() else {
            continue;
        };
        let v = tree.vessel(n);
        counts[n.index()] = s.spheres.len() as u64;
        out.spheres.extend(s.spheres.iter().map(|sph| SphereLocation {
            position: v.start + (v.end - v.start) * sph.location,
            vessel: v.owner,
        }));
    }
    // Particles never injected before the step bound rest at the root entry.
    let root = tree.vessel(tree.root());
    counts[tree.root().index()] += waiting;
    out.spheres.extend((0..waiting).map(|_| SphereLocation {
        position: root.start,
        vessel: root.owner,
    }));

    let injected = count - waiting;
    let diameter = if injected > 0 {
        2.0 * radius_sum / injected as f64
    } else {
        config.sizes.mean()
    };
    out.clusters = determine_clusters(tree, &counts, diameter);
    Ok(out)
}

/// Moves every particle by one step, pre-order. Returns the number of particles still in
/// motion.
fn advance(
    tree: &TractTree,
    overlay: &mut FlowOverlay<'_>,
    state: &mut [Option<VesselState>],
    step: f64,
    rng: &mut dyn Rng,
) -> u64 {
    let mut moving = 0;
    for &n in tree.pre_order() {
        let flow = overlay.flow(n);
        if let Some(p) = tree.parent(n) {
            if overlay.flow(p) <= 0.0 {
                overlay.set_flow(n, 0.0);
            }
        }
        if flow <= 0.0 {
            continue;
        }
        let Some(vs) = state[n.index()].as_mut() else {
            continue;
        };
        if vs.spheres.is_empty() {
            continue;
        }
        let length = vs.length;
        let travelled = flow * step / (vs.cross_section * length);
        let spheres = std::mem::take(&mut vs.spheres);

        let mut stay = Vec::with_capacity(spheres.len());
        let mut passed: Vec<(NodeId, Sphere)> = Vec::new();
        let mut occlude = false;
        for mut s in spheres {
            let distance = s.time_fraction * travelled;
            if s.location + distance < 1.0 {
                s.location += distance;
                s.time_fraction = 1.0;
                stay.push(s);
                continue;
            }
            let fits = |c: Option<NodeId>| c.filter(|&c| tree.vessel(c).radius >= s.radius);
            let next = match (fits(tree.left(n)), fits(tree.right(n))) {
                (None, None) => None,
                (Some(c), None) | (None, Some(c)) => Some(c),
                (Some(l), Some(r)) => Some(if bernoulli(overlay.p(l), rng) { l } else { r }),
            };
            match next {
                None => {
                    s.location = 1.0;
                    occlude = true;
                    stay.push(s);
                }
                Some(c) => {
                    if length > MIN_VESSEL_LENGTH {
                        s.time_fraction *= (1.0 - s.location) / distance;
                    }
                    passed.push((
                        c,
                        Sphere {
                            location: 0.0,
                            radius: s.radius,
                            time_fraction: s.time_fraction,
                        },
                    ));
                }
            }
        }

        if let Some(vs) = state[n.index()].as_mut() {
            vs.spheres = stay;
            if occlude {
                vs.occluded = true;
                overlay.set_flow(n, 0.0);
            }
            moving += vs.spheres.len() as u64;
        }
        for (c, s) in passed {
            if let Some(child) = state[c.index()].as_mut() {
                child.spheres.push(s);
            }
        }
    }
    moving
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeSet;

    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::distribution::flow_tree::tests::fixture;
    use crate::units::um;

    fn fixed(radius: f64) -> ConcurrentConfig {
        ConcurrentConfig::default()
            .with_sizes(SphereSizes::Fixed(2.0 * radius))
            .with_injection(Injection::Instant)
            .with_time_step(1e-9)
    }

    fn resting_vessels(radius: f64, seed: u64) -> BTreeSet<u32> {
        let tree = fixture();
        let mut rng = StdRng::seed_from_u64(seed);
        let d = concurrent(&tree, 2, 0.6, &fixed(radius), &mut rng, &AtomicU8::new(0)).unwrap();
        assert_eq!(d.spheres.len(), 2);
        assert_eq!(d.clustered(), 2);
        d.spheres.iter().map(|s| s.vessel.0).collect()
    }

    #[test]
    fn large_particles_stop_above_narrow_children() {
        for seed in 0..10 {
            let rest = resting_vessels(um(12.0), seed);
            assert!(rest.is_subset(&BTreeSet::from([5, 6, 7])), "{rest:?}");
        }
    }

    #[test]
    fn small_particles_pass_into_wide_enough_children() {
        for seed in 0..10 {
            let rest = resting_vessels(um(8.0), seed);
            assert!(rest.is_subset(&BTreeSet::from([6, 7, 9])), "{rest:?}");
        }
    }

    #[test]
    fn time_step_comes_from_fastest_long_vessel() {
        let tree = fixture();
        let step = time_step(&tree).unwrap();
        let fastest = 0.01 / (std::f64::consts::PI * um(1.0) * um(1.0));
        assert!((step / (MIN_VESSEL_LENGTH / fastest) - 1.0).abs() < 1e-12);
    }

    #[test]
    fn step_bound_keeps_every_particle() {
        let tree = fixture();
        let config = fixed(um(8.0)).with_max_steps(1);
        let mut rng = StdRng::seed_from_u64(1);
        let d = concurrent(&tree, 5, 0.6, &config, &mut rng, &AtomicU8::new(0)).unwrap();
        assert_eq!(d.spheres.len(), 5);
        assert_eq!(d.clustered(), 5);
    }

    #[test]
    fn invalid_injection_is_rejected() {
        let c = ConcurrentConfig::default().with_injection(Injection::Poisson { duration: 0.0 });
        assert!(c.validate().is_err());
        assert!(ConcurrentConfig::default().with_time_step(-1.0).validate().is_err());
    }
}
