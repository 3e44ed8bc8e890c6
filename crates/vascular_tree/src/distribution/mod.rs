//! Microsphere distribution through a finished tree.
//!
//! Every mode walks a [`TractTree`] with a per-run [`FlowOverlay`] and reports where each
//! particle came to rest together with the sizes of the particle clusters.
//!
//! - [`Mode::Unembolized`]: the whole population is split binomially at every bifurcation.
//! - [`Mode::Embolized`], [`Mode::Radiized`], [`Mode::Unradiized`]: particles are inserted one at
//!   a time and deplete the flow of the vessel they stop in.
//! - [`Mode::Concurrent`]: all particles advance together in fixed time steps and occlude the
//!   vessels they block.
//!
//! ```
//! use std::sync::atomic::AtomicU8;
//! use glam::DVec3;
//! use rand::SeedableRng;
//! use vascular_tree::prelude::*;
//!
//! let vessels = BinaryTree::with_root(FlowVessel::new(
//!     VesselId(1),
//!     DVec3::ZERO,
//!     DVec3::new(1e-3, 0.0, 0.0),
//!     1e-3,
//!     1.0,
//! ));
//! let tree = TractTree::from_tree(vessels).unwrap();
//! let config = DistributionConfig::default();
//! let mut rng = rand::rngs::StdRng::seed_from_u64(1);
//! let result = distribute(&tree, 10, &config, &mut rng, &AtomicU8::new(0)).unwrap();
//! assert_eq!(result.spheres.len(), 10);
//! ```
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU8, Ordering};

use glam::DVec3;
use rand::Rng;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::vessel::VesselId;

pub mod compare;
pub mod concurrent;
pub mod flow_tree;
pub mod individual;
pub mod overlay;
pub mod runner;
pub mod sampler;
pub mod unembolized;

pub use compare::{compare_sizes, CompareConfig, SizeComparison};
pub use concurrent::{ConcurrentConfig, Injection};
pub use flow_tree::{FlowVessel, TractTree};
pub use overlay::{FlowOverlay, Traversal, Visit};
pub use runner::{run_tries, TriesConfig};
pub use sampler::{Gaussian90, SphereSizes};

/// Where one particle came to rest.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SphereLocation {
    pub position: DVec3,
    pub vessel: VesselId,
}

/// Outcome of one distribution run.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Distribution {
    pub spheres: Vec<SphereLocation>,
    /// Sizes of the particle clusters; they sum to the number of particles.
    pub clusters: Vec<u64>,
}

impl Distribution {
    /// Number of clusters of each size.
    pub fn cluster_histogram(&self) -> BTreeMap<u64, usize> {
        let mut h = BTreeMap::new();
        for &c in &self.clusters {
            *h.entry(c).or_insert(0) += 1;
        }
        h
    }

    pub fn clustered(&self) -> u64 {
        self.clusters.iter().sum()
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum Mode {
    /// Earlier particles have no effect on later ones; all arrive in portal tracts.
    #[default]
    Unembolized,
    /// Flow is depleted per particle; all arrive in portal tracts.
    Embolized,
    /// Flow is depleted per particle; particles stop in the first vessel narrower than them.
    Radiized(SphereSizes),
    /// Like [`Mode::Radiized`] with constant flow.
    Unradiized(SphereSizes),
    Concurrent(ConcurrentConfig),
}

/// Configuration shared by every distribution mode.
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct DistributionConfig {
    /// Share of particles entering the straight child when both children carry equal flow.
    pub straight_ratio: f64,
    /// Particles that fit into one portal tract.
    pub spheres_per_tract: f64,
    pub mode: Mode,
}

impl Default for DistributionConfig {
    fn default() -> Self {
        Self {
            straight_ratio: 0.6,
            spheres_per_tract: 50.0,
            mode: Mode::Unembolized,
        }
    }
}

impl DistributionConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_straight_ratio(mut self, straight_ratio: f64) -> Self {
        self.straight_ratio = straight_ratio;
        self
    }

    pub fn with_spheres_per_tract(mut self, spheres_per_tract: f64) -> Self {
        self.spheres_per_tract = spheres_per_tract;
        self
    }

    pub fn with_mode(mut self, mode: Mode) -> Self {
        self.mode = mode;
        self
    }

    /// Validates the configuration, returning an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.straight_ratio) {
            return Err(Error::InvalidConfig(
                "straight_ratio must be within [0, 1]".into(),
            ));
        }
        if !(self.spheres_per_tract > 0.0) {
            return Err(Error::InvalidConfig("spheres_per_tract must be > 0".into()));
        }
        match &self.mode {
            Mode::Unembolized | Mode::Embolized => Ok(()),
            Mode::Radiized(sizes) | Mode::Unradiized(sizes) => sizes.validate(),
            Mode::Concurrent(c) => c.validate(),
        }
    }
}

/// Distributes `count` particles through `tree`. `progress` is updated from 0 to 100.
pub fn distribute(
    tree: &TractTree,
    count: u64,
    config: &DistributionConfig,
    rng: &mut dyn Rng,
    progress: &AtomicU8,
) -> Result<Distribution> {
    config.validate()?;
    let s = config.straight_ratio;
    let out = match &config.mode {
        Mode::Unembolized => unembolized::unembolized(tree, count, s, rng, progress),
        Mode::Embolized => individual::individual(
            tree,
            count,
            s,
            config.spheres_per_tract,
            None,
            rng,
            progress,
        )?,
        Mode::Radiized(sizes) => individual::individual(
            tree,
            count,
            s,
            config.spheres_per_tract,
            Some(sizes),
            rng,
            progress,
        )?,
        Mode::Unradiized(sizes) => {
            individual::individual(tree, count, s, f64::INFINITY, Some(sizes), rng, progress)?
        }
        Mode::Concurrent(c) => concurrent::concurrent(tree, count, s, c, rng, progress)?,
    };
    report(progress, 100);
    Ok(out)
}

#[inline]
pub(crate) fn report(progress: &AtomicU8, pct: u64) {
    progress.store(pct.min(100) as u8, Ordering::Relaxed);
}
