#![forbid(unsafe_code)]
//! vascular_tree: hemodynamic arterial tree growth and microsphere distribution.
//!
//! Modules:
//! - vessel: vessel segments, the Murray/Poiseuille normalizer and the growable vessel tree
//! - spatial: octree index over vessel segments and candidate sites
//! - growth: macrocell birth/death cycles over the lobule lattice
//! - record: persisted trees and initial trunk vessel lists
//! - distribution: particle transport through a finished tree (several modes, tries, size comparison)
//! - stats: tree statistics and terminal radius adjustment
//!
//! For examples and docs, see README.
pub mod distribution;
pub mod error;
pub mod geometry;
pub mod growth;
pub mod random;
pub mod record;
pub mod shape;
pub mod spatial;
pub mod stats;
pub mod tree;
pub mod units;
pub mod vessel;

/// Convenient re-exports for common types. Import with `use vascular_tree::prelude::*;`.
pub mod prelude {
    pub use crate::distribution::{
        compare_sizes, distribute, run_tries, CompareConfig, ConcurrentConfig, Distribution,
        DistributionConfig, FlowVessel, Gaussian90, Injection, Mode, SizeComparison,
        SphereLocation, SphereSizes, TractTree, TriesConfig,
    };
    pub use crate::error::{Error, Result};
    pub use crate::geometry::Aabb;
    pub use crate::growth::{
        CellList, CellType, EventSink, FnSink, GrowthConfig, GrowthEvent, LocationStrategy,
        Macrocell, MacrocellTree, Subcycle, VecSink,
    };
    pub use crate::random::SeedSequence;
    pub use crate::record::{
        parse_initial_vessels, read_initial_vessels, FlatVessel, TreeRecord, DEFAULT_TRUNK_SCALE,
    };
    pub use crate::shape::{BoxShape, EllipsoidShape, Shape};
    pub use crate::spatial::Octree;
    pub use crate::stats::{adjust_terminal_radii, Moments, TreeStats};
    pub use crate::tree::{BinaryTree, NodeId, Side};
    pub use crate::units::{mm, mmhg, um};
    pub use crate::vessel::{CellId, Normalizer, Vessel, VesselId, VesselTree};
}
