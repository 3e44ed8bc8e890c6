//! Summary statistics of a grown tree and terminal radius adjustment.
use std::fmt;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{Error, Result};
use crate::growth::lattice::count_portal_tracts;
use crate::growth::MacrocellTree;
use crate::vessel::VesselTree;

/// Particle diameter used for the trapping and terminal-width statistics.
pub const DEFAULT_SPHERE_DIAMETER: f64 = 25e-6;

/// Mean terminal radius the adjustment aims for.
pub const DEFAULT_TERMINAL_RADIUS_GOAL: f64 = 11.8e-6 / 2.0;

/// Mean and population standard deviation.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct Moments {
    pub mean: f64,
    pub std: f64,
}

impl Moments {
    pub fn of(values: impl IntoIterator<Item = f64>) -> Self {
        let values: Vec<f64> = values.into_iter().collect();
        if values.is_empty() {
            return Self::default();
        }
        let n = values.len() as f64;
        let mean = values.iter().sum::<f64>() / n;
        let var = values.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / n;
        Self {
            mean,
            std: var.sqrt(),
        }
    }
}

impl fmt::Display for Moments {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6e} ({:.6e})", self.mean, self.std)
    }
}

#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TreeStats {
    pub gamma: f64,
    pub macrocells: usize,
    /// Portal tract sites available inside the shape.
    pub locations: usize,
    pub root_radius: f64,
    pub root_flow: f64,
    pub root_pressure: f64,
    pub terminal_radius: Moments,
    pub terminal_flow: Moments,
    pub terminal_pressure: f64,
    /// Length-weighted radius along each root-to-macrocell path.
    pub path_radius: Moments,
    /// Length-weighted flow along each root-to-macrocell path.
    pub path_flow: Moments,
    pub path_length: Moments,
    pub path_bifurcations: Moments,
    /// Share of terminal vessels wide enough for the reference particle.
    pub terminals_over_sphere: f64,
    /// Vessels wider than the reference particle whose children are both narrower, plus wide
    /// enough leaves.
    pub trapping_locations: usize,
    pub bifurcation_fallbacks: u64,
}

impl TreeStats {
    /// Collects the statistics of `tree` for particles of `sphere_diameter`.
    pub fn compute(tree: &MacrocellTree, sphere_diameter: f64) -> Self {
        let vessels = tree.vessels();
        let arena = vessels.tree();
        let sphere_radius = sphere_diameter / 2.0;

        let terminals: Vec<_> = vessels
            .terminal_vessels()
            .into_iter()
            .filter_map(|id| vessels.get(id))
            .collect();
        let terminal_radius = Moments::of(terminals.iter().map(|v| v.radius));
        let terminal_flow = Moments::of(terminals.iter().map(|v| v.flow));
        let wide = terminals.iter().filter(|v| v.radius > sphere_radius).count();

        let trapping_locations = arena
            .nodes()
            .into_iter()
            .filter(|&n| {
                if arena[n].radius <= sphere_radius {
                    return false;
                }
                match (arena.left(n), arena.right(n)) {
                    (None, None) => true,
                    (Some(l), Some(r)) => {
                        arena[l].radius < sphere_radius && arena[r].radius < sphere_radius
                    }
                    _ => false,
                }
            })
            .count();

        let mut radii = Vec::new();
        let mut flows = Vec::new();
        let mut lengths = Vec::new();
        let mut bifurcations = Vec::new();
        for cell in tree.cells().iter() {
            let Some(start) = cell.parent_vessel.and_then(|id| vessels.node(id)) else {
                continue;
            };
            let (mut length, mut radius, mut flow, mut splits) = (0.0, 0.0, 0.0, 0u32);
            for n in std::iter::once(start).chain(arena.ancestors(start)) {
                let v = &arena[n];
                if arena.has_two_children(n) {
                    splits += 1;
                }
                let l = v.length();
                length += l;
                radius += v.radius * l;
                flow += v.flow * l;
            }
            if length > 0.0 {
                radii.push(radius / length);
                flows.push(flow / length);
            }
            lengths.push(length);
            bifurcations.push(f64::from(splits));
        }

        let root = vessels.root();
        Self {
            gamma: vessels.gamma(),
            macrocells: tree.cells().len(),
            locations: count_portal_tracts(tree.shape()),
            root_radius: root.map_or(0.0, |v| v.radius),
            root_flow: root.map_or(0.0, |v| v.flow),
            root_pressure: root.map_or(0.0, |v| v.entry_pressure),
            terminal_radius,
            terminal_flow,
            terminal_pressure: terminals.first().map_or(0.0, |v| v.exit_pressure),
            path_radius: Moments::of(radii),
            path_flow: Moments::of(flows),
            path_length: Moments::of(lengths),
            path_bifurcations: Moments::of(bifurcations),
            terminals_over_sphere: if terminals.is_empty() {
                0.0
            } else {
                wide as f64 / terminals.len() as f64
            },
            trapping_locations,
            bifurcation_fallbacks: vessels.bifurcation_fallbacks(),
        }
    }
}

impl fmt::Display for TreeStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Murray exponent: {}", self.gamma)?;
        writeln!(f, "Root radius: {:.3} um", self.root_radius * 1e6)?;
        writeln!(f, "Root flow: {:.6e} m3/s", self.root_flow)?;
        writeln!(f, "Root entry pressure: {:.3} Pa", self.root_pressure)?;
        writeln!(f, "Macrocell pressure: {:.3} Pa", self.terminal_pressure)?;
        writeln!(f, "Terminal flow: {}", self.terminal_flow)?;
        writeln!(f, "Terminal radius: {}", self.terminal_radius)?;
        let filled = if self.locations == 0 {
            0.0
        } else {
            100.0 * self.macrocells as f64 / self.locations as f64
        };
        writeln!(f, "Portal tracts filled: {filled:.2}%")?;
        writeln!(f, "Macrocells: {}", self.macrocells)?;
        writeln!(f, "Trapping locations: {}", self.trapping_locations)?;
        writeln!(f, "Bifurcations per path: {}", self.path_bifurcations)?;
        writeln!(f, "Path radius: {}", self.path_radius)?;
        writeln!(f, "Path length: {}", self.path_length)?;
        writeln!(f, "Terminals wider than the particle: {:.2}%", 100.0 * self.terminals_over_sphere)?;
        write!(f, "Centroid fallbacks: {}", self.bifurcation_fallbacks)
    }
}

fn mean_terminal_radius(vessels: &VesselTree) -> f64 {
    Moments::of(
        vessels
            .terminal_vessels()
            .into_iter()
            .filter_map(|id| vessels.get(id))
            .map(|v| v.radius),
    )
    .mean
}

/// Scales the terminal vessel radii until their mean is within `tolerance` of `goal`. Interior
/// radii and pressures are left as they are. Returns the number of scaling passes.
pub fn adjust_terminal_radii(vessels: &mut VesselTree, goal: f64, tolerance: f64) -> Result<usize> {
    if !(goal > 0.0) || !(tolerance > 0.0) {
        return Err(Error::InvalidConfig(
            "goal radius and tolerance must be > 0".into(),
        ));
    }
    let mut actual = mean_terminal_radius(vessels);
    if !(actual > 0.0) {
        return Err(Error::Other("tree has no terminal vessels with a radius".into()));
    }
    info!("Mean terminal radius {:e}, goal {:e}", actual, goal);
    let mut passes = 0;
    while (actual - goal).abs() > tolerance {
        vessels.scale_terminal_radii(goal / actual);
        actual = mean_terminal_radius(vessels);
        passes += 1;
        info!("Mean terminal radius {:e}", actual);
    }
    Ok(passes)
}
