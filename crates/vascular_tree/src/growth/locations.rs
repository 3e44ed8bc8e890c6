//! Where new macrocells may be placed.
//!
//! Two strategies share one interface:
//!
//! - [`LatticeLocations`] snaps cells to portal tracts of the lobule lattice. Candidate sites are
//!   re-selected whenever the cell radius changes.
//! - [`GridLocations`] jitters around the requested point and rejects spots whose occupancy-grid
//!   cell is already taken.
use std::collections::{BTreeSet, HashMap, HashSet};

use glam::{DVec3, IVec3};
use rand::Rng;
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::geometry::Aabb;
use crate::growth::balanced::BalancedSampler;
use crate::growth::lattice::{
    count_portal_tracts, find_near_tract, for_portal_tract, CELL_THICKNESS, TRACT_VOLUME,
};
use crate::growth::macrocell::Macrocell;
use crate::random::rand01;
use crate::shape::Shape;
use crate::spatial::{Octree, SitePoint};
use crate::vessel::CellId;

const GRID_TRIES: usize = 100;

/// Which placement strategy a build uses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum LocationStrategy {
    #[default]
    Lattice,
    Grid,
}

#[derive(Debug, Clone)]
pub enum Locations {
    Lattice(LatticeLocations),
    Grid(GridLocations),
}

impl Locations {
    pub fn new(strategy: LocationStrategy, shape: &dyn Shape, cell_radius: f64) -> Self {
        match strategy {
            LocationStrategy::Lattice => Locations::Lattice(LatticeLocations::new(shape, cell_radius)),
            LocationStrategy::Grid => Locations::Grid(GridLocations::new(shape, cell_radius)),
        }
    }

    /// A free spot near `loc`, or near the extension of `loc → end` when `end` is given.
    pub fn find_location(
        &self,
        shape: &dyn Shape,
        loc: DVec3,
        end: Option<DVec3>,
        rng: &mut dyn Rng,
    ) -> Option<(DVec3, IVec3)> {
        match self {
            Locations::Lattice(l) => l.find_location(shape, loc, end, rng),
            Locations::Grid(g) => g.find_location(shape, loc, end, rng),
        }
    }

    pub fn add_item(&mut self, cell: &Macrocell) {
        match self {
            Locations::Lattice(l) => l.add_item(cell),
            Locations::Grid(g) => g.add_item(cell),
        }
    }

    pub fn remove_item(&mut self, cell: &Macrocell) {
        match self {
            Locations::Lattice(l) => l.remove_item(cell),
            Locations::Grid(g) => g.remove_item(cell),
        }
    }

    /// Adopts a new cell radius. `cells` are the cells currently placed.
    pub fn reset<'a>(
        &mut self,
        shape: &dyn Shape,
        cell_radius: f64,
        cells: impl IntoIterator<Item = &'a Macrocell>,
        fit_to_lobules: bool,
    ) {
        match self {
            Locations::Lattice(l) => l.reset(shape, cell_radius, fit_to_lobules),
            Locations::Grid(g) => g.reset(cell_radius, cells),
        }
    }

    /// Number of portal tracts the organ holds at full resolution.
    pub fn max_sites(&self) -> usize {
        match self {
            Locations::Lattice(l) => l.max_sites,
            Locations::Grid(g) => g.max_sites,
        }
    }

    /// Number of candidate sites at the current resolution.
    pub fn number_of_sites(&self) -> usize {
        match self {
            Locations::Lattice(l) => l.sites.len(),
            Locations::Grid(g) => g.max_sites,
        }
    }

    /// Flow of one macrocell when `tree_flow` is shared by every portal tract.
    pub fn cell_flow(&self, tree_flow: f64) -> f64 {
        tree_flow / self.max_sites().max(1) as f64
    }
}

/// Portal-tract sites of the lobule lattice.
#[derive(Debug, Clone)]
pub struct LatticeLocations {
    cell_radius: f64,
    sites: Octree<SitePoint>,
    occupied: HashSet<IVec3>,
    max_sites: usize,
}

impl LatticeLocations {
    pub fn new(shape: &dyn Shape, cell_radius: f64) -> Self {
        let mut this = Self {
            cell_radius,
            sites: Octree::new(shape.extents()),
            occupied: HashSet::new(),
            max_sites: count_portal_tracts(shape),
        };
        this.select_sites(shape, false);
        this
    }

    /// Samples tracts on a grid of spacing `2r`, or takes every tract when fitting to lobules.
    fn select_sites(&mut self, shape: &dyn Shape, fit_to_lobules: bool) {
        let ext = shape.extents();
        let mut sites = Octree::new(ext);
        if fit_to_lobules {
            for_portal_tract(shape, |location, lattice| {
                sites.insert(SitePoint { location, lattice });
            });
        } else {
            let mut seen = BTreeSet::new();
            ext.inflate(-self.cell_radius)
                .for_each_step(2.0 * self.cell_radius, |p| {
                    if let Some((location, lattice)) = find_near_tract(shape, p) {
                        if seen.insert(lattice.to_array()) {
                            sites.insert(SitePoint { location, lattice });
                        }
                    }
                });
        }
        self.sites = sites;
    }

    fn find_location(
        &self,
        shape: &dyn Shape,
        loc: DVec3,
        end: Option<DVec3>,
        rng: &mut dyn Rng,
    ) -> Option<(DVec3, IVec3)> {
        if let Some(end) = end {
            let (p, idx) = find_near_tract(shape, end)?;
            return (!self.occupied.contains(&idx)).then_some((p, idx));
        }

        let candidates: Vec<SitePoint> = self
            .sites
            .within(loc, 6.0 * self.cell_radius, |s, p| {
                Some(s.location.distance_squared(p))
            })
            .into_iter()
            .map(|(s, _)| s)
            .filter(|s| !self.occupied.contains(&s.lattice))
            .collect();
        let keys: Vec<i64> = candidates
            .iter()
            .map(|s| (s.location.z / CELL_THICKNESS).round() as i64)
            .collect();
        let pick = BalancedSampler::new(&keys).sample(rng)?;
        Some((candidates[pick].location, candidates[pick].lattice))
    }

    fn add_item(&mut self, cell: &Macrocell) {
        self.occupied.insert(cell.lattice);
    }

    fn remove_item(&mut self, cell: &Macrocell) {
        self.occupied.remove(&cell.lattice);
    }

    fn reset(&mut self, shape: &dyn Shape, cell_radius: f64, fit_to_lobules: bool) {
        self.cell_radius = cell_radius;
        self.select_sites(shape, fit_to_lobules);
    }
}

/// Sparse occupancy grid of cell ids with cubes of side `cell_size`.
#[derive(Debug, Clone)]
struct OccupancyGrid {
    origin: DVec3,
    cell_size: f64,
    cells: HashMap<IVec3, BTreeSet<CellId>>,
}

impl OccupancyGrid {
    fn new(origin: DVec3, cell_size: f64) -> Self {
        Self {
            origin,
            cell_size,
            cells: HashMap::new(),
        }
    }

    fn slot(&self, p: DVec3) -> IVec3 {
        ((p - self.origin) / self.cell_size).floor().as_ivec3()
    }

    fn for_slots(&self, ext: &Aabb, mut f: impl FnMut(IVec3)) {
        let lo = self.slot(ext.min);
        let hi = self.slot(ext.max);
        for z in lo.z..=hi.z {
            for y in lo.y..=hi.y {
                for x in lo.x..=hi.x {
                    f(IVec3::new(x, y, z));
                }
            }
        }
    }

    fn add(&mut self, cell: &Macrocell) {
        let mut slots = Vec::new();
        self.for_slots(&cell.extents(), |s| slots.push(s));
        for s in slots {
            self.cells.entry(s).or_default().insert(cell.id);
        }
    }

    fn remove(&mut self, cell: &Macrocell) {
        let mut slots = Vec::new();
        self.for_slots(&cell.extents(), |s| slots.push(s));
        for s in slots {
            if let Some(set) = self.cells.get_mut(&s) {
                set.remove(&cell.id);
                if set.is_empty() {
                    self.cells.remove(&s);
                }
            }
        }
    }

    fn is_free(&self, p: DVec3) -> bool {
        !self.cells.contains_key(&self.slot(p))
    }
}

/// Free placement with random jitter.
#[derive(Debug, Clone)]
pub struct GridLocations {
    cell_radius: f64,
    grid: OccupancyGrid,
    max_sites: usize,
}

impl GridLocations {
    pub fn new(shape: &dyn Shape, cell_radius: f64) -> Self {
        Self {
            cell_radius,
            grid: OccupancyGrid::new(shape.extents().min, cell_radius / 2.0),
            max_sites: (shape.volume() / TRACT_VOLUME).round() as usize,
        }
    }

    fn find_location(
        &self,
        shape: &dyn Shape,
        loc: DVec3,
        end: Option<DVec3>,
        rng: &mut dyn Rng,
    ) -> Option<(DVec3, IVec3)> {
        if !shape.contains(loc) {
            debug!("Near point {:?} is outside the organ; skipping.", loc);
            return None;
        }
        for _ in 0..GRID_TRIES {
            let p = match end {
                Some(end) => end + (end - loc) * rand01(rng),
                None => {
                    let jitter = DVec3::new(rand01(rng), rand01(rng), rand01(rng)) * 4.0 - 2.0;
                    loc + jitter * self.cell_radius
                }
            };
            if shape.contains(p) && self.grid.is_free(p) {
                return Some((p, IVec3::ZERO));
            }
        }
        None
    }

    fn add_item(&mut self, cell: &Macrocell) {
        self.grid.add(cell);
    }

    fn remove_item(&mut self, cell: &Macrocell) {
        self.grid.remove(cell);
    }

    fn reset<'a>(&mut self, cell_radius: f64, cells: impl IntoIterator<Item = &'a Macrocell>) {
        self.cell_radius = cell_radius;
        let mut grid = OccupancyGrid::new(self.grid.origin, cell_radius / 2.0);
        for c in cells {
            grid.add(c);
        }
        self.grid = grid;
    }
}
