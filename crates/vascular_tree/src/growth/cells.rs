//! The set of macrocells of a growing tree and their placement bookkeeping.
use std::collections::BTreeMap;

use glam::DVec3;
use rand::Rng;
use tracing::{info, warn};

use crate::growth::locations::{LocationStrategy, Locations};
use crate::growth::macrocell::{CellType, Macrocell};
use crate::shape::Shape;
use crate::vessel::{CellId, IdGenerator};

#[derive(Debug, Clone)]
pub struct CellList {
    cells: BTreeMap<CellId, Macrocell>,
    ids: IdGenerator,
    cell_radius: f64,
    cell_flow: f64,
    cell_pressure: f64,
    tree_flow: f64,
    locations: Locations,
}

impl CellList {
    pub fn new(
        strategy: LocationStrategy,
        shape: &dyn Shape,
        cell_radius: f64,
        tree_flow: f64,
        cell_pressure: f64,
    ) -> Self {
        let locations = Locations::new(strategy, shape, cell_radius);
        Self {
            cells: BTreeMap::new(),
            ids: IdGenerator::default(),
            cell_radius,
            cell_flow: locations.cell_flow(tree_flow),
            cell_pressure,
            tree_flow,
            locations,
        }
    }

    /// Restores persisted cells. The cell radius is taken from the cells themselves, falling back
    /// to `default_radius` for an empty list.
    pub fn from_cells(
        cells: Vec<Macrocell>,
        strategy: LocationStrategy,
        shape: &dyn Shape,
        default_radius: f64,
        tree_flow: f64,
        cell_pressure: f64,
    ) -> Self {
        let cell_radius = cells.first().map_or(default_radius, |c| c.radius);
        let mut this = Self::new(strategy, shape, cell_radius, tree_flow, cell_pressure);
        let last = cells.iter().map(|c| c.id.0).max().unwrap_or(0);
        this.ids = IdGenerator::after(last);
        for c in cells {
            this.locations.add_item(&c);
            this.cells.insert(c.id, c);
        }
        this
    }

    /// Places a new cell near `loc` (or along `loc → end`). Returns `None` when no free spot is
    /// found.
    pub fn add_cell_near(
        &mut self,
        shape: &dyn Shape,
        loc: DVec3,
        end: Option<DVec3>,
        rng: &mut dyn Rng,
    ) -> Option<CellId> {
        let (center, lattice) = self.locations.find_location(shape, loc, end, rng)?;
        let id = CellId(self.ids.next_id());
        let cell = Macrocell {
            id,
            center,
            parent_vessel: None,
            kind: CellType::Normal,
            radius: self.cell_radius,
            flow: self.cell_flow,
            pressure: self.cell_pressure,
            lattice,
        };
        self.locations.add_item(&cell);
        self.cells.insert(id, cell);
        Some(id)
    }

    pub fn erase(&mut self, id: CellId) -> Option<Macrocell> {
        let cell = self.cells.remove(&id)?;
        self.locations.remove_item(&cell);
        Some(cell)
    }

    /// Scales the radius of every cell and re-selects the candidate sites.
    pub fn reduce_cell_size(&mut self, shape: &dyn Shape, scale: f64, fit_to_lobules: bool) {
        self.cell_radius *= scale;
        for c in self.cells.values_mut() {
            c.radius *= scale;
        }
        self.locations
            .reset(shape, self.cell_radius, self.cells.values(), fit_to_lobules);
        info!("# of potential cell sites: {}", self.locations.number_of_sites());
    }

    pub fn get(&self, id: CellId) -> Option<&Macrocell> {
        self.cells.get(&id)
    }

    pub fn get_mut(&mut self, id: CellId) -> Option<&mut Macrocell> {
        self.cells.get_mut(&id)
    }

    /// Cells in id order.
    pub fn iter(&self) -> impl Iterator<Item = &Macrocell> + '_ {
        self.cells.values()
    }

    pub fn len(&self) -> usize {
        self.cells.len()
    }

    pub fn is_empty(&self) -> bool {
        self.cells.is_empty()
    }

    pub fn cell_radius(&self) -> f64 {
        self.cell_radius
    }

    pub fn cell_flow(&self) -> f64 {
        self.cell_flow
    }

    pub fn cell_pressure(&self) -> f64 {
        self.cell_pressure
    }

    pub fn tree_flow(&self) -> f64 {
        self.tree_flow
    }

    pub fn locations(&self) -> &Locations {
        &self.locations
    }

    /// Every cell is connected and carries the sink pressure.
    pub fn validate(&self) -> bool {
        let mut ok = true;
        for (id, c) in &self.cells {
            if *id != c.id {
                warn!("Mismatch in cell id {} references {}", id, c.id);
                ok = false;
            }
            if c.parent_vessel.is_none() {
                warn!("Unconnected macrocell found in list: {}", c.id);
                ok = false;
            }
            if c.pressure != self.cell_pressure {
                warn!("Cell {} pressure invalid: {:e}", c.id, c.pressure);
                ok = false;
            }
        }
        ok
    }
}

impl PartialEq for CellList {
    fn eq(&self, other: &Self) -> bool {
        self.cells == other.cells
    }
}
