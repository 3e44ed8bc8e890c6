//! Grows a vascular tree by macrocell birth and death cycles.
//!
//! A [`MacrocellTree`] starts from a const trunk, attaches one macrocell below every trunk
//! terminal and then repeatedly:
//!
//! 1. shrinks the macrocell radius so candidate sites get denser,
//! 2. lets every cell die or clone with cycle-dependent probabilities until the population stops
//!    growing,
//! 3. re-normalizes the hemodynamics and validates the tree.
use std::sync::Arc;

use glam::DVec3;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::growth::cells::CellList;
use crate::growth::events::{EventSink, GrowthEvent};
use crate::growth::locations::LocationStrategy;
use crate::record::{FlatVessel, TreeRecord};
use crate::random::{rand01, shuffle};
use crate::shape::Shape;
use crate::units::{mm, DEFAULT_CELL_PRESSURE, DEFAULT_GAMMA, DEFAULT_TREE_FLOW, INPUT_PRESSURE};
use crate::vessel::validate::check_close;
use crate::vessel::{Normalizer, VesselId, VesselTree};

/// Birth probability `M1 · e^(−cycle / M2)` and death probability `N1 · e^(−cycle / N2)`.
const M1: f64 = 1.0;
const M2: f64 = 9.8;
const N1: f64 = 0.3;
const N2: f64 = 9.0;

/// Below this final radius the last cycle snaps cells to every portal tract.
const FIT_TO_LOBULES_BELOW: f64 = 2e-3;

/// Configuration for growing a [`MacrocellTree`].
#[non_exhaustive]
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct GrowthConfig {
    /// Murray exponent.
    pub gamma: f64,
    /// Flow entering the root, shared by all portal tracts.
    pub tree_flow: f64,
    /// Pressure at every macrocell.
    pub cell_pressure: f64,
    /// Pressure at the root entry after normalization.
    pub input_pressure: f64,
    /// Macrocell radius before the first cycle.
    pub initial_cell_radius: f64,
    pub location_strategy: LocationStrategy,
    /// Upper bound on grow/die passes per cycle.
    pub max_subcycles: usize,
    /// Fill the organ with a grow-only pass right after the initial connection.
    pub initial_fill: bool,
    /// Seed of the generator driving placement and birth/death draws.
    pub seed: u64,
}

impl Default for GrowthConfig {
    fn default() -> Self {
        Self {
            gamma: DEFAULT_GAMMA,
            tree_flow: DEFAULT_TREE_FLOW,
            cell_pressure: DEFAULT_CELL_PRESSURE,
            input_pressure: INPUT_PRESSURE,
            initial_cell_radius: mm(5.0) / 0.3679,
            location_strategy: LocationStrategy::Lattice,
            max_subcycles: 10_000,
            initial_fill: true,
            seed: 0,
        }
    }
}

impl GrowthConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_gamma(mut self, gamma: f64) -> Self {
        self.gamma = gamma;
        self
    }

    pub fn with_tree_flow(mut self, tree_flow: f64) -> Self {
        self.tree_flow = tree_flow;
        self
    }

    pub fn with_cell_pressure(mut self, cell_pressure: f64) -> Self {
        self.cell_pressure = cell_pressure;
        self
    }

    pub fn with_input_pressure(mut self, input_pressure: f64) -> Self {
        self.input_pressure = input_pressure;
        self
    }

    pub fn with_initial_cell_radius(mut self, radius: f64) -> Self {
        self.initial_cell_radius = radius;
        self
    }

    pub fn with_location_strategy(mut self, strategy: LocationStrategy) -> Self {
        self.location_strategy = strategy;
        self
    }

    pub fn with_max_subcycles(mut self, max_subcycles: usize) -> Self {
        self.max_subcycles = max_subcycles;
        self
    }

    pub fn with_initial_fill(mut self, initial_fill: bool) -> Self {
        self.initial_fill = initial_fill;
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Validates the configuration, returning an error if invalid.
    pub fn validate(&self) -> Result<()> {
        if !(self.gamma > 0.0) {
            return Err(Error::InvalidConfig("gamma must be > 0".into()));
        }
        if !(self.tree_flow > 0.0) {
            return Err(Error::InvalidConfig("tree_flow must be > 0".into()));
        }
        if !(self.input_pressure > self.cell_pressure) {
            return Err(Error::InvalidConfig(
                "input_pressure must exceed cell_pressure".into(),
            ));
        }
        if !(self.initial_cell_radius > 0.0) {
            return Err(Error::InvalidConfig("initial_cell_radius must be > 0".into()));
        }
        if self.max_subcycles == 0 {
            return Err(Error::InvalidConfig("max_subcycles must be > 0".into()));
        }
        Ok(())
    }
}

/// Counters of one grow/die pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Subcycle {
    pub attempted: usize,
    pub created: usize,
    pub died: usize,
}

impl Subcycle {
    pub fn net(&self) -> i64 {
        self.created as i64 - self.died as i64
    }
}

/// A vessel tree together with the macrocells it perfuses.
pub struct MacrocellTree {
    config: GrowthConfig,
    shape: Arc<dyn Shape>,
    vessels: VesselTree,
    cells: CellList,
    rng: StdRng,
}

impl MacrocellTree {
    /// Builds the initial tree from a const trunk: one macrocell per trunk terminal and, if
    /// configured, an initial grow-only fill.
    pub fn new(config: GrowthConfig, trunk: Vec<FlatVessel>, shape: Arc<dyn Shape>) -> Result<Self> {
        Self::new_with_events(config, trunk, shape, &mut ())
    }

    pub fn new_with_events(
        config: GrowthConfig,
        trunk: Vec<FlatVessel>,
        shape: Arc<dyn Shape>,
        sink: &mut dyn EventSink,
    ) -> Result<Self> {
        config.validate()?;
        let cells = CellList::new(
            config.location_strategy,
            shape.as_ref(),
            config.initial_cell_radius,
            config.tree_flow,
            config.cell_pressure,
        );
        let normalizer = Normalizer::new(config.gamma, config.cell_pressure, cells.cell_flow())
            .with_input_pressure(config.input_pressure);
        let mut vessels = VesselTree::from_flat(trunk, shape.extents(), normalizer)?;
        vessels.normalize_all();
        if !vessels.validate(true) {
            warn!("Initial trunk does not validate; continuing.");
        }

        let mut this = Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            shape,
            vessels,
            cells,
        };

        for id in this.vessels.terminal_vessels() {
            let (start, end) = match this.vessels.get(id) {
                Some(v) => (v.start(), v.end()),
                None => return Err(Error::UnknownVessel(id)),
            };
            let cell_id = this
                .cells
                .add_cell_near(this.shape.as_ref(), start, Some(end), &mut this.rng)
                .ok_or(Error::InitialConnection(id))?;
            let cell = this
                .cells
                .get_mut(cell_id)
                .ok_or(Error::InitialConnection(id))?;
            this.vessels
                .connect_cell_initial(cell, id)
                .map_err(|_| Error::InitialConnection(id))?;
        }

        if this.config.initial_fill {
            this.fill(1.0, 0.0, 0, sink);
        }
        this.vessels.normalize_all();
        this.vessels.compute_strahler_orders();
        if !this.validate() {
            warn!("Invalid tree detected after the initial connection.");
            sink.send(GrowthEvent::Warning {
                context: "initial".into(),
                message: "tree failed validation".into(),
            });
        }
        Ok(this)
    }

    /// Restores a persisted tree. Header values that are zero fall back to the defaults.
    pub fn from_record(record: &TreeRecord, shape: Arc<dyn Shape>) -> Result<Self> {
        let defaults = GrowthConfig::default();
        let pick = |v: f64, default: f64| if v.abs() < 1e-12 { default } else { v };
        let config = GrowthConfig {
            gamma: if record.gamma.abs() < 1e-2 { defaults.gamma } else { record.gamma },
            tree_flow: pick(record.tree_flow, defaults.tree_flow),
            cell_pressure: pick(record.cell_pressure, defaults.cell_pressure),
            ..defaults
        };
        let cells = CellList::from_cells(
            record.cells(),
            config.location_strategy,
            shape.as_ref(),
            config.initial_cell_radius,
            config.tree_flow,
            config.cell_pressure,
        );
        let normalizer = Normalizer::new(config.gamma, config.cell_pressure, cells.cell_flow())
            .with_input_pressure(config.input_pressure);
        let vessels = VesselTree::from_flat(record.flat_vessels(), shape.extents(), normalizer)?;
        Ok(Self {
            rng: StdRng::seed_from_u64(config.seed),
            config,
            shape,
            vessels,
            cells,
        })
    }

    pub fn to_record(&self) -> TreeRecord {
        TreeRecord {
            gamma: self.vessels.gamma(),
            tree_flow: self.cells.tree_flow(),
            cell_pressure: self.cells.cell_pressure(),
            vessels: self.vessels.to_records(),
            macrocells: self.cells.iter().map(Into::into).collect(),
        }
    }

    pub fn config(&self) -> &GrowthConfig {
        &self.config
    }

    pub fn shape(&self) -> &dyn Shape {
        self.shape.as_ref()
    }

    pub fn vessels(&self) -> &VesselTree {
        &self.vessels
    }

    pub fn vessels_mut(&mut self) -> &mut VesselTree {
        &mut self.vessels
    }

    pub fn cells(&self) -> &CellList {
        &self.cells
    }

    pub fn reduce_cell_size(&mut self, scale: f64, fit_to_lobules: bool) {
        debug_assert!(scale > 0.0, "scale must be > 0");
        self.cells
            .reduce_cell_size(self.shape.as_ref(), scale, fit_to_lobules);
    }

    /// One birth/death pass. Returns the net change in macrocells.
    pub fn update_macrocells(&mut self, grow: f64, die: f64) -> i64 {
        self.update(grow, die, 0, &mut ()).net()
    }

    /// Repeats [`Self::update_macrocells`] while the population grows. Returns the number of
    /// passes run.
    pub fn fill_with_pcts(&mut self, grow: f64, die: f64) -> usize {
        self.fill(grow, die, 0, &mut ())
    }

    pub fn build(&mut self, cycles: usize, final_radius: f64) -> Result<()> {
        self.build_with_events(cycles, final_radius, &mut ())
    }

    /// Runs `cycles` growth cycles, shrinking cells linearly from the initial radius to
    /// `final_radius`.
    pub fn build_with_events(
        &mut self,
        cycles: usize,
        final_radius: f64,
        sink: &mut dyn EventSink,
    ) -> Result<()> {
        if cycles == 0 {
            return Err(Error::InvalidConfig("cycles must be > 0".into()));
        }
        if !(final_radius > 0.0) {
            return Err(Error::InvalidConfig("final_radius must be > 0".into()));
        }
        let initial = self.config.initial_cell_radius;
        let t = (final_radius - initial) / cycles as f64;

        for cycle in 0..cycles {
            let c = cycle as f64;
            let grow = M1 * (-c / M2).exp();
            let die = N1 * (-c / N2).exp();
            let fit_to_lobules = cycle == cycles - 1 && final_radius < FIT_TO_LOBULES_BELOW;
            self.reduce_cell_size(1.0 + t / (initial + c * t), fit_to_lobules);
            sink.send(GrowthEvent::CycleStarted {
                cycle,
                grow_probability: grow,
                die_probability: die,
                cell_radius: self.cells.cell_radius(),
                sites: self.cells.locations().number_of_sites(),
            });

            let before = self.cells.len();
            self.fill(grow, die, cycle, sink);
            self.vessels.normalize_all();
            let valid = self.validate();
            if !valid {
                warn!("Invalid tree detected in cycle {}.", cycle + 1);
            }
            let change = self.cells.len() as i64 - before as i64;
            info!(
                "Cycle {:2} | Mitosis: {:.4} | Necrosis: {:.4} | Change: {:6} | Cells: {}",
                cycle + 1,
                grow,
                die,
                change,
                self.cells.len()
            );
            sink.send(GrowthEvent::CycleFinished {
                cycle,
                change,
                macrocells: self.cells.len(),
                valid,
            });
        }

        self.vessels.normalize_all();
        self.vessels.compute_strahler_orders();
        Ok(())
    }

    /// Vessel tree, cell list and the links between them are all consistent.
    pub fn validate(&self) -> bool {
        let mut ok = self.vessels.validate(self.cells.is_empty()) && self.cells.validate();
        for cell in self.cells.iter() {
            let Some(v) = cell.parent_vessel.and_then(|id| self.vessels.get(id)) else {
                warn!("Macrocell {} references a missing vessel", cell.id);
                ok = false;
                continue;
            };
            ok &= check_close(
                v.exit_pressure,
                cell.pressure,
                1e-4,
                v.id,
                "vessel exit pressure",
                "cell pressure",
            );
        }
        for v in self.vessels.vessels() {
            if let Some(c) = v.cell {
                if self.cells.get(c).is_none() {
                    warn!("Vessel {} references non-existent cell {}", v.id, c);
                    ok = false;
                }
            }
        }
        ok
    }

    fn fill(&mut self, grow: f64, die: f64, cycle: usize, sink: &mut dyn EventSink) -> usize {
        let mut passes = 0;
        loop {
            passes += 1;
            let net = self.update(grow, die, cycle, sink).net();
            if net <= 0 {
                return passes;
            }
            if passes >= self.config.max_subcycles {
                warn!(
                    "Cycle {} still growing after {} passes; stopping.",
                    cycle + 1,
                    passes
                );
                sink.send(GrowthEvent::Warning {
                    context: format!("cycle {}", cycle + 1),
                    message: format!("stopped after {passes} passes"),
                });
                return passes;
            }
        }
    }

    fn update(&mut self, grow: f64, die: f64, cycle: usize, sink: &mut dyn EventSink) -> Subcycle {
        let rng: &mut dyn Rng = &mut self.rng;

        let candidates: Vec<_> = self
            .cells
            .iter()
            .map(|c| (c.id, c.parent_vessel))
            .collect();
        let mut dying = Vec::new();
        for (cell, vessel) in candidates {
            if rand01(rng) >= die {
                continue;
            }
            let Some(vessel) = vessel else {
                continue;
            };
            match self.vessels.remove(vessel) {
                Ok(true) => dying.push(cell),
                Ok(false) => {}
                Err(e) => warn!("Cannot remove vessel of macrocell {}: {}", cell, e),
            }
        }

        let mut clone_centers: Vec<DVec3> = self
            .cells
            .iter()
            .filter_map(|c| (rand01(rng) < grow).then_some(c.center))
            .collect();
        for id in &dying {
            self.cells.erase(*id);
        }

        shuffle(&mut clone_centers, rng);
        let mut stats = Subcycle {
            attempted: clone_centers.len(),
            died: dying.len(),
            ..Subcycle::default()
        };
        for center in clone_centers {
            let Some(id) = self
                .cells
                .add_cell_near(self.shape.as_ref(), center, None, rng)
            else {
                continue;
            };
            let connected = match self.cells.get_mut(id) {
                Some(cell) => self.vessels.connect_cell(cell, rng).is_some(),
                None => false,
            };
            if connected {
                stats.created += 1;
            } else {
                self.cells.erase(id);
            }
        }

        debug!(
            "total: {:8} | attempted: {:6} | created: {:6} | died: {:6} | net: {:6}",
            self.vessels.len(),
            stats.attempted,
            stats.created,
            stats.died,
            stats.net()
        );
        sink.send(GrowthEvent::SubcycleFinished {
            cycle,
            vessels: self.vessels.len(),
            attempted: stats.attempted,
            created: stats.created,
            died: stats.died,
        });
        stats
    }

    /// Vessel feeding the macrocell `cell`, if connected.
    pub fn vessel_of(&self, cell: crate::vessel::CellId) -> Option<VesselId> {
        self.cells.get(cell).and_then(|c| c.parent_vessel)
    }
}

impl PartialEq for MacrocellTree {
    fn eq(&self, other: &Self) -> bool {
        self.cells == other.cells && self.vessels == other.vessels
    }
}

impl std::fmt::Debug for MacrocellTree {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MacrocellTree")
            .field("config", &self.config)
            .field("vessels", &self.vessels.len())
            .field("macrocells", &self.cells.len())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::growth::events::VecSink;
    use crate::shape::BoxShape;
    use crate::units::mmhg;
    use crate::vessel::Vessel;

    fn trunk_vessel(id: u32, start: DVec3, end: DVec3, parent: Option<u32>, left: Option<u32>, right: Option<u32>) -> FlatVessel {
        FlatVessel {
            vessel: Vessel::new(VesselId(id), start, end, mm(1.5), 1.0, mmhg(25.0)).with_const(true),
            parent: parent.map(VesselId),
            left: left.map(VesselId),
            right: right.map(VesselId),
        }
    }

    /// A Y shaped trunk entering a 16 mm cube from below.
    pub(crate) fn y_trunk() -> Vec<FlatVessel> {
        let a = DVec3::new(mm(8.0), mm(8.0), 0.0);
        let b = DVec3::new(mm(8.0), mm(8.0), mm(5.0));
        let c = DVec3::new(mm(5.0), mm(6.0), mm(9.0));
        let d = DVec3::new(mm(11.0), mm(10.0), mm(10.0));
        vec![
            trunk_vessel(0, a, b, None, Some(1), Some(2)),
            trunk_vessel(1, b, c, Some(0), None, None),
            trunk_vessel(2, b, d, Some(0), None, None),
        ]
    }

    pub(crate) fn cube() -> Arc<dyn Shape> {
        Arc::new(BoxShape::new(DVec3::ZERO, DVec3::splat(mm(16.0))))
    }

    pub(crate) fn small_config() -> GrowthConfig {
        GrowthConfig::default()
            .with_initial_cell_radius(mm(3.0))
            .with_seed(7)
    }

    #[test]
    fn config_validation() {
        assert!(GrowthConfig::default().validate().is_ok());
        assert!(GrowthConfig::default().with_gamma(0.0).validate().is_err());
        assert!(GrowthConfig::default().with_input_pressure(0.0).validate().is_err());
        assert!(GrowthConfig::default().with_max_subcycles(0).validate().is_err());
        let err = MacrocellTree::new(GrowthConfig::default().with_tree_flow(-1.0), y_trunk(), cube());
        assert!(matches!(err, Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn initial_tree_connects_every_trunk_terminal() {
        let t = MacrocellTree::new(small_config().with_initial_fill(false), y_trunk(), cube()).unwrap();
        assert_eq!(t.cells().len(), 2);
        assert_eq!(t.vessels().len(), 5);
        assert!(t.validate());
    }

    #[test]
    fn grow_only_passes_never_shrink_the_population() {
        let mut t = MacrocellTree::new(small_config().with_initial_fill(false), y_trunk(), cube()).unwrap();
        let mut last = t.cells().len();
        for _ in 0..6 {
            let net = t.update_macrocells(1.0, 0.0);
            assert!(net >= 0);
            assert_eq!(t.cells().len() as i64, last as i64 + net);
            last = t.cells().len();
        }
        t.vessels_mut().normalize_all();
        assert!(t.validate());
    }

    #[test]
    fn balanced_cycle_terminates() {
        let mut t = MacrocellTree::new(small_config(), y_trunk(), cube()).unwrap();
        let passes = t.fill_with_pcts(0.9, 0.3);
        assert!(passes >= 1 && passes <= t.config().max_subcycles);
        t.vessels_mut().normalize_all();
        assert!(t.validate());
    }

    #[test]
    fn build_reports_every_cycle() {
        let mut t = MacrocellTree::new(small_config(), y_trunk(), cube()).unwrap();
        let mut sink = VecSink::new();
        t.build_with_events(2, mm(2.5), &mut sink).unwrap();
        let finished: Vec<_> = sink
            .as_slice()
            .iter()
            .filter(|e| matches!(e, GrowthEvent::CycleFinished { .. }))
            .collect();
        assert_eq!(finished.len(), 2);
        assert!((t.cells().cell_radius() - mm(2.5)).abs() < 1e-12);
        assert!(t.validate());
        assert!(matches!(t.build(0, mm(1.0)), Err(Error::InvalidConfig(_))));
    }

    #[test]
    fn record_round_trip_is_exact() {
        let mut t = MacrocellTree::new(small_config(), y_trunk(), cube()).unwrap();
        t.build(1, mm(2.5)).unwrap();
        let record = t.to_record();
        let loaded = MacrocellTree::from_record(&record, cube()).unwrap();
        assert!(loaded == t);
        assert_eq!(loaded.to_record(), record);
    }

    #[test]
    fn same_seed_same_tree() {
        let a = MacrocellTree::new(small_config(), y_trunk(), cube()).unwrap();
        let b = MacrocellTree::new(small_config(), y_trunk(), cube()).unwrap();
        assert!(a == b);
    }
}
