//! Vessel segments and the hemodynamic vessel tree.
//!
//! - [`Vessel`]: one tree edge with geometry and hemodynamic state.
//! - [`VesselTree`]: the binary tree plus its spatial index, growth primitives and validator.
//! - [`Normalizer`]: derives consistent radius, flow and pressure for every vessel.
use std::fmt;

use glam::DVec3;

use crate::spatial::SegmentItem;
use crate::units::{pressure_drop, relative_difference};

pub mod normalize;
pub mod validate;
pub mod vessel_tree;

pub use normalize::Normalizer;
pub use vessel_tree::VesselTree;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct VesselId(pub u32);

impl fmt::Display for VesselId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct CellId(pub u32);

impl fmt::Display for CellId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Hands out increasing ids, never repeating one.
#[derive(Debug, Clone, Default)]
pub struct IdGenerator {
    last: u32,
}

impl IdGenerator {
    /// Generator whose first id is `last + 1`.
    pub fn after(last: u32) -> Self {
        Self { last }
    }

    pub fn next_id(&mut self) -> u32 {
        self.last += 1;
        self.last
    }

    pub fn last(&self) -> u32 {
        self.last
    }
}

/// A cylindrical vessel segment.
///
/// Geometry is private so that the cached length always matches the end points; hemodynamic
/// fields are public and kept consistent by the [`Normalizer`].
#[derive(Debug, Clone, PartialEq)]
pub struct Vessel {
    pub id: VesselId,
    start: DVec3,
    end: DVec3,
    length: f64,
    pub radius: f64,
    pub flow: f64,
    pub entry_pressure: f64,
    pub exit_pressure: f64,
    /// Macrocell fed by this vessel, if it is a terminal sink.
    pub cell: Option<CellId>,
    /// Trunk geometry that must never move or be merged out.
    pub is_const: bool,
    pub strahler_order: u32,
}

impl Vessel {
    /// New vessel whose entry pressure is derived from `exit_pressure`.
    pub fn new(
        id: VesselId,
        start: DVec3,
        end: DVec3,
        radius: f64,
        flow: f64,
        exit_pressure: f64,
    ) -> Self {
        let mut v = Self {
            id,
            start,
            end,
            length: start.distance(end),
            radius,
            flow,
            entry_pressure: 0.0,
            exit_pressure: 0.0,
            cell: None,
            is_const: false,
            strahler_order: 0,
        };
        v.set_exit_pressure(exit_pressure);
        v
    }

    /// Restores a vessel with every value taken verbatim, e.g. from a persisted record.
    #[allow(clippy::too_many_arguments)]
    pub fn from_parts(
        id: VesselId,
        start: DVec3,
        end: DVec3,
        radius: f64,
        flow: f64,
        entry_pressure: f64,
        exit_pressure: f64,
        cell: Option<CellId>,
        is_const: bool,
    ) -> Self {
        Self {
            id,
            start,
            end,
            length: start.distance(end),
            radius,
            flow,
            entry_pressure,
            exit_pressure,
            cell,
            is_const,
            strahler_order: 0,
        }
    }

    pub fn with_cell(mut self, cell: CellId) -> Self {
        self.cell = Some(cell);
        self
    }

    pub fn with_const(mut self, is_const: bool) -> Self {
        self.is_const = is_const;
        self
    }

    pub fn start(&self) -> DVec3 {
        self.start
    }

    pub fn end(&self) -> DVec3 {
        self.end
    }

    pub fn length(&self) -> f64 {
        self.length
    }

    pub fn direction(&self) -> DVec3 {
        self.end - self.start
    }

    pub fn set_start(&mut self, start: DVec3) {
        self.start = start;
        self.length = start.distance(self.end);
    }

    pub fn set_end(&mut self, end: DVec3) {
        self.end = end;
        self.length = self.start.distance(end);
    }

    pub fn pressure_drop(&self) -> f64 {
        pressure_drop(self.flow, self.radius, self.length)
    }

    /// Sets the exit pressure and recomputes the entry pressure from the current drop.
    pub fn set_exit_pressure(&mut self, exit: f64) {
        self.exit_pressure = exit;
        self.entry_pressure = exit + self.pressure_drop();
    }

    /// Sets the entry pressure and recomputes the exit pressure from the current drop.
    pub fn set_entry_pressure(&mut self, entry: f64) {
        self.entry_pressure = entry;
        self.exit_pressure = entry - self.pressure_drop();
    }

    pub fn cross_section(&self) -> f64 {
        std::f64::consts::PI * self.radius * self.radius
    }

    /// Whether the stored entry pressure matches `exit + drop` within `eps` relative difference.
    pub fn is_consistent(&self, eps: f64) -> bool {
        relative_difference(self.entry_pressure, self.exit_pressure + self.pressure_drop()) <= eps
    }

    pub fn segment(&self) -> SegmentItem {
        SegmentItem::new(self.id, self.start, self.end)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::{mm, mmhg};

    #[test]
    fn new_vessel_is_consistent() {
        let v = Vessel::new(VesselId(1), DVec3::ZERO, DVec3::new(0.0, 0.0, mm(5.0)), mm(1.0), 1e-7, mmhg(25.0));
        assert!(v.entry_pressure > v.exit_pressure);
        assert!(v.is_consistent(1e-12));
        assert!((v.length() - mm(5.0)).abs() < 1e-15);
    }

    #[test]
    fn moving_start_updates_length() {
        let mut v = Vessel::new(VesselId(1), DVec3::ZERO, DVec3::X, 1.0, 0.0, 0.0);
        v.set_start(DVec3::new(0.25, 0.0, 0.0));
        assert_eq!(v.length(), 0.75);
        v.set_end(DVec3::new(1.25, 0.0, 0.0));
        assert_eq!(v.length(), 1.0);
    }

    #[test]
    fn id_generator_is_monotonic() {
        let mut ids = IdGenerator::after(41);
        assert_eq!(ids.next_id(), 42);
        assert_eq!(ids.next_id(), 43);
        assert_eq!(ids.last(), 43);
    }
}
