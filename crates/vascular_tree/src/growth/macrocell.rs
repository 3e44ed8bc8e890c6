use glam::{DVec3, IVec3};

use crate::geometry::Aabb;
use crate::vessel::{CellId, VesselId};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum CellType {
    #[default]
    Normal,
    Tumor,
}

/// A terminal sink perfused by one vessel.
#[derive(Debug, Clone, PartialEq)]
pub struct Macrocell {
    pub id: CellId,
    pub center: DVec3,
    pub parent_vessel: Option<VesselId>,
    pub kind: CellType,
    pub radius: f64,
    pub flow: f64,
    pub pressure: f64,
    /// Lattice index of the site the cell occupies.
    pub lattice: IVec3,
}

impl Macrocell {
    pub fn extents(&self) -> Aabb {
        Aabb::around(self.center, self.radius)
    }
}
