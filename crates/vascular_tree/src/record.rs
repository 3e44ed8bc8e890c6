//! Persisted trees and the initial trunk vessel list.
//!
//! [`TreeRecord`] is the flat, serializable form of a grown tree: a header, every vessel in
//! level order and every macrocell. Loading is the inverse of [`VesselTree::to_records`] and
//! restores each value bit for bit.
//!
//! The initial vessel list is a whitespace separated text format with one trunk vessel per
//! line (see [`parse_initial_vessels`]).
use std::path::Path;

use glam::{DVec3, IVec3};
#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::growth::macrocell::{CellType, Macrocell};
use crate::units::{mm, mmhg};
use crate::vessel::{CellId, Vessel, VesselId, VesselTree};

/// Trunk files are stored at a reduced scale; coordinates are multiplied by this on load.
pub const DEFAULT_TRUNK_SCALE: f64 = 1.0 / 0.3679;

/// A vessel together with the ids of its neighbours, before the tree is assembled.
#[derive(Debug, Clone, PartialEq)]
pub struct FlatVessel {
    pub vessel: Vessel,
    pub parent: Option<VesselId>,
    pub left: Option<VesselId>,
    pub right: Option<VesselId>,
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct VesselRecord {
    pub id: u32,
    pub parent: Option<u32>,
    pub left: Option<u32>,
    pub right: Option<u32>,
    pub radius: f64,
    pub flow: f64,
    pub entry_pressure: f64,
    pub exit_pressure: f64,
    pub start: [f64; 3],
    pub end: [f64; 3],
    pub cell: Option<u32>,
    pub is_const: bool,
}

impl VesselRecord {
    pub fn to_flat(&self) -> FlatVessel {
        FlatVessel {
            vessel: Vessel::from_parts(
                VesselId(self.id),
                DVec3::from_array(self.start),
                DVec3::from_array(self.end),
                self.radius,
                self.flow,
                self.entry_pressure,
                self.exit_pressure,
                self.cell.map(CellId),
                self.is_const,
            ),
            parent: self.parent.map(VesselId),
            left: self.left.map(VesselId),
            right: self.right.map(VesselId),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct MacrocellRecord {
    pub id: u32,
    pub center: [f64; 3],
    pub radius: f64,
    pub flow: f64,
    pub pressure: f64,
    pub parent_vessel: Option<u32>,
    pub lattice: [i32; 3],
    #[cfg_attr(feature = "serde", serde(default))]
    pub kind: CellType,
}

impl From<&Macrocell> for MacrocellRecord {
    fn from(c: &Macrocell) -> Self {
        Self {
            id: c.id.0,
            center: c.center.to_array(),
            radius: c.radius,
            flow: c.flow,
            pressure: c.pressure,
            parent_vessel: c.parent_vessel.map(|v| v.0),
            lattice: c.lattice.to_array(),
            kind: c.kind,
        }
    }
}

impl From<&MacrocellRecord> for Macrocell {
    fn from(r: &MacrocellRecord) -> Self {
        Self {
            id: CellId(r.id),
            center: DVec3::from_array(r.center),
            parent_vessel: r.parent_vessel.map(VesselId),
            kind: r.kind,
            radius: r.radius,
            flow: r.flow,
            pressure: r.pressure,
            lattice: IVec3::from_array(r.lattice),
        }
    }
}

/// A complete grown tree.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TreeRecord {
    pub gamma: f64,
    pub tree_flow: f64,
    pub cell_pressure: f64,
    pub vessels: Vec<VesselRecord>,
    pub macrocells: Vec<MacrocellRecord>,
}

impl TreeRecord {
    pub fn flat_vessels(&self) -> Vec<FlatVessel> {
        self.vessels.iter().map(VesselRecord::to_flat).collect()
    }

    pub fn cells(&self) -> Vec<Macrocell> {
        self.macrocells.iter().map(Macrocell::from).collect()
    }
}

impl VesselTree {
    /// Every vessel in level order with its neighbour ids.
    pub fn to_records(&self) -> Vec<VesselRecord> {
        let Some(root) = self.tree.root() else {
            return Vec::new();
        };
        self.tree
            .level_order(root)
            .into_iter()
            .map(|n| {
                let v = &self.tree[n];
                let id_of = |m: Option<_>| m.map(|m| self.tree[m].id.0);
                VesselRecord {
                    id: v.id.0,
                    parent: id_of(self.tree.parent(n)),
                    left: id_of(self.tree.left(n)),
                    right: id_of(self.tree.right(n)),
                    radius: v.radius,
                    flow: v.flow,
                    entry_pressure: v.entry_pressure,
                    exit_pressure: v.exit_pressure,
                    start: v.start().to_array(),
                    end: v.end().to_array(),
                    cell: v.cell.map(|c| c.0),
                    is_const: v.is_const,
                }
            })
            .collect()
    }
}

/// Parses the trunk vessel list.
///
/// Each non-empty line not starting with `#` holds 13 whitespace separated columns:
/// `x1 y1 z1 x2 y2 z2 radius parent left right` followed by three ignored values. Lengths are
/// millimetres and are multiplied by `scale`; `-1` marks a missing neighbour. A vessel's id is
/// its zero-based index among the data lines.
///
/// Every vessel is const, carries a placeholder flow of 1 m³/s and an exit pressure of
/// 25 mmHg until the first normalization.
pub fn parse_initial_vessels(text: &str, scale: f64) -> Result<Vec<FlatVessel>> {
    let mut out = Vec::new();
    for (lineno, line) in text.lines().enumerate() {
        if line.trim().is_empty() || line.starts_with('#') {
            continue;
        }
        let line_no = lineno + 1;
        let cols: Vec<&str> = line.split_whitespace().collect();
        if cols.len() != 13 {
            return Err(Error::MalformedVesselFile {
                line: line_no,
                message: format!("expected 13 columns, found {}", cols.len()),
            });
        }
        let num = |i: usize| -> Result<f64> {
            cols[i].parse::<f64>().map_err(|e| Error::MalformedVesselFile {
                line: line_no,
                message: format!("column {}: {e}", i + 1),
            })
        };
        let id_at = |i: usize| -> Result<Option<VesselId>> {
            let v = cols[i].parse::<i64>().map_err(|e| Error::MalformedVesselFile {
                line: line_no,
                message: format!("column {}: {e}", i + 1),
            })?;
            match u32::try_from(v) {
                Ok(id) => Ok(Some(VesselId(id))),
                Err(_) if v < 0 => Ok(None),
                Err(_) => Err(Error::MalformedVesselFile {
                    line: line_no,
                    message: format!("column {}: id {v} out of range", i + 1),
                }),
            }
        };

        let start = DVec3::new(num(0)?, num(1)?, num(2)?) * mm(scale);
        let end = DVec3::new(num(3)?, num(4)?, num(5)?) * mm(scale);
        let radius = mm(num(6)? * scale);
        let id = VesselId(out.len() as u32);
        out.push(FlatVessel {
            vessel: Vessel::new(id, start, end, radius, 1.0, mmhg(25.0)).with_const(true),
            parent: id_at(7)?,
            left: id_at(8)?,
            right: id_at(9)?,
        });
    }
    if out.is_empty() {
        return Err(Error::InvalidConfig("vessel list contains no vessels".into()));
    }
    Ok(out)
}

/// Reads and parses a trunk vessel file.
pub fn read_initial_vessels(path: impl AsRef<Path>, scale: f64) -> Result<Vec<FlatVessel>> {
    let text = std::fs::read_to_string(path)?;
    parse_initial_vessels(&text, scale)
}
