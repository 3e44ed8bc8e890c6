//! The hexagonal lobule lattice and its portal tracts.
//!
//! Lobules are hexagonal prisms laid out in rows along y; every other row along x is shifted.
//! Each lobule contributes two portal tracts, one below its center (`- DOFF`) and one to its
//! lower left (`- DLOFF`). Tract lattice indices reuse the lobule index with `y` doubled for the
//! first tract and doubled plus one for the second.
//!
//! All positions are relative to the lower corner of the shape's extents.
use glam::{DVec3, IVec3};

use crate::geometry::Aabb;
use crate::shape::Shape;

pub const SIDE_LENGTH: f64 = 0.693e-3;
pub const MIN_RADIUS: f64 = 0.6e-3;
pub const CELL_THICKNESS: f64 = 1.5e-3;

/// Distance between the centers of adjacent rows.
pub const XSTEP: f64 = MIN_RADIUS;
/// Distance between centers within a row.
pub const YSTEP: f64 = SIDE_LENGTH * 3.0;
pub const ZSTEP: f64 = CELL_THICKNESS;

pub const XOFF: f64 = XSTEP / 2.0;
pub const YOFF0: f64 = 5.0 * SIDE_LENGTH / 2.0;
pub const YOFF1: f64 = SIDE_LENGTH;
pub const ZOFF: f64 = ZSTEP / 2.0;

pub const DLOFF: DVec3 = DVec3::new(MIN_RADIUS, SIDE_LENGTH / 2.0, 0.0);
pub const DOFF: DVec3 = DVec3::new(0.0, SIDE_LENGTH, 0.0);

/// Tissue volume served by one portal tract.
pub const TRACT_VOLUME: f64 = XSTEP * YSTEP * ZSTEP / 2.0;

#[inline]
fn row_offset(x: i32) -> f64 {
    if x % 2 == 0 {
        YOFF0
    } else {
        YOFF1
    }
}

fn axis_index(p: f64, step: f64, offset: f64) -> i32 {
    ((p - offset) / step).round() as i32
}

/// Index of the lobule whose center is closest to `p` (relative coordinates).
pub fn to_idx(p: DVec3) -> IVec3 {
    let x = axis_index(p.x, XSTEP, XOFF);
    let z = axis_index(p.z, ZSTEP, ZOFF);
    let y = axis_index(p.y, YSTEP, row_offset(x));
    IVec3::new(x, y, z)
}

/// Center of lobule `idx` (relative coordinates).
pub fn from_idx(idx: IVec3) -> DVec3 {
    idx.as_dvec3() * DVec3::new(XSTEP, YSTEP, ZSTEP) + DVec3::new(XOFF, row_offset(idx.x), ZOFF)
}

fn adjust_index(idx: IVec3, xoffset: i32) -> IVec3 {
    let shift = i32::from(xoffset % 2 != 0 && idx.x % 2 == 0);
    IVec3::new(idx.x + xoffset, idx.y + shift, idx.z)
}

fn lobule_point(ext: &Aabb, idx: IVec3) -> DVec3 {
    ext.min + from_idx(idx)
}

fn tract_point(ext: &Aabb, lobule: IVec3, lower_left: bool) -> (DVec3, IVec3) {
    let center = lobule_point(ext, lobule);
    if lower_left {
        (center - DLOFF, IVec3::new(lobule.x, 2 * lobule.y + 1, lobule.z))
    } else {
        (center - DOFF, IVec3::new(lobule.x, 2 * lobule.y, lobule.z))
    }
}

/// Calls `f` with the center and index of every lobule inside `shape`, z slowest and y fastest.
pub fn for_lobule(shape: &dyn Shape, mut f: impl FnMut(DVec3, IVec3)) {
    let ext = shape.extents();
    let size = ext.size();
    let mut z = 0;
    while ZOFF + z as f64 * ZSTEP < size.z {
        let mut x = 0;
        while XOFF + x as f64 * XSTEP < size.x {
            let mut y = 0;
            while row_offset(x) + y as f64 * YSTEP < size.y {
                let idx = IVec3::new(x, y, z);
                let p = lobule_point(&ext, idx);
                if shape.contains(p) {
                    f(p, idx);
                }
                y += 1;
            }
            x += 1;
        }
        z += 1;
    }
}

/// Calls `f` with the location and tract index of every portal tract of every lobule inside
/// `shape`, skipping tracts that fall outside it.
pub fn for_portal_tract(shape: &dyn Shape, mut f: impl FnMut(DVec3, IVec3)) {
    let ext = shape.extents();
    for_lobule(shape, |_, idx| {
        for lower_left in [false, true] {
            let (p, tidx) = tract_point(&ext, idx, lower_left);
            if shape.contains(p) {
                f(p, tidx);
            }
        }
    });
}

pub fn count_portal_tracts(shape: &dyn Shape) -> usize {
    let mut n = 0;
    for_portal_tract(shape, |_, _| n += 1);
    n
}

/// The lobule nearest to `p`, if its center lies inside `shape`.
pub fn find_near_lobule(shape: &dyn Shape, p: DVec3) -> Option<(DVec3, IVec3)> {
    let ext = shape.extents();
    let idx = to_idx(p - ext.min);
    let center = lobule_point(&ext, idx);
    shape.contains(center).then_some((center, idx))
}

/// The portal tract nearest to `p`, if it lies inside `shape`.
///
/// Looks at the two tracts bordering the quadrant of the nearest lobule that contains `p`.
pub fn find_near_tract(shape: &dyn Shape, p: DVec3) -> Option<(DVec3, IVec3)> {
    let ext = shape.extents();
    let (center, idx) = find_near_lobule(shape, p)?;

    let (x0, x1) = match (p.x < center.x, p.y < center.y) {
        (true, true) => (0, 0),
        (false, true) => (0, 2),
        (true, false) => (-1, 1),
        (false, false) => (1, 1),
    };
    let below = tract_point(&ext, adjust_index(idx, x0), false);
    let lower_left = tract_point(&ext, adjust_index(idx, x1), true);
    let pick = if p.distance_squared(below.0) < p.distance_squared(lower_left.0) {
        below
    } else {
        lower_left
    };
    shape.contains(pick.0).then_some(pick)
}

#[cfg(test)]
mod tests {
    use std::collections::BTreeMap;

    use super::*;
    use crate::shape::BoxShape;

    fn box18() -> BoxShape {
        BoxShape::new(DVec3::ZERO, DVec3::splat(18e-3))
    }

    #[test]
    fn index_round_trip() {
        for idx in [IVec3::new(0, 0, 0), IVec3::new(3, 2, 1), IVec3::new(8, 5, 4)] {
            assert_eq!(to_idx(from_idx(idx)), idx);
        }
    }

    #[test]
    fn near_lobule_matches_enumeration() {
        let shape = box18();
        let mut lobules = BTreeMap::new();
        for_lobule(&shape, |p, idx| {
            lobules.insert(idx.to_array(), p);
        });
        assert!(!lobules.is_empty());

        for i in 2..35 {
            let q = DVec3::splat(i as f64 * 0.5e-3);
            let (p, idx) = find_near_lobule(&shape, q).expect("lobule inside the box");
            assert_eq!(lobules[&idx.to_array()], p);
        }
    }

    #[test]
    fn near_tract_matches_enumeration() {
        let shape = box18();
        let mut tracts = BTreeMap::new();
        for_portal_tract(&shape, |p, idx| {
            tracts.insert(idx.to_array(), p);
        });
        assert_eq!(tracts.len(), count_portal_tracts(&shape));

        for i in 2..35 {
            let q = DVec3::splat(i as f64 * 0.5e-3);
            let (p, idx) = find_near_tract(&shape, q).expect("tract inside the box");
            assert_eq!(tracts.get(&idx.to_array()), Some(&p), "query {q:?}");
        }
    }

    #[test]
    fn tract_density_matches_volume() {
        let shape = box18();
        let expected = shape.volume() / TRACT_VOLUME;
        let n = count_portal_tracts(&shape) as f64;
        assert!((n / expected - 1.0).abs() < 0.15, "{n} vs {expected}");
    }

    #[test]
    fn outside_point_has_no_lobule() {
        let shape = box18();
        assert!(find_near_lobule(&shape, DVec3::splat(-5e-3)).is_none());
    }
}
