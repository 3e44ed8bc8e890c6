//! Spatial indexing of vessels and candidate macrocell sites.
//!
//! The octree holds lightweight copies of geometry keyed by id; vessel and macrocell storage
//! stays with their owners.
use glam::{DVec3, IVec3};

use crate::geometry::Aabb;
use crate::vessel::VesselId;

pub mod octree;

pub use octree::{Accumulator, Indexed, NNearest, Nearest, Octree, Within, PREFERRED_CAPACITY};

/// A vessel as a line segment with cached offset and squared length.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SegmentItem {
    pub id: VesselId,
    pub start: DVec3,
    pub end: DVec3,
    offset: DVec3,
    length_sq: f64,
}

impl SegmentItem {
    pub fn new(id: VesselId, start: DVec3, end: DVec3) -> Self {
        let offset = end - start;
        Self {
            id,
            start,
            end,
            offset,
            length_sq: offset.length_squared(),
        }
    }

    fn parameter(&self, p: DVec3) -> f64 {
        if self.length_sq == 0.0 {
            return 0.0;
        }
        (p - self.start).dot(self.offset) / self.length_sq
    }

    /// Squared distance from `p` to the closest point on the segment.
    pub fn distance_squared(&self, p: DVec3) -> f64 {
        let t = self.parameter(p).clamp(0.0, 1.0);
        (self.start + self.offset * t).distance_squared(p)
    }

    /// Like [`Self::distance_squared`] but rejects points that project before the start.
    ///
    /// New branches never grow backwards from a vessel's start.
    pub fn forward_distance_squared(&self, p: DVec3) -> Option<f64> {
        let t = self.parameter(p);
        if t < 0.0 {
            return None;
        }
        let closest = if t > 1.0 {
            self.end
        } else {
            self.start + self.offset * t
        };
        Some(closest.distance_squared(p))
    }
}

impl Indexed for SegmentItem {
    type Key = VesselId;

    fn key(&self) -> VesselId {
        self.id
    }

    fn extents(&self) -> Aabb {
        Aabb::from_corners(self.start, self.end)
    }
}

/// A candidate macrocell site on the lobule lattice.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SitePoint {
    pub location: DVec3,
    pub lattice: IVec3,
}

impl Indexed for SitePoint {
    type Key = [i32; 3];

    fn key(&self) -> [i32; 3] {
        self.lattice.to_array()
    }

    fn extents(&self) -> Aabb {
        Aabb::from_point(self.location)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn forward_distance_rejects_points_behind_start() {
        let s = SegmentItem::new(VesselId(1), DVec3::ZERO, DVec3::X);
        assert!(s.forward_distance_squared(DVec3::new(-0.1, 1.0, 0.0)).is_none());
        assert_eq!(s.forward_distance_squared(DVec3::new(0.5, 2.0, 0.0)), Some(4.0));
        assert_eq!(s.forward_distance_squared(DVec3::new(3.0, 0.0, 0.0)), Some(4.0));
        assert_eq!(s.distance_squared(DVec3::new(-1.0, 0.0, 0.0)), 1.0);
    }

    #[test]
    fn zero_length_segment_measures_to_start() {
        let s = SegmentItem::new(VesselId(1), DVec3::ONE, DVec3::ONE);
        assert_eq!(s.distance_squared(DVec3::ZERO), 3.0);
        assert_eq!(s.forward_distance_squared(DVec3::ZERO), Some(3.0));
    }
}
