//! Organ shape predicates.
//!
//! Growth only needs to know whether a point lies inside the organ, the organ's bounding box and
//! its volume. Voxel masks are decoded elsewhere and plugged in through [`Shape`].
use glam::DVec3;

use crate::geometry::Aabb;

pub trait Shape: Send + Sync {
    fn contains(&self, p: DVec3) -> bool;
    fn extents(&self) -> Aabb;
    fn volume(&self) -> f64;
}

/// Solid axis-aligned box.
#[derive(Debug, Clone, Copy)]
pub struct BoxShape {
    pub bounds: Aabb,
}

impl BoxShape {
    pub fn new(min: DVec3, max: DVec3) -> Self {
        Self {
            bounds: Aabb::from_corners(min, max),
        }
    }
}

impl Shape for BoxShape {
    fn contains(&self, p: DVec3) -> bool {
        self.bounds.contains_point(p)
    }

    fn extents(&self) -> Aabb {
        self.bounds
    }

    fn volume(&self) -> f64 {
        self.bounds.volume()
    }
}

/// Solid axis-aligned ellipsoid.
#[derive(Debug, Clone, Copy)]
pub struct EllipsoidShape {
    pub center: DVec3,
    pub radii: DVec3,
}

impl EllipsoidShape {
    pub fn new(center: DVec3, radii: DVec3) -> Self {
        Self { center, radii }
    }
}

impl Shape for EllipsoidShape {
    fn contains(&self, p: DVec3) -> bool {
        ((p - self.center) / self.radii).length_squared() <= 1.0
    }

    fn extents(&self) -> Aabb {
        Aabb {
            min: self.center - self.radii,
            max: self.center + self.radii,
        }
    }

    fn volume(&self) -> f64 {
        4.0 / 3.0 * std::f64::consts::PI * self.radii.x * self.radii.y * self.radii.z
    }
}
