//! Axis-aligned boxes and segment helpers shared by the spatial index and the growth engine.
use glam::{DVec3, IVec3};

/// Axis-aligned box given by its lower (`min`) and upper (`max`) corners.
///
/// A box whose `min` is not strictly below `max` on every axis is empty.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Aabb {
    pub min: DVec3,
    pub max: DVec3,
}

impl Aabb {
    /// Box spanning two arbitrary corners.
    pub fn from_corners(a: DVec3, b: DVec3) -> Self {
        Self {
            min: a.min(b),
            max: a.max(b),
        }
    }

    pub fn from_point(p: DVec3) -> Self {
        Self { min: p, max: p }
    }

    pub fn center(&self) -> DVec3 {
        (self.min + self.max) * 0.5
    }

    pub fn size(&self) -> DVec3 {
        self.max - self.min
    }

    pub fn is_empty(&self) -> bool {
        self.min.cmpge(self.max).any()
    }

    pub fn volume(&self) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        let s = self.size();
        s.x * s.y * s.z
    }

    pub fn contains_point(&self, p: DVec3) -> bool {
        p.cmpge(self.min).all() && p.cmple(self.max).all()
    }

    /// Whether `other` lies wholly inside this box.
    pub fn contains(&self, other: &Aabb) -> bool {
        other.min.cmpge(self.min).all() && other.max.cmple(self.max).all()
    }

    /// Non-degenerate intersection test: touching faces do not overlap.
    pub fn overlaps(&self, other: &Aabb) -> bool {
        let lo = self.min.max(other.min);
        let hi = self.max.min(other.max);
        lo.cmplt(hi).all()
    }

    /// Grows (or, for negative `by`, shrinks) every face by `by`.
    pub fn inflate(&self, by: f64) -> Aabb {
        Aabb {
            min: self.min - DVec3::splat(by),
            max: self.max + DVec3::splat(by),
        }
    }

    pub fn union(&self, other: &Aabb) -> Aabb {
        Aabb {
            min: self.min.min(other.min),
            max: self.max.max(other.max),
        }
    }

    pub fn expand_to(&mut self, p: DVec3) {
        self.min = self.min.min(p);
        self.max = self.max.max(p);
    }

    /// Cube centered at `p` with half side `half`.
    pub fn around(p: DVec3, half: f64) -> Aabb {
        Aabb {
            min: p - DVec3::splat(half),
            max: p + DVec3::splat(half),
        }
    }

    /// The eight octants obtained by splitting at the center, indexed by `x | y << 1 | z << 2`.
    pub fn octants(&self) -> [Aabb; 8] {
        let c = self.center();
        std::array::from_fn(|i| {
            let pick = |bit: usize, lo: f64, mid: f64, hi: f64| {
                if i & bit == 0 {
                    (lo, mid)
                } else {
                    (mid, hi)
                }
            };
            let (x0, x1) = pick(1, self.min.x, c.x, self.max.x);
            let (y0, y1) = pick(2, self.min.y, c.y, self.max.y);
            let (z0, z1) = pick(4, self.min.z, c.z, self.max.z);
            Aabb {
                min: DVec3::new(x0, y0, z0),
                max: DVec3::new(x1, y1, z1),
            }
        })
    }

    /// Visits every lattice point `min + i * step` inside the box, x fastest.
    pub fn for_each_step(&self, step: f64, mut f: impl FnMut(DVec3)) {
        if self.is_empty() || !(step > 0.0) {
            return;
        }
        let counts = ((self.size() / step).floor().as_ivec3() + IVec3::ONE).max(IVec3::ZERO);
        for z in 0..counts.z {
            for y in 0..counts.y {
                for x in 0..counts.x {
                    f(self.min + DVec3::new(x as f64, y as f64, z as f64) * step);
                }
            }
        }
    }
}

/// Parameter of the orthogonal projection of `p` onto the line through `a` and `b`.
#[inline]
pub fn projection_parameter(a: DVec3, b: DVec3, p: DVec3) -> f64 {
    let d = b - a;
    let len_sq = d.length_squared();
    if len_sq == 0.0 {
        return 0.0;
    }
    (p - a).dot(d) / len_sq
}

/// Closest point to `p` on the segment `a..b`.
#[inline]
pub fn project_onto_segment(a: DVec3, b: DVec3, p: DVec3) -> DVec3 {
    a + (b - a) * projection_parameter(a, b, p).clamp(0.0, 1.0)
}
