//! Where to split a vessel when a new branch joins it.
//!
//! Trunk (const) vessels are split at the orthogonal projection of the new sink. Other vessels
//! get a Y junction whose branch angles follow Murray's law for the two downstream flows. The
//! junction is found in the plane of the three points: the chord between the two branch ends
//! subtends `θ₁ + θ₂` at the junction and the chord between the parent start and the larger
//! branch end subtends `π - θ₁`, so the junction is the second intersection of those two
//! circles. If the angles are not reproduced within 1e-2 rad the centroid is used instead.
use std::f64::consts::PI;

use glam::{DQuat, DVec2, DVec3};

use crate::geometry::project_onto_segment;
use crate::vessel::Vessel;

const ANGLE_TOLERANCE: f64 = 1e-2;

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SplitPoint {
    /// Projection onto a trunk vessel.
    Projected(DVec3),
    /// Junction reproducing the Murray branch angles.
    Murray(DVec3),
    /// The solver found no valid junction; centroid of the three points.
    Centroid(DVec3),
}

impl SplitPoint {
    pub fn point(&self) -> DVec3 {
        match *self {
            SplitPoint::Projected(p) | SplitPoint::Murray(p) | SplitPoint::Centroid(p) => p,
        }
    }

    pub fn is_fallback(&self) -> bool {
        matches!(self, SplitPoint::Centroid(_))
    }
}

/// Split point on `v` for a new branch towards `p` carrying `flow`.
pub fn split_point(v: &Vessel, p: DVec3, flow: f64, gamma: f64) -> SplitPoint {
    if v.is_const {
        return SplitPoint::Projected(project_onto_segment(v.start(), v.end(), p));
    }
    find_bifurcation_point(v.start(), v.end(), p, v.flow, flow, gamma)
}

/// Junction for a parent starting at `p0` feeding branches to `p1` (flow `q1`) and `p2`
/// (flow `q2`). The order of the branches does not matter.
pub fn find_bifurcation_point(
    p0: DVec3,
    p1: DVec3,
    p2: DVec3,
    q1: f64,
    q2: f64,
    gamma: f64,
) -> SplitPoint {
    if q1 > q2 {
        solve(p0, p1, p2, q1, q2, gamma)
    } else {
        solve(p0, p2, p1, q2, q1, gamma)
    }
}

/// Branch angles `(θ₁, θ₂)` measured from the parent direction, `θ₁` for the larger flow.
pub fn murray_angles(f1: f64, f2: f64, gamma: f64) -> (f64, f64) {
    let k = 2.0 / gamma - 1.0;
    let r = f1 / (f1 + f2);
    let a = r.powf(k);
    let b = r.powf(-k);
    let c = r.powf(k) * (1.0 - r).powf(-2.0 * k);
    ((0.5 * (a + b - c)).acos(), (0.5 * (a - b + c)).acos())
}

fn solve(p0: DVec3, p1: DVec3, p2: DVec3, f1: f64, f2: f64, gamma: f64) -> SplitPoint {
    let centroid = SplitPoint::Centroid((p0 + p1 + p2) / 3.0);
    let (th1, th2) = murray_angles(f1, f2, gamma);

    let normal = (p1 - p0).cross(p2 - p1).normalize_or_zero();
    if normal == DVec3::ZERO || !th1.is_finite() || !th2.is_finite() {
        return centroid;
    }
    let to_plane = DQuat::from_rotation_arc(normal, DVec3::Z);
    let (a0, a1, a2) = (to_plane * p0, to_plane * p1, to_plane * p2);
    let (x0, x1, x2) = (a0.truncate(), a1.truncate(), a2.truncate());

    let Some(xy) = junction_in_plane(x0, x1, x2, th1, th2) else {
        return centroid;
    };
    let pb = to_plane.inverse() * xy.extend(a0.z);

    let ath1 = angle_between(p1 - pb, pb - p0);
    let ath2 = angle_between(p2 - pb, pb - p0);
    if !ath1.is_finite()
        || !ath2.is_finite()
        || (ath1 - th1).abs() > ANGLE_TOLERANCE
        || (ath2 - th2).abs() > ANGLE_TOLERANCE
    {
        return centroid;
    }
    SplitPoint::Murray(pb)
}

fn junction_in_plane(p0: DVec2, p1: DVec2, p2: DVec2, th1: f64, th2: f64) -> Option<DVec2> {
    let (c12, r12) = chord_circle(th1 + th2, p1, p2, p0)?;
    let (c01, r01) = chord_circle(PI - th1, p0, p1, p2)?;
    let (a, b) = circle_intersections(c12, r12, c01, r01)?;
    // Both circles pass through p1; the junction is the other intersection.
    if a.distance(p1) > b.distance(p1) {
        Some(a)
    } else {
        Some(b)
    }
}

/// Circle through `a` and `b` on which the chord `ab` subtends `theta` at points lying on the
/// same side of the chord as `third`.
fn chord_circle(theta: f64, a: DVec2, b: DVec2, third: DVec2) -> Option<(DVec2, f64)> {
    let sin = theta.sin();
    let chord = b - a;
    let l = chord.length();
    if !(sin > 0.0) || l == 0.0 {
        return None;
    }
    let radius = l / (2.0 * sin);
    let perp = chord.perp() / l;
    let side = chord.perp_dot(third - a).signum();
    let center = (a + b) * 0.5 + perp * side * (0.5 * l * theta.cos() / sin);
    Some((center, radius))
}

fn circle_intersections(c1: DVec2, r1: f64, c2: DVec2, r2: f64) -> Option<(DVec2, DVec2)> {
    let d = c1.distance(c2);
    if d == 0.0 || !d.is_finite() {
        return None;
    }
    let a = (r1 * r1 - r2 * r2 + d * d) / (2.0 * d);
    let mut h_sq = r1 * r1 - a * a;
    if h_sq < 0.0 {
        if h_sq < -1e-9 * r1 * r1 {
            return None;
        }
        h_sq = 0.0;
    }
    let h = h_sq.sqrt();
    let dir = (c2 - c1) / d;
    let base = c1 + dir * a;
    Some((base + dir.perp() * h, base - dir.perp() * h))
}

fn angle_between(a: DVec3, b: DVec3) -> f64 {
    (a.dot(b) / (a.length() * b.length())).acos()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vessel::VesselId;

    // Junction at (0, 0, 10) mm with branches at the Murray angles on either side.
    fn constructed(gamma: f64, f1: f64, f2: f64) -> (DVec3, DVec3, DVec3, DVec3) {
        let (th1, th2) = murray_angles(f1, f2, gamma);
        let p0 = DVec3::ZERO;
        let pb = DVec3::new(0.0, 0.0, 10e-3);
        let p1 = pb + DVec3::new(th1.sin(), 0.0, th1.cos()) * 10e-3;
        let p2 = pb + DVec3::new(-th2.sin(), 0.0, th2.cos()) * 8e-3;
        (p0, p1, p2, pb)
    }

    #[test]
    fn recovers_constructed_junction() {
        for (gamma, f1, f2) in [(3.0, 0.9, 0.1), (2.7, 0.6, 0.4), (3.0, 0.75, 0.25)] {
            let (p0, p1, p2, pb) = constructed(gamma, f1, f2);
            let found = find_bifurcation_point(p0, p1, p2, f1, f2, gamma);
            assert!(matches!(found, SplitPoint::Murray(_)), "{gamma} {f1}: {found:?}");
            assert!(found.point().distance(pb) < 1e-9);
        }
    }

    #[test]
    fn branch_order_does_not_matter() {
        let (p0, p1, p2, pb) = constructed(3.0, 0.8, 0.2);
        let found = find_bifurcation_point(p0, p2, p1, 0.2, 0.8, 3.0);
        assert!(found.point().distance(pb) < 1e-9);
    }

    #[test]
    fn larger_flow_branch_deviates_less() {
        let (th1, th2) = murray_angles(0.9, 0.1, 3.0);
        assert!(th1 < th2);
        let (s1, s2) = murray_angles(0.5, 0.5, 3.0);
        assert!((s1 - s2).abs() < 1e-12);
    }

    #[test]
    fn collinear_points_fall_back_to_centroid() {
        let p0 = DVec3::ZERO;
        let p1 = DVec3::Z;
        let p2 = DVec3::Z * 2.0;
        let found = find_bifurcation_point(p0, p1, p2, 0.7, 0.3, 3.0);
        assert!(found.is_fallback());
        assert_eq!(found.point(), DVec3::Z);
    }

    #[test]
    fn const_vessel_projects() {
        let v = Vessel::new(VesselId(1), DVec3::ZERO, DVec3::X, 1.0, 1.0, 0.0).with_const(true);
        let sp = split_point(&v, DVec3::new(0.4, 3.0, -1.0), 0.1, 3.0);
        assert_eq!(sp, SplitPoint::Projected(DVec3::new(0.4, 0.0, 0.0)));
        let sp = split_point(&v, DVec3::new(-2.0, 0.0, 0.0), 0.1, 3.0);
        assert_eq!(sp.point(), DVec3::ZERO);
    }
}
