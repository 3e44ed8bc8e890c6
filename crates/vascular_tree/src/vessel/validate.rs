//! Invariant checks for a vessel tree.
//!
//! Validation never aborts: each mismatch is logged with the offending vessel id and the
//! aggregate result is returned.
use std::collections::BTreeSet;

use tracing::warn;

use crate::units::{relative_difference, CONTINUITY_EPS};
use crate::vessel::{VesselId, VesselTree};

/// Logs and returns `false` when `a` and `b` differ by more than `eps` relative difference.
/// NaN never compares close.
pub(crate) fn check_close(a: f64, b: f64, eps: f64, id: impl std::fmt::Display, what_a: &str, what_b: &str) -> bool {
    let diff = relative_difference(a, b);
    if diff <= eps {
        return true;
    }
    warn!("{id}: {what_a} {a:e} differs from {what_b} {b:e} (relative {diff:e})");
    false
}

impl VesselTree {
    /// Checks continuity, index bookkeeping, root pressure, Murray's law, flow conservation,
    /// pressure continuity and per-vessel pressure drops. Unless `ignore_unconnected` is set,
    /// every leaf must feed a macrocell.
    pub fn validate(&self, ignore_unconnected: bool) -> bool {
        let Some(root) = self.tree.root() else {
            warn!("Vessel tree is empty.");
            return false;
        };
        let mut ok = true;
        let gamma = self.gamma();
        let order = self.tree.level_order(root);

        for &n in &order {
            let v = &self.tree[n];
            for c in [self.tree.left(n), self.tree.right(n)].into_iter().flatten() {
                let child = &self.tree[c];
                if child.start().distance(v.end()) >= CONTINUITY_EPS {
                    warn!("Invalid spatial distance: {} to {}", v.id, child.id);
                    ok = false;
                }
            }
        }

        let tree_ids: BTreeSet<VesselId> = order.iter().map(|&n| self.tree[n].id).collect();
        let index_ids = self.index.keys();
        if tree_ids != index_ids {
            let missing: Vec<String> = tree_ids
                .symmetric_difference(&index_ids)
                .map(ToString::to_string)
                .collect();
            warn!("Vessel tree and spatial index disagree on: {}", missing.join(" "));
            ok = false;
        }
        if tree_ids.iter().any(|id| !self.nodes.contains_key(id)) {
            warn!("Some vessels not found in the id map");
            ok = false;
        }

        let root_vessel = &self.tree[root];
        ok &= check_close(
            root_vessel.entry_pressure,
            self.normalizer.input_pressure,
            1e-3,
            root_vessel.id,
            "root pressure",
            "model pressure",
        );

        for &n in &order {
            let v = &self.tree[n];
            let left = self.tree.left(n).map(|c| &self.tree[c]);
            let right = self.tree.right(n).map(|c| &self.tree[c]);

            if let Some(cell) = v.cell {
                if left.is_some() || right.is_some() {
                    warn!("Vessel {} connects macrocell {} and has child vessels", v.id, cell);
                    ok = false;
                }
            }
            for (child, name) in [(left, "left child entry pressure"), (right, "right child entry pressure")] {
                if let Some(c) = child {
                    ok &= check_close(v.exit_pressure, c.entry_pressure, 1e-3, v.id, "node exit pressure", name);
                }
            }

            match (left, right) {
                (Some(l), Some(r)) => {
                    let law = (l.radius.powf(gamma) + r.radius.powf(gamma)).powf(1.0 / gamma);
                    ok &= check_close(v.radius, law, 1e-5, v.id, "node radius", "children-derived radius");
                    ok &= check_close(v.flow, l.flow + r.flow, 1e-5, v.id, "node flow", "children flows");
                }
                (Some(c), None) | (None, Some(c)) => {
                    ok &= check_close(v.radius, c.radius, 1e-5, v.id, "node radius", "child radius");
                    ok &= check_close(v.flow, c.flow, 1e-4, v.id, "node flow", "child flow");
                }
                (None, None) => {
                    if !ignore_unconnected && v.cell.is_none() {
                        warn!("Unconnected vessel found: {}", v.id);
                        ok = false;
                    }
                }
            }

            if !v.is_consistent(1e-3) {
                warn!(
                    "Vessel {}: entry pressure {:e} does not match exit {:e} plus drop {:e}",
                    v.id,
                    v.entry_pressure,
                    v.exit_pressure,
                    v.pressure_drop()
                );
                ok = false;
            }
        }
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::units::mm;
    use crate::vessel::normalize::Normalizer;
    use crate::vessel::vessel_tree::tests::{cube, trunk};

    #[test]
    fn check_close_rejects_nan() {
        assert!(check_close(1.0, 1.0 + 1e-7, 1e-5, 1, "a", "b"));
        assert!(!check_close(1.0, 1.1, 1e-5, 1, "a", "b"));
        assert!(!check_close(f64::NAN, 1.0, 1e-5, 1, "a", "b"));
    }

    #[test]
    fn unconnected_trunk_fails_unless_ignored() {
        let mut t = VesselTree::from_flat(trunk(), cube(), Normalizer::new(2.7, 3000.0, 1e-9)).unwrap();
        t.normalize_all();
        assert!(t.validate(true));
        assert!(!t.validate(false));
    }

    #[test]
    fn tampering_is_detected() {
        let mut t = VesselTree::from_flat(trunk(), cube(), Normalizer::new(2.7, 3000.0, 1e-9)).unwrap();
        t.normalize_all();
        let root = t.tree.root().unwrap();
        t.tree[root].radius += mm(0.1);
        assert!(!t.validate(true));
    }
}
