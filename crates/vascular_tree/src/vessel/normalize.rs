//! Hemodynamic normalization of a vessel tree.
//!
//! Two passes:
//!
//! 1. Post-order: every internal vessel derives radius, flow and exit pressure from its
//!    children. At a bifurcation the child with the higher entry pressure is the reference;
//!    the other branch records a radius correction `((other_entry - sink)/(ref_entry - sink))^¼`
//!    that, once applied to its whole subtree, makes both children present the same entry
//!    pressure. The parent radius follows Murray's law using the corrected branch.
//! 2. Breadth-first from the root: a cumulative radius scale makes the root entry pressure
//!    equal to the input pressure; each vessel multiplies the scale by its stored correction,
//!    rescales its radius and recomputes its exit pressure from the authoritative entry.
//!
//! Nothing here fails. Zero flows or pressures produce NaN that the validator reports.
use std::collections::VecDeque;

use crate::tree::{BinaryTree, NodeId};
use crate::units::{INPUT_PRESSURE, TERMINAL_RADIUS};
use crate::vessel::Vessel;

#[derive(Debug, Clone)]
pub struct Normalizer {
    pub gamma: f64,
    pub cell_pressure: f64,
    pub cell_flow: f64,
    pub terminal_radius: f64,
    pub input_pressure: f64,
    scalars: Vec<f64>,
}

impl Normalizer {
    pub fn new(gamma: f64, cell_pressure: f64, cell_flow: f64) -> Self {
        Self {
            gamma,
            cell_pressure,
            cell_flow,
            terminal_radius: TERMINAL_RADIUS,
            input_pressure: INPUT_PRESSURE,
            scalars: Vec::new(),
        }
    }

    pub fn with_input_pressure(mut self, input_pressure: f64) -> Self {
        self.input_pressure = input_pressure;
        self
    }

    pub fn with_terminal_radius(mut self, terminal_radius: f64) -> Self {
        self.terminal_radius = terminal_radius;
        self
    }

    /// Makes every vessel of `tree` satisfy flow conservation, Murray's law, pressure
    /// continuity and the root input pressure.
    pub fn normalize(&mut self, tree: &mut BinaryTree<Vessel>) {
        let Some(root) = tree.root() else {
            return;
        };
        let max_id = tree.nodes().iter().map(|&n| tree[n].id.0).max().unwrap_or(0);
        self.scalars.clear();
        self.scalars.resize(max_id as usize + 1, 1.0);

        for n in tree.post_order(root) {
            self.update_vessel(tree, n);
        }
        self.normalize_pressure(tree, root);
        self.scalars.iter_mut().for_each(|s| *s = 1.0);
    }

    fn update_vessel(&mut self, tree: &mut BinaryTree<Vessel>, n: NodeId) {
        match (tree.left(n), tree.right(n)) {
            (Some(l), Some(r)) => {
                if tree[l].entry_pressure > tree[r].entry_pressure {
                    self.update_pressures(tree, n, l, r);
                } else {
                    self.update_pressures(tree, n, r, l);
                }
            }
            (Some(c), None) | (None, Some(c)) => {
                let (radius, flow, entry) = {
                    let child = &tree[c];
                    (child.radius, child.flow, child.entry_pressure)
                };
                let v = &mut tree[n];
                v.radius = radius;
                v.flow = flow;
                v.set_exit_pressure(entry);
            }
            (None, None) => {
                let v = &mut tree[n];
                v.radius = self.terminal_radius;
                v.flow = self.cell_flow;
                v.set_exit_pressure(self.cell_pressure);
            }
        }
    }

    fn update_pressures(
        &mut self,
        tree: &mut BinaryTree<Vessel>,
        n: NodeId,
        reference: NodeId,
        other: NodeId,
    ) {
        let (ref_radius, ref_flow, ref_entry) = {
            let v = &tree[reference];
            (v.radius, v.flow, v.entry_pressure)
        };
        let (other_id, other_radius, other_flow, other_entry) = {
            let v = &tree[other];
            (v.id, v.radius, v.flow, v.entry_pressure)
        };

        let scalar =
            ((other_entry - self.cell_pressure) / (ref_entry - self.cell_pressure)).powf(0.25);
        let g = self.gamma;
        let v = &mut tree[n];
        v.radius = (ref_radius.powf(g) + (other_radius * scalar).powf(g)).powf(1.0 / g);
        v.flow = ref_flow + other_flow;
        v.set_exit_pressure(ref_entry);
        self.scalars[other_id.0 as usize] = scalar;
    }

    fn normalize_pressure(&self, tree: &mut BinaryTree<Vessel>, root: NodeId) {
        let root_scale = ((tree[root].entry_pressure - self.cell_pressure)
            / (self.input_pressure - self.cell_pressure))
            .powf(0.25);

        let mut queue = VecDeque::from([(root, self.input_pressure, root_scale)]);
        while let Some((n, entry, parent_scale)) = queue.pop_front() {
            let v = &mut tree[n];
            let scale = parent_scale * self.scalars[v.id.0 as usize];
            v.radius *= scale;
            v.set_entry_pressure(entry);
            let exit = v.exit_pressure;
            for child in [tree.left(n), tree.right(n)].into_iter().flatten() {
                queue.push_back((child, exit, scale));
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::DVec3;

    use super::*;
    use crate::tree::Side;
    use crate::units::{mm, mmhg, relative_difference, DEFAULT_GAMMA};
    use crate::vessel::VesselId;

    fn vessel(id: u32, start: DVec3, end: DVec3) -> Vessel {
        Vessel::new(VesselId(id), start * 1e-3, end * 1e-3, mm(1.0), 1e-6, mmhg(25.0))
    }

    // Asymmetric tree: a long left limb with a further split and a short right limb.
    fn sample_tree() -> BinaryTree<Vessel> {
        let mut t = BinaryTree::with_root(vessel(1, DVec3::ZERO, DVec3::new(0.0, 0.0, 10.0)));
        let r = t.root().unwrap();
        let a = t.set_child(r, Side::Left, vessel(2, DVec3::new(0.0, 0.0, 10.0), DVec3::new(8.0, 0.0, 20.0)));
        t.set_child(r, Side::Right, vessel(3, DVec3::new(0.0, 0.0, 10.0), DVec3::new(-2.0, 0.0, 12.0)));
        t.set_child(a, Side::Left, vessel(4, DVec3::new(8.0, 0.0, 20.0), DVec3::new(9.0, 3.0, 29.0)));
        let b = t.set_child(a, Side::Right, vessel(5, DVec3::new(8.0, 0.0, 20.0), DVec3::new(12.0, 1.0, 21.0)));
        t.set_child(b, Side::Left, vessel(6, DVec3::new(12.0, 1.0, 21.0), DVec3::new(14.0, 1.0, 24.0)));
        t
    }

    #[test]
    fn normalized_tree_satisfies_invariants() {
        let mut tree = sample_tree();
        let cell_flow = 1e-8;
        let mut norm = Normalizer::new(DEFAULT_GAMMA, mmhg(25.0), cell_flow);
        norm.normalize(&mut tree);

        let root = tree.root().unwrap();
        assert!(relative_difference(tree[root].entry_pressure, INPUT_PRESSURE) < 1e-3);
        assert!((tree[root].flow - 3.0 * cell_flow).abs() < 1e-18);

        for n in tree.nodes() {
            let v = &tree[n];
            assert!(v.is_consistent(1e-3), "vessel {}", v.id);
            for c in [tree.left(n), tree.right(n)].into_iter().flatten() {
                assert!(relative_difference(v.exit_pressure, tree[c].entry_pressure) < 1e-3);
            }
            match (tree.left(n), tree.right(n)) {
                (Some(l), Some(r)) => {
                    let (l, r) = (&tree[l], &tree[r]);
                    let g = DEFAULT_GAMMA;
                    let law = (l.radius.powf(g) + r.radius.powf(g)).powf(1.0 / g);
                    assert!(relative_difference(v.radius, law) < 1e-5, "vessel {}", v.id);
                    assert!(relative_difference(v.flow, l.flow + r.flow) < 1e-5);
                }
                (Some(c), None) | (None, Some(c)) => {
                    assert!(relative_difference(v.radius, tree[c].radius) < 1e-5);
                    assert!(relative_difference(v.flow, tree[c].flow) < 1e-5);
                }
                (None, None) => {
                    assert!(relative_difference(v.exit_pressure, mmhg(25.0)) < 1e-4);
                    assert_eq!(v.flow, cell_flow);
                }
            }
        }
    }

    #[test]
    fn normalizing_twice_is_stable() {
        let mut tree = sample_tree();
        let mut norm = Normalizer::new(3.0, mmhg(25.0), 1e-8);
        norm.normalize(&mut tree);
        let first: Vec<f64> = tree.nodes().iter().map(|&n| tree[n].radius).collect();
        norm.normalize(&mut tree);
        let second: Vec<f64> = tree.nodes().iter().map(|&n| tree[n].radius).collect();
        for (a, b) in first.iter().zip(&second) {
            assert!(relative_difference(*a, *b) < 1e-9);
        }
    }

    #[test]
    fn zero_flow_propagates_nan_without_panicking() {
        let mut tree = sample_tree();
        let mut norm = Normalizer::new(DEFAULT_GAMMA, mmhg(25.0), 0.0);
        norm.normalize(&mut tree);
        let root = tree.root().unwrap();
        assert!(tree[root].radius.is_nan());
    }
}
