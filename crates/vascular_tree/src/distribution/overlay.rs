//! Per-trial flow and branch probabilities over a [`TractTree`].
use crate::distribution::flow_tree::{FlowVessel, TractTree};
use crate::error::{Error, Result};
use crate::tree::NodeId;

/// What a traversal does after visiting a vessel.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Traversal {
    Left,
    Right,
    /// Rest here; the flow of every ancestor is recomputed.
    Stop,
    /// End without touching the flow.
    Abort,
}

/// A child as seen from its parent during a traversal.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Child {
    pub node: NodeId,
    pub radius: f64,
    pub flow: f64,
    /// Probability of entering this child.
    pub p: f64,
}

/// The vessel being visited by a traversal.
#[derive(Debug, Clone, Copy)]
pub struct Visit<'t> {
    pub node: NodeId,
    pub vessel: &'t FlowVessel,
    pub left: Option<Child>,
    pub right: Option<Child>,
}

impl Visit<'_> {
    pub fn is_leaf(&self) -> bool {
        self.left.is_none() && self.right.is_none()
    }
}

/// Flow and branch probability of every vessel for one distribution run.
///
/// At a node with child flows `l` and `r` the left child is entered with probability
/// `D·s / (D·s + (1 − D)(1 − s))`, `D = l / (l + r)`, where `s` is the straight ratio.
#[derive(Debug, Clone)]
pub struct FlowOverlay<'t> {
    tree: &'t TractTree,
    straight_ratio: f64,
    flow: Vec<f64>,
    p: Vec<f64>,
}

impl<'t> FlowOverlay<'t> {
    pub fn new(tree: &'t TractTree, straight_ratio: f64) -> Self {
        let mut flow = vec![0.0; tree.capacity()];
        for &n in tree.pre_order() {
            flow[n.index()] = tree.vessel(n).flow;
        }
        let mut this = Self {
            tree,
            straight_ratio,
            flow,
            p: vec![1.0; tree.capacity()],
        };
        this.update_flows();
        this
    }

    pub fn tree(&self) -> &'t TractTree {
        self.tree
    }

    pub fn flow(&self, n: NodeId) -> f64 {
        self.flow[n.index()]
    }

    pub fn set_flow(&mut self, n: NodeId, flow: f64) {
        self.flow[n.index()] = flow;
    }

    pub fn p(&self, n: NodeId) -> f64 {
        self.p[n.index()]
    }

    /// Recomputes every inner vessel bottom-up.
    pub fn update_flows(&mut self) {
        self.update_flows_except(|_| false);
    }

    /// Like [`Self::update_flows`], but vessels for which `blocked` holds keep zero flow.
    pub fn update_flows_except(&mut self, blocked: impl Fn(NodeId) -> bool) {
        let tree = self.tree;
        for &n in tree.post_order() {
            self.update_node(n);
            if blocked(n) {
                self.flow[n.index()] = 0.0;
            }
        }
    }

    fn update_ancestors(&mut self, n: NodeId) {
        let tree = self.tree;
        for a in tree.ancestors(n) {
            self.update_node(a);
        }
    }

    fn update_node(&mut self, n: NodeId) {
        match (self.tree.left(n), self.tree.right(n)) {
            (Some(l), Some(r)) => {
                let lf = self.flow[l.index()];
                let rf = self.flow[r.index()];
                let p_left = branch_probability(lf, rf, self.straight_ratio);
                self.p[l.index()] = p_left;
                self.p[r.index()] = 1.0 - p_left;
                self.flow[n.index()] = lf + rf;
            }
            (Some(l), None) => {
                self.flow[n.index()] = self.flow[l.index()];
            }
            _ => {}
        }
    }

    fn child(&self, n: Option<NodeId>) -> Option<Child> {
        n.map(|node| Child {
            node,
            radius: self.tree.vessel(node).radius,
            flow: self.flow[node.index()],
            p: self.p[node.index()],
        })
    }

    fn visit(&self, node: NodeId) -> Visit<'t> {
        Visit {
            node,
            vessel: self.tree.vessel(node),
            left: self.child(self.tree.left(node)),
            right: self.child(self.tree.right(node)),
        }
    }

    fn step(&self, visit: &Visit<'_>, t: Traversal) -> Result<NodeId> {
        let (child, side) = match t {
            Traversal::Left => (visit.left, "left"),
            _ => (visit.right, "right"),
        };
        child.map(|c| c.node).ok_or_else(|| {
            Error::Traversal(format!("vessel {} has no {side} child", visit.vessel.id))
        })
    }

    /// Walks from the root, letting `decide` pick the way at every vessel. `decide` may change
    /// the flow of the visited vessel through its second argument.
    ///
    /// Returns the vessel where the walk stopped, or `None` when it was aborted.
    pub fn traverse<F>(&mut self, mut decide: F) -> Result<Option<NodeId>>
    where
        F: FnMut(&Visit<'t>, &mut f64) -> Traversal,
    {
        let mut node = self.tree.root();
        loop {
            let visit = self.visit(node);
            let t = decide(&visit, &mut self.flow[node.index()]);
            match t {
                Traversal::Stop => {
                    self.update_ancestors(node);
                    return Ok(Some(node));
                }
                Traversal::Abort => return Ok(None),
                _ => node = self.step(&visit, t)?,
            }
        }
    }

    /// Same walk as [`Self::traverse`] without any change to the overlay, so one overlay can
    /// serve many threads.
    pub fn traverse_read_only<F>(&self, mut decide: F) -> Result<Option<NodeId>>
    where
        F: FnMut(&Visit<'t>) -> Traversal,
    {
        let mut node = self.tree.root();
        loop {
            let visit = self.visit(node);
            let t = decide(&visit);
            match t {
                Traversal::Stop => return Ok(Some(node)),
                Traversal::Abort => return Ok(None),
                _ => node = self.step(&visit, t)?,
            }
        }
    }
}

/// Probability of entering the left (straight) child. Even odds when neither child carries flow.
pub fn branch_probability(left_flow: f64, right_flow: f64, straight_ratio: f64) -> f64 {
    let total = left_flow + right_flow;
    if !(total > 0.0) {
        return 0.5;
    }
    let d = left_flow / total;
    let weighted = d * straight_ratio;
    let denom = weighted + (1.0 - d) * (1.0 - straight_ratio);
    if denom > 0.0 {
        weighted / denom
    } else {
        0.5
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::distribution::flow_tree::tests::fixture;
    use crate::vessel::VesselId;

    #[test]
    fn branch_probability_blends_flow_and_straightness() {
        assert!((branch_probability(1.0, 1.0, 0.5) - 0.5).abs() < 1e-15);
        assert!((branch_probability(1.0, 1.0, 0.6) - 0.6).abs() < 1e-15);
        assert!((branch_probability(3.0, 1.0, 0.5) - 0.75).abs() < 1e-15);
        assert_eq!(branch_probability(0.0, 0.0, 0.6), 0.5);
        assert_eq!(branch_probability(0.0, 2.0, 0.6), 0.0);
    }

    #[test]
    fn inner_flows_are_sums_of_children() {
        let tree = fixture();
        let overlay = FlowOverlay::new(&tree, 0.6);
        let n = |id| tree.find(VesselId(id)).unwrap();
        assert!((overlay.flow(n(4)) - 0.44).abs() < 1e-12);
        assert!((overlay.flow(n(5)) - 0.55).abs() < 1e-12);
        assert!((overlay.flow(n(2)) - 0.99).abs() < 1e-12);
        assert!((overlay.flow(tree.root()) - 1.0).abs() < 1e-12);
        assert!((overlay.p(n(2)) + overlay.p(n(3)) - 1.0).abs() < 1e-15);
        assert!(overlay.p(n(2)) > 0.99);
    }

    #[test]
    fn stop_recomputes_ancestors() {
        let tree = fixture();
        let mut overlay = FlowOverlay::new(&tree, 0.6);
        let target = tree.find(VesselId(6)).unwrap();
        let path = [VesselId(1), VesselId(2), VesselId(4)];
        let stopped = overlay
            .traverse(|visit, flow| {
                if visit.node == target {
                    *flow = 0.0;
                    return Traversal::Stop;
                }
                let i = path.iter().position(|&id| id == visit.vessel.id).unwrap();
                let next = if i + 1 < path.len() { path[i + 1] } else { VesselId(6) };
                if visit.left.map(|c| tree.vessel(c.node).id) == Some(next) {
                    Traversal::Left
                } else {
                    Traversal::Right
                }
            })
            .unwrap();
        assert_eq!(stopped, Some(target));
        let n4 = tree.find(VesselId(4)).unwrap();
        assert!((overlay.flow(n4) - 0.04).abs() < 1e-12);
        assert_eq!(overlay.p(target), 0.0);
    }

    #[test]
    fn missing_child_is_an_error() {
        let tree = fixture();
        let mut overlay = FlowOverlay::new(&tree, 0.6);
        let err = overlay.traverse(|visit, _| {
            if visit.vessel.tract {
                Traversal::Right
            } else {
                Traversal::Left
            }
        });
        assert!(matches!(err, Err(Error::Traversal(_))));
    }

    #[test]
    fn abort_leaves_flow_untouched() {
        let tree = fixture();
        let mut overlay = FlowOverlay::new(&tree, 0.6);
        let before = overlay.flow(tree.root());
        let out = overlay
            .traverse(|_, flow| {
                *flow = 0.0;
                Traversal::Abort
            })
            .unwrap();
        assert_eq!(out, None);
        assert_eq!(overlay.flow(tree.root()), 0.0);
        overlay.update_flows();
        assert_eq!(overlay.flow(tree.root()), before);
    }
}
