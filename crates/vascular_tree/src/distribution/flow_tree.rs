//! The read-only tree particles travel through.
//!
//! A [`TractTree`] is a copy of a grown vessel tree prepared for distribution: at every
//! bifurcation the straighter child is on the left, a lone right child is moved to the left, and
//! every terminal vessel gets an extension tract of one cell thickness below it where particles
//! come to rest.
use std::collections::HashMap;

use glam::DVec3;
use tracing::{debug, info};

use crate::error::{Error, Result};
use crate::growth::lattice::CELL_THICKNESS;
use crate::tree::{BinaryTree, NodeId, Side};
use crate::vessel::{VesselId, VesselTree};

/// The geometry and flow of one vessel as seen by the distribution.
#[derive(Debug, Clone, PartialEq)]
pub struct FlowVessel {
    pub id: VesselId,
    /// Vessel of the grown tree this one stands for. Extension tracts report their terminal.
    pub owner: VesselId,
    pub start: DVec3,
    pub end: DVec3,
    pub radius: f64,
    pub flow: f64,
    pub tract: bool,
}

impl FlowVessel {
    pub fn new(id: VesselId, start: DVec3, end: DVec3, radius: f64, flow: f64) -> Self {
        Self {
            id,
            owner: id,
            start,
            end,
            radius,
            flow,
            tract: false,
        }
    }

    pub fn length(&self) -> f64 {
        self.start.distance(self.end)
    }
}

#[derive(Debug, Clone)]
pub struct TractTree {
    tree: BinaryTree<FlowVessel>,
    root: NodeId,
    pre: Vec<NodeId>,
    post: Vec<NodeId>,
    by_id: HashMap<VesselId, NodeId>,
}

impl TractTree {
    /// Copies the vessels of a grown tree and prepares them for distribution.
    pub fn new(vessels: &VesselTree) -> Result<Self> {
        let src = vessels.tree();
        let src_root = src.root().ok_or(Error::NoRootVessel)?;
        let copy = |n: NodeId| {
            let v = &src[n];
            FlowVessel::new(v.id, v.start(), v.end(), v.radius, v.flow)
        };

        let mut tree = BinaryTree::with_root(copy(src_root));
        let mut mapped = HashMap::new();
        mapped.insert(src_root, tree.root().ok_or(Error::NoRootVessel)?);
        for n in src.pre_order(src_root).into_iter().skip(1) {
            let (Some(parent), Some(side)) = (src.parent(n), src.side_of(n)) else {
                continue;
            };
            let child = tree.set_child(mapped[&parent], side, copy(n));
            mapped.insert(n, child);
        }
        Self::from_tree(tree)
    }

    /// Prepares an already assembled tree.
    pub fn from_tree(mut tree: BinaryTree<FlowVessel>) -> Result<Self> {
        let root = tree.root().ok_or(Error::NoRootVessel)?;

        let post = tree.post_order(root);
        let mut last_id = 0;
        let mut min_radius = f64::INFINITY;
        for &n in &post {
            last_id = last_id.max(tree[n].id.0);
            min_radius = min_radius.min(tree[n].radius);
            match (tree.left(n), tree.right(n)) {
                (Some(l), Some(r)) => {
                    let v = &tree[n];
                    let dir = (v.end - v.start).normalize_or_zero();
                    let dl = (tree[l].end - v.end).normalize_or_zero();
                    let dr = (tree[r].end - v.end).normalize_or_zero();
                    if dl.dot(dir) < dr.dot(dir) {
                        tree.swap_children(n);
                    }
                }
                (None, Some(_)) => tree.swap_children(n),
                _ => {}
            }
        }
        debug!("Min radius in tract tree: {:e}", min_radius);

        let mut tracts = 0;
        for &n in &post {
            if tree.left(n).is_some() {
                continue;
            }
            last_id += 1;
            let v = &tree[n];
            let tract = FlowVessel {
                id: VesselId(last_id),
                owner: v.owner,
                start: v.end,
                end: v.end + DVec3::new(0.0, 0.0, CELL_THICKNESS),
                radius: v.radius,
                flow: v.flow,
                tract: true,
            };
            tree.set_child(n, Side::Left, tract);
            tracts += 1;
        }
        info!("Tract tree: {} vessels, {} tracts", tree.len(), tracts);

        let pre = tree.pre_order(root);
        let post = tree.post_order(root);
        let by_id = pre.iter().map(|&n| (tree[n].id, n)).collect();
        Ok(Self {
            tree,
            root,
            pre,
            post,
            by_id,
        })
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn vessel(&self, n: NodeId) -> &FlowVessel {
        &self.tree[n]
    }

    pub fn left(&self, n: NodeId) -> Option<NodeId> {
        self.tree.left(n)
    }

    pub fn right(&self, n: NodeId) -> Option<NodeId> {
        self.tree.right(n)
    }

    pub fn parent(&self, n: NodeId) -> Option<NodeId> {
        self.tree.parent(n)
    }

    pub fn ancestors(&self, n: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        self.tree.ancestors(n)
    }

    pub fn pre_order(&self) -> &[NodeId] {
        &self.pre
    }

    pub fn post_order(&self) -> &[NodeId] {
        &self.post
    }

    /// Node of the vessel or tract with the given id.
    pub fn find(&self, id: VesselId) -> Option<NodeId> {
        self.by_id.get(&id).copied()
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    /// Size of dense per-node side tables.
    pub fn capacity(&self) -> usize {
        self.tree.capacity()
    }

    pub fn tracts(&self) -> impl Iterator<Item = &FlowVessel> + '_ {
        self.pre.iter().map(|&n| &self.tree[n]).filter(|v| v.tract)
    }
}
