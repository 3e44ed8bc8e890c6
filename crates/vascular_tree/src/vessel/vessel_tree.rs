//! The vessel tree with its spatial index.
//!
//! [`VesselTree`] owns the arena tree of [`Vessel`]s, an id → node map, and an octree of vessel
//! segments used to find where new macrocells attach. Every geometric mutation removes the
//! vessel from the octree, changes it and re-inserts it within one `&mut self` call, so queries
//! never see a half-updated vessel.
use std::collections::{BTreeMap, HashMap, HashSet};

use glam::DVec3;
use rand::Rng;
use tracing::{debug, info, warn};

use crate::error::{Error, Result};
use crate::geometry::Aabb;
use crate::growth::balanced::BalancedSampler;
use crate::growth::bifurcation::split_point;
use crate::growth::lattice::CELL_THICKNESS;
use crate::growth::macrocell::Macrocell;
use crate::record::FlatVessel;
use crate::spatial::{Indexed, Octree, SegmentItem};
use crate::tree::{BinaryTree, NodeId, Side};
use crate::units::NEW_VESSEL_RADIUS;
use crate::vessel::{IdGenerator, Normalizer, Vessel, VesselId};

/// Number of nearest vessels among which a new branch picks its parent.
const NEAREST_CANDIDATES: usize = 10;

#[derive(Debug, Clone)]
pub struct VesselTree {
    pub(crate) tree: BinaryTree<Vessel>,
    pub(crate) nodes: HashMap<VesselId, NodeId>,
    pub(crate) index: Octree<SegmentItem>,
    pub(crate) normalizer: Normalizer,
    ids: IdGenerator,
    bifurcation_fallbacks: u64,
    unindexed: u64,
}

impl VesselTree {
    /// Builds the tree from a flat vessel list by locating the unique parentless vessel and
    /// attaching children recursively. Values are taken verbatim.
    ///
    /// The spatial index covers `extents` grown to include every vessel.
    pub fn from_flat(flat: Vec<FlatVessel>, extents: Aabb, normalizer: Normalizer) -> Result<Self> {
        let by_id: BTreeMap<VesselId, FlatVessel> =
            flat.into_iter().map(|f| (f.vessel.id, f)).collect();
        let root_id = by_id
            .values()
            .find(|f| f.parent.is_none())
            .map(|f| f.vessel.id)
            .ok_or(Error::NoRootVessel)?;

        let mut bounds = extents;
        for f in by_id.values() {
            bounds.expand_to(f.vessel.start());
            bounds.expand_to(f.vessel.end());
        }
        let margin = bounds.size().max_element() * 0.05;
        let mut tree = BinaryTree::with_root(by_id[&root_id].vessel.clone());
        let mut this = Self {
            nodes: HashMap::new(),
            index: Octree::new(bounds.inflate(margin)),
            normalizer,
            ids: IdGenerator::after(by_id.keys().map(|id| id.0).max().unwrap_or(0)),
            bifurcation_fallbacks: 0,
            unindexed: 0,
            tree: BinaryTree::new(),
        };

        let root = tree.root().ok_or(Error::NoRootVessel)?;
        let mut visited = HashSet::from([root_id]);
        let mut stack = vec![root];
        while let Some(n) = stack.pop() {
            let id = tree[n].id;
            let current = &by_id[&id];
            for (side, child_id) in [(Side::Left, current.left), (Side::Right, current.right)] {
                let Some(child_id) = child_id else {
                    continue;
                };
                let child = by_id.get(&child_id).ok_or_else(|| {
                    Error::CorruptRecord(format!("vessel {id} names missing child {child_id}"))
                })?;
                if child.parent != Some(id) {
                    return Err(Error::CorruptRecord(format!(
                        "Node expects {}, actual parent {}",
                        child.parent.map_or("none".to_owned(), |p| p.to_string()),
                        id
                    )));
                }
                if !visited.insert(child_id) {
                    return Err(Error::CorruptRecord(format!(
                        "vessel {child_id} is attached twice"
                    )));
                }
                stack.push(tree.set_child(n, side, child.vessel.clone()));
            }
        }
        if visited.len() < by_id.len() {
            warn!(
                "{} vessels are not reachable from root {}; ignoring them.",
                by_id.len() - visited.len(),
                root_id
            );
        }

        this.tree = tree;
        for n in this.tree.nodes() {
            this.record(n);
        }
        this.compute_strahler_orders();
        Ok(this)
    }

    pub fn tree(&self) -> &BinaryTree<Vessel> {
        &self.tree
    }

    pub fn normalizer(&self) -> &Normalizer {
        &self.normalizer
    }

    pub fn normalizer_mut(&mut self) -> &mut Normalizer {
        &mut self.normalizer
    }

    pub fn gamma(&self) -> f64 {
        self.normalizer.gamma
    }

    pub fn len(&self) -> usize {
        self.tree.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tree.is_empty()
    }

    pub fn root(&self) -> Option<&Vessel> {
        self.tree.root().map(|r| &self.tree[r])
    }

    pub fn get(&self, id: VesselId) -> Option<&Vessel> {
        self.nodes.get(&id).map(|&n| &self.tree[n])
    }

    pub fn node(&self, id: VesselId) -> Option<NodeId> {
        self.nodes.get(&id).copied()
    }

    pub fn parent_of(&self, id: VesselId) -> Option<&Vessel> {
        let n = self.node(id)?;
        self.tree.parent(n).map(|p| &self.tree[p])
    }

    /// Vessels in pre-order.
    pub fn vessels(&self) -> impl Iterator<Item = &Vessel> + '_ {
        self.tree.nodes().into_iter().map(move |n| &self.tree[n])
    }

    /// Ids of vessels without children, in in-order.
    pub fn terminal_vessels(&self) -> Vec<VesselId> {
        let Some(root) = self.tree.root() else {
            return Vec::new();
        };
        self.tree
            .in_order(root)
            .into_iter()
            .filter(|&n| self.tree.is_leaf(n))
            .map(|n| self.tree[n].id)
            .collect()
    }

    /// Number of split points that fell back to the centroid.
    pub fn bifurcation_fallbacks(&self) -> u64 {
        self.bifurcation_fallbacks
    }

    /// Number of vessels the spatial index rejected for reaching past its bounds. They are never
    /// offered as parents for new branches.
    pub fn unindexed_vessels(&self) -> u64 {
        self.unindexed
    }

    pub fn normalize_all(&mut self) {
        self.normalizer.normalize(&mut self.tree);
    }

    /// Multiplies every terminal vessel radius by `factor`.
    pub fn scale_terminal_radii(&mut self, factor: f64) {
        for n in self.tree.nodes() {
            if self.tree.is_leaf(n) {
                self.tree[n].radius *= factor;
            }
        }
    }

    /// Picks the parent for a branch towards `loc` among the nearest vessels whose start lies
    /// behind `loc`, balancing across lattice layers.
    pub fn nearest_vessel(&self, loc: DVec3, rng: &mut dyn Rng) -> Option<VesselId> {
        let items = self
            .index
            .n_nearest(loc, NEAREST_CANDIDATES, |s, p| s.forward_distance_squared(p));
        let keys: Vec<i64> = items
            .iter()
            .map(|(s, _)| (s.end.z / CELL_THICKNESS).round() as i64)
            .collect();
        let pick = BalancedSampler::new(&keys).sample(rng)?;
        Some(items[pick].0.id)
    }

    /// Attaches `cell` to the first vessel found by [`Self::nearest_vessel`], splitting it.
    /// Returns the id of the new branch vessel, or `None` when no vessel qualifies.
    pub fn connect_cell(&mut self, cell: &mut Macrocell, rng: &mut dyn Rng) -> Option<VesselId> {
        let Some(target) = self.nearest_vessel(cell.center, rng) else {
            debug!("No vessel reaches macrocell {} at {:?}.", cell.id, cell.center);
            return None;
        };
        let branch = self.split_existing_vessel(target, cell)?;
        self.subtract_flow_above(branch, cell.flow);
        Some(branch)
    }

    /// Attaches `cell` below the terminal trunk vessel `id` without moving anything.
    pub fn connect_cell_initial(&mut self, cell: &mut Macrocell, id: VesselId) -> Result<VesselId> {
        let n = self.node(id).ok_or(Error::UnknownVessel(id))?;
        let v = Vessel::new(
            VesselId(self.ids.next_id()),
            self.tree[n].end(),
            cell.center,
            NEW_VESSEL_RADIUS,
            cell.flow,
            cell.pressure,
        )
        .with_cell(cell.id);
        let branch = v.id;
        let child = self.tree.set_child(n, Side::Left, v);
        self.record(child);
        cell.parent_vessel = Some(branch);
        self.subtract_flow_above(branch, cell.flow);
        Ok(branch)
    }

    fn split_existing_vessel(&mut self, id: VesselId, cell: &mut Macrocell) -> Option<VesselId> {
        let n = self.node(id)?;
        let gamma = self.gamma();

        let old = self.tree[n].segment();
        if let Err(e) = self.index.remove(old.key(), &old.extents()) {
            warn!("Vessel {} missing from the index before split: {}", id, e);
        }
        let split = split_point(&self.tree[n], cell.center, cell.flow, gamma);
        if split.is_fallback() {
            self.bifurcation_fallbacks += 1;
            debug!("Split of vessel {} fell back to the centroid.", id);
        }
        let new_start = split.point();
        let old_start = self.tree[n].start();
        self.tree[n].set_start(new_start);
        self.index_vessel(n);

        let (flow, entry, is_const) = {
            let v = &self.tree[n];
            (v.flow, v.entry_pressure, v.is_const)
        };
        let trunk = Vessel::new(
            VesselId(self.ids.next_id()),
            old_start,
            new_start,
            NEW_VESSEL_RADIUS,
            flow,
            entry,
        )
        .with_const(is_const);
        let trunk_node = self.tree.insert_above(n, Side::Left, trunk);
        self.record(trunk_node);

        let branch = Vessel::new(
            VesselId(self.ids.next_id()),
            new_start,
            cell.center,
            NEW_VESSEL_RADIUS,
            cell.flow,
            cell.pressure,
        )
        .with_cell(cell.id);
        let branch_id = branch.id;
        let branch_node = self.tree.set_child(trunk_node, Side::Right, branch);
        self.record(branch_node);
        cell.parent_vessel = Some(branch_id);
        Some(branch_id)
    }

    /// Prunes the terminal vessel `id` and every degree-one ancestor above it, then merges out
    /// the surviving junction unless it is a trunk vessel.
    ///
    /// Returns `Ok(false)` without changing anything when the chain reaches a const vessel.
    pub fn remove(&mut self, id: VesselId) -> Result<bool> {
        let start = self.node(id).ok_or(Error::UnknownVessel(id))?;
        let flow = self.tree[start].flow;

        let mut chain = Vec::new();
        let mut side = Side::Left;
        let mut cursor = Some(start);
        let survivor = loop {
            let Some(n) = cursor else {
                return Ok(false);
            };
            if self.tree.has_two_children(n) {
                break n;
            }
            if self.tree[n].is_const {
                return Ok(false);
            }
            chain.push(n);
            side = self.tree.side_of(n).unwrap_or(Side::Left);
            cursor = self.tree.parent(n);
        };

        for &n in &chain {
            self.forget(n);
        }
        if let Some(child) = self.tree.child(survivor, side) {
            self.tree.remove_subtree(child);
        }

        let mut bottom = survivor;
        if !self.tree[survivor].is_const {
            if let Some(remaining) = self.tree.left(survivor).or(self.tree.right(survivor)) {
                let merged_start = self.tree[survivor].start();
                self.forget(survivor);
                self.unindex(remaining);
                self.tree[remaining].set_start(merged_start);
                self.tree.replace_parent(remaining);
                self.index_vessel(remaining);
                bottom = remaining;
            }
        }

        self.tree[bottom].flow -= flow;
        let above: Vec<NodeId> = self.tree.ancestors(bottom).collect();
        for a in above {
            self.tree[a].flow -= flow;
        }
        Ok(true)
    }

    /// Recomputes Horton–Strahler orders bottom-up.
    pub fn compute_strahler_orders(&mut self) {
        let Some(root) = self.tree.root() else {
            return;
        };
        for n in self.tree.post_order(root) {
            let mut order = self.tree.left(n).map_or(1, |l| self.tree[l].strahler_order);
            if let Some(r) = self.tree.right(n) {
                let ro = self.tree[r].strahler_order;
                if ro == order {
                    order += 1;
                } else if ro > order {
                    order = ro;
                }
            }
            self.tree[n].strahler_order = order;
        }
        info!("Highest order: {}", self.tree[root].strahler_order);
    }

    pub(crate) fn last_id(&self) -> u32 {
        self.ids.last()
    }

    fn subtract_flow_above(&mut self, id: VesselId, flow: f64) {
        let Some(n) = self.node(id) else {
            return;
        };
        let above: Vec<NodeId> = self.tree.ancestors(n).collect();
        for a in above {
            self.tree[a].flow -= flow;
        }
    }

    fn record(&mut self, n: NodeId) {
        self.nodes.insert(self.tree[n].id, n);
        self.index_vessel(n);
    }

    fn index_vessel(&mut self, n: NodeId) {
        let v = &self.tree[n];
        if !self.index.insert(v.segment()) {
            self.unindexed += 1;
            warn!("Vessel {} reaches outside the spatial index; it takes no new branches.", v.id);
        }
    }

    fn unindex(&mut self, n: NodeId) {
        let s = self.tree[n].segment();
        if let Err(e) = self.index.remove(s.key(), &s.extents()) {
            debug!("{}", e);
        }
    }

    fn forget(&mut self, n: NodeId) {
        self.unindex(n);
        self.nodes.remove(&self.tree[n].id);
    }
}

/// Structural and numeric equality: same vessels in the same pre-order positions.
impl PartialEq for VesselTree {
    fn eq(&self, other: &Self) -> bool {
        let a = self.tree.nodes();
        let b = other.tree.nodes();
        a.len() == b.len()
            && a.iter().zip(&b).all(|(&x, &y)| {
                self.tree[x] == other.tree[y]
                    && self.tree.parent(x).map(|p| self.tree[p].id)
                        == other.tree.parent(y).map(|p| other.tree[p].id)
                    && self.tree.side_of(x) == other.tree.side_of(y)
            })
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::growth::macrocell::CellType;
    use crate::units::{mm, mmhg, DEFAULT_GAMMA};
    use crate::vessel::CellId;

    fn flat(id: u32, start: DVec3, end: DVec3, parent: Option<u32>, left: Option<u32>, right: Option<u32>) -> FlatVessel {
        FlatVessel {
            vessel: Vessel::new(VesselId(id), start, end, mm(2.0), 1.0, mmhg(25.0)).with_const(true),
            parent: parent.map(VesselId),
            left: left.map(VesselId),
            right: right.map(VesselId),
        }
    }

    /// A trunk entering at the bottom of a 20 mm cube and splitting once.
    pub(crate) fn trunk() -> Vec<FlatVessel> {
        let a = DVec3::new(mm(10.0), mm(10.0), 0.0);
        let b = DVec3::new(mm(10.0), mm(10.0), mm(8.0));
        let c = DVec3::new(mm(5.0), mm(6.0), mm(12.0));
        let d = DVec3::new(mm(15.0), mm(13.0), mm(13.0));
        vec![
            flat(0, a, b, None, Some(1), Some(2)),
            flat(1, b, c, Some(0), None, None),
            flat(2, b, d, Some(0), None, None),
        ]
    }

    pub(crate) fn cube() -> Aabb {
        Aabb::from_corners(DVec3::ZERO, DVec3::splat(mm(20.0)))
    }

    fn cell(id: u32, center: DVec3) -> Macrocell {
        Macrocell {
            id: CellId(id),
            center,
            parent_vessel: None,
            kind: CellType::Normal,
            radius: mm(1.0),
            flow: 1e-9,
            pressure: mmhg(25.0),
            lattice: glam::IVec3::ZERO,
        }
    }

    fn built() -> VesselTree {
        let norm = Normalizer::new(DEFAULT_GAMMA, mmhg(25.0), 1e-9);
        let mut t = VesselTree::from_flat(trunk(), cube(), norm).unwrap();
        let terminals = t.terminal_vessels();
        for (i, id) in terminals.into_iter().enumerate() {
            let end = t.get(id).unwrap().end();
            let mut c = cell(i as u32 + 1, end + DVec3::Z * mm(2.0));
            t.connect_cell_initial(&mut c, id).unwrap();
        }
        t.normalize_all();
        t
    }

    #[test]
    fn missing_root_is_reported() {
        let mut list = trunk();
        list[0].parent = Some(VesselId(2));
        let norm = Normalizer::new(DEFAULT_GAMMA, 0.0, 0.0);
        assert!(matches!(VesselTree::from_flat(list, cube(), norm), Err(Error::NoRootVessel)));
    }

    #[test]
    fn wrong_parent_is_corrupt() {
        let mut list = trunk();
        list[2].parent = Some(VesselId(1));
        let norm = Normalizer::new(DEFAULT_GAMMA, 0.0, 0.0);
        assert!(matches!(VesselTree::from_flat(list, cube(), norm), Err(Error::CorruptRecord(_))));
    }

    #[test]
    fn initial_connection_validates() {
        let t = built();
        assert_eq!(t.len(), 5);
        assert_eq!(t.index.len(), 5);
        assert!(t.validate(false));
        assert_eq!(t.root().unwrap().strahler_order, 2);
    }

    #[test]
    fn connect_and_remove_keep_tree_valid() {
        let mut t = built();
        let mut rng = StdRng::seed_from_u64(4);
        let mut cells = Vec::new();
        for (i, p) in [
            DVec3::new(mm(6.0), mm(5.0), mm(16.0)),
            DVec3::new(mm(14.0), mm(15.0), mm(17.0)),
            DVec3::new(mm(4.0), mm(8.0), mm(18.0)),
        ]
        .into_iter()
        .enumerate()
        {
            let mut c = cell(10 + i as u32, p);
            let branch = t.connect_cell(&mut c, &mut rng).expect("vessel in reach");
            assert_eq!(c.parent_vessel, Some(branch));
            cells.push(c);
            t.normalize_all();
            assert!(t.validate(false));
        }
        assert_eq!(t.len(), 11);
        assert!(t.last_id() >= 10);

        let victim = cells[1].parent_vessel.unwrap();
        let before = t.len();
        let junction_is_trunk = t.parent_of(victim).unwrap().is_const;
        assert!(t.remove(victim).unwrap());
        assert!(t.get(victim).is_none());
        assert_eq!(t.len(), if junction_is_trunk { before - 1 } else { before - 2 });
        t.normalize_all();
        assert!(t.validate(false));
    }

    #[test]
    fn removing_next_to_trunk_is_refused() {
        let mut t = built();
        let first = t.terminal_vessels()[0];
        assert!(!t.remove(first).unwrap());
        assert_eq!(t.len(), 5);
        assert!(matches!(t.remove(VesselId(999)), Err(Error::UnknownVessel(_))));
    }

    #[test]
    fn vessels_outside_the_index_are_counted() {
        let mut t = built();
        assert_eq!(t.unindexed_vessels(), 0);
        let first = t.terminal_vessels()[0];
        let far = DVec3::new(mm(10.0), mm(10.0), mm(40.0));
        let mut c = cell(50, far);
        let branch = t.connect_cell_initial(&mut c, first).unwrap();

        assert_eq!(t.unindexed_vessels(), 1);
        assert!(t.get(branch).is_some());
        assert_eq!(t.index.len(), t.len() - 1);
        let mut rng = StdRng::seed_from_u64(1);
        assert_ne!(t.nearest_vessel(far, &mut rng), Some(branch));
    }

    #[test]
    fn equality_is_structural() {
        let a = built();
        let b = built();
        assert!(a == b);
        let mut c = built();
        c.scale_terminal_radii(1.1);
        assert!(a != c);
    }
}
