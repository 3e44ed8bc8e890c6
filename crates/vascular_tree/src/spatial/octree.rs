//! Octree over axis-aligned volumes.
//!
//! Nodes live in one `Vec`; a split node stores the index of its first octant and the eight
//! octants are contiguous. Items are kept at the deepest node whose box wholly contains them at
//! insertion time, so items straddling a split plane stay at the parent. Removal never merges
//! octants back.
//!
//! Queries take a distance callback returning the squared distance from the query point to an
//! item, or `None` when the item must not be returned at all.
use std::collections::BTreeSet;
use std::fmt::Debug;

use glam::DVec3;
use tracing::debug;

use crate::error::{Error, Result};
use crate::geometry::Aabb;

/// Default number of items a leaf holds before it splits.
pub const PREFERRED_CAPACITY: usize = 16;

const MAX_DEPTH: u8 = 32;

/// Anything that can be stored in an [`Octree`].
pub trait Indexed: Clone {
    type Key: Copy + Ord + Debug;

    fn key(&self) -> Self::Key;
    fn extents(&self) -> Aabb;
}

/// Collects candidates during a search and decides how far the search must still look.
pub trait Accumulator<T> {
    fn consider(&mut self, item: &T, distance_sq: f64);

    /// `true` once the accumulator would only accept strictly closer items.
    fn is_full(&self) -> bool;

    /// Squared distance beyond which nothing is accepted; only read when [`Self::is_full`].
    fn bound_sq(&self) -> f64;
}

/// Keeps the single closest item.
#[derive(Debug, Clone)]
pub struct Nearest<T> {
    pub best: Option<(T, f64)>,
}

impl<T> Default for Nearest<T> {
    fn default() -> Self {
        Self { best: None }
    }
}

impl<T: Clone> Accumulator<T> for Nearest<T> {
    fn consider(&mut self, item: &T, distance_sq: f64) {
        if self.best.as_ref().is_none_or(|(_, d)| distance_sq < *d) {
            self.best = Some((item.clone(), distance_sq));
        }
    }

    fn is_full(&self) -> bool {
        self.best.is_some()
    }

    fn bound_sq(&self) -> f64 {
        self.best.as_ref().map_or(f64::INFINITY, |(_, d)| *d)
    }
}

/// Keeps the `n` closest items, sorted by distance.
#[derive(Debug, Clone)]
pub struct NNearest<T> {
    n: usize,
    pub found: Vec<(T, f64)>,
}

impl<T> NNearest<T> {
    pub fn new(n: usize) -> Self {
        Self {
            n,
            found: Vec::with_capacity(n + 1),
        }
    }
}

impl<T: Clone> Accumulator<T> for NNearest<T> {
    fn consider(&mut self, item: &T, distance_sq: f64) {
        if self.n == 0 {
            return;
        }
        if self.found.len() == self.n && distance_sq >= self.bound_sq() {
            return;
        }
        let at = self.found.partition_point(|(_, d)| *d <= distance_sq);
        self.found.insert(at, (item.clone(), distance_sq));
        self.found.truncate(self.n);
    }

    fn is_full(&self) -> bool {
        self.found.len() >= self.n
    }

    fn bound_sq(&self) -> f64 {
        self.found.last().map_or(f64::INFINITY, |(_, d)| *d)
    }
}

/// Keeps every item strictly closer than a radius.
#[derive(Debug, Clone)]
pub struct Within<T> {
    radius_sq: f64,
    pub found: Vec<(T, f64)>,
}

impl<T> Within<T> {
    pub fn new(radius: f64) -> Self {
        Self {
            radius_sq: radius * radius,
            found: Vec::new(),
        }
    }
}

impl<T: Clone> Accumulator<T> for Within<T> {
    fn consider(&mut self, item: &T, distance_sq: f64) {
        if distance_sq < self.radius_sq {
            self.found.push((item.clone(), distance_sq));
        }
    }

    fn is_full(&self) -> bool {
        true
    }

    fn bound_sq(&self) -> f64 {
        self.radius_sq
    }
}

#[derive(Debug, Clone)]
struct Node<T> {
    extents: Aabb,
    items: Vec<T>,
    first_child: Option<usize>,
    depth: u8,
}

impl<T> Node<T> {
    fn new(extents: Aabb, depth: u8) -> Self {
        Self {
            extents,
            items: Vec::new(),
            first_child: None,
            depth,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Octree<T: Indexed> {
    nodes: Vec<Node<T>>,
    capacity: usize,
    len: usize,
}

impl<T: Indexed> Octree<T> {
    pub fn new(extents: Aabb) -> Self {
        Self::with_capacity(extents, PREFERRED_CAPACITY)
    }

    pub fn with_capacity(extents: Aabb, capacity: usize) -> Self {
        Self {
            nodes: vec![Node::new(extents, 0)],
            capacity: capacity.max(1),
            len: 0,
        }
    }

    pub fn extents(&self) -> Aabb {
        self.nodes[0].extents
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Inserts `item`. Items not wholly inside the root volume are rejected and `false` is returned.
    pub fn insert(&mut self, item: T) -> bool {
        let ext = item.extents();
        if !self.nodes[0].extents.contains(&ext) {
            debug!(
                "Item {:?} from {:?} to {:?} lies outside the index; skipping.",
                item.key(),
                ext.min,
                ext.max
            );
            return false;
        }

        let mut n = 0;
        while let Some(first) = self.nodes[n].first_child {
            match self.containing_child(first, &ext) {
                Some(c) => n = c,
                None => break,
            }
        }

        self.nodes[n].items.push(item);
        self.len += 1;
        if self.nodes[n].first_child.is_none()
            && self.nodes[n].items.len() > self.capacity
            && self.nodes[n].depth < MAX_DEPTH
        {
            self.split(n);
        }
        true
    }

    /// Removes the item with `key` whose extents at insertion time were `extents`.
    pub fn remove(&mut self, key: T::Key, extents: &Aabb) -> Result<T> {
        let mut n = 0;
        loop {
            if let Some(pos) = self.nodes[n].items.iter().position(|i| i.key() == key) {
                self.len -= 1;
                return Ok(self.nodes[n].items.swap_remove(pos));
            }
            match self.nodes[n]
                .first_child
                .and_then(|first| self.containing_child(first, extents))
            {
                Some(c) => n = c,
                None => return Err(Error::NotIndexed(format!("{key:?}"))),
            }
        }
    }

    /// Every key currently stored.
    pub fn keys(&self) -> BTreeSet<T::Key> {
        self.iter().map(Indexed::key).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &T> {
        self.nodes.iter().flat_map(|n| n.items.iter())
    }

    pub fn nearest<F>(&self, p: DVec3, mut distance: F) -> Option<(T, f64)>
    where
        F: FnMut(&T, DVec3) -> Option<f64>,
    {
        let mut acc = Nearest::default();
        self.search(p, &mut distance, &mut acc);
        acc.best
    }

    /// Up to `n` closest items, nearest first.
    pub fn n_nearest<F>(&self, p: DVec3, n: usize, mut distance: F) -> Vec<(T, f64)>
    where
        F: FnMut(&T, DVec3) -> Option<f64>,
    {
        let mut acc = NNearest::new(n);
        self.search(p, &mut distance, &mut acc);
        acc.found
    }

    /// All items strictly within `radius`, in no particular order.
    pub fn within<F>(&self, p: DVec3, radius: f64, mut distance: F) -> Vec<(T, f64)>
    where
        F: FnMut(&T, DVec3) -> Option<f64>,
    {
        let mut acc = Within::new(radius);
        self.search(p, &mut distance, &mut acc);
        acc.found
    }

    /// Runs a search with a caller-supplied accumulator.
    pub fn search<F, A>(&self, p: DVec3, distance: &mut F, acc: &mut A)
    where
        F: FnMut(&T, DVec3) -> Option<f64>,
        A: Accumulator<T>,
    {
        self.search_node(0, p, distance, acc);
    }

    fn search_node<F, A>(&self, n: usize, p: DVec3, distance: &mut F, acc: &mut A)
    where
        F: FnMut(&T, DVec3) -> Option<f64>,
        A: Accumulator<T>,
    {
        let node = &self.nodes[n];
        for item in &node.items {
            if let Some(d) = distance(item, p) {
                acc.consider(item, d);
            }
        }

        let Some(first) = node.first_child else {
            return;
        };
        let inner = (first..first + 8).find(|&c| self.nodes[c].extents.contains_point(p));
        if let Some(c) = inner {
            self.search_node(c, p, distance, acc);
        }
        for c in first..first + 8 {
            if Some(c) == inner {
                continue;
            }
            if !acc.is_full()
                || self.nodes[c]
                    .extents
                    .overlaps(&Aabb::around(p, acc.bound_sq().sqrt()))
            {
                self.search_node(c, p, distance, acc);
            }
        }
    }

    fn containing_child(&self, first: usize, ext: &Aabb) -> Option<usize> {
        (first..first + 8).find(|&c| self.nodes[c].extents.contains(ext))
    }

    fn split(&mut self, n: usize) {
        let first = self.nodes.len();
        let depth = self.nodes[n].depth + 1;
        for octant in self.nodes[n].extents.octants() {
            self.nodes.push(Node::new(octant, depth));
        }
        self.nodes[n].first_child = Some(first);

        let items = std::mem::take(&mut self.nodes[n].items);
        for item in items {
            match self.containing_child(first, &item.extents()) {
                Some(c) => self.nodes[c].items.push(item),
                None => self.nodes[n].items.push(item),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use glam::IVec3;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    use super::*;
    use crate::random::{rand01, uniform};
    use crate::spatial::SitePoint;

    fn random_points(n: usize, rng: &mut StdRng) -> Vec<SitePoint> {
        (0..n)
            .map(|i| SitePoint {
                location: DVec3::new(rand01(rng), rand01(rng), rand01(rng)) * 10.0,
                lattice: IVec3::new(i as i32, 0, 0),
            })
            .collect()
    }

    fn point_distance(s: &SitePoint, p: DVec3) -> Option<f64> {
        Some(s.location.distance_squared(p))
    }

    fn populated(points: &[SitePoint]) -> Octree<SitePoint> {
        let mut tree = Octree::new(Aabb::from_corners(DVec3::ZERO, DVec3::splat(10.0)));
        for p in points {
            assert!(tree.insert(*p));
        }
        tree
    }

    #[test]
    fn within_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(17);
        let points = random_points(2_000, &mut rng);
        let tree = populated(&points);
        assert_eq!(tree.len(), points.len());

        for _ in 0..25 {
            let q = DVec3::new(uniform(-1.0, 11.0, &mut rng), uniform(-1.0, 11.0, &mut rng), uniform(-1.0, 11.0, &mut rng));
            let r = uniform(0.1, 3.0, &mut rng);

            let mut got: Vec<_> = tree
                .within(q, r, point_distance)
                .into_iter()
                .map(|(s, _)| s.key())
                .collect();
            got.sort_unstable();

            let mut expected: Vec<_> = points
                .iter()
                .filter(|s| s.location.distance_squared(q) < r * r)
                .map(|s| s.key())
                .collect();
            expected.sort_unstable();

            assert_eq!(got, expected);
        }
    }

    #[test]
    fn n_nearest_matches_brute_force() {
        let mut rng = StdRng::seed_from_u64(23);
        let points = random_points(1_000, &mut rng);
        let tree = populated(&points);

        for _ in 0..25 {
            let q = DVec3::new(rand01(&mut rng), rand01(&mut rng), rand01(&mut rng)) * 10.0;
            let got: Vec<f64> = tree.n_nearest(q, 10, point_distance).iter().map(|(_, d)| *d).collect();

            let mut all: Vec<f64> = points.iter().map(|s| s.location.distance_squared(q)).collect();
            all.sort_by(f64::total_cmp);
            assert_eq!(got, all[..10].to_vec());

            let (_, best) = tree.nearest(q, point_distance).unwrap();
            assert_eq!(best, all[0]);
        }
    }

    #[test]
    fn rejected_candidates_are_never_returned() {
        let mut rng = StdRng::seed_from_u64(29);
        let points = random_points(500, &mut rng);
        let tree = populated(&points);
        let q = DVec3::splat(5.0);
        let only_upper = |s: &SitePoint, p: DVec3| (s.location.z > p.z).then(|| s.location.distance_squared(p));

        let found = tree.n_nearest(q, 20, only_upper);
        assert_eq!(found.len(), 20);
        assert!(found.iter().all(|(s, _)| s.location.z > 5.0));
    }

    #[test]
    fn insert_outside_is_rejected() {
        let mut tree = Octree::new(Aabb::from_corners(DVec3::ZERO, DVec3::ONE));
        let p = SitePoint {
            location: DVec3::splat(2.0),
            lattice: IVec3::ZERO,
        };
        assert!(!tree.insert(p));
        assert!(tree.is_empty());
        assert!(tree.nearest(DVec3::ZERO, point_distance).is_none());
    }

    #[test]
    fn remove_by_key_and_extents() {
        let mut rng = StdRng::seed_from_u64(31);
        let points = random_points(300, &mut rng);
        let mut tree = populated(&points);

        for p in points.iter().step_by(2) {
            let removed = tree.remove(p.key(), &p.extents()).unwrap();
            assert_eq!(removed.key(), p.key());
        }
        assert_eq!(tree.len(), 150);
        let keys = tree.keys();
        assert!(points.iter().skip(1).step_by(2).all(|p| keys.contains(&p.key())));

        let gone = &points[0];
        assert!(matches!(tree.remove(gone.key(), &gone.extents()), Err(Error::NotIndexed(_))));
    }

    #[test]
    fn duplicate_locations_do_not_recurse_forever() {
        let mut tree = Octree::new(Aabb::from_corners(DVec3::ZERO, DVec3::ONE));
        for i in 0..200 {
            tree.insert(SitePoint {
                location: DVec3::splat(0.25),
                lattice: IVec3::new(i, 0, 0),
            });
        }
        assert_eq!(tree.len(), 200);
        assert_eq!(tree.within(DVec3::splat(0.25), 1e-3, point_distance).len(), 200);
    }
}
