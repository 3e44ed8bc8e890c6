//! Arena-backed binary tree.
//!
//! Nodes are addressed by [`NodeId`], a stable index into the arena. Parent and child links are
//! plain indices. Freed slots go on a free list and are reused by later insertions, so a
//! `NodeId` must not be held across the removal of its node.
use std::collections::VecDeque;
use std::ops::{Index, IndexMut};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl NodeId {
    pub fn index(self) -> usize {
        self.0
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    Left,
    Right,
}

#[derive(Debug, Clone)]
struct Slot<T> {
    value: T,
    parent: Option<NodeId>,
    left: Option<NodeId>,
    right: Option<NodeId>,
}

#[derive(Debug, Clone)]
pub struct BinaryTree<T> {
    slots: Vec<Option<Slot<T>>>,
    free: Vec<usize>,
    root: Option<NodeId>,
    len: usize,
}

impl<T> Default for BinaryTree<T> {
    fn default() -> Self {
        Self {
            slots: Vec::new(),
            free: Vec::new(),
            root: None,
            len: 0,
        }
    }
}

impl<T> BinaryTree<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_root(value: T) -> Self {
        let mut tree = Self::new();
        tree.root = Some(tree.alloc(value, None));
        tree
    }

    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Upper bound on [`NodeId::index`] for dense side tables.
    pub fn capacity(&self) -> usize {
        self.slots.len()
    }

    pub fn get(&self, id: NodeId) -> Option<&T> {
        self.slots.get(id.0)?.as_ref().map(|s| &s.value)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut T> {
        self.slots.get_mut(id.0)?.as_mut().map(|s| &mut s.value)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.slot(id).parent
    }

    pub fn left(&self, id: NodeId) -> Option<NodeId> {
        self.slot(id).left
    }

    pub fn right(&self, id: NodeId) -> Option<NodeId> {
        self.slot(id).right
    }

    pub fn child(&self, id: NodeId, side: Side) -> Option<NodeId> {
        match side {
            Side::Left => self.left(id),
            Side::Right => self.right(id),
        }
    }

    pub fn is_leaf(&self, id: NodeId) -> bool {
        let s = self.slot(id);
        s.left.is_none() && s.right.is_none()
    }

    pub fn has_two_children(&self, id: NodeId) -> bool {
        let s = self.slot(id);
        s.left.is_some() && s.right.is_some()
    }

    /// Which side of its parent `id` hangs on; `None` for the root.
    pub fn side_of(&self, id: NodeId) -> Option<Side> {
        let parent = self.parent(id)?;
        if self.left(parent) == Some(id) {
            Some(Side::Left)
        } else {
            Some(Side::Right)
        }
    }

    /// Replaces the whole tree with a single root.
    pub fn set_root(&mut self, value: T) -> NodeId {
        self.clear();
        let id = self.alloc(value, None);
        self.root = Some(id);
        id
    }

    pub fn clear(&mut self) {
        self.slots.clear();
        self.free.clear();
        self.root = None;
        self.len = 0;
    }

    /// Attaches `value` as the `side` child of `id`, dropping any subtree already there.
    pub fn set_child(&mut self, id: NodeId, side: Side, value: T) -> NodeId {
        if let Some(old) = self.child(id, side) {
            self.remove_subtree(old);
        }
        let child = self.alloc(value, Some(id));
        self.link(id, side, Some(child));
        child
    }

    /// Inserts `value` between `id` and its parent; `id` becomes the `side` child of the new node.
    pub fn insert_above(&mut self, id: NodeId, side: Side, value: T) -> NodeId {
        let parent = self.parent(id);
        let parent_side = self.side_of(id);
        let new = self.alloc(value, parent);
        match (parent, parent_side) {
            (Some(p), Some(s)) => self.link(p, s, Some(new)),
            _ => self.root = Some(new),
        }
        self.link(new, side, Some(id));
        self.slot_mut(id).parent = Some(new);
        new
    }

    /// Detaches and frees `id` together with all of its descendants.
    pub fn remove_subtree(&mut self, id: NodeId) {
        match (self.parent(id), self.side_of(id)) {
            (Some(p), Some(s)) => self.link(p, s, None),
            _ => self.root = None,
        }
        for n in self.post_order(id) {
            self.release(n);
        }
    }

    /// `child` takes the place of its parent, which must have no other child. Returns the
    /// parent's value.
    pub fn replace_parent(&mut self, child: NodeId) -> Option<T> {
        let parent = self.parent(child)?;
        let grand = self.parent(parent);
        let parent_side = self.side_of(parent);
        match (grand, parent_side) {
            (Some(g), Some(s)) => self.link(g, s, Some(child)),
            _ => self.root = Some(child),
        }
        self.slot_mut(child).parent = grand;
        let slot = self.slots[parent.0].take()?;
        self.free.push(parent.0);
        self.len -= 1;
        Some(slot.value)
    }

    pub fn swap_children(&mut self, id: NodeId) {
        let s = self.slot_mut(id);
        std::mem::swap(&mut s.left, &mut s.right);
    }

    /// Nodes from the parent of `id` up to the root.
    pub fn ancestors(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(self.parent(id), move |&n| self.parent(n))
    }

    pub fn pre_order(&self, start: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![start];
        while let Some(n) = stack.pop() {
            out.push(n);
            let s = self.slot(n);
            stack.extend(s.right);
            stack.extend(s.left);
        }
        out
    }

    pub fn post_order(&self, start: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![start];
        while let Some(n) = stack.pop() {
            out.push(n);
            let s = self.slot(n);
            stack.extend(s.left);
            stack.extend(s.right);
        }
        out.reverse();
        out
    }

    pub fn in_order(&self, start: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = Vec::new();
        let mut cur = Some(start);
        while cur.is_some() || !stack.is_empty() {
            while let Some(n) = cur {
                stack.push(n);
                cur = self.left(n);
            }
            if let Some(n) = stack.pop() {
                out.push(n);
                cur = self.right(n);
            }
        }
        out
    }

    pub fn level_order(&self, start: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut queue = VecDeque::from([start]);
        while let Some(n) = queue.pop_front() {
            out.push(n);
            let s = self.slot(n);
            queue.extend(s.left);
            queue.extend(s.right);
        }
        out
    }

    /// Pre-order over the whole tree; empty when there is no root.
    pub fn nodes(&self) -> Vec<NodeId> {
        self.root.map(|r| self.pre_order(r)).unwrap_or_default()
    }

    fn alloc(&mut self, value: T, parent: Option<NodeId>) -> NodeId {
        let slot = Slot {
            value,
            parent,
            left: None,
            right: None,
        };
        self.len += 1;
        match self.free.pop() {
            Some(i) => {
                self.slots[i] = Some(slot);
                NodeId(i)
            }
            None => {
                self.slots.push(Some(slot));
                NodeId(self.slots.len() - 1)
            }
        }
    }

    fn release(&mut self, id: NodeId) {
        if self.slots[id.0].take().is_some() {
            self.free.push(id.0);
            self.len -= 1;
        }
    }

    fn link(&mut self, parent: NodeId, side: Side, child: Option<NodeId>) {
        let s = self.slot_mut(parent);
        match side {
            Side::Left => s.left = child,
            Side::Right => s.right = child,
        }
    }

    fn slot(&self, id: NodeId) -> &Slot<T> {
        match self.slots.get(id.0) {
            Some(Some(s)) => s,
            _ => panic!("stale node id {}", id.0),
        }
    }

    fn slot_mut(&mut self, id: NodeId) -> &mut Slot<T> {
        match self.slots.get_mut(id.0) {
            Some(Some(s)) => s,
            _ => panic!("stale node id {}", id.0),
        }
    }
}

impl<T> Index<NodeId> for BinaryTree<T> {
    type Output = T;

    fn index(&self, id: NodeId) -> &T {
        &self.slot(id).value
    }
}

impl<T> IndexMut<NodeId> for BinaryTree<T> {
    fn index_mut(&mut self, id: NodeId) -> &mut T {
        &mut self.slot_mut(id).value
    }
}
