//! Bounding volume hierarchy for broad-phase collision detection.
//!
//! Nodes live in an arena and refer to each other by [`NodeId`]. A node is
//! either a leaf holding one payload, or a branch with exactly two children
//! whose volume encloses both of them. Branch volumes are recomputed bottom-up
//! after every insert, remove and update.
//!
//! Leaf ids are stable: splitting a leaf on insert creates a new branch in its
//! place, and removing a leaf splices its sibling into the parent's place
//! without touching the sibling's id.
//!
//! # Example
//! ```
//! use embedded_physics::bounding::BoundingSphere;
//! use embedded_physics::bvh::BvhTree;
//! use nalgebra::Vector3;
//!
//! let mut tree = BvhTree::new();
//! tree.insert(1u32, BoundingSphere::new(Vector3::new(0.0, 0.0, 0.0), 1.0));
//! tree.insert(2u32, BoundingSphere::new(Vector3::new(1.5, 0.0, 0.0), 1.0));
//! tree.insert(3u32, BoundingSphere::new(Vector3::new(9.0, 0.0, 0.0), 1.0));
//!
//! let pairs = tree.potential_contacts::<8>(8);
//! assert_eq!(pairs.len(), 1);
//! ```

use alloc::vec::Vec;

use crate::bounding::BoundingVolume;

/// Handle of a node in a [`BvhTree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(usize);

/// A pair of payloads whose bounding volumes overlap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PotentialContact<T> {
    pub items: [T; 2],
}

#[derive(Debug, Clone, Copy)]
enum NodeKind<T> {
    Leaf(T),
    Branch([NodeId; 2]),
}

#[derive(Debug, Clone)]
struct Node<V, T> {
    parent: Option<NodeId>,
    volume: V,
    kind: NodeKind<T>,
}

/// Binary tree of bounding volumes over payloads of type `T`.
#[derive(Debug, Clone)]
pub struct BvhTree<V, T> {
    nodes: Vec<Option<Node<V, T>>>,
    free: Vec<usize>,
    root: Option<NodeId>,
    leaves: usize,
}

impl<V: BoundingVolume, T: Copy> Default for BvhTree<V, T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<V: BoundingVolume, T: Copy> BvhTree<V, T> {
    pub fn new() -> Self {
        Self {
            nodes: Vec::new(),
            free: Vec::new(),
            root: None,
            leaves: 0,
        }
    }

    /// Number of leaves.
    #[inline]
    pub fn len(&self) -> usize {
        self.leaves
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    #[inline]
    pub fn root(&self) -> Option<NodeId> {
        self.root
    }

    /// Drop every node.
    pub fn clear(&mut self) {
        self.nodes.clear();
        self.free.clear();
        self.root = None;
        self.leaves = 0;
    }

    /// Volume of a live node.
    pub fn volume(&self, id: NodeId) -> Option<&V> {
        self.get(id).map(|n| &n.volume)
    }

    /// Payload of a live leaf.
    pub fn payload(&self, id: NodeId) -> Option<T> {
        match self.get(id)?.kind {
            NodeKind::Leaf(payload) => Some(payload),
            NodeKind::Branch(_) => None,
        }
    }

    /// Children of a live branch.
    pub fn children(&self, id: NodeId) -> Option<[NodeId; 2]> {
        match self.get(id)?.kind {
            NodeKind::Branch(children) => Some(children),
            NodeKind::Leaf(_) => None,
        }
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.get(id)?.parent
    }

    /// Iterate over live leaves as `(id, payload, volume)`.
    pub fn leaves(&self) -> impl Iterator<Item = (NodeId, T, &V)> {
        self.nodes.iter().enumerate().filter_map(|(i, slot)| match slot {
            Some(Node {
                volume,
                kind: NodeKind::Leaf(payload),
                ..
            }) => Some((NodeId(i), *payload, volume)),
            _ => None,
        })
    }

    /// Insert a payload with its volume and return the new leaf.
    ///
    /// Descends from the root towards the child whose volume grows least,
    /// then splits the leaf it reaches into a branch holding both leaves.
    pub fn insert(&mut self, payload: T, volume: V) -> NodeId {
        let leaf = self.alloc(Node {
            parent: None,
            volume,
            kind: NodeKind::Leaf(payload),
        });
        self.leaves += 1;

        let mut current = match self.root {
            Some(root) => root,
            None => {
                self.root = Some(leaf);
                return leaf;
            }
        };

        while let NodeKind::Branch([a, b]) = self.node(current).kind {
            let grow_a = self.node(a).volume.growth(&volume);
            let grow_b = self.node(b).volume.growth(&volume);
            current = if grow_a < grow_b { a } else { b };
        }

        let parent = self.node(current).parent;
        let branch_volume = self.node(current).volume.combine(&volume);
        let branch = self.alloc(Node {
            parent,
            volume: branch_volume,
            kind: NodeKind::Branch([current, leaf]),
        });
        self.node_mut(current).parent = Some(branch);
        self.node_mut(leaf).parent = Some(branch);
        self.replace_child(parent, current, branch);
        self.refit(parent);
        leaf
    }

    /// Remove a node and its whole subtree.
    ///
    /// The removed node's sibling takes the parent's place. Returns `false`
    /// if `id` is not a live node.
    pub fn remove(&mut self, id: NodeId) -> bool {
        let parent = match self.get(id) {
            Some(node) => node.parent,
            None => return false,
        };
        self.free_subtree(id);

        let Some(parent) = parent else {
            self.root = None;
            return true;
        };

        let sibling = match self.node(parent).kind {
            NodeKind::Branch([a, b]) => {
                if a == id {
                    b
                } else {
                    a
                }
            }
            NodeKind::Leaf(_) => unreachable!("leaf {:?} recorded as a parent", parent),
        };
        let grandparent = self.node(parent).parent;
        self.node_mut(sibling).parent = grandparent;
        self.replace_child(grandparent, parent, sibling);
        self.release(parent);
        self.refit(grandparent);
        true
    }

    /// Replace a leaf's volume and refit its ancestors. Returns `false` if
    /// `id` is not a live leaf.
    pub fn update(&mut self, id: NodeId, volume: V) -> bool {
        let parent = match self.get(id) {
            Some(Node {
                parent,
                kind: NodeKind::Leaf(_),
                ..
            }) => *parent,
            _ => return false,
        };
        self.node_mut(id).volume = volume;
        self.refit(parent);
        true
    }

    /// Collect up to `min(limit, C)` pairs of leaves whose volumes overlap.
    ///
    /// Every pair is reported once. Subtrees whose volumes do not overlap are
    /// skipped whole. Traversal stops as soon as the limit is reached.
    pub fn potential_contacts<const C: usize>(&self, limit: usize) -> heapless::Vec<PotentialContact<T>, C> {
        let mut out = heapless::Vec::new();
        let limit = limit.min(C);
        if let Some(root) = self.root {
            self.collect_within(root, limit, &mut out);
        }
        out
    }

    fn collect_within<const C: usize>(&self, id: NodeId, limit: usize, out: &mut heapless::Vec<PotentialContact<T>, C>) {
        if out.len() >= limit {
            return;
        }
        if let NodeKind::Branch([a, b]) = self.node(id).kind {
            self.collect_within(a, limit, out);
            self.collect_within(b, limit, out);
            self.collect_between(a, b, limit, out);
        }
    }

    fn collect_between<const C: usize>(
        &self,
        a: NodeId,
        b: NodeId,
        limit: usize,
        out: &mut heapless::Vec<PotentialContact<T>, C>,
    ) {
        if out.len() >= limit {
            return;
        }
        let (na, nb) = (self.node(a), self.node(b));
        if !na.volume.overlaps(&nb.volume) {
            return;
        }

        match (na.kind, nb.kind) {
            (NodeKind::Leaf(x), NodeKind::Leaf(y)) => {
                let _ = out.push(PotentialContact { items: [x, y] });
            }
            (NodeKind::Leaf(_), NodeKind::Branch([b0, b1])) => {
                self.collect_between(a, b0, limit, out);
                self.collect_between(a, b1, limit, out);
            }
            (NodeKind::Branch([a0, a1]), NodeKind::Leaf(_)) => {
                self.collect_between(a0, b, limit, out);
                self.collect_between(a1, b, limit, out);
            }
            (NodeKind::Branch([a0, a1]), NodeKind::Branch([b0, b1])) => {
                if nb.volume.size() > na.volume.size() {
                    self.collect_between(a, b0, limit, out);
                    self.collect_between(a, b1, limit, out);
                } else {
                    self.collect_between(a0, b, limit, out);
                    self.collect_between(a1, b, limit, out);
                }
            }
        }
    }

    // -- Arena plumbing --

    fn get(&self, id: NodeId) -> Option<&Node<V, T>> {
        self.nodes.get(id.0).and_then(|slot| slot.as_ref())
    }

    fn node(&self, id: NodeId) -> &Node<V, T> {
        match self.get(id) {
            Some(node) => node,
            None => unreachable!("bvh node {:?} is not live", id),
        }
    }

    fn node_mut(&mut self, id: NodeId) -> &mut Node<V, T> {
        match self.nodes.get_mut(id.0).and_then(|slot| slot.as_mut()) {
            Some(node) => node,
            None => unreachable!("bvh node {:?} is not live", id),
        }
    }

    fn alloc(&mut self, node: Node<V, T>) -> NodeId {
        match self.free.pop() {
            Some(index) => {
                self.nodes[index] = Some(node);
                NodeId(index)
            }
            None => {
                self.nodes.push(Some(node));
                NodeId(self.nodes.len() - 1)
            }
        }
    }

    fn release(&mut self, id: NodeId) -> Option<Node<V, T>> {
        let node = self.nodes.get_mut(id.0)?.take()?;
        self.free.push(id.0);
        Some(node)
    }

    fn free_subtree(&mut self, id: NodeId) {
        match self.release(id).map(|n| n.kind) {
            Some(NodeKind::Leaf(_)) => self.leaves -= 1,
            Some(NodeKind::Branch([a, b])) => {
                self.free_subtree(a);
                self.free_subtree(b);
            }
            None => {}
        }
    }

    /// Point `parent` (or the root, when `parent` is `None`) at `new` instead of `old`.
    fn replace_child(&mut self, parent: Option<NodeId>, old: NodeId, new: NodeId) {
        match parent {
            None => self.root = Some(new),
            Some(p) => {
                if let NodeKind::Branch(children) = &mut self.node_mut(p).kind {
                    for child in children.iter_mut() {
                        if *child == old {
                            *child = new;
                        }
                    }
                }
            }
        }
    }

    /// Recompute branch volumes from `start` up to the root.
    fn refit(&mut self, start: Option<NodeId>) {
        let mut current = start;
        while let Some(id) = current {
            if let NodeKind::Branch([a, b]) = self.node(id).kind {
                let volume = self.node(a).volume.combine(&self.node(b).volume);
                self.node_mut(id).volume = volume;
            }
            current = self.node(id).parent;
        }
    }
}
