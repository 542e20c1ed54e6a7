//! Cover tree index over the node arena.
//!
//! The tree is a leveled metric-space structure: nodes at level `L` are kept
//! at least `base^L` apart (separation) and every node at level `L` sits
//! within `base^(L+1)` of some node at level `L+1` (covering). Nodes live in
//! a growable record array and reference each other by index, with
//! [`NO_PARENT`] standing in for null; freed node slots go to a free set and
//! are reused by later allocations.
//!
//! The tree stores element ids only. Distances between elements are supplied
//! by the caller through a callback, which keeps key storage and metric
//! choice out of this module.

use smallvec::{smallvec, SmallVec};
use tracing::{debug, warn};

use crate::error::Result;
use crate::storage::{DynArray, FreeSet, Record, SlotId, SlotStore};

/// Sentinel node index used where a tree link has no target.
pub(crate) const NO_PARENT: u32 = 0xFFFF_FFFF;

/// One tree node as stored in the node array.
///
/// `children` is the slot of a per-node index array, so the record itself
/// stays fixed-size.
#[derive(Debug, Clone, Copy)]
pub(crate) struct NodeRecord {
    pub(crate) element_id: u32,
    pub(crate) level: u32,
    pub(crate) parent: u32,
    pub(crate) children: SlotId,
}

impl Record for NodeRecord {
    const SIZE: usize = 16;

    fn encode(&self, out: &mut [u8]) {
        out[0..4].copy_from_slice(&self.element_id.to_le_bytes());
        out[4..8].copy_from_slice(&self.level.to_le_bytes());
        out[8..12].copy_from_slice(&self.parent.to_le_bytes());
        out[12..16].copy_from_slice(&self.children.to_le_bytes());
    }

    fn decode(buf: &[u8]) -> Self {
        Self {
            element_id: u32::decode(&buf[0..4]),
            level: u32::decode(&buf[4..8]),
            parent: u32::decode(&buf[8..12]),
            children: u32::decode(&buf[12..16]),
        }
    }
}

/// A live node as reported by [`CoverTree::snapshot`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NodeSnapshot {
    /// Element the node represents.
    pub element_id: u32,
    /// Tree level of the node.
    pub level: u32,
    /// Element id of the parent node, `None` for the root.
    pub parent_element: Option<u32>,
}

/// Distance callback: squared metric between two elements by id.
pub(crate) type DistanceFn<'a, S> = dyn FnMut(&S, u32, u32) -> Result<f32> + 'a;

/// The cover tree proper: node arena, node free set, and the root/level
/// header fields. `base` is the level growth factor.
pub(crate) struct CoverTree {
    nodes: DynArray<NodeRecord>,
    free_nodes: FreeSet,
    root_idx: u32,
    max_level: u32,
    base: f64,
}

impl CoverTree {
    pub(crate) fn create<S: SlotStore>(store: &mut S, base: f64) -> Result<Self> {
        Ok(Self {
            nodes: DynArray::create(store)?,
            free_nodes: FreeSet::create(store)?,
            root_idx: NO_PARENT,
            max_level: 0,
            base,
        })
    }

    pub(crate) fn open(
        nodes_slot: SlotId,
        free_slot: SlotId,
        root_idx: u32,
        max_level: u32,
        base: f64,
    ) -> Self {
        Self {
            nodes: DynArray::open(nodes_slot),
            free_nodes: FreeSet::open(free_slot),
            root_idx,
            max_level,
            base,
        }
    }

    pub(crate) fn nodes_slot(&self) -> SlotId {
        self.nodes.slot()
    }

    pub(crate) fn free_slot(&self) -> SlotId {
        self.free_nodes.slot()
    }

    pub(crate) fn root_idx(&self) -> u32 {
        self.root_idx
    }

    pub(crate) fn max_level(&self) -> u32 {
        self.max_level
    }

    pub(crate) fn base(&self) -> f64 {
        self.base
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.root_idx == NO_PARENT
    }

    /// Inserts `element_id` into the tree.
    ///
    /// `nearest_distance` is the distance from the new element to its nearest
    /// live neighbor, `None` when the caller found no finite one. `dist`
    /// answers element-to-element distances for parent selection.
    pub(crate) fn insert<S: SlotStore>(
        &mut self,
        store: &mut S,
        element_id: u32,
        nearest_distance: Option<f32>,
        dist: &mut DistanceFn<'_, S>,
    ) -> Result<()> {
        if self.root_idx == NO_PARENT {
            let node_idx = self.allocate_node(store, element_id, 0)?;
            self.root_idx = node_idx;
            self.max_level = 0;
            debug!(element_id, node_idx, "tree root created");
            return Ok(());
        }

        let level = self.insertion_level(nearest_distance);
        let node_idx = self.allocate_node(store, element_id, level)?;
        self.attach_at_level(store, node_idx, level, dist)
    }

    /// Level for a new node given the distance to its nearest neighbor.
    ///
    /// Zero (or non-finite) distance pins the node to level 0; otherwise the
    /// level is `floor(log_base(distance))` clamped to `[0, max_level]`.
    fn insertion_level(&self, nearest_distance: Option<f32>) -> u32 {
        let Some(d) = nearest_distance else { return 0 };
        if d <= 0.0 || !d.is_finite() {
            return 0;
        }
        let raw = (f64::from(d).ln() / self.base.ln()).floor();
        #[allow(clippy::cast_possible_truncation)] // |raw| bounded well below 2^63
        let level = (raw as i64).min(i64::from(self.max_level)).max(0);
        u32::try_from(level).unwrap_or(0)
    }

    fn attach_at_level<S: SlotStore>(
        &mut self,
        store: &mut S,
        node_idx: u32,
        level: u32,
        dist: &mut DistanceFn<'_, S>,
    ) -> Result<()> {
        if level > self.max_level {
            // The node outranks the whole tree: promote it to a fresh root
            // one level above, with the old root as its only child.
            let old_root = self.root_idx;
            let mut rec = self.nodes.get(&*store, node_idx)?;
            rec.level = level + 1;
            rec.parent = NO_PARENT;
            self.nodes.set(store, node_idx, &rec)?;
            self.root_idx = node_idx;
            if old_root != NO_PARENT {
                DynArray::<u32>::open(rec.children).push(store, &old_root)?;
                self.set_parent(store, old_root, node_idx)?;
            }
            self.max_level = level + 1;
            debug!(node_idx, level = level + 1, "node promoted to new root");
            return Ok(());
        }

        let mut candidates = self.nodes_at_level(&*store, level + 1)?;
        if candidates.is_empty() && self.root_idx != NO_PARENT {
            candidates.push(self.root_idx);
        }

        let new_element = self.nodes.get(&*store, node_idx)?.element_id;
        let mut best_parent = NO_PARENT;
        let mut best_distance = f32::INFINITY;
        for &candidate in &candidates {
            let candidate_element = self.nodes.get(&*store, candidate)?.element_id;
            let d = dist(&*store, candidate_element, new_element)?;
            if d < best_distance {
                best_distance = d;
                best_parent = candidate;
            }
        }

        if best_parent == NO_PARENT {
            // Every candidate distance was non-finite. Attaching to the root
            // keeps the node reachable instead of leaking it as an orphan.
            warn!(node_idx, level, "no eligible parent found, attaching to root");
            best_parent = self.root_idx;
        }

        self.set_parent(store, node_idx, best_parent)?;
        self.push_child(store, best_parent, node_idx)
    }

    /// Removes the node holding `element_id`, reattaching its children.
    ///
    /// Returns `false` when no live node references that element.
    pub(crate) fn remove<S: SlotStore>(&mut self, store: &mut S, element_id: u32) -> Result<bool> {
        let Some(node_idx) = self.find_node_by_id(&*store, element_id)? else {
            return Ok(false);
        };

        let node = self.nodes.get(&*store, node_idx)?;
        let children = DynArray::<u32>::open(node.children).read_all(&*store)?;

        if node.parent != NO_PARENT {
            self.remove_child(store, node.parent, node_idx)?;
            for &child in &children {
                self.set_parent(store, child, node.parent)?;
                self.push_child(store, node.parent, child)?;
            }
        } else if node_idx == self.root_idx {
            if children.is_empty() {
                self.root_idx = NO_PARENT;
                self.max_level = 0;
            } else {
                // Promote the highest-level child (first wins on ties).
                let mut best_child = children[0];
                let mut best_level = self.nodes.get(&*store, best_child)?.level;
                for &child in &children[1..] {
                    let child_level = self.nodes.get(&*store, child)?.level;
                    if child_level > best_level {
                        best_level = child_level;
                        best_child = child;
                    }
                }
                self.root_idx = best_child;
                self.set_parent(store, best_child, NO_PARENT)?;
                for &child in &children {
                    if child != best_child {
                        self.set_parent(store, child, best_child)?;
                        self.push_child(store, best_child, child)?;
                    }
                }
                debug!(node_idx = best_child, level = best_level, "child promoted to root");
            }
        }

        self.free_nodes.insert(store, node_idx)?;
        Ok(true)
    }

    /// All live node indices at `target_level`.
    ///
    /// Iterative depth-first walk; freed node slots are skipped in case a
    /// stale child reference is ever encountered.
    fn nodes_at_level<S: SlotStore>(&self, store: &S, target_level: u32) -> Result<Vec<u32>> {
        let mut found = Vec::new();
        if self.root_idx == NO_PARENT {
            return Ok(found);
        }

        let mut stack: SmallVec<[u32; 16]> = smallvec![self.root_idx];
        while let Some(node_idx) = stack.pop() {
            if self.free_nodes.contains(store, node_idx)? {
                continue;
            }
            let node = self.nodes.get(store, node_idx)?;
            if node.level == target_level {
                found.push(node_idx);
            } else if node.level > target_level {
                stack.extend(DynArray::<u32>::open(node.children).read_all(store)?);
            }
        }
        Ok(found)
    }

    /// Node index holding `element_id`, if any. O(n) full traversal.
    pub(crate) fn find_node_by_id<S: SlotStore>(
        &self,
        store: &S,
        element_id: u32,
    ) -> Result<Option<u32>> {
        if self.root_idx == NO_PARENT {
            return Ok(None);
        }

        let mut stack: SmallVec<[u32; 16]> = smallvec![self.root_idx];
        while let Some(node_idx) = stack.pop() {
            if self.free_nodes.contains(store, node_idx)? {
                continue;
            }
            let node = self.nodes.get(store, node_idx)?;
            if node.element_id == element_id {
                return Ok(Some(node_idx));
            }
            stack.extend(DynArray::<u32>::open(node.children).read_all(store)?);
        }
        Ok(None)
    }

    /// Element ids of all live nodes, in traversal order.
    pub(crate) fn live_elements<S: SlotStore>(&self, store: &S) -> Result<Vec<u32>> {
        Ok(self
            .walk(store)?
            .into_iter()
            .map(|(_, rec)| rec.element_id)
            .collect())
    }

    /// Structural view of every live node, for diagnostics and invariant
    /// checks.
    pub(crate) fn snapshot<S: SlotStore>(&self, store: &S) -> Result<Vec<NodeSnapshot>> {
        let mut out = Vec::new();
        for (_, rec) in self.walk(store)? {
            let parent_element = if rec.parent == NO_PARENT {
                None
            } else {
                Some(self.nodes.get(store, rec.parent)?.element_id)
            };
            out.push(NodeSnapshot {
                element_id: rec.element_id,
                level: rec.level,
                parent_element,
            });
        }
        Ok(out)
    }

    fn walk<S: SlotStore>(&self, store: &S) -> Result<Vec<(u32, NodeRecord)>> {
        let mut out = Vec::new();
        if self.root_idx == NO_PARENT {
            return Ok(out);
        }
        let mut stack: SmallVec<[u32; 16]> = smallvec![self.root_idx];
        while let Some(node_idx) = stack.pop() {
            if self.free_nodes.contains(store, node_idx)? {
                continue;
            }
            let node = self.nodes.get(store, node_idx)?;
            stack.extend(DynArray::<u32>::open(node.children).read_all(store)?);
            out.push((node_idx, node));
        }
        Ok(out)
    }

    /// Allocates a node slot, reusing a freed one when available. The reused
    /// slot keeps its children array slot but starts with an empty list.
    fn allocate_node<S: SlotStore>(
        &mut self,
        store: &mut S,
        element_id: u32,
        level: u32,
    ) -> Result<u32> {
        if let Some(node_idx) = self.free_nodes.pop(store)? {
            let old = self.nodes.get(&*store, node_idx)?;
            DynArray::<u32>::open(old.children).clear(store)?;
            self.nodes.set(
                store,
                node_idx,
                &NodeRecord {
                    element_id,
                    level,
                    parent: NO_PARENT,
                    children: old.children,
                },
            )?;
            Ok(node_idx)
        } else {
            let children = DynArray::<u32>::create(store)?;
            self.nodes.push(
                store,
                &NodeRecord {
                    element_id,
                    level,
                    parent: NO_PARENT,
                    children: children.slot(),
                },
            )
        }
    }

    fn set_parent<S: SlotStore>(&self, store: &mut S, node_idx: u32, parent: u32) -> Result<()> {
        let mut rec = self.nodes.get(&*store, node_idx)?;
        rec.parent = parent;
        self.nodes.set(store, node_idx, &rec)
    }

    fn push_child<S: SlotStore>(&self, store: &mut S, parent_idx: u32, child_idx: u32) -> Result<()> {
        let rec = self.nodes.get(&*store, parent_idx)?;
        DynArray::<u32>::open(rec.children).push(store, &child_idx)?;
        Ok(())
    }

    fn remove_child<S: SlotStore>(
        &self,
        store: &mut S,
        parent_idx: u32,
        child_idx: u32,
    ) -> Result<()> {
        let rec = self.nodes.get(&*store, parent_idx)?;
        let children = DynArray::<u32>::open(rec.children);
        let items = children.read_all(&*store)?;
        if let Some(pos) = items.iter().position(|&c| c == child_idx) {
            children.remove_at(
                store,
                u32::try_from(pos).unwrap_or(u32::MAX), // position < len, always fits
            )?;
        }
        Ok(())
    }
}
