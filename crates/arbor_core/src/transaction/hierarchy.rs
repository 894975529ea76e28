//! Hierarchy locking and structural pre-checks.
//!
//! Every write locks the path from the written node up to its root by
//! incrementing a busy count on each node of the path. A node with a
//! non-zero busy count cannot be adopted or released by another write.

use crate::application::{Application, Internals};
use crate::change::ChildDelta;
use crate::error::{CoreError, CoreResult};
use crate::node::{NodeId, NodeRef};
use std::collections::{HashMap, HashSet};
use tracing::trace;

/// Busy counts and in-progress writes.
#[derive(Debug, Default)]
pub(crate) struct HierarchyTracker {
    busy: HashMap<NodeId, usize>,
    writing: HashSet<NodeId>,
}

impl HierarchyTracker {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn lock(&mut self, id: NodeId) {
        *self.busy.entry(id).or_insert(0) += 1;
    }

    pub(crate) fn release(&mut self, id: NodeId) {
        if let Some(count) = self.busy.get_mut(&id) {
            *count -= 1;
            if *count == 0 {
                self.busy.remove(&id);
            }
        }
    }

    pub(crate) fn is_busy(&self, id: NodeId) -> bool {
        self.busy.contains_key(&id)
    }

    /// Marks `id` as mid-write. Returns `false` if it already was.
    pub(crate) fn begin_write(&mut self, id: NodeId) -> bool {
        self.writing.insert(id)
    }

    pub(crate) fn end_write(&mut self, id: NodeId) {
        self.writing.remove(&id);
    }

    /// Returns `true` when nothing is locked and nothing is being written.
    pub(crate) fn is_idle(&self) -> bool {
        self.busy.is_empty() && self.writing.is_empty()
    }
}

/// Holds busy counts on a set of nodes until dropped.
pub(crate) struct HierarchyGuard<'a> {
    app: &'a Application,
    nodes: Vec<NodeRef>,
}

impl<'a> HierarchyGuard<'a> {
    /// Locks `node` and every ancestor, leaf first.
    ///
    /// A parent link to a node whose handles were all dropped ends the walk.
    pub(crate) fn lock_upward(app: &'a Application, node: &NodeRef) -> CoreResult<Self> {
        let nodes = app.with_internals_mut(|internals| {
            let mut nodes = Vec::new();
            let mut current = Some(node.clone());
            while let Some(n) = current {
                let record = internals
                    .read(n.id())
                    .ok_or(CoreError::InvalidReference { node: n.id() })?;
                current = record.parent().and_then(|id| internals.resolve(id));
                nodes.push(n);
            }
            for n in &nodes {
                internals.hierarchy.lock(n.id());
            }
            Ok::<_, CoreError>(nodes)
        })?;
        trace!(
            app = %app.label(),
            node = %node.id(),
            depth = nodes.len(),
            "locked hierarchy"
        );
        Ok(Self { app, nodes })
    }

    /// Locks exactly `nodes`.
    pub(crate) fn lock_nodes(app: &'a Application, nodes: Vec<NodeRef>) -> Self {
        app.with_internals_mut(|internals| {
            for n in &nodes {
                internals.hierarchy.lock(n.id());
            }
        });
        Self { app, nodes }
    }

    /// Returns the locked nodes. For an upward lock, index 0 is the written
    /// node and the last entry is its root.
    pub(crate) fn nodes(&self) -> &[NodeRef] {
        &self.nodes
    }
}

impl Drop for HierarchyGuard<'_> {
    fn drop(&mut self) {
        self.app.with_internals_mut(|internals| {
            for n in &self.nodes {
                internals.hierarchy.release(n.id());
            }
        });
    }
}

/// Validates a write's child delta before anything is mutated.
///
/// `path` is the locked hierarchy of `node`, leaf first.
pub(crate) fn check_parenting(
    internals: &Internals,
    node: &NodeRef,
    path: &[NodeRef],
    delta: &ChildDelta,
) -> CoreResult<()> {
    for (child, count) in delta.iter() {
        if child.kind().is_history() {
            return Err(CoreError::structural(format!(
                "{child} is a history object and can't be parented to other nodes"
            )));
        }
        if internals.is_root(child.id()) {
            return Err(CoreError::structural(format!(
                "{child} is a root and can't be parented"
            )));
        }
        if count == 1 && path.contains(child) {
            return Err(CoreError::structural(format!(
                "parent cycle between {child} and {node}"
            )));
        }
        if internals.hierarchy.is_busy(child.id()) {
            return Err(CoreError::HierarchyLocked { node: child.id() });
        }
        if child.is_initializing() {
            return Err(CoreError::structural(format!(
                "can't change parent for {child} while it is initializing"
            )));
        }
        match count {
            1 => {
                let record = internals
                    .read(child.id())
                    .ok_or(CoreError::InvalidReference { node: child.id() })?;
                if let Some(parent) = record.parent().and_then(|id| internals.resolve(id)) {
                    return Err(CoreError::structural(format!(
                        "{child} is already parented to {parent}, can't parent it to {node}"
                    )));
                }
            }
            -1 => {
                let record = internals
                    .read(node.id())
                    .ok_or(CoreError::InvalidReference { node: node.id() })?;
                if !record.has_child(child.id()) {
                    return Err(CoreError::structural(format!(
                        "{child} is not a child of {node}"
                    )));
                }
            }
            n if n > 1 => {
                return Err(CoreError::structural(format!(
                    "{child} can't be parented to {node} more than once"
                )));
            }
            _ => {
                return Err(CoreError::structural(format!(
                    "{child} can't be released from {node} more than once"
                )));
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn busy_counts_nest() {
        let id = NodeId::new();
        let mut tracker = HierarchyTracker::new();
        tracker.lock(id);
        tracker.lock(id);
        tracker.release(id);
        assert!(tracker.is_busy(id));
        tracker.release(id);
        assert!(!tracker.is_busy(id));
        assert!(tracker.is_idle());
    }

    #[test]
    fn write_marks_are_exclusive() {
        let id = NodeId::new();
        let mut tracker = HierarchyTracker::new();
        assert!(tracker.begin_write(id));
        assert!(!tracker.begin_write(id));
        assert!(!tracker.is_idle());
        tracker.end_write(id);
        assert!(tracker.begin_write(id));
    }

    #[test]
    fn release_of_unlocked_node_is_ignored() {
        let mut tracker = HierarchyTracker::new();
        tracker.release(NodeId::new());
        assert!(tracker.is_idle());
    }
}
