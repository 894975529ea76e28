//! Changes, child deltas and the actions that carry them up a hierarchy.

use crate::node::{Location, NodeRef};
use crate::payload::{Metadata, Payload};
use crate::types::{ChangeId, Phase};
use std::sync::Arc;

/// Kind of change.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    /// A single write to one node.
    Atomic,
    /// A span of writes treated as one unit by reactions and history.
    Batch,
}

/// Description of a change, supplied by the type layer.
///
/// The engine only reads the structural contract: the name, the old and new
/// state, the children released and adopted, and the nodes that adopt the
/// writer's history. Changes are identified by [`ChangeId`], never by value.
#[derive(Debug, Clone)]
pub struct Change {
    id: ChangeId,
    name: String,
    kind: ChangeKind,
    old_state: Option<Payload>,
    new_state: Option<Payload>,
    old_children: Vec<NodeRef>,
    new_children: Vec<NodeRef>,
    history_adopters: Vec<NodeRef>,
    atomic: Option<Arc<Change>>,
    metadata: Metadata,
}

impl Change {
    /// Creates an atomic change.
    pub fn new(name: impl Into<String>) -> Self {
        Self::of_kind(name, ChangeKind::Atomic)
    }

    /// Creates a batch change.
    pub fn batch(name: impl Into<String>) -> Self {
        Self::of_kind(name, ChangeKind::Batch)
    }

    fn of_kind(name: impl Into<String>, kind: ChangeKind) -> Self {
        Self {
            id: ChangeId::next(),
            name: name.into(),
            kind,
            old_state: None,
            new_state: None,
            old_children: Vec::new(),
            new_children: Vec::new(),
            history_adopters: Vec::new(),
            atomic: None,
            metadata: Metadata::new(),
        }
    }

    /// Creates the implicit single-change batch wrapping `change`.
    pub(crate) fn atomic_batch(change: &Arc<Change>) -> Self {
        let mut batch = Self::batch(change.name.clone());
        batch.atomic = Some(Arc::clone(change));
        batch
    }

    /// Sets the state before the change.
    #[must_use]
    pub fn with_old_state(mut self, state: Payload) -> Self {
        self.old_state = Some(state);
        self
    }

    /// Sets the state after the change.
    #[must_use]
    pub fn with_new_state(mut self, state: Payload) -> Self {
        self.new_state = Some(state);
        self
    }

    /// Sets the children released by the change.
    #[must_use]
    pub fn with_old_children(mut self, children: impl IntoIterator<Item = NodeRef>) -> Self {
        self.old_children = children.into_iter().collect();
        self
    }

    /// Sets the children adopted by the change.
    #[must_use]
    pub fn with_new_children(mut self, children: impl IntoIterator<Item = NodeRef>) -> Self {
        self.new_children = children.into_iter().collect();
        self
    }

    /// Sets the nodes whose history provider becomes the writing node.
    #[must_use]
    pub fn with_history_adopters(mut self, adopters: impl IntoIterator<Item = NodeRef>) -> Self {
        self.history_adopters = adopters.into_iter().collect();
        self
    }

    /// Attaches a metadata entry.
    #[must_use]
    pub fn with_metadata(mut self, key: impl Into<String>, value: Payload) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// Returns the change ID.
    #[must_use]
    pub fn id(&self) -> ChangeId {
        self.id
    }

    /// Returns the human-readable name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the change kind.
    #[must_use]
    pub fn kind(&self) -> ChangeKind {
        self.kind
    }

    /// Returns the state before the change.
    #[must_use]
    pub fn old_state(&self) -> Option<&Payload> {
        self.old_state.as_ref()
    }

    /// Returns the state after the change.
    #[must_use]
    pub fn new_state(&self) -> Option<&Payload> {
        self.new_state.as_ref()
    }

    /// Returns the children released by the change.
    #[must_use]
    pub fn old_children(&self) -> &[NodeRef] {
        &self.old_children
    }

    /// Returns the children adopted by the change.
    #[must_use]
    pub fn new_children(&self) -> &[NodeRef] {
        &self.new_children
    }

    /// Returns the history adopters.
    #[must_use]
    pub fn history_adopters(&self) -> &[NodeRef] {
        &self.history_adopters
    }

    /// Returns the metadata.
    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Returns the change wrapped by an implicit single-change batch.
    #[must_use]
    pub fn atomic_change(&self) -> Option<&Arc<Change>> {
        self.atomic.as_ref()
    }

    /// Returns `true` if this is the implicit batch around one atomic write.
    #[must_use]
    pub fn is_atomic_batch(&self) -> bool {
        self.atomic.is_some()
    }
}

/// Net parenting operations requested by a write.
///
/// Each node carries a count: `+1` adopts it, `-1` releases it, `0` is a
/// no-op. Any other count is a structural error reported by the writer.
#[derive(Debug, Clone, Default)]
pub struct ChildDelta {
    counts: Vec<(NodeRef, i32)>,
}

impl ChildDelta {
    /// Creates an empty delta.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds the delta described by a change's old and new children.
    #[must_use]
    pub fn from_change(change: &Change) -> Self {
        let mut delta = Self::new();
        for child in &change.old_children {
            delta.add(child, -1);
        }
        for child in &change.new_children {
            delta.add(child, 1);
        }
        delta
    }

    /// Adds one adoption of `child`.
    #[must_use]
    pub fn adopt(mut self, child: &NodeRef) -> Self {
        self.add(child, 1);
        self
    }

    /// Adds one release of `child`.
    #[must_use]
    pub fn release(mut self, child: &NodeRef) -> Self {
        self.add(child, -1);
        self
    }

    /// Adds `count` to the count of `child`.
    pub fn add(&mut self, child: &NodeRef, count: i32) {
        match self.counts.iter_mut().find(|(node, _)| node == child) {
            Some((_, existing)) => *existing += count,
            None => self.counts.push((child.clone(), count)),
        }
    }

    /// Returns the count of `child`.
    #[must_use]
    pub fn count(&self, child: &NodeRef) -> i32 {
        self.counts
            .iter()
            .find(|(node, _)| node == child)
            .map_or(0, |(_, count)| *count)
    }

    /// Iterates over nodes with a non-zero count, in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&NodeRef, i32)> {
        self.counts
            .iter()
            .filter(|(_, count)| *count != 0)
            .map(|(node, count)| (node, *count))
    }

    /// Iterates over adopted nodes.
    pub fn adopted(&self) -> impl Iterator<Item = &NodeRef> {
        self.iter()
            .filter(|(_, count)| *count == 1)
            .map(|(node, _)| node)
    }

    /// Iterates over released nodes.
    pub fn released(&self) -> impl Iterator<Item = &NodeRef> {
        self.iter()
            .filter(|(_, count)| *count == -1)
            .map(|(node, _)| node)
    }

    /// Returns `true` if no node has a non-zero count.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.iter().next().is_none()
    }
}

/// One hop of a change travelling up the hierarchy.
#[derive(Debug, Clone)]
pub struct Action {
    sender: NodeRef,
    receiver: NodeRef,
    locations: Vec<Location>,
    change: Arc<Change>,
}

impl Action {
    pub(crate) fn new(
        sender: NodeRef,
        receiver: NodeRef,
        locations: Vec<Location>,
        change: Arc<Change>,
    ) -> Self {
        Self {
            sender,
            receiver,
            locations,
            change,
        }
    }

    /// Returns the node where the change happened.
    #[must_use]
    pub fn sender(&self) -> &NodeRef {
        &self.sender
    }

    /// Returns the node currently seeing the action.
    #[must_use]
    pub fn receiver(&self) -> &NodeRef {
        &self.receiver
    }

    /// Returns the path of locations from the receiver down to the sender.
    ///
    /// Empty when the receiver is the sender.
    #[must_use]
    pub fn locations(&self) -> &[Location] {
        &self.locations
    }

    /// Returns the change.
    #[must_use]
    pub fn change(&self) -> &Arc<Change> {
        &self.change
    }

    /// Returns `true` if the receiver is the node that changed.
    #[must_use]
    pub fn is_local(&self) -> bool {
        self.sender == self.receiver
    }
}

/// Payload sent to a node's external observers when a commit is published.
#[derive(Debug, Clone)]
pub struct Notification {
    /// The action, with the observed node as receiver.
    pub action: Action,
    /// The phase relative to the commit.
    pub phase: Phase,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::NodeKind;

    fn node() -> NodeRef {
        NodeRef::new(NodeKind::builder("Plain").build())
    }

    #[test]
    fn changes_get_distinct_ids() {
        let a = Change::new("Update");
        let b = Change::new("Update");
        assert_ne!(a.id(), b.id());
        assert_eq!(a.kind(), ChangeKind::Atomic);
        assert_eq!(Change::batch("Batch").kind(), ChangeKind::Batch);
    }

    #[test]
    fn atomic_batch_wraps_change() {
        let change = Arc::new(Change::new("Set value"));
        let batch = Change::atomic_batch(&change);
        assert_eq!(batch.name(), "Set value");
        assert_eq!(batch.kind(), ChangeKind::Batch);
        assert_eq!(batch.atomic_change().map(|c| c.id()), Some(change.id()));
    }

    #[test]
    fn delta_counts_net_operations() {
        let a = node();
        let b = node();
        let delta = ChildDelta::new().adopt(&a).release(&b).adopt(&b);

        assert_eq!(delta.count(&a), 1);
        assert_eq!(delta.count(&b), 0);
        assert_eq!(delta.adopted().cloned().collect::<Vec<_>>(), vec![a]);
        assert_eq!(delta.released().count(), 0);
    }

    #[test]
    fn delta_from_change() {
        let a = node();
        let b = node();
        let change = Change::new("Swap")
            .with_old_children([a.clone()])
            .with_new_children([b.clone()]);
        let delta = ChildDelta::from_change(&change);

        assert_eq!(delta.count(&a), -1);
        assert_eq!(delta.count(&b), 1);
        assert!(!delta.is_empty());
        assert!(ChildDelta::new().is_empty());
    }
}
