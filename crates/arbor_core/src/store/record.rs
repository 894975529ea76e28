//! Versioned per-node records.

use crate::history::{HistoryHandle, WeakHistory};
use crate::node::NodeId;
use crate::payload::{Metadata, Payload};
use std::collections::BTreeSet;

/// The payload held for one node at one point in time.
///
/// Records are immutable: every write produces a new record through the
/// `with_*` methods and replaces the old one wholesale. Links to other nodes
/// are weak and stored by ID.
#[derive(Debug, Clone, PartialEq)]
pub struct StoreRecord {
    state: Payload,
    data: Option<Payload>,
    metadata: Metadata,
    parent: Option<NodeId>,
    history_provider: Option<NodeId>,
    last_parent_history: Option<WeakHistory>,
    history: Option<HistoryHandle>,
    children: BTreeSet<NodeId>,
}

impl StoreRecord {
    /// Creates the initial record of a node: no parent, no children.
    #[must_use]
    pub fn new(state: Payload, data: Option<Payload>) -> Self {
        Self {
            state,
            data,
            metadata: Metadata::new(),
            parent: None,
            history_provider: None,
            last_parent_history: None,
            history: None,
            children: BTreeSet::new(),
        }
    }

    /// Returns the state.
    #[must_use]
    pub fn state(&self) -> &Payload {
        &self.state
    }

    /// Returns the derived data, if any.
    #[must_use]
    pub fn data(&self) -> Option<&Payload> {
        self.data.as_ref()
    }

    /// Returns the metadata.
    #[must_use]
    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    /// Returns the parent link.
    #[must_use]
    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    /// Returns the link to the node that provides this node's history.
    #[must_use]
    pub fn history_provider(&self) -> Option<NodeId> {
        self.history_provider
    }

    /// Returns the history this node reported to when it was last parented.
    #[must_use]
    pub fn last_parent_history(&self) -> Option<&WeakHistory> {
        self.last_parent_history.as_ref()
    }

    /// Returns the history owned by this node.
    #[must_use]
    pub fn history(&self) -> Option<&HistoryHandle> {
        self.history.as_ref()
    }

    /// Returns the children.
    #[must_use]
    pub fn children(&self) -> &BTreeSet<NodeId> {
        &self.children
    }

    /// Returns `true` if `child` is a recorded child.
    #[must_use]
    pub fn has_child(&self, child: NodeId) -> bool {
        self.children.contains(&child)
    }

    /// Returns a copy with new state, data and metadata.
    #[must_use]
    pub fn with_contents(&self, state: Payload, data: Option<Payload>, metadata: Metadata) -> Self {
        Self {
            state,
            data,
            metadata,
            ..self.clone()
        }
    }

    /// Returns a copy with new data.
    #[must_use]
    pub fn with_data(&self, data: Option<Payload>) -> Self {
        Self {
            data,
            ..self.clone()
        }
    }

    /// Returns a copy with `update` merged into the metadata.
    #[must_use]
    pub fn with_metadata_update(&self, update: Metadata) -> Self {
        let mut record = self.clone();
        record.metadata.extend(update);
        record
    }

    /// Returns a copy with a new parent link.
    #[must_use]
    pub fn with_parent(&self, parent: Option<NodeId>) -> Self {
        Self {
            parent,
            ..self.clone()
        }
    }

    /// Returns a copy with a new history provider link.
    #[must_use]
    pub fn with_history_provider(&self, provider: Option<NodeId>) -> Self {
        Self {
            history_provider: provider,
            ..self.clone()
        }
    }

    /// Returns a copy with a new last-parent-history link.
    #[must_use]
    pub fn with_last_parent_history(&self, history: Option<WeakHistory>) -> Self {
        Self {
            last_parent_history: history,
            ..self.clone()
        }
    }

    /// Returns a copy that owns `history`.
    #[must_use]
    pub fn with_history(&self, history: Option<HistoryHandle>) -> Self {
        Self {
            history,
            ..self.clone()
        }
    }

    /// Returns a copy with `child` added to the children.
    #[must_use]
    pub fn with_child(&self, child: NodeId) -> Self {
        let mut record = self.clone();
        record.children.insert(child);
        record
    }

    /// Returns a copy with `child` removed from the children.
    #[must_use]
    pub fn without_child(&self, child: NodeId) -> Self {
        let mut record = self.clone();
        record.children.remove(&child);
        record
    }
}
