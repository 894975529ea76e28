//! Identity-compared node handles.

use crate::change::Notification;
use crate::node::{NodeId, NodeKind};
use crate::observer::Subject;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

pub(crate) struct NodeInner {
    id: NodeId,
    kind: Arc<NodeKind>,
    subject: Subject<Notification>,
    initializing: AtomicBool,
}

/// A handle to a node.
///
/// Handles are cheap to clone and compare by identity: two handles are equal
/// only if they refer to the same node, whatever the node's state. The
/// engine holds nodes weakly, so a node lives as long as some caller keeps
/// a handle to it.
#[derive(Clone)]
pub struct NodeRef(Arc<NodeInner>);

impl NodeRef {
    pub(crate) fn new(kind: Arc<NodeKind>) -> Self {
        Self(Arc::new(NodeInner {
            id: NodeId::new(),
            kind,
            subject: Subject::new(),
            initializing: AtomicBool::new(false),
        }))
    }

    /// Returns the node's ID.
    #[must_use]
    pub fn id(&self) -> NodeId {
        self.0.id
    }

    /// Returns the node's kind.
    #[must_use]
    pub fn kind(&self) -> &Arc<NodeKind> {
        &self.0.kind
    }

    /// Returns the subject external observers register with.
    ///
    /// The subject only receives actions once they are published.
    #[must_use]
    pub fn subject(&self) -> &Subject<Notification> {
        &self.0.subject
    }

    /// Returns `true` while the node's initialization closure runs.
    #[must_use]
    pub fn is_initializing(&self) -> bool {
        self.0.initializing.load(Ordering::Acquire)
    }

    pub(crate) fn set_initializing(&self, value: bool) {
        self.0.initializing.store(value, Ordering::Release);
    }

    pub(crate) fn downgrade(&self) -> WeakNode {
        WeakNode(Arc::downgrade(&self.0))
    }
}

impl PartialEq for NodeRef {
    fn eq(&self, other: &Self) -> bool {
        self.0.id == other.0.id
    }
}

impl Eq for NodeRef {}

impl Hash for NodeRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.0.id.hash(state);
    }
}

impl fmt::Debug for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<{} {}>", self.0.kind.name(), self.0.id)
    }
}

impl fmt::Display for NodeRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

/// A non-owning link to a node.
#[derive(Clone)]
pub(crate) struct WeakNode(Weak<NodeInner>);

impl WeakNode {
    /// Returns the node if some handle to it is still alive.
    pub(crate) fn upgrade(&self) -> Option<NodeRef> {
        self.0.upgrade().map(NodeRef)
    }

    pub(crate) fn is_dead(&self) -> bool {
        self.0.strong_count() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn kind() -> Arc<NodeKind> {
        NodeKind::builder("Plain").build()
    }

    #[test]
    fn equality_is_identity() {
        let kind = kind();
        let a = NodeRef::new(Arc::clone(&kind));
        let b = NodeRef::new(kind);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);

        let set: HashSet<_> = [a.clone(), a.clone(), b].into_iter().collect();
        assert_eq!(set.len(), 2);
    }

    #[test]
    fn weak_link_does_not_own() {
        let node = NodeRef::new(kind());
        let weak = node.downgrade();
        assert_eq!(weak.upgrade(), Some(node.clone()));

        drop(node);
        assert!(weak.is_dead());
        assert!(weak.upgrade().is_none());
    }

    #[test]
    fn initializing_flag() {
        let node = NodeRef::new(kind());
        assert!(!node.is_initializing());
        node.set_initializing(true);
        assert!(node.is_initializing());
    }
}
