//! Undo/redo history integration.
//!
//! The engine does not implement an undo stack. It drives a [`History`]
//! collaborator: every atomic write is wrapped in a single-change batch
//! unless a wider batch is already open, changes are pushed as they commit,
//! and histories a node stops reporting to are flushed.

use crate::change::Change;
use crate::error::CoreResult;
use std::fmt;
use std::sync::{Arc, Weak};

/// An undo/redo history driven by the engine.
pub trait History: Send + Sync {
    /// Opens a batch; changes pushed until the matching exit belong to it.
    fn enter_batch(&self, batch: &Arc<Change>) -> CoreResult<()>;

    /// Closes the batch opened by [`History::enter_batch`].
    fn exit_batch(&self, batch: &Arc<Change>) -> CoreResult<()>;

    /// Records a committed change.
    fn push_change(&self, change: &Arc<Change>) -> CoreResult<()>;

    /// Discards all recorded changes.
    fn flush(&self) -> CoreResult<()>;

    /// Returns `true` while an undo or redo is executing.
    fn is_executing(&self) -> bool;

    /// Returns `true` while a batch is open.
    fn in_batch(&self) -> bool;
}

/// Shared handle to a history, compared by identity.
#[derive(Clone)]
pub struct HistoryHandle(Arc<dyn History>);

impl HistoryHandle {
    /// Wraps a history.
    pub fn new<H: History + 'static>(history: H) -> Self {
        Self(Arc::new(history))
    }

    /// Wraps an already shared history.
    pub fn from_arc(history: Arc<dyn History>) -> Self {
        Self(history)
    }

    /// Returns `true` if both handles refer to the same history.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }

    pub(crate) fn downgrade(&self) -> WeakHistory {
        WeakHistory(Arc::downgrade(&self.0))
    }
}

impl std::ops::Deref for HistoryHandle {
    type Target = dyn History;

    fn deref(&self) -> &Self::Target {
        &*self.0
    }
}

impl PartialEq for HistoryHandle {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl fmt::Debug for HistoryHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "History({:p})", Arc::as_ptr(&self.0).cast::<()>())
    }
}

/// A non-owning link to a history.
#[derive(Clone)]
pub struct WeakHistory(Weak<dyn History>);

impl WeakHistory {
    /// Returns the history if it is still alive.
    #[must_use]
    pub fn upgrade(&self) -> Option<HistoryHandle> {
        self.0.upgrade().map(HistoryHandle)
    }

    /// Returns `true` if this link points at `history`.
    #[must_use]
    pub fn points_to(&self, history: &HistoryHandle) -> bool {
        self.upgrade().is_some_and(|h| h.ptr_eq(history))
    }
}

impl PartialEq for WeakHistory {
    fn eq(&self, other: &Self) -> bool {
        Weak::ptr_eq(&self.0, &other.0)
    }
}

impl fmt::Debug for WeakHistory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.upgrade() {
            Some(history) => write!(f, "Weak({history:?})"),
            None => f.write_str("Weak(<dead>)"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Inert;

    impl History for Inert {
        fn enter_batch(&self, _: &Arc<Change>) -> CoreResult<()> {
            Ok(())
        }
        fn exit_batch(&self, _: &Arc<Change>) -> CoreResult<()> {
            Ok(())
        }
        fn push_change(&self, _: &Arc<Change>) -> CoreResult<()> {
            Ok(())
        }
        fn flush(&self) -> CoreResult<()> {
            Ok(())
        }
        fn is_executing(&self) -> bool {
            false
        }
        fn in_batch(&self) -> bool {
            false
        }
    }

    #[test]
    fn handles_compare_by_identity() {
        let a = HistoryHandle::new(Inert);
        let b = HistoryHandle::new(Inert);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn weak_link_reads_dead_as_absent() {
        let a = HistoryHandle::new(Inert);
        let weak = a.downgrade();
        assert!(weak.points_to(&a));
        drop(a);
        assert!(weak.upgrade().is_none());
    }
}
