//! Scoped read and write handles.

use crate::application::Application;
use crate::change::{Change, ChildDelta};
use crate::error::CoreResult;
use crate::node::NodeRef;
use crate::payload::{Metadata, Payload};
use crate::store::StoreRecord;
use crate::transaction::CommitKind;

/// One write to a node: its new contents and the change describing it.
#[derive(Debug, Clone)]
pub struct Write {
    pub(crate) state: Payload,
    pub(crate) data: Option<Payload>,
    pub(crate) metadata: Option<Metadata>,
    pub(crate) child_delta: ChildDelta,
    pub(crate) change: Change,
}

impl Write {
    /// Creates a write of `state`.
    ///
    /// The child delta defaults to the one described by the change's old
    /// and new children. Data is cleared and metadata kept unless set.
    pub fn new(state: Payload, change: Change) -> Self {
        Self {
            state,
            data: None,
            metadata: None,
            child_delta: ChildDelta::from_change(&change),
            change,
        }
    }

    /// Sets the derived data.
    #[must_use]
    pub fn data(mut self, data: Payload) -> Self {
        self.data = Some(data);
        self
    }

    /// Replaces the metadata.
    #[must_use]
    pub fn metadata(mut self, metadata: Metadata) -> Self {
        self.metadata = Some(metadata);
        self
    }

    /// Overrides the child delta.
    #[must_use]
    pub fn child_delta(mut self, delta: ChildDelta) -> Self {
        self.child_delta = delta;
        self
    }

    /// Returns the change.
    #[must_use]
    pub fn change(&self) -> &Change {
        &self.change
    }
}

/// Handle passed to read context closures.
#[derive(Debug, Clone, Copy)]
pub struct ReadContext<'a> {
    app: &'a Application,
}

impl<'a> ReadContext<'a> {
    pub(crate) fn new(app: &'a Application) -> Self {
        Self { app }
    }

    /// Reads the latest record of `node`.
    pub fn read(&self, node: &NodeRef) -> CoreResult<StoreRecord> {
        self.app.read(node)
    }

    /// Returns the parent of `node`, if it has a live one.
    pub fn parent_of(&self, node: &NodeRef) -> CoreResult<Option<NodeRef>> {
        self.app.parent_of(node)
    }

    /// Returns the application.
    #[must_use]
    pub fn app(&self) -> &'a Application {
        self.app
    }
}

/// Handle passed to write context closures.
///
/// Every write made through the handle joins the enclosing transaction: it
/// is published when the outermost write context succeeds and discarded if
/// any enclosing context fails.
#[derive(Debug, Clone, Copy)]
pub struct WriteContext<'a> {
    app: &'a Application,
}

impl<'a> WriteContext<'a> {
    pub(crate) fn new(app: &'a Application) -> Self {
        Self { app }
    }

    /// Reads the latest record of `node`, including uncommitted writes.
    pub fn read(&self, node: &NodeRef) -> CoreResult<StoreRecord> {
        self.app.read(node)
    }

    /// Returns the parent of `node`, if it has a live one.
    pub fn parent_of(&self, node: &NodeRef) -> CoreResult<Option<NodeRef>> {
        self.app.parent_of(node)
    }

    /// Writes `node`.
    ///
    /// Returns `Ok` when a reaction rejected this write's own change: the
    /// write was reverted and the compensating callback ran.
    ///
    /// # Errors
    ///
    /// - [`ReentrantWrite`](crate::CoreError::ReentrantWrite) if `node` is
    ///   already being written further up the call stack.
    /// - [`StructuralIntegrity`](crate::CoreError::StructuralIntegrity) or
    ///   [`HierarchyLocked`](crate::CoreError::HierarchyLocked) if the child
    ///   delta is invalid. Nothing is written.
    /// - Any error returned by a reaction or by the history.
    pub fn write(&self, node: &NodeRef, write: Write) -> CoreResult<()> {
        self.app.write_node(node, write)
    }

    /// Merges `update` into the metadata of `node`. Produces no actions.
    pub fn update_metadata(&self, node: &NodeRef, update: Metadata) -> CoreResult<()> {
        self.app.update_metadata_in_context(node, update)
    }

    /// Runs `f` as one batch change on `node`.
    ///
    /// Returns `None` if a reaction rejected the batch.
    pub fn batch<R, F>(&self, node: &NodeRef, change: Change, f: F) -> CoreResult<Option<R>>
    where
        F: FnOnce(&WriteContext<'_>) -> CoreResult<R>,
    {
        self.app.batch_in_context(node, change, f)
    }

    /// Returns the kinds of the commits appended so far, oldest first.
    #[must_use]
    pub fn commit_kinds(&self) -> Vec<CommitKind> {
        self.app.with_internals(|internals| internals.commits.kinds())
    }

    /// Returns the application.
    #[must_use]
    pub fn app(&self) -> &'a Application {
        self.app
    }
}
