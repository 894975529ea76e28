//! The application: the store, its lock and its transaction contexts.

use crate::change::{Action, Change, Notification};
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::history::HistoryHandle;
use crate::node::{NodeId, NodeKind, NodeRef, WeakNode};
use crate::observer::{ObserversFailed, RefusedNotification};
use crate::payload::{Metadata, Payload};
use crate::stats::AppStats;
use crate::store::{Snapshot, Storage, StoreRecord};
use crate::transaction::hierarchy::HierarchyTracker;
use crate::transaction::log::{Commit, CommitLog};
use crate::transaction::{CommitKind, ReadContext, Write, WriteContext};
use crate::types::{Phase, SequenceNumber};
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};
use std::cell::RefCell;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Initial contents of a node.
#[derive(Debug, Clone)]
pub struct NodeInit {
    state: Payload,
    data: Option<Payload>,
    history: Option<HistoryHandle>,
}

impl NodeInit {
    /// Creates initial contents with `state`, no data and no history.
    pub fn new(state: Payload) -> Self {
        Self {
            state,
            data: None,
            history: None,
        }
    }

    /// Sets the initial data.
    #[must_use]
    pub fn data(mut self, data: Payload) -> Self {
        self.data = Some(data);
        self
    }

    /// Gives the node its own history. The node becomes its own history
    /// provider, and the provider of every node it later adopts as a
    /// history adopter.
    #[must_use]
    pub fn history(mut self, history: HistoryHandle) -> Self {
        self.history = Some(history);
        self
    }
}

/// Engine state guarded by the application lock.
pub(crate) struct Internals {
    storage: Arc<Storage>,
    registry: HashMap<NodeId, WeakNode>,
    roots: HashSet<NodeId>,
    pub(crate) commits: CommitLog,
    pub(crate) hierarchy: HierarchyTracker,
    pub(crate) reading: usize,
    pub(crate) writing: usize,
    sequence: SequenceNumber,
}

impl Internals {
    fn new() -> Self {
        Self {
            storage: Arc::new(Storage::new()),
            registry: HashMap::new(),
            roots: HashSet::new(),
            commits: CommitLog::new(),
            hierarchy: HierarchyTracker::new(),
            reading: 0,
            writing: 0,
            sequence: SequenceNumber::default(),
        }
    }

    /// Returns the latest record of `id`, uncommitted writes first.
    pub(crate) fn read(&self, id: NodeId) -> Option<&StoreRecord> {
        self.commits.lookup(id).or_else(|| self.storage.get(&id))
    }

    /// Returns the node with `id` if some handle to it is still alive.
    pub(crate) fn resolve(&self, id: NodeId) -> Option<NodeRef> {
        self.registry.get(&id).and_then(WeakNode::upgrade)
    }

    pub(crate) fn is_root(&self, id: NodeId) -> bool {
        self.roots.contains(&id)
    }
}

#[derive(Clone, Copy)]
enum Depth {
    Reading,
    Writing,
}

/// Keeps the read or write depth raised for its lifetime.
struct DepthGuard<'a> {
    app: &'a Application,
    depth: Depth,
}

impl<'a> DepthGuard<'a> {
    fn enter(app: &'a Application, depth: Depth) -> Self {
        app.with_internals_mut(|internals| match depth {
            Depth::Reading => internals.reading += 1,
            Depth::Writing => internals.writing += 1,
        });
        Self { app, depth }
    }
}

impl Drop for DepthGuard<'_> {
    fn drop(&mut self) {
        self.app.with_internals_mut(|internals| match self.depth {
            Depth::Reading => internals.reading -= 1,
            Depth::Writing => internals.writing -= 1,
        });
    }
}

/// A graph of versioned nodes and the transactions that change it.
///
/// All contexts are serialized by one re-entrant lock: a thread that holds
/// it may open nested contexts (reactions do), other threads block until
/// the outermost context returns. [`Snapshot`]s can be read without the lock.
///
/// # Example
///
/// ```rust,ignore
/// let app = Application::new();
/// let kind = NodeKind::builder("Counter").build();
/// let node = app.init_node(&kind, NodeInit::new(Payload::new(0_i64)))?;
///
/// app.write_context(|tx| {
///     tx.write(&node, Write::new(Payload::new(1_i64), Change::new("Increment")))
/// })?;
/// ```
pub struct Application {
    config: Config,
    stats: AppStats,
    inner: ReentrantMutex<RefCell<Internals>>,
}

impl Application {
    /// Creates an application with the default configuration.
    pub fn new() -> Self {
        Self::with_config(Config::default())
    }

    /// Creates an application with `config`.
    pub fn with_config(config: Config) -> Self {
        Self {
            config,
            stats: AppStats::new(),
            inner: ReentrantMutex::new(RefCell::new(Internals::new())),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Returns the label used in log events.
    pub fn label(&self) -> &str {
        &self.config.label
    }

    /// Returns the statistics counters.
    pub fn stats(&self) -> &AppStats {
        &self.stats
    }

    pub(crate) fn lock(&self) -> ReentrantMutexGuard<'_, RefCell<Internals>> {
        self.inner.lock()
    }

    /// Runs `f` with shared access to the internals. `f` must not call back
    /// into user code.
    pub(crate) fn with_internals<R>(&self, f: impl FnOnce(&Internals) -> R) -> R {
        let guard = self.inner.lock();
        let internals = guard.borrow();
        f(&internals)
    }

    /// Runs `f` with exclusive access to the internals. `f` must not call
    /// back into user code.
    pub(crate) fn with_internals_mut<R>(&self, f: impl FnOnce(&mut Internals) -> R) -> R {
        let guard = self.inner.lock();
        let mut internals = guard.borrow_mut();
        f(&mut internals)
    }

    pub(crate) fn record_stat(&self, f: impl FnOnce(&AppStats)) {
        if self.config.collect_stats {
            f(&self.stats);
        }
    }

    /// Initializes a node of `kind`.
    pub fn init_node(&self, kind: &Arc<NodeKind>, init: NodeInit) -> CoreResult<NodeRef> {
        self.init_node_with(kind, init, |_, _| Ok(()))
    }

    /// Initializes a node of `kind`, then runs `f` with the node flagged as
    /// initializing.
    ///
    /// While `f` runs, writes to the node are not batched into its history
    /// and the node itself cannot be adopted or released. If `f` fails, the
    /// node's record is discarded with everything else `f` wrote.
    pub fn init_node_with<F>(
        &self,
        kind: &Arc<NodeKind>,
        init: NodeInit,
        f: F,
    ) -> CoreResult<NodeRef>
    where
        F: FnOnce(&WriteContext<'_>, &NodeRef) -> CoreResult<()>,
    {
        self.write_context(|tx| {
            let node = NodeRef::new(Arc::clone(kind));
            self.insert_initial(&node, init, false);
            node.set_initializing(true);
            let result = f(tx, &node);
            node.set_initializing(false);
            result.map(|()| node)
        })
    }

    /// Initializes a root node. Roots can never be parented.
    pub fn init_root(&self, kind: &Arc<NodeKind>, init: NodeInit) -> CoreResult<NodeRef> {
        self.write_context(|_| {
            let node = NodeRef::new(Arc::clone(kind));
            self.insert_initial(&node, init, true);
            Ok(node)
        })
    }

    fn insert_initial(&self, node: &NodeRef, init: NodeInit, root: bool) {
        let NodeInit {
            state,
            data,
            history,
        } = init;
        let mut record = StoreRecord::new(state, data);
        if let Some(history) = history {
            record = record
                .with_history(Some(history))
                .with_history_provider(Some(node.id()));
        }

        self.with_internals_mut(|internals| {
            internals.registry.insert(node.id(), node.downgrade());
            if root {
                internals.roots.insert(node.id());
            }
            let mut stores = HashMap::new();
            stores.insert(node.id(), record);
            internals.commits.push(Commit::change(Vec::new(), stores));
        });
        trace!(app = %self.label(), node = %node.id(), root, "initialized node");
    }

    /// Reads the latest record of `node`.
    ///
    /// Inside a write context this includes uncommitted writes.
    pub fn read(&self, node: &NodeRef) -> CoreResult<StoreRecord> {
        self.with_internals(|internals| internals.read(node.id()).cloned())
            .ok_or(CoreError::InvalidReference { node: node.id() })
    }

    /// Returns the parent of `node`, if it has a live one.
    pub fn parent_of(&self, node: &NodeRef) -> CoreResult<Option<NodeRef>> {
        let parent = self.read(node)?.parent();
        Ok(parent.and_then(|id| self.with_internals(|internals| internals.resolve(id))))
    }

    /// Returns the live children of `node`.
    pub fn children_of(&self, node: &NodeRef) -> CoreResult<Vec<NodeRef>> {
        let record = self.read(node)?;
        Ok(self.with_internals(|internals| {
            record
                .children()
                .iter()
                .filter_map(|id| internals.resolve(*id))
                .collect()
        }))
    }

    /// Runs `f` in a read context. Writes fail while it runs.
    pub fn read_context<R, F>(&self, f: F) -> CoreResult<R>
    where
        F: FnOnce(&ReadContext<'_>) -> CoreResult<R>,
    {
        let _lock = self.lock();
        let _depth = DepthGuard::enter(self, Depth::Reading);
        f(&ReadContext::new(self))
    }

    /// Runs `f` in a write context.
    ///
    /// Nested contexts join the enclosing transaction. If `f` fails, every
    /// commit it appended is discarded and the error is returned. When the
    /// outermost context succeeds, its commits are merged into the store and
    /// published to observers.
    ///
    /// # Errors
    ///
    /// - [`CoreError::Context`] when called inside a read context.
    /// - [`CoreError::MisplacedRejection`] when a rejection reaches the
    ///   outermost context without meeting the writer of its change.
    /// - [`CoreError::ObserversFailed`] when observers failed during
    ///   publish. The store is already updated.
    pub fn write_context<R, F>(&self, f: F) -> CoreResult<R>
    where
        F: FnOnce(&WriteContext<'_>) -> CoreResult<R>,
    {
        let _lock = self.lock();
        let (topmost, index) = self.with_internals(|internals| {
            if internals.reading > 0 {
                return Err(CoreError::context(
                    "can't enter a write context while in a read context",
                ));
            }
            Ok((internals.writing == 0, internals.commits.len()))
        })?;

        let depth = DepthGuard::enter(self, Depth::Writing);
        let result = match f(&WriteContext::new(self)) {
            Ok(value) if topmost => self.push().map(|()| value),
            Ok(value) => Ok(value),
            Err(err) => {
                self.revert(index);
                match err {
                    CoreError::Rejected(rejection) if topmost => {
                        debug!(
                            app = %self.label(),
                            change = %rejection.change(),
                            "rejection escaped its writer"
                        );
                        Err(CoreError::MisplacedRejection {
                            change: rejection.change(),
                        })
                    }
                    err => Err(err),
                }
            }
        };
        drop(depth);

        if topmost {
            debug_assert!(self.with_internals(|internals| {
                internals.hierarchy.is_idle() && internals.commits.is_empty()
            }));
        }
        result
    }

    /// Runs `f` in a write context, then discards its writes.
    ///
    /// `f` observes its own writes through the context; nothing is published.
    /// Nested inside another write context, the discard sentinel
    /// ([`CoreError::Temporary`]) propagates and the enclosing transaction
    /// fails unless an outer temporary context catches it.
    pub fn temporary_context<R, F>(&self, f: F) -> CoreResult<R>
    where
        F: FnOnce(&WriteContext<'_>) -> CoreResult<R>,
    {
        let _lock = self.lock();
        let topmost = !self.is_writing();
        let mut value = None;
        let result = self.write_context(|tx| {
            value = Some(f(tx)?);
            Err::<(), _>(CoreError::Temporary)
        });
        match result {
            Err(CoreError::Temporary) if topmost => {}
            Err(err) => return Err(err),
            Ok(()) => {}
        }
        value.ok_or_else(|| CoreError::context("temporary context produced no value"))
    }

    /// Runs `f` as one batch change on `node`, in a write context.
    ///
    /// Returns `None` if a reaction rejected the batch.
    pub fn batch_context<R, F>(&self, node: &NodeRef, change: Change, f: F) -> CoreResult<Option<R>>
    where
        F: FnOnce(&WriteContext<'_>) -> CoreResult<R>,
    {
        self.write_context(|tx| tx.batch(node, change, f))
    }

    /// Writes `node` in its own write context.
    pub fn write(&self, node: &NodeRef, write: Write) -> CoreResult<()> {
        self.write_context(|tx| tx.write(node, write))
    }

    /// Merges `update` into the metadata of `node`.
    pub fn update_metadata(&self, node: &NodeRef, update: Metadata) -> CoreResult<()> {
        self.write_context(|tx| tx.update_metadata(node, update))
    }

    /// Takes an immutable snapshot of the store.
    ///
    /// Inside a write context the snapshot includes uncommitted writes.
    pub fn take_snapshot(&self) -> Snapshot {
        self.with_internals(|internals| {
            if internals.commits.is_empty() {
                return Snapshot::new(Arc::clone(&internals.storage), internals.sequence);
            }
            let mut storage = Storage::clone(&internals.storage);
            for commit in internals.commits.iter() {
                for (id, record) in commit.stores() {
                    storage.insert(*id, record.clone());
                }
            }
            Snapshot::new(Arc::new(storage), internals.sequence)
        })
    }

    /// Returns `true` inside a read context, including while publishing.
    pub fn is_reading(&self) -> bool {
        self.with_internals(|internals| internals.reading > 0)
    }

    /// Returns `true` inside a write context.
    pub fn is_writing(&self) -> bool {
        self.with_internals(|internals| internals.writing > 0)
    }

    /// Returns the sequence number of the last publish.
    pub fn sequence(&self) -> SequenceNumber {
        self.with_internals(|internals| internals.sequence)
    }

    /// Drops the records of nodes whose handles were all dropped.
    ///
    /// Returns how many records were removed.
    ///
    /// # Errors
    ///
    /// Fails with [`CoreError::Context`] inside a read or write context.
    pub fn prune(&self) -> CoreResult<usize> {
        let _lock = self.lock();
        let pruned = self.with_internals_mut(|internals| {
            if internals.reading > 0 || internals.writing > 0 {
                return Err(CoreError::context("can't prune inside a context"));
            }
            let dead: Vec<NodeId> = internals
                .registry
                .iter()
                .filter(|(_, node)| node.is_dead())
                .map(|(id, _)| *id)
                .collect();
            for id in &dead {
                internals.registry.remove(id);
                internals.roots.remove(id);
            }
            if !dead.iter().any(|id| internals.storage.contains_key(id)) {
                return Ok(0);
            }
            let storage = Arc::make_mut(&mut internals.storage);
            Ok(dead.iter().filter(|id| storage.remove(id).is_some()).count())
        })?;
        if pruned > 0 {
            debug!(app = %self.label(), pruned, "pruned records");
        }
        Ok(pruned)
    }

    /// Merges the commit log into the store and publishes every action.
    fn push(&self) -> CoreResult<()> {
        let commits = self.with_internals_mut(|internals| internals.commits.take());
        if commits.is_empty() {
            return Ok(());
        }
        let _reading = DepthGuard::enter(self, Depth::Reading);
        let count = commits.len() as u64;

        let mut failed = ObserversFailed::default();
        for commit in commits {
            match commit.kind() {
                CommitKind::Batch(phase) => self.publish(commit.actions(), phase, &mut failed),
                CommitKind::Change => {
                    let (actions, stores) = commit.into_parts();
                    self.publish(&actions, Phase::Pre, &mut failed);
                    self.with_internals_mut(|internals| {
                        Arc::make_mut(&mut internals.storage).extend(stores);
                    });
                    self.publish(&actions, Phase::Post, &mut failed);
                }
            }
        }

        let sequence = self.with_internals_mut(|internals| {
            internals.sequence = internals.sequence.next();
            internals.sequence
        });
        self.record_stat(|stats| stats.record_push(count));
        debug!(app = %self.label(), commits = count, %sequence, "pushed commits");

        if failed.is_empty() {
            return Ok(());
        }
        self.record_stat(|stats| stats.record_observer_failures(failed.len() as u64));
        Err(CoreError::ObserversFailed(failed))
    }

    /// Sends one notification per action and collects what failed.
    fn publish(&self, actions: &[Action], phase: Phase, failed: &mut ObserversFailed) {
        for action in actions {
            let notification = Notification {
                action: action.clone(),
                phase,
            };
            let sent = match action.receiver().subject().send(notification.clone()) {
                Ok(sent) => sent,
                Err(error) => {
                    if self.config.log_observer_failures {
                        warn!(
                            app = %self.label(),
                            node = %action.receiver().id(),
                            %phase,
                            %error,
                            "subject refused notification"
                        );
                    }
                    failed.refused.push(RefusedNotification {
                        notification,
                        error,
                    });
                    continue;
                }
            };
            if self.config.log_observer_failures {
                for failure in &sent {
                    warn!(
                        app = %self.label(),
                        node = %action.receiver().id(),
                        observer = %failure.observer,
                        %phase,
                        error = %failure.error,
                        "observer failed"
                    );
                }
            }
            failed.failures.extend(sent);
        }
    }
}

impl Default for Application {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for Application {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Application")
            .field("label", &self.config.label)
            .field("sequence", &self.sequence())
            .finish_non_exhaustive()
    }
}
