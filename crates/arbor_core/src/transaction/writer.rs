//! The write and batch algorithms.

use crate::application::{Application, Internals};
use crate::change::{Action, Change, ChildDelta};
use crate::error::{CoreError, CoreResult};
use crate::history::HistoryHandle;
use crate::node::{Location, NodeId, NodeRef};
use crate::payload::{same_payload, Metadata, Payload};
use crate::reaction::{react, Rejection};
use crate::store::StoreRecord;
use crate::transaction::hierarchy::{check_parenting, HierarchyGuard};
use crate::transaction::log::Commit;
use crate::transaction::{Write, WriteContext};
use crate::types::Phase;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::debug;

/// Actions along a locked path, with the location of each hop's child.
struct Route {
    actions: Vec<Action>,
    hops: Vec<Option<Location>>,
}

impl Application {
    pub(crate) fn write_node(&self, node: &NodeRef, write: Write) -> CoreResult<()> {
        let _lock = self.lock();
        let index = self.with_internals_mut(|internals| {
            check_writable(internals)?;
            if !internals.hierarchy.begin_write(node.id()) {
                return Err(CoreError::ReentrantWrite { node: node.id() });
            }
            Ok(internals.commits.len())
        })?;
        self.record_stat(|stats| stats.record_write());

        let Write {
            state,
            data,
            metadata,
            child_delta,
            change,
        } = write;
        let change = Arc::new(change);
        let result = self.write_locked(node, state, data, metadata, &child_delta, &change);
        self.with_internals_mut(|internals| internals.hierarchy.end_write(node.id()));

        match result {
            Ok(()) => Ok(()),
            Err(CoreError::Rejected(rejection)) if rejection.change() == change.id() => {
                self.compensate(index, rejection)
            }
            Err(err) => {
                self.revert(index);
                Err(err)
            }
        }
    }

    fn write_locked(
        &self,
        node: &NodeRef,
        state: Payload,
        data: Option<Payload>,
        metadata: Option<Metadata>,
        delta: &ChildDelta,
        change: &Arc<Change>,
    ) -> CoreResult<()> {
        let hierarchy = HierarchyGuard::lock_upward(self, node)?;
        let path = hierarchy.nodes();
        self.with_internals(|internals| check_parenting(internals, node, path, delta))?;
        let _adopted = HierarchyGuard::lock_nodes(self, delta.adopted().cloned().collect());

        let (history, provider) = self.resolve_history(node)?;
        let atomic_batch = match &history {
            Some(history)
                if !node.is_initializing() && !history.is_executing() && !history.in_batch() =>
            {
                let batch = Arc::new(Change::atomic_batch(change));
                history.enter_batch(&batch)?;
                Some(batch)
            }
            _ => None,
        };

        let result = self.write_phases(
            node,
            path,
            state,
            data,
            metadata,
            delta,
            change,
            history.as_ref(),
            provider.as_ref(),
        );

        let exited = match (&history, &atomic_batch) {
            (Some(history), Some(batch)) => history.exit_batch(batch),
            _ => Ok(()),
        };
        result.and(exited)
    }

    #[allow(clippy::too_many_arguments)]
    fn write_phases(
        &self,
        node: &NodeRef,
        path: &[NodeRef],
        state: Payload,
        data: Option<Payload>,
        metadata: Option<Metadata>,
        delta: &ChildDelta,
        change: &Arc<Change>,
        history: Option<&HistoryHandle>,
        provider: Option<&NodeRef>,
    ) -> CoreResult<()> {
        let route = self.route(node, path, change, true)?;

        // Histories a new child or an adopter stops reporting to.
        let mut to_flush: Vec<HistoryHandle> = Vec::new();
        let mut moved_children = HashSet::new();
        for child in delta.adopted() {
            let last = self
                .read(child)?
                .last_parent_history()
                .and_then(|weak| weak.upgrade());
            if !same_history(last.as_ref(), history) {
                if let Some(last) = last {
                    push_unique(&mut to_flush, last);
                }
                moved_children.insert(child.id());
            }
        }
        let mut adopters = Vec::new();
        for adopter in change.history_adopters() {
            if self.read(adopter)?.history().is_some() {
                continue;
            }
            let (old, _) = self.resolve_history(adopter)?;
            if !same_history(old.as_ref(), history) {
                if let Some(old) = old {
                    push_unique(&mut to_flush, old);
                }
            }
            adopters.push(adopter.clone());
        }
        for stale in &to_flush {
            stale.flush()?;
        }

        let mut stores: HashMap<NodeId, StoreRecord> = HashMap::new();
        let old = self.read(node)?;
        let data_changed = !same_payload(data.as_ref(), old.data());
        let metadata = metadata.unwrap_or_else(|| old.metadata().clone());
        let mut record = old.with_contents(state, data.clone(), metadata);

        for child in delta.released() {
            record = record.without_child(child.id());
            stores.insert(child.id(), self.read(child)?.with_parent(None));
        }
        for child in delta.adopted() {
            record = record.with_child(child.id());
            let mut child_record = self.read(child)?.with_parent(Some(node.id()));
            if moved_children.contains(&child.id()) {
                child_record =
                    child_record.with_last_parent_history(history.map(HistoryHandle::downgrade));
            }
            stores.insert(child.id(), child_record);
        }
        stores.insert(node.id(), record);

        for adopter in &adopters {
            let current = match stores.get(&adopter.id()) {
                Some(record) => record.clone(),
                None => self.read(adopter)?,
            };
            stores.insert(
                adopter.id(),
                current.with_history_provider(Some(node.id())),
            );
        }

        if data_changed {
            if let Some(data) = data {
                self.project_data(path, &route.hops, data, &mut stores)?;
            }
        }

        self.with_internals_mut(|internals| {
            internals
                .commits
                .push(Commit::change(route.actions.clone(), stores));
        });

        if let (Some(history), Some(provider)) = (history, provider) {
            if !node.is_initializing() && !provider.is_initializing() {
                history.push_change(change)?;
            }
        }

        for action in &route.actions {
            react(self, action.receiver(), action, Phase::Post)?;
        }
        Ok(())
    }

    /// Recomputes ancestors' data from the written node's new data.
    fn project_data(
        &self,
        path: &[NodeRef],
        hops: &[Option<Location>],
        data: Payload,
        stores: &mut HashMap<NodeId, StoreRecord>,
    ) -> CoreResult<()> {
        let mut child_data = data;
        for (parent, hop) in path.iter().zip(hops).skip(1) {
            let (Some(projection), Some(location)) = (parent.kind().data_projection(), hop)
            else {
                break;
            };
            let parent_old = match stores.get(&parent.id()) {
                Some(record) => record.clone(),
                None => self.read(parent)?,
            };
            let Some(parent_data) = projection(&parent_old, location, &child_data) else {
                break;
            };
            if parent_old.data().is_some_and(|old| old.ptr_eq(&parent_data)) {
                break;
            }
            stores.insert(parent.id(), parent_old.with_data(Some(parent_data.clone())));
            child_data = parent_data;
        }
        Ok(())
    }

    /// Builds one action per node of `path`, leaf first. With `pre_react`,
    /// each receiver's PRE reactions run as soon as its action exists.
    fn route(
        &self,
        sender: &NodeRef,
        path: &[NodeRef],
        change: &Arc<Change>,
        pre_react: bool,
    ) -> CoreResult<Route> {
        let mut actions = Vec::with_capacity(path.len());
        let mut hops = Vec::with_capacity(path.len());
        let mut locations: Vec<Location> = Vec::new();
        let mut child: Option<&NodeRef> = None;

        for receiver in path {
            match child {
                Some(child) => {
                    let location = receiver.kind().locate(&self.read(receiver)?, child);
                    locations.insert(0, location.clone());
                    hops.push(Some(location));
                }
                None => hops.push(None),
            }
            let action = Action::new(
                sender.clone(),
                receiver.clone(),
                locations.clone(),
                Arc::clone(change),
            );
            if pre_react {
                react(self, receiver, &action, Phase::Pre)?;
            }
            actions.push(action);
            child = Some(receiver);
        }
        Ok(Route { actions, hops })
    }

    /// Returns the history `node` reports to and the node that owns it.
    pub(crate) fn resolve_history(
        &self,
        node: &NodeRef,
    ) -> CoreResult<(Option<HistoryHandle>, Option<NodeRef>)> {
        let mut visited = HashSet::new();
        let mut current = node.clone();
        loop {
            if !visited.insert(current.id()) {
                return Ok((None, None));
            }
            let record = self.read(&current)?;
            if let Some(history) = record.history() {
                return Ok((Some(history.clone()), Some(current)));
            }
            match record
                .history_provider()
                .and_then(|id| self.with_internals(|internals| internals.resolve(id)))
            {
                Some(provider) => current = provider,
                None => return Ok((None, None)),
            }
        }
    }

    pub(crate) fn update_metadata_in_context(
        &self,
        node: &NodeRef,
        update: Metadata,
    ) -> CoreResult<()> {
        let _lock = self.lock();
        self.with_internals(check_writable)?;
        let record = self.read(node)?.with_metadata_update(update);
        self.with_internals_mut(|internals| {
            let mut stores = HashMap::new();
            stores.insert(node.id(), record);
            internals.commits.push(Commit::change(Vec::new(), stores));
            Ok(())
        })
    }

    pub(crate) fn batch_in_context<R, F>(
        &self,
        node: &NodeRef,
        change: Change,
        f: F,
    ) -> CoreResult<Option<R>>
    where
        F: FnOnce(&WriteContext<'_>) -> CoreResult<R>,
    {
        let _lock = self.lock();
        let index = self.with_internals(|internals| {
            check_writable(internals)?;
            Ok(internals.commits.len())
        })?;
        self.record_stat(|stats| stats.record_batch());

        let change = Arc::new(change);
        match self.batch_locked(node, &change, f) {
            Ok(value) => Ok(Some(value)),
            Err(CoreError::Rejected(rejection)) if rejection.change() == change.id() => {
                self.compensate(index, rejection).map(|()| None)
            }
            Err(err) => {
                self.revert(index);
                Err(err)
            }
        }
    }

    fn batch_locked<R, F>(&self, node: &NodeRef, change: &Arc<Change>, f: F) -> CoreResult<R>
    where
        F: FnOnce(&WriteContext<'_>) -> CoreResult<R>,
    {
        let hierarchy = HierarchyGuard::lock_upward(self, node)?;
        let (history, provider) = self.resolve_history(node)?;
        let route = self.route(node, hierarchy.nodes(), change, false)?;

        self.with_internals_mut(|internals| {
            internals
                .commits
                .push(Commit::batch(route.actions.clone(), Phase::Pre));
        });

        let history = match (history, provider) {
            (Some(history), Some(provider))
                if !node.is_initializing() && !provider.is_initializing() =>
            {
                history.enter_batch(change)?;
                Some(history)
            }
            _ => None,
        };

        let result = route
            .actions
            .iter()
            .try_for_each(|action| react(self, action.receiver(), action, Phase::Pre))
            .and_then(|()| f(&WriteContext::new(self)));

        let result = match &history {
            Some(history) => {
                let exited = history.exit_batch(change);
                result.and_then(|value| exited.map(|()| value))
            }
            None => result,
        };
        let value = result?;

        for action in &route.actions {
            react(self, action.receiver(), action, Phase::Post)?;
        }
        self.with_internals_mut(|internals| {
            internals
                .commits
                .push(Commit::batch(route.actions, Phase::Post));
        });
        Ok(value)
    }

    /// Reverts to `index`, then runs the rejection's callback.
    fn compensate(&self, index: usize, rejection: Rejection) -> CoreResult<()> {
        self.revert(index);
        self.record_stat(|stats| stats.record_rejection());
        debug!(
            app = %self.label(),
            change = %rejection.change(),
            index,
            "change rejected"
        );
        (rejection.into_callback())(self)
    }

    /// Discards every commit at or after `index`.
    pub(crate) fn revert(&self, index: usize) {
        let discarded = self.with_internals_mut(|internals| internals.commits.revert(index));
        if discarded > 0 {
            self.record_stat(|stats| stats.record_revert());
            debug!(app = %self.label(), index, discarded, "reverted commits");
        }
    }
}

/// Fails unless a write context is open and no read context is.
fn check_writable(internals: &Internals) -> CoreResult<()> {
    if internals.reading > 0 {
        return Err(CoreError::context("can't write while reading"));
    }
    if internals.writing == 0 {
        return Err(CoreError::context("writes need an open write context"));
    }
    Ok(())
}

fn same_history(a: Option<&HistoryHandle>, b: Option<&HistoryHandle>) -> bool {
    match (a, b) {
        (Some(a), Some(b)) => a.ptr_eq(b),
        (None, None) => true,
        _ => false,
    }
}

fn push_unique(histories: &mut Vec<HistoryHandle>, history: HistoryHandle) {
    if !histories.iter().any(|h| h.ptr_eq(&history)) {
        histories.push(history);
    }
}
