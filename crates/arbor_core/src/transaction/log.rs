//! The commit log of the outermost write transaction.

use crate::change::Action;
use crate::node::NodeId;
use crate::store::StoreRecord;
use crate::types::Phase;
use std::collections::HashMap;

/// What a commit represents.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitKind {
    /// One write and the records it produced.
    Change,
    /// A batch boundary marker. Carries no records.
    Batch(Phase),
}

/// An ordered group of actions and the records they produced.
#[derive(Debug, Clone)]
pub(crate) struct Commit {
    kind: CommitKind,
    actions: Vec<Action>,
    stores: HashMap<NodeId, StoreRecord>,
}

impl Commit {
    /// Creates a commit for one write.
    pub(crate) fn change(actions: Vec<Action>, stores: HashMap<NodeId, StoreRecord>) -> Self {
        Self {
            kind: CommitKind::Change,
            actions,
            stores,
        }
    }

    /// Creates a batch boundary marker.
    pub(crate) fn batch(actions: Vec<Action>, phase: Phase) -> Self {
        Self {
            kind: CommitKind::Batch(phase),
            actions,
            stores: HashMap::new(),
        }
    }

    pub(crate) fn kind(&self) -> CommitKind {
        self.kind
    }

    pub(crate) fn actions(&self) -> &[Action] {
        &self.actions
    }

    pub(crate) fn stores(&self) -> &HashMap<NodeId, StoreRecord> {
        &self.stores
    }

    pub(crate) fn into_parts(self) -> (Vec<Action>, HashMap<NodeId, StoreRecord>) {
        (self.actions, self.stores)
    }
}

/// Commits appended since the outermost write context opened.
///
/// Each commit holds only the records its own step produced, so reverting
/// is a truncation and reads search the log newest first.
#[derive(Debug, Default)]
pub(crate) struct CommitLog {
    commits: Vec<Commit>,
}

impl CommitLog {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn len(&self) -> usize {
        self.commits.len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.commits.is_empty()
    }

    pub(crate) fn push(&mut self, commit: Commit) {
        self.commits.push(commit);
    }

    /// Discards every commit at or after `index`. Returns how many were
    /// discarded.
    pub(crate) fn revert(&mut self, index: usize) -> usize {
        let discarded = self.commits.len().saturating_sub(index);
        self.commits.truncate(index);
        discarded
    }

    /// Returns the newest uncommitted record of `id`, if any.
    pub(crate) fn lookup(&self, id: NodeId) -> Option<&StoreRecord> {
        self.commits
            .iter()
            .rev()
            .find_map(|commit| commit.stores.get(&id))
    }

    /// Removes and returns every commit, oldest first.
    pub(crate) fn take(&mut self) -> Vec<Commit> {
        std::mem::take(&mut self.commits)
    }

    pub(crate) fn iter(&self) -> impl Iterator<Item = &Commit> {
        self.commits.iter()
    }

    pub(crate) fn kinds(&self) -> Vec<CommitKind> {
        self.commits.iter().map(Commit::kind).collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::Payload;

    fn commit_for(id: NodeId, value: i32) -> Commit {
        let mut stores = HashMap::new();
        stores.insert(id, StoreRecord::new(Payload::new(value), None));
        Commit::change(Vec::new(), stores)
    }

    fn value(record: &StoreRecord) -> i32 {
        *record.state().downcast_ref::<i32>().unwrap()
    }

    #[test]
    fn lookup_prefers_newest() {
        let id = NodeId::new();
        let mut log = CommitLog::new();
        log.push(commit_for(id, 1));
        log.push(Commit::batch(Vec::new(), Phase::Pre));
        log.push(commit_for(id, 2));

        assert_eq!(value(log.lookup(id).unwrap()), 2);
        assert!(log.lookup(NodeId::new()).is_none());
    }

    #[test]
    fn revert_truncates_tail() {
        let id = NodeId::new();
        let mut log = CommitLog::new();
        log.push(commit_for(id, 1));
        log.push(commit_for(id, 2));
        log.push(commit_for(id, 3));

        assert_eq!(log.revert(1), 2);
        assert_eq!(log.len(), 1);
        assert_eq!(value(log.lookup(id).unwrap()), 1);
        assert_eq!(log.revert(5), 0);
    }

    #[test]
    fn take_empties_log() {
        let mut log = CommitLog::new();
        log.push(Commit::batch(Vec::new(), Phase::Pre));
        log.push(commit_for(NodeId::new(), 0));
        log.push(Commit::batch(Vec::new(), Phase::Post));

        assert_eq!(
            log.kinds(),
            vec![
                CommitKind::Batch(Phase::Pre),
                CommitKind::Change,
                CommitKind::Batch(Phase::Post)
            ]
        );
        let commits = log.take();
        assert_eq!(commits.len(), 3);
        assert!(log.is_empty());
    }
}
