//! Published storage and immutable snapshots of it.

use crate::error::{CoreError, CoreResult};
use crate::node::{NodeId, NodeRef};
use crate::store::StoreRecord;
use crate::types::SequenceNumber;
use std::collections::HashMap;
use std::sync::Arc;

/// Published records by node.
pub(crate) type Storage = HashMap<NodeId, StoreRecord>;

/// An immutable view of the store at one point in time.
///
/// Snapshots share structure with the store they were taken from and never
/// observe later writes. They can be read from any thread without taking
/// the application lock.
#[derive(Debug, Clone)]
pub struct Snapshot {
    records: Arc<Storage>,
    sequence: SequenceNumber,
}

impl Snapshot {
    pub(crate) fn new(records: Arc<Storage>, sequence: SequenceNumber) -> Self {
        Self { records, sequence }
    }

    /// Returns the record of `node` as of this snapshot.
    pub fn read(&self, node: &NodeRef) -> CoreResult<StoreRecord> {
        self.get(node.id())
            .cloned()
            .ok_or(CoreError::InvalidReference { node: node.id() })
    }

    /// Returns the record stored under `id`, if any.
    #[must_use]
    pub fn get(&self, id: NodeId) -> Option<&StoreRecord> {
        self.records.get(&id)
    }

    /// Returns `true` if the snapshot holds a record for `id`.
    #[must_use]
    pub fn contains(&self, id: NodeId) -> bool {
        self.records.contains_key(&id)
    }

    /// Returns the number of records.
    #[must_use]
    pub fn len(&self) -> usize {
        self.records.len()
    }

    /// Returns `true` if the snapshot holds no records.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Returns the publish sequence the snapshot was taken at.
    #[must_use]
    pub fn sequence(&self) -> SequenceNumber {
        self.sequence
    }

    /// Iterates over all records.
    pub fn iter(&self) -> impl Iterator<Item = (&NodeId, &StoreRecord)> {
        self.records.iter()
    }
}

impl PartialEq for Snapshot {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.records, &other.records) || *self.records == *other.records
    }
}
