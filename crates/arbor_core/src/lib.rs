//! # Arbor Core
//!
//! Transaction engine for hierarchies of versioned nodes.
//!
//! This crate provides:
//! - A store of immutable, per-node records with snapshot reads
//! - Nested, re-entrant write transactions with prefix rollback
//! - Parent/child integrity (single parent, no cycles, hierarchy locking)
//! - Priority-ordered PRE/POST reactions along each node's hierarchy
//! - Change rejection with compensating callbacks
//! - Undo/redo history integration through the [`History`] trait
//! - Publication of committed actions to weakly held observers
//!
//! The attribute and container layer that gives node state its meaning is
//! not part of this crate: states, data and metadata are opaque
//! [`Payload`]s.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod application;
mod change;
mod config;
mod error;
mod history;
mod node;
mod observer;
mod payload;
mod reaction;
mod stats;
mod store;
mod transaction;
mod types;

pub use application::{Application, NodeInit};
pub use change::{Action, Change, ChangeKind, ChildDelta, Notification};
pub use config::Config;
pub use error::{CoreError, CoreResult};
pub use history::{History, HistoryHandle, WeakHistory};
pub use node::{DataProjection, Location, Locator, NodeId, NodeKind, NodeKindBuilder, NodeRef};
pub use observer::{
    Observer, ObserverError, ObserverFailure, ObserverToken, ObserversFailed, RefusedNotification,
    Subject,
};
pub use payload::{Metadata, Payload};
pub use reaction::{reject, Compensation, Reaction, ReactionFn, Rejection};
pub use stats::{AppStats, StatsSnapshot};
pub use store::{Snapshot, StoreRecord};
pub use transaction::{CommitKind, ReadContext, Write, WriteContext};
pub use types::{ChangeId, ObserverId, Phase, SequenceNumber};
