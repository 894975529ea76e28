//! Transactions over the node store.
//!
//! A write transaction is a closure run inside [`Application::write_context`].
//! Contexts nest on the same thread and share one commit log:
//!
//! - every write locks its node's hierarchy, validates its child delta,
//!   runs PRE reactions, appends one commit and runs POST reactions;
//! - any failure reverts the log to where the failing scope began, so
//!   rollback always discards a tail of the log, never an interior commit;
//! - when the outermost context succeeds, the log is merged into the store
//!   and every action is published to its receiver's observers.
//!
//! [`Application::write_context`]: crate::Application::write_context

mod context;
pub(crate) mod hierarchy;
pub(crate) mod log;
mod writer;

pub use context::{ReadContext, Write, WriteContext};
pub use log::CommitKind;
