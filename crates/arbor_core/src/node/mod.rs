//! Nodes: identities, handles and kinds.

mod handle;
mod id;
mod kind;

pub(crate) use handle::WeakNode;
pub use handle::NodeRef;
pub use id::NodeId;
pub use kind::{DataProjection, Location, Locator, NodeKind, NodeKindBuilder};
