//! Error types for Arbor core.

use crate::node::NodeId;
use crate::observer::ObserversFailed;
use crate::reaction::Rejection;
use crate::types::ChangeId;
use thiserror::Error;

/// Result type for core operations.
pub type CoreResult<T> = Result<T, CoreError>;

/// Errors that can occur in Arbor core operations.
#[derive(Debug, Error)]
pub enum CoreError {
    /// Node has no record in the store.
    #[error("node {node} is not known to the store")]
    InvalidReference {
        /// The node that was looked up.
        node: NodeId,
    },

    /// Illegal nesting of read and write contexts.
    #[error("context error: {message}")]
    Context {
        /// Description of the violation.
        message: String,
    },

    /// The node's hierarchy is locked by a write in progress.
    #[error("can't change parent for {node} while its hierarchy is locked")]
    HierarchyLocked {
        /// The node whose parent change was refused.
        node: NodeId,
    },

    /// A parent/child invariant would be violated.
    #[error("structural integrity: {message}")]
    StructuralIntegrity {
        /// Description of the violation.
        message: String,
    },

    /// The node is already being written further up the call stack.
    #[error("reaction cycle detected: {node} is already being written")]
    ReentrantWrite {
        /// The node being written twice.
        node: NodeId,
    },

    /// A reaction rejected a change.
    ///
    /// This is a control-flow signal: the writer that owns the change
    /// reverts its work and runs the compensating callback.
    #[error("{0}")]
    Rejected(Rejection),

    /// A rejection escaped the writer that owns the rejected change.
    #[error(
        "change {change} was rejected but the rejection was not returned through the \
         writer that owns it"
    )]
    MisplacedRejection {
        /// The change that was rejected.
        change: ChangeId,
    },

    /// One or more observers failed while the commit was published.
    #[error("{0}")]
    ObserversFailed(ObserversFailed),

    /// Subject or observer token misuse.
    #[error("observer error: {message}")]
    Observer {
        /// Description of the misuse.
        message: String,
    },

    /// A history object refused an operation.
    #[error("history error: {message}")]
    History {
        /// Description of the failure.
        message: String,
    },

    /// A reaction failed.
    #[error("reaction failed: {message}")]
    Reaction {
        /// Description of the failure.
        message: String,
    },

    /// Sentinel used by temporary contexts to discard their writes.
    #[error("temporary write context discarded")]
    Temporary,
}

impl CoreError {
    /// Creates a context error.
    pub fn context(message: impl Into<String>) -> Self {
        Self::Context {
            message: message.into(),
        }
    }

    /// Creates a structural integrity error.
    pub fn structural(message: impl Into<String>) -> Self {
        Self::StructuralIntegrity {
            message: message.into(),
        }
    }

    /// Creates an observer error.
    pub fn observer(message: impl Into<String>) -> Self {
        Self::Observer {
            message: message.into(),
        }
    }

    /// Creates a history error.
    pub fn history(message: impl Into<String>) -> Self {
        Self::History {
            message: message.into(),
        }
    }

    /// Creates a reaction error.
    pub fn reaction(message: impl Into<String>) -> Self {
        Self::Reaction {
            message: message.into(),
        }
    }

    /// Returns `true` for the structural errors reported before any mutation.
    #[must_use]
    pub fn is_structural(&self) -> bool {
        matches!(
            self,
            Self::StructuralIntegrity { .. } | Self::HierarchyLocked { .. }
        )
    }

    /// Returns the rejection carried by this error, if any.
    #[must_use]
    pub fn as_rejection(&self) -> Option<&Rejection> {
        match self {
            Self::Rejected(rejection) => Some(rejection),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn structural_errors_are_flagged() {
        assert!(CoreError::structural("cycle").is_structural());
        assert!(CoreError::HierarchyLocked {
            node: NodeId::new()
        }
        .is_structural());
        assert!(!CoreError::context("reading").is_structural());
    }

    #[test]
    fn messages_include_details() {
        let err = CoreError::structural("parent cycle between a and b");
        assert_eq!(
            err.to_string(),
            "structural integrity: parent cycle between a and b"
        );

        let change = ChangeId::next();
        let err = CoreError::MisplacedRejection { change };
        assert!(err.to_string().contains(&change.to_string()));
    }
}
