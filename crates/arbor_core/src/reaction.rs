//! Reactions and the pipeline that dispatches them.
//!
//! Reactions are type-level callbacks. While a write walks its locked
//! hierarchy, every receiver runs its kind's reactions once in the PRE
//! phase, before the new records enter the commit log, and once in the POST
//! phase, after. A reaction may reject the change it is reacting to by
//! returning [`CoreError::Rejected`]; the writer that owns the change then
//! reverts its own work and runs the compensating callback.

use crate::application::Application;
use crate::change::{Action, Change};
use crate::error::{CoreError, CoreResult};
use crate::node::NodeRef;
use crate::types::{ChangeId, Phase};
use std::fmt;
use std::sync::Arc;
use tracing::trace;

/// Signature of a reaction callback.
pub type ReactionFn =
    Arc<dyn Fn(&Application, &NodeRef, &Action, Phase) -> CoreResult<()> + Send + Sync>;

/// A named, optionally prioritized reaction.
#[derive(Clone)]
pub struct Reaction {
    name: String,
    priority: Option<i32>,
    func: ReactionFn,
}

impl Reaction {
    /// Creates a reaction without a priority.
    pub fn new<F>(name: impl Into<String>, func: F) -> Self
    where
        F: Fn(&Application, &NodeRef, &Action, Phase) -> CoreResult<()> + Send + Sync + 'static,
    {
        Self {
            name: name.into(),
            priority: None,
            func: Arc::new(func),
        }
    }

    /// Sets the priority. Lower priorities run first.
    #[must_use]
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = Some(priority);
        self
    }

    /// Returns the name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the priority, if one was declared.
    #[must_use]
    pub fn priority(&self) -> Option<i32> {
        self.priority
    }

    /// Invokes the callback.
    pub fn call(
        &self,
        app: &Application,
        node: &NodeRef,
        action: &Action,
        phase: Phase,
    ) -> CoreResult<()> {
        (self.func)(app, node, action, phase)
    }
}

impl fmt::Debug for Reaction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Reaction")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .finish_non_exhaustive()
    }
}

/// Compensating callback run after a rejected change is reverted.
pub type Compensation = Box<dyn FnOnce(&Application) -> CoreResult<()> + Send + Sync>;

/// A reaction's refusal of a change.
pub struct Rejection {
    change: ChangeId,
    callback: Compensation,
}

impl Rejection {
    /// Rejects `change`; `callback` runs once the change is reverted.
    pub fn new<F>(change: &Change, callback: F) -> Self
    where
        F: FnOnce(&Application) -> CoreResult<()> + Send + Sync + 'static,
    {
        Self {
            change: change.id(),
            callback: Box::new(callback),
        }
    }

    /// Returns the ID of the rejected change.
    #[must_use]
    pub fn change(&self) -> ChangeId {
        self.change
    }

    pub(crate) fn into_callback(self) -> Compensation {
        self.callback
    }
}

impl fmt::Debug for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rejection")
            .field("change", &self.change)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} was rejected", self.change)
    }
}

/// Builds the error a reaction returns to reject `change`.
pub fn reject<F>(change: &Change, callback: F) -> CoreError
where
    F: FnOnce(&Application) -> CoreResult<()> + Send + Sync + 'static,
{
    CoreError::Rejected(Rejection::new(change, callback))
}

/// Runs the reactions of `node`'s kind, in priority order.
pub(crate) fn react(
    app: &Application,
    node: &NodeRef,
    action: &Action,
    phase: Phase,
) -> CoreResult<()> {
    let reactions = Arc::clone(node.kind().reactions());
    for reaction in reactions.iter() {
        trace!(
            app = %app.label(),
            node = %node.id(),
            reaction = %reaction.name(),
            change = %action.change().name(),
            %phase,
            "dispatching reaction"
        );
        reaction.call(app, node, action, phase)?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejection_targets_change() {
        let change = Change::new("Update");
        let err = reject(&change, |_| Ok(()));
        let rejection = err.as_rejection().expect("rejection");
        assert_eq!(rejection.change(), change.id());
        assert!(err.to_string().contains("was rejected"));
    }

    #[test]
    fn reaction_priority() {
        let reaction = Reaction::new("r", |_, _, _, _| Ok(()));
        assert_eq!(reaction.priority(), None);
        assert_eq!(reaction.with_priority(3).priority(), Some(3));
    }
}
