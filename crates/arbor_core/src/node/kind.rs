//! Node kinds: the static, per-type metadata the engine consults.
//!
//! A kind is resolved once, when it is built. Its reaction list is merged
//! across the kind's ancestry (a reaction redeclared under the same name
//! replaces the inherited one and moves to the end of discovery order),
//! then frozen in priority order: lower priorities first, ties broken by
//! discovery order, reactions without a priority last.

use crate::node::{NodeId, NodeRef};
use crate::payload::Payload;
use crate::reaction::Reaction;
use crate::store::StoreRecord;
use std::fmt;
use std::sync::Arc;

/// Where a child sits inside its parent, as seen by the parent's kind.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Location {
    /// The child itself; used when the parent's kind declares no locator.
    Node(NodeId),
    /// A named slot.
    Key(String),
    /// A position in a sequence.
    Index(usize),
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Node(id) => write!(f, "{id}"),
            Self::Key(key) => write!(f, "{key}"),
            Self::Index(index) => write!(f, "[{index}]"),
        }
    }
}

/// Locates a child inside a parent's record.
pub type Locator = Arc<dyn Fn(&StoreRecord, &NodeRef) -> Option<Location> + Send + Sync>;

/// Recomputes a parent's data after the data of the child at `location`
/// changed. Returns `None` when the parent's data does not depend on it.
pub type DataProjection =
    Arc<dyn Fn(&StoreRecord, &Location, &Payload) -> Option<Payload> + Send + Sync>;

/// Static metadata shared by every node of one kind.
pub struct NodeKind {
    name: String,
    declared: Vec<Reaction>,
    reactions: Arc<[Reaction]>,
    history: bool,
    locator: Option<Locator>,
    data_projection: Option<DataProjection>,
}

impl NodeKind {
    /// Starts building a kind.
    pub fn builder(name: impl Into<String>) -> NodeKindBuilder {
        NodeKindBuilder {
            name: name.into(),
            declared: Vec::new(),
            history: false,
            locator: None,
            data_projection: None,
        }
    }

    /// Returns the kind's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the frozen, priority-ordered reactions.
    #[must_use]
    pub fn reactions(&self) -> &Arc<[Reaction]> {
        &self.reactions
    }

    /// Returns `true` if nodes of this kind are history objects.
    ///
    /// History objects can never be parented under another node.
    #[must_use]
    pub fn is_history(&self) -> bool {
        self.history
    }

    /// Locates `child` inside `parent`, falling back to the child's ID.
    #[must_use]
    pub fn locate(&self, parent: &StoreRecord, child: &NodeRef) -> Location {
        self.locator
            .as_ref()
            .and_then(|locator| locator(parent, child))
            .unwrap_or_else(|| Location::Node(child.id()))
    }

    pub(crate) fn data_projection(&self) -> Option<&DataProjection> {
        self.data_projection.as_ref()
    }
}

impl fmt::Debug for NodeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NodeKind")
            .field("name", &self.name)
            .field(
                "reactions",
                &self.reactions.iter().map(Reaction::name).collect::<Vec<_>>(),
            )
            .field("history", &self.history)
            .finish_non_exhaustive()
    }
}

/// Builder for [`NodeKind`].
pub struct NodeKindBuilder {
    name: String,
    declared: Vec<Reaction>,
    history: bool,
    locator: Option<Locator>,
    data_projection: Option<DataProjection>,
}

impl NodeKindBuilder {
    /// Inherits reactions, locator, data projection and history flag.
    ///
    /// Later calls override what earlier ones declared.
    #[must_use]
    pub fn extends(mut self, base: &NodeKind) -> Self {
        for reaction in &base.declared {
            self = self.reaction(reaction.clone());
        }
        self.history = base.history;
        if base.locator.is_some() {
            self.locator = base.locator.clone();
        }
        if base.data_projection.is_some() {
            self.data_projection = base.data_projection.clone();
        }
        self
    }

    /// Declares a reaction, replacing any reaction with the same name.
    #[must_use]
    pub fn reaction(mut self, reaction: Reaction) -> Self {
        self.declared.retain(|r| r.name() != reaction.name());
        self.declared.push(reaction);
        self
    }

    /// Removes an inherited reaction.
    #[must_use]
    pub fn without_reaction(mut self, name: &str) -> Self {
        self.declared.retain(|r| r.name() != name);
        self
    }

    /// Marks nodes of this kind as history objects.
    #[must_use]
    pub const fn history(mut self, value: bool) -> Self {
        self.history = value;
        self
    }

    /// Sets how children are located inside nodes of this kind.
    #[must_use]
    pub fn locator<F>(mut self, locator: F) -> Self
    where
        F: Fn(&StoreRecord, &NodeRef) -> Option<Location> + Send + Sync + 'static,
    {
        self.locator = Some(Arc::new(locator));
        self
    }

    /// Sets how nodes of this kind derive their data from their children's.
    #[must_use]
    pub fn data_projection<F>(mut self, projection: F) -> Self
    where
        F: Fn(&StoreRecord, &Location, &Payload) -> Option<Payload> + Send + Sync + 'static,
    {
        self.data_projection = Some(Arc::new(projection));
        self
    }

    /// Freezes the kind.
    #[must_use]
    pub fn build(self) -> Arc<NodeKind> {
        let mut sorted = self.declared.clone();
        sorted.sort_by_key(|r| (r.priority().is_none(), r.priority()));
        Arc::new(NodeKind {
            name: self.name,
            declared: self.declared,
            reactions: sorted.into(),
            history: self.history,
            locator: self.locator,
            data_projection: self.data_projection,
        })
    }
}
