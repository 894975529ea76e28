//! Fixture node kinds, histories and observers.
//!
//! The fixtures implement a minimal attribute layer on top of the engine:
//! a "value" node holds an integer and named child slots. Writes go through
//! [`set_value`] and [`set_child`], which build the same changes a real
//! attribute layer would.

use arbor_core::{
    Action, Application, Change, CoreError, CoreResult, History, HistoryHandle, Location,
    NodeInit, NodeKind, NodeKindBuilder, NodeRef, Notification, Observer, ObserverError, Payload,
    Phase, Reaction, Write, WriteContext,
};
use parking_lot::Mutex;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

/// Name of the change produced by [`set_value`].
pub const SET_VALUE: &str = "Set value";

/// Name of the change produced by [`set_child`].
pub const SET_CHILD: &str = "Set child";

/// State of a value node.
#[derive(Debug, Clone, Default)]
pub struct ValueState {
    /// The integer value.
    pub value: i64,
    /// Children by slot name.
    pub slots: BTreeMap<String, NodeRef>,
}

/// Starts a value kind: children are located by slot name.
pub fn value_kind_builder(name: &str) -> NodeKindBuilder {
    NodeKind::builder(name).locator(|parent, child| {
        let state = parent.state().downcast_ref::<ValueState>()?;
        state
            .slots
            .iter()
            .find(|(_, node)| *node == child)
            .map(|(slot, _)| Location::Key(slot.clone()))
    })
}

/// Returns a plain value kind.
pub fn value_kind() -> Arc<NodeKind> {
    value_kind_builder("Value").build()
}

/// Returns a value kind whose nodes are history objects.
pub fn history_object_kind() -> Arc<NodeKind> {
    value_kind_builder("HistoryObject").history(true).build()
}

/// Returns a value kind that keeps its value equal to its initial value
/// plus every delta of the value of whatever node sits in its `child` slot.
///
/// Whenever the child's value changes from `a` to `b`, the reaction adds
/// `b - a` to the parent's value in the POST phase.
pub fn summing_kind() -> Arc<NodeKind> {
    value_kind_builder("Summing")
        .reaction(Reaction::new("sum_child", sum_child))
        .build()
}

fn sum_child(app: &Application, node: &NodeRef, action: &Action, phase: Phase) -> CoreResult<()> {
    if phase != Phase::Post || action.locations().len() != 1 {
        return Ok(());
    }
    if action.locations()[0] != Location::Key("child".into()) {
        return Ok(());
    }
    let change = action.change();
    if change.name() != SET_VALUE {
        return Ok(());
    }
    let (Some(old), Some(new)) = (
        change.old_state().and_then(|s| s.downcast_ref::<ValueState>()),
        change.new_state().and_then(|s| s.downcast_ref::<ValueState>()),
    ) else {
        return Ok(());
    };
    let delta = new.value - old.value;
    app.write_context(|tx| {
        let current = state_in(tx, node)?.value;
        set_value(tx, node, current + delta)
    })
}

/// Initializes a value node.
pub fn init_value(app: &Application, kind: &Arc<NodeKind>, value: i64) -> NodeRef {
    app.init_node(
        kind,
        NodeInit::new(Payload::new(ValueState {
            value,
            slots: BTreeMap::new(),
        })),
    )
    .expect("failed to initialize value node")
}

/// Initializes a value node that owns `history`.
pub fn init_value_with_history(
    app: &Application,
    kind: &Arc<NodeKind>,
    value: i64,
    history: HistoryHandle,
) -> NodeRef {
    app.init_node(
        kind,
        NodeInit::new(Payload::new(ValueState {
            value,
            slots: BTreeMap::new(),
        }))
        .history(history),
    )
    .expect("failed to initialize value node")
}

/// Reads the state of a value node.
pub fn state_of(app: &Application, node: &NodeRef) -> ValueState {
    app.read(node)
        .expect("node is not in the store")
        .state()
        .downcast_ref::<ValueState>()
        .cloned()
        .expect("node is not a value node")
}

/// Reads the value of a value node.
pub fn value_of(app: &Application, node: &NodeRef) -> i64 {
    state_of(app, node).value
}

fn state_in(tx: &WriteContext<'_>, node: &NodeRef) -> CoreResult<ValueState> {
    tx.read(node)?
        .state()
        .downcast_ref::<ValueState>()
        .cloned()
        .ok_or_else(|| CoreError::reaction(format!("{node} is not a value node")))
}

/// Sets the value of a value node.
pub fn set_value(tx: &WriteContext<'_>, node: &NodeRef, value: i64) -> CoreResult<()> {
    let old = state_in(tx, node)?;
    let new = ValueState {
        value,
        ..old.clone()
    };
    let new_state = Payload::new(new);
    let change = Change::new(SET_VALUE)
        .with_old_state(Payload::new(old))
        .with_new_state(new_state.clone());
    tx.write(node, Write::new(new_state, change))
}

/// Puts `child` in `slot`, releasing whatever was there.
pub fn set_child(
    tx: &WriteContext<'_>,
    node: &NodeRef,
    slot: &str,
    child: Option<&NodeRef>,
) -> CoreResult<()> {
    let old = state_in(tx, node)?;
    let mut new = old.clone();
    let released = match child {
        Some(child) => new.slots.insert(slot.to_string(), child.clone()),
        None => new.slots.remove(slot),
    };
    let new_state = Payload::new(new);
    let change = Change::new(SET_CHILD)
        .with_old_state(Payload::new(old))
        .with_new_state(new_state.clone())
        .with_old_children(released)
        .with_new_children(child.cloned());
    tx.write(node, Write::new(new_state, change))
}

/// Something a [`RecordingHistory`] was asked to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HistoryEvent {
    /// A batch was opened, with its name.
    EnterBatch(String),
    /// A batch was closed, with its name.
    ExitBatch(String),
    /// A change was pushed, with its name.
    Push(String),
    /// The history was flushed.
    Flush,
}

/// A history that records every call.
#[derive(Debug, Default)]
pub struct RecordingHistory {
    events: Mutex<Vec<HistoryEvent>>,
    depth: AtomicUsize,
    executing: AtomicBool,
}

impl RecordingHistory {
    /// Creates a shared recording history and a handle to it.
    pub fn shared() -> (Arc<Self>, HistoryHandle) {
        let history = Arc::new(Self::default());
        let handle = HistoryHandle::from_arc(Arc::clone(&history) as Arc<dyn History>);
        (history, handle)
    }

    /// Returns the recorded events.
    pub fn events(&self) -> Vec<HistoryEvent> {
        self.events.lock().clone()
    }

    /// Clears the recorded events.
    pub fn clear(&self) {
        self.events.lock().clear();
    }

    /// Sets the "executing an undo or redo" flag.
    pub fn set_executing(&self, value: bool) {
        self.executing.store(value, Ordering::SeqCst);
    }
}

impl History for RecordingHistory {
    fn enter_batch(&self, batch: &Arc<Change>) -> CoreResult<()> {
        self.depth.fetch_add(1, Ordering::SeqCst);
        self.events
            .lock()
            .push(HistoryEvent::EnterBatch(batch.name().to_string()));
        Ok(())
    }

    fn exit_batch(&self, batch: &Arc<Change>) -> CoreResult<()> {
        self.depth.fetch_sub(1, Ordering::SeqCst);
        self.events
            .lock()
            .push(HistoryEvent::ExitBatch(batch.name().to_string()));
        Ok(())
    }

    fn push_change(&self, change: &Arc<Change>) -> CoreResult<()> {
        self.events
            .lock()
            .push(HistoryEvent::Push(change.name().to_string()));
        Ok(())
    }

    fn flush(&self) -> CoreResult<()> {
        self.events.lock().push(HistoryEvent::Flush);
        Ok(())
    }

    fn is_executing(&self) -> bool {
        self.executing.load(Ordering::SeqCst)
    }

    fn in_batch(&self) -> bool {
        self.depth.load(Ordering::SeqCst) > 0
    }
}

/// One notification as seen by a [`RecordingObserver`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seen {
    /// The node that changed.
    pub sender: NodeRef,
    /// The node whose subject sent the notification.
    pub receiver: NodeRef,
    /// The change name.
    pub change: String,
    /// The phase.
    pub phase: Phase,
}

/// An observer that records what it receives and optionally fails.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    seen: Mutex<Vec<Seen>>,
    fail: AtomicBool,
}

impl RecordingObserver {
    /// Creates an observer that never fails.
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Creates an observer that fails on every notification.
    pub fn failing() -> Arc<Self> {
        let observer = Self::default();
        observer.fail.store(true, Ordering::SeqCst);
        Arc::new(observer)
    }

    /// Returns what the observer received.
    pub fn seen(&self) -> Vec<Seen> {
        self.seen.lock().clone()
    }
}

impl Observer<Notification> for RecordingObserver {
    fn observe(&self, notification: &Notification) -> Result<(), ObserverError> {
        self.seen.lock().push(Seen {
            sender: notification.action.sender().clone(),
            receiver: notification.action.receiver().clone(),
            change: notification.action.change().name().to_string(),
            phase: notification.phase,
        });
        if self.fail.load(Ordering::SeqCst) {
            return Err("recording observer failed".into());
        }
        Ok(())
    }
}

/// Checks that every parent/child link in the published store is mutual.
///
/// Returns a description of the first violation.
pub fn check_symmetry(app: &Application, nodes: &[NodeRef]) -> Result<(), String> {
    for node in nodes {
        for child in app.children_of(node).map_err(|e| e.to_string())? {
            let parent = app.parent_of(&child).map_err(|e| e.to_string())?;
            if parent.as_ref() != Some(node) {
                return Err(format!("{child} is a child of {node} but its parent is {parent:?}"));
            }
        }
        if let Some(parent) = app.parent_of(node).map_err(|e| e.to_string())? {
            let parent_record = app.read(&parent).map_err(|e| e.to_string())?;
            if !parent_record.has_child(node.id()) {
                return Err(format!("{node} has parent {parent} which does not list it"));
            }
        }
    }
    Ok(())
}
