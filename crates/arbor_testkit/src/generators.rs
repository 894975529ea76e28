//! Property-based test generators using proptest.
//!
//! Operations address nodes by index into a pool created up front, so a
//! generated sequence can be replayed against any application.

use crate::fixtures::{init_value, set_child, set_value, value_kind};
use arbor_core::{Application, CoreResult, NodeRef, WriteContext};
use proptest::prelude::*;

/// Slot names used by generated operations.
pub const SLOTS: [&str; 3] = ["left", "right", "child"];

/// A write against a pool of value nodes.
#[derive(Debug, Clone)]
pub enum WriteOp {
    /// Set a node's value
    SetValue {
        /// Node index
        node: usize,
        /// New value
        value: i64,
    },
    /// Put a node in a slot, or clear the slot
    SetChild {
        /// Parent index
        parent: usize,
        /// Slot name
        slot: &'static str,
        /// Child index, or `None` to clear
        child: Option<usize>,
    },
}

impl WriteOp {
    /// Applies the operation inside `tx`.
    ///
    /// Indices wrap around the pool, so any generated operation is
    /// applicable.
    pub fn apply(&self, tx: &WriteContext<'_>, nodes: &[NodeRef]) -> CoreResult<()> {
        match self {
            Self::SetValue { node, value } => set_value(tx, &nodes[node % nodes.len()], *value),
            Self::SetChild {
                parent,
                slot,
                child,
            } => set_child(
                tx,
                &nodes[parent % nodes.len()],
                slot,
                child.map(|c| &nodes[c % nodes.len()]),
            ),
        }
    }
}

/// Strategy for generating node values.
pub fn value_strategy() -> impl Strategy<Value = i64> {
    -1000i64..1000
}

/// Strategy for generating writes against a pool of `pool` nodes.
pub fn write_op_strategy(pool: usize) -> impl Strategy<Value = WriteOp> {
    let pool = pool.max(1);
    prop_oneof![
        2 => (0..pool, value_strategy())
            .prop_map(|(node, value)| WriteOp::SetValue { node, value }),
        3 => (0..pool, prop::sample::select(SLOTS.to_vec()), prop::option::of(0..pool))
            .prop_map(|(parent, slot, child)| WriteOp::SetChild { parent, slot, child }),
    ]
}

/// Strategy for generating a sequence of writes.
pub fn write_sequence_strategy(
    pool: usize,
    min_ops: usize,
    max_ops: usize,
) -> impl Strategy<Value = Vec<WriteOp>> {
    prop::collection::vec(write_op_strategy(pool), min_ops..max_ops)
}

/// Creates `count` value nodes with values `0..count`.
pub fn value_pool(app: &Application, count: usize) -> Vec<NodeRef> {
    let kind = value_kind();
    (0..count)
        .map(|i| init_value(app, &kind, i as i64))
        .collect()
}

/// Applies each operation in its own write context.
///
/// Returns how many operations were refused.
pub fn apply_each(app: &Application, nodes: &[NodeRef], ops: &[WriteOp]) -> usize {
    ops.iter()
        .filter(|op| app.write_context(|tx| op.apply(tx, nodes)).is_err())
        .count()
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Creates a configuration for thorough tests.
    #[must_use]
    pub fn thorough() -> Self {
        Self {
            cases: 1024,
            max_shrink_iters: 10000,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::check_symmetry;

    proptest! {
        #![proptest_config(PropTestConfig::quick().to_proptest_config())]

        #[test]
        fn generated_slots_are_known(op in write_op_strategy(4)) {
            if let WriteOp::SetChild { slot, parent, .. } = op {
                prop_assert!(SLOTS.contains(&slot));
                prop_assert!(parent < 4);
            }
        }

        #[test]
        fn applied_sequences_keep_links_mutual(ops in write_sequence_strategy(5, 1, 20)) {
            let app = Application::new();
            let nodes = value_pool(&app, 5);
            apply_each(&app, &nodes, &ops);
            prop_assert_eq!(check_symmetry(&app, &nodes), Ok(()));
            prop_assert!(!app.is_writing());
        }
    }
}
