//! Opaque payloads supplied by the type layer.

use std::any::Any;
use std::collections::BTreeMap;
use std::fmt;
use std::sync::Arc;

/// An immutable, shareable value the engine stores without inspecting.
///
/// State, data and metadata values are all payloads. Two payloads are equal
/// only if they are the same allocation: the engine never compares values,
/// it only detects whether a record was replaced.
#[derive(Clone)]
pub struct Payload(Arc<dyn Any + Send + Sync>);

impl Payload {
    /// Wraps a value.
    pub fn new<T: Any + Send + Sync>(value: T) -> Self {
        Self(Arc::new(value))
    }

    /// Returns a reference to the value if it is of type `T`.
    #[must_use]
    pub fn downcast_ref<T: Any>(&self) -> Option<&T> {
        self.0.downcast_ref::<T>()
    }

    /// Returns `true` if the value is of type `T`.
    #[must_use]
    pub fn is<T: Any>(&self) -> bool {
        self.0.is::<T>()
    }

    /// Returns `true` if both payloads share the same allocation.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.0, &other.0)
    }
}

impl PartialEq for Payload {
    fn eq(&self, other: &Self) -> bool {
        self.ptr_eq(other)
    }
}

impl Eq for Payload {}

impl fmt::Debug for Payload {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Payload({:p})", Arc::as_ptr(&self.0))
    }
}

/// String-keyed auxiliary bookkeeping attached to a record.
pub type Metadata = BTreeMap<String, Payload>;

/// Returns `true` if both optional payloads are absent or the same allocation.
pub(crate) fn same_payload(a: Option<&Payload>, b: Option<&Payload>) -> bool {
    match (a, b) {
        (None, None) => true,
        (Some(a), Some(b)) => a.ptr_eq(b),
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn downcast() {
        let payload = Payload::new(42_i64);
        assert_eq!(payload.downcast_ref::<i64>(), Some(&42));
        assert!(payload.downcast_ref::<String>().is_none());
        assert!(payload.is::<i64>());
    }

    #[test]
    fn equality_is_identity() {
        let a = Payload::new(1_u8);
        let b = Payload::new(1_u8);
        assert_eq!(a, a.clone());
        assert_ne!(a, b);
    }

    #[test]
    fn same_payload_handles_absence() {
        let a = Payload::new(());
        assert!(same_payload(None, None));
        assert!(same_payload(Some(&a), Some(&a.clone())));
        assert!(!same_payload(Some(&a), None));
    }
}
