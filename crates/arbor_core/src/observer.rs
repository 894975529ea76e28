//! Fan-out of published actions to external observers.
//!
//! Every node owns a [`Subject`]. Observers register with it and receive
//! each [`Notification`](crate::change::Notification) once the commit that
//! produced it is merged into the store. Subjects never fail fast: an
//! observer that returns an error is recorded and the remaining observers
//! still run.
//!
//! # Ordering
//!
//! Observers run in registration order unless one of them waits on
//! another's [`ObserverToken`], which runs the awaited observer first:
//!
//! ```rust,ignore
//! struct After(ObserverToken<u32>);
//!
//! impl Observer<u32> for After {
//!     fn observe(&self, _: &u32) -> Result<(), ObserverError> {
//!         self.0.wait()?;
//!         Ok(())
//!     }
//! }
//! ```

use crate::change::Notification;
use crate::error::{CoreError, CoreResult};
use crate::types::ObserverId;
use parking_lot::Mutex;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::sync::{Arc, Weak};
use tracing::trace;

/// Error returned by an observer.
pub type ObserverError = Box<dyn std::error::Error + Send + Sync>;

/// Receives payloads sent through a [`Subject`].
pub trait Observer<P>: Send + Sync {
    /// Reacts to one payload.
    fn observe(&self, payload: &P) -> Result<(), ObserverError>;
}

/// An observer error recorded while sending a payload.
pub struct ObserverFailure<P> {
    /// The observer that failed.
    pub observer: ObserverId,
    /// The payload it was receiving.
    pub payload: Arc<P>,
    /// The error it returned.
    pub error: ObserverError,
}

impl<P> fmt::Debug for ObserverFailure<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ObserverFailure")
            .field("observer", &self.observer)
            .field("error", &self.error)
            .finish_non_exhaustive()
    }
}

/// A notification a subject refused to deliver.
#[derive(Debug)]
pub struct RefusedNotification {
    /// The notification that was not delivered.
    pub notification: Notification,
    /// Why the subject refused it.
    pub error: CoreError,
}

/// Every observer failure collected while publishing one push.
#[derive(Debug, Default)]
pub struct ObserversFailed {
    /// Failures in the order they happened.
    pub failures: Vec<ObserverFailure<Notification>>,
    /// Notifications whose subject was already sending.
    pub refused: Vec<RefusedNotification>,
}

impl ObserversFailed {
    /// Returns the number of failed observers and refused notifications.
    #[must_use]
    pub fn len(&self) -> usize {
        self.failures.len() + self.refused.len()
    }

    /// Returns `true` if nothing failed.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.failures.is_empty() && self.refused.is_empty()
    }
}

impl fmt::Display for ObserversFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} observer(s) failed while publishing", self.len())?;
        if let Some(first) = self.failures.first() {
            write!(f, "; first: {}: {}", first.observer, first.error)?;
        } else if let Some(first) = self.refused.first() {
            write!(
                f,
                "; first: {}: {}",
                first.notification.action.receiver().id(),
                first.error
            )?;
        }
        Ok(())
    }
}

struct Registration<P> {
    id: ObserverId,
    observer: Weak<dyn Observer<P>>,
}

struct SendState<P> {
    payload: Arc<P>,
    pending: VecDeque<(ObserverId, Arc<dyn Observer<P>>)>,
    receiving: HashSet<ObserverId>,
    failed: HashSet<ObserverId>,
    failures: Vec<ObserverFailure<P>>,
}

struct SubjectInner<P> {
    registrations: Mutex<Vec<Registration<P>>>,
    sending: Mutex<Option<SendState<P>>>,
}

impl<P> SubjectInner<P> {
    /// Runs one observer outside the state lock and records its outcome.
    fn deliver(
        &self,
        id: ObserverId,
        observer: &Arc<dyn Observer<P>>,
        payload: &Arc<P>,
    ) -> Result<(), String> {
        let result = observer.observe(payload);

        let mut sending = self.sending.lock();
        let Some(state) = sending.as_mut() else {
            return Ok(());
        };
        state.receiving.remove(&id);
        match result {
            Ok(()) => Ok(()),
            Err(error) => {
                let message = error.to_string();
                trace!(observer = %id, error = %message, "observer failed");
                state.failed.insert(id);
                state.failures.push(ObserverFailure {
                    observer: id,
                    payload: Arc::clone(payload),
                    error,
                });
                Err(message)
            }
        }
    }
}

/// Sends payloads to registered observers.
///
/// Observers are held weakly: dropping the last `Arc` to an observer
/// silently deregisters it.
pub struct Subject<P> {
    inner: Arc<SubjectInner<P>>,
}

impl<P: 'static> Subject<P> {
    /// Creates a subject with no observers.
    #[must_use]
    pub fn new() -> Self {
        Self {
            inner: Arc::new(SubjectInner {
                registrations: Mutex::new(Vec::new()),
                sending: Mutex::new(None),
            }),
        }
    }

    /// Registers `observer` and returns its token.
    ///
    /// Registering an observer twice returns the existing token.
    pub fn register<O>(&self, observer: &Arc<O>) -> ObserverToken<P>
    where
        O: Observer<P> + 'static,
    {
        let observer: Arc<dyn Observer<P>> = Arc::clone(observer) as Arc<dyn Observer<P>>;
        let weak = Arc::downgrade(&observer);

        let mut registrations = self.inner.registrations.lock();
        registrations.retain(|r| r.observer.strong_count() > 0);
        let id = match registrations
            .iter()
            .find(|r| Weak::ptr_eq(&r.observer, &weak))
        {
            Some(existing) => existing.id,
            None => {
                let id = ObserverId::next();
                registrations.push(Registration {
                    id,
                    observer: weak.clone(),
                });
                id
            }
        };
        ObserverToken {
            subject: Arc::downgrade(&self.inner),
            id,
            observer: weak,
        }
    }

    /// Deregisters `observer`. Unknown observers are ignored.
    pub fn deregister<O>(&self, observer: &Arc<O>)
    where
        O: Observer<P> + 'static,
    {
        let observer: Arc<dyn Observer<P>> = Arc::clone(observer) as Arc<dyn Observer<P>>;
        let weak = Arc::downgrade(&observer);
        self.inner
            .registrations
            .lock()
            .retain(|r| r.observer.strong_count() > 0 && !Weak::ptr_eq(&r.observer, &weak));
    }

    /// Returns the token of an already registered observer.
    pub fn token<O>(&self, observer: &Arc<O>) -> CoreResult<ObserverToken<P>>
    where
        O: Observer<P> + 'static,
    {
        let observer: Arc<dyn Observer<P>> = Arc::clone(observer) as Arc<dyn Observer<P>>;
        let weak = Arc::downgrade(&observer);
        self.inner
            .registrations
            .lock()
            .iter()
            .find(|r| Weak::ptr_eq(&r.observer, &weak))
            .map(|r| ObserverToken {
                subject: Arc::downgrade(&self.inner),
                id: r.id,
                observer: weak.clone(),
            })
            .ok_or_else(|| CoreError::observer("observer is not registered"))
    }

    /// Returns the number of live observers.
    #[must_use]
    pub fn observer_count(&self) -> usize {
        self.inner
            .registrations
            .lock()
            .iter()
            .filter(|r| r.observer.strong_count() > 0)
            .count()
    }

    /// Returns `true` while a payload is being sent.
    #[must_use]
    pub fn is_sending(&self) -> bool {
        self.inner.sending.lock().is_some()
    }

    /// Sends `payload` to every observer and returns the failures.
    ///
    /// Fails only if the subject is already sending.
    pub fn send(&self, payload: P) -> CoreResult<Vec<ObserverFailure<P>>> {
        let pending: VecDeque<_> = self
            .inner
            .registrations
            .lock()
            .iter()
            .filter_map(|r| r.observer.upgrade().map(|o| (r.id, o)))
            .collect();
        if pending.is_empty() {
            return Ok(Vec::new());
        }

        let payload = Arc::new(payload);
        {
            let mut sending = self.inner.sending.lock();
            if sending.is_some() {
                return Err(CoreError::observer(
                    "subject is already sending a payload",
                ));
            }
            *sending = Some(SendState {
                payload: Arc::clone(&payload),
                pending,
                receiving: HashSet::new(),
                failed: HashSet::new(),
                failures: Vec::new(),
            });
        }

        loop {
            let next = {
                let mut sending = self.inner.sending.lock();
                let Some(state) = sending.as_mut() else {
                    break;
                };
                let next = state.pending.pop_front();
                if let Some((id, _)) = &next {
                    state.receiving.insert(*id);
                }
                next
            };
            let Some((id, observer)) = next else {
                break;
            };
            // Failures are already recorded; keep sending to the others.
            let _ = self.inner.deliver(id, &observer, &payload);
        }

        let state = self.inner.sending.lock().take();
        Ok(state.map(|s| s.failures).unwrap_or_default())
    }
}

impl<P: 'static> Default for Subject<P> {
    fn default() -> Self {
        Self::new()
    }
}

impl<P: 'static> fmt::Debug for Subject<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subject")
            .field("observers", &self.observer_count())
            .field("sending", &self.is_sending())
            .finish()
    }
}

/// Lets an observer wait for another observer of the same subject.
pub struct ObserverToken<P> {
    subject: Weak<SubjectInner<P>>,
    id: ObserverId,
    observer: Weak<dyn Observer<P>>,
}

impl<P> ObserverToken<P> {
    /// Returns the ID of the token's observer.
    #[must_use]
    pub fn id(&self) -> ObserverId {
        self.id
    }

    /// Runs the token's observer now if it has not yet received the
    /// payload being sent.
    ///
    /// Does nothing when no payload is being sent, when the observer already
    /// received it, or when the subject or the observer was dropped.
    ///
    /// # Errors
    ///
    /// Fails if the observer is itself waiting further up the stack (a wait
    /// cycle), or if it failed while receiving the payload.
    pub fn wait(&self) -> CoreResult<()> {
        let Some(subject) = self.subject.upgrade() else {
            return Ok(());
        };
        let Some(observer) = self.observer.upgrade() else {
            return Ok(());
        };

        let payload = {
            let mut sending = subject.sending.lock();
            let Some(state) = sending.as_mut() else {
                return Ok(());
            };
            if state.receiving.contains(&self.id) {
                return Err(CoreError::observer(format!(
                    "token wait cycle detected in {}",
                    self.id
                )));
            }
            if state.failed.contains(&self.id) {
                return Err(CoreError::observer(format!(
                    "can't wait for failed {}",
                    self.id
                )));
            }
            let Some(position) = state.pending.iter().position(|(id, _)| *id == self.id) else {
                return Ok(());
            };
            state.pending.remove(position);
            state.receiving.insert(self.id);
            Arc::clone(&state.payload)
        };

        subject
            .deliver(self.id, &observer, &payload)
            .map_err(|message| CoreError::observer(format!("{} failed: {message}", self.id)))
    }
}

impl<P> Clone for ObserverToken<P> {
    fn clone(&self) -> Self {
        Self {
            subject: self.subject.clone(),
            id: self.id,
            observer: self.observer.clone(),
        }
    }
}

impl<P> fmt::Debug for ObserverToken<P> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("ObserverToken").field(&self.id).finish()
    }
}
