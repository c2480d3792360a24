//! Named broadcast events and the observer protocol.
//!
//! An [`Event`] keeps weak references to its observers. States and
//! transitions register themselves when a callback or event gate is attached,
//! and an observer that has been dropped is simply skipped on trigger.

use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

static NEXT_EVENT_ID: AtomicU64 = AtomicU64::new(1);

/// Something that wants to hear about an [`Event`] being triggered.
///
/// `notify` may be called from any thread that triggers the event.
pub trait EventObserver: Send + Sync {
    fn notify(&self, event: &Event);
}

/// Process-unique identity of an [`Event`].
///
/// Subscriptions are keyed by this id rather than by the event's address so a
/// dropped event can never be confused with a newer one.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EventId(u64);

struct EventInner {
    id: EventId,
    name: String,
    observers: Mutex<Vec<Weak<dyn EventObserver>>>,
}

/// A named broadcast channel.
///
/// `Event` is a cheap handle; clones refer to the same event and can be moved
/// to other threads to trigger it from there.
///
/// # Example
///
/// ```rust
/// use statechart::Event;
///
/// let door_opened = Event::new("door_opened");
/// assert_eq!(door_opened.name(), "door_opened");
/// assert_eq!(door_opened.observer_count(), 0);
///
/// // Nobody is listening yet, so this does nothing.
/// door_opened.trigger();
/// ```
#[derive(Clone)]
pub struct Event {
    inner: Arc<EventInner>,
}

impl Event {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            inner: Arc::new(EventInner {
                id: EventId(NEXT_EVENT_ID.fetch_add(1, Ordering::Relaxed)),
                name: name.into(),
                observers: Mutex::new(Vec::new()),
            }),
        }
    }

    /// An event named `"anonymous"`.
    pub fn anonymous() -> Self {
        Self::new("anonymous")
    }

    /// Name used for diagnostics. Names are not required to be unique.
    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn id(&self) -> EventId {
        self.inner.id
    }

    /// Notify every live observer, in no particular order.
    ///
    /// The observer list is snapshotted first, so observers are free to
    /// subscribe or unsubscribe from inside their `notify`.
    pub fn trigger(&self) {
        let live: Vec<Arc<dyn EventObserver>> = self
            .inner
            .observers
            .lock()
            .iter()
            .filter_map(Weak::upgrade)
            .collect();

        tracing::trace!(event = %self.inner.name, observers = live.len(), "event triggered");

        for observer in live {
            observer.notify(self);
        }
    }

    /// Register an observer. Returns `false` if it was already registered.
    pub fn add_observer<O>(&self, observer: &Arc<O>) -> bool
    where
        O: EventObserver + 'static,
    {
        let weak = Arc::downgrade(observer);
        let weak: Weak<dyn EventObserver> = weak;
        let mut observers = self.inner.observers.lock();
        if observers.iter().any(|o| Weak::ptr_eq(o, &weak)) {
            return false;
        }
        observers.push(weak);
        true
    }

    /// Unregister an observer. Returns `false` if it was not registered.
    pub fn remove_observer<O>(&self, observer: &Arc<O>) -> bool
    where
        O: EventObserver + 'static,
    {
        let weak = Arc::downgrade(observer);
        let weak: Weak<dyn EventObserver> = weak;
        let mut observers = self.inner.observers.lock();
        let before = observers.len();
        observers.retain(|o| !Weak::ptr_eq(o, &weak));
        observers.len() != before
    }

    /// Number of registered observers, including ones that have since been
    /// dropped but not yet unregistered.
    pub fn observer_count(&self) -> usize {
        self.inner.observers.lock().len()
    }
}

impl Default for Event {
    fn default() -> Self {
        Self::anonymous()
    }
}

impl PartialEq for Event {
    fn eq(&self, other: &Self) -> bool {
        self.inner.id == other.inner.id
    }
}

impl Eq for Event {}

impl fmt::Debug for Event {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Event")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .field("observers", &self.observer_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct Counter {
        hits: AtomicUsize,
    }

    impl EventObserver for Counter {
        fn notify(&self, _event: &Event) {
            self.hits.fetch_add(1, Ordering::SeqCst);
        }
    }

    #[test]
    fn trigger_without_observers_is_noop() {
        let event = Event::new("idle");
        event.trigger();
        assert_eq!(event.observer_count(), 0);
    }

    #[test]
    fn trigger_notifies_every_observer() {
        let event = Event::new("tick");
        let a = Arc::new(Counter::default());
        let b = Arc::new(Counter::default());

        assert!(event.add_observer(&a));
        assert!(event.add_observer(&b));
        event.trigger();
        event.trigger();

        assert_eq!(a.hits.load(Ordering::SeqCst), 2);
        assert_eq!(b.hits.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn add_observer_is_idempotent() {
        let event = Event::new("tick");
        let a = Arc::new(Counter::default());

        assert!(event.add_observer(&a));
        assert!(!event.add_observer(&a));
        assert_eq!(event.observer_count(), 1);

        event.trigger();
        assert_eq!(a.hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn remove_observer_reports_membership() {
        let event = Event::new("tick");
        let a = Arc::new(Counter::default());

        assert!(!event.remove_observer(&a));
        event.add_observer(&a);
        assert!(event.remove_observer(&a));
        assert!(!event.remove_observer(&a));
        assert_eq!(event.observer_count(), 0);

        event.trigger();
        assert_eq!(a.hits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn dropped_observers_are_skipped_but_still_counted() {
        let event = Event::new("tick");
        let survivor = Arc::new(Counter::default());
        {
            let transient = Arc::new(Counter::default());
            event.add_observer(&transient);
        }
        event.add_observer(&survivor);

        event.trigger();

        assert_eq!(event.observer_count(), 2);
        assert_eq!(survivor.hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn events_have_distinct_ids() {
        let a = Event::anonymous();
        let b = Event::anonymous();
        assert_eq!(a.name(), "anonymous");
        assert_ne!(a.id(), b.id());
        assert_eq!(a.clone(), a);
    }
}
