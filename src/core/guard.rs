//! Guard predicates for controlling transitions.
//!
//! Guards are boolean functions that determine whether a transition may be
//! taken. All guards attached to one transition are ANDed together.

use std::fmt;
use std::sync::Arc;

/// Predicate that determines if a transition can be taken.
///
/// A guard is a cheap handle: clones share the same predicate, and two
/// handles compare equal only if they refer to the same guard. This is what
/// [`Transition::remove_guard`](crate::Transition::remove_guard) relies on.
///
/// # Example
///
/// ```rust
/// use statechart::Guard;
/// use std::sync::atomic::{AtomicBool, Ordering};
/// use std::sync::Arc;
///
/// let door_closed = Arc::new(AtomicBool::new(false));
/// let flag = door_closed.clone();
/// let guard = Guard::new(move || flag.load(Ordering::SeqCst));
///
/// assert!(!guard.is_satisfied());
/// door_closed.store(true, Ordering::SeqCst);
/// assert!(guard.is_satisfied());
/// ```
#[derive(Clone)]
pub struct Guard {
    predicate: Arc<dyn Fn() -> bool + Send + Sync>,
}

impl Guard {
    /// Create a guard from a predicate.
    ///
    /// The predicate is evaluated on every call to [`Guard::is_satisfied`]
    /// and may run on the chart's background thread, so it must be
    /// `Send + Sync`.
    pub fn new<F>(predicate: F) -> Self
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        Guard {
            predicate: Arc::new(predicate),
        }
    }

    /// Evaluate the predicate. Nothing is cached.
    pub fn is_satisfied(&self) -> bool {
        (self.predicate)()
    }
}

impl PartialEq for Guard {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.predicate, &other.predicate)
    }
}

impl Eq for Guard {}

impl fmt::Debug for Guard {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Guard").finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    #[test]
    fn guard_reflects_predicate() {
        assert!(Guard::new(|| true).is_satisfied());
        assert!(!Guard::new(|| false).is_satisfied());
    }

    #[test]
    fn guard_is_not_cached() {
        let flag = Arc::new(AtomicBool::new(false));
        let observed = flag.clone();
        let guard = Guard::new(move || observed.load(Ordering::SeqCst));

        assert!(!guard.is_satisfied());
        flag.store(true, Ordering::SeqCst);
        assert!(guard.is_satisfied());
        flag.store(false, Ordering::SeqCst);
        assert!(!guard.is_satisfied());
    }

    #[test]
    fn guard_evaluates_predicate_each_call() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = calls.clone();
        let guard = Guard::new(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        });

        guard.is_satisfied();
        guard.is_satisfied();
        guard.is_satisfied();

        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn guard_identity_follows_clones() {
        let guard = Guard::new(|| true);
        let same = guard.clone();
        let other = Guard::new(|| true);

        assert_eq!(guard, same);
        assert_ne!(guard, other);
    }
}
