//! Callback types shared by states, transitions and charts.

use super::event::Event;
use std::fmt;
use std::sync::Arc;

/// Entry/do/exit actions of a state and the action of a transition.
pub(crate) type Action = Arc<dyn Fn() + Send + Sync>;

/// Callback run when a subscribed event fires while its state is active.
pub(crate) type EventCallback = Arc<dyn Fn(&Event) + Send + Sync>;

pub(crate) fn noop() -> Action {
    Arc::new(|| {})
}

/// Handle to a callback registered with
/// [`Chart::create_state_change_callback`](crate::Chart::create_state_change_callback).
///
/// Keep it around to unregister the callback later. Two handles are equal
/// only if they refer to the same registration.
#[derive(Clone)]
pub struct StateChangeCallback {
    callback: Arc<dyn Fn(&str) + Send + Sync>,
}

impl StateChangeCallback {
    pub(crate) fn new<F>(callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self {
            callback: Arc::new(callback),
        }
    }

    pub(crate) fn invoke(&self, state: &str) {
        (self.callback)(state)
    }
}

impl PartialEq for StateChangeCallback {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.callback, &other.callback)
    }
}

impl Eq for StateChangeCallback {}

impl fmt::Debug for StateChangeCallback {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateChangeCallback").finish_non_exhaustive()
    }
}
