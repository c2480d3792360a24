//! Guarded, optionally event-gated edges between two states of one chart.

use super::action::Action;
use super::event::{Event, EventId, EventObserver};
use super::guard::Guard;
use super::state::{AbstractState, StateNode};
use parking_lot::Mutex;
use std::collections::HashSet;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

pub(crate) struct TransitionNode {
    container: Weak<StateNode>,
    src: Weak<StateNode>,
    dst: Weak<StateNode>,
    guards: Mutex<Vec<Guard>>,
    events: Mutex<HashSet<EventId>>,
    triggered: AtomicBool,
    action: Action,
}

impl TransitionNode {
    pub(crate) fn new(
        container: Weak<StateNode>,
        src: Weak<StateNode>,
        dst: Weak<StateNode>,
        action: Action,
    ) -> Self {
        Self {
            container,
            src,
            dst,
            guards: Mutex::new(Vec::new()),
            events: Mutex::new(HashSet::new()),
            triggered: AtomicBool::new(false),
            action,
        }
    }

    pub(crate) fn destination(&self) -> Option<Arc<StateNode>> {
        self.dst.upgrade()
    }

    /// Expired once the destination is dropped or no longer registered in
    /// the chart this transition was created in.
    pub(crate) fn is_expired(&self) -> bool {
        let (Some(dst), Some(container)) = (self.dst.upgrade(), self.container.upgrade()) else {
            return true;
        };
        container
            .chart_core()
            .map_or(true, |core| !core.contains(&dst))
    }

    /// Every guard is evaluated, even after one has failed.
    pub(crate) fn guards_satisfied(&self) -> bool {
        let guards = self.guards.lock().clone();
        guards
            .iter()
            .fold(true, |satisfied, guard| guard.is_satisfied() & satisfied)
    }

    /// Event-less transitions only look at their guards. Event-gated ones
    /// consume the trigger flag on every call, whether or not the guards
    /// then pass.
    pub(crate) fn should_perform(&self) -> bool {
        if self.events.lock().is_empty() {
            return self.guards_satisfied();
        }
        if self.triggered.swap(false, Ordering::SeqCst) {
            self.guards_satisfied()
        } else {
            false
        }
    }

    pub(crate) fn run_action(&self) {
        (self.action)();
    }
}

impl EventObserver for TransitionNode {
    fn notify(&self, event: &Event) {
        let Some(src) = self.src.upgrade() else {
            return;
        };
        if !src.is_active() {
            return;
        }

        // Hold the running root chart between steps so the source cannot be
        // left while the flag is being set. A thread inside a step of that
        // chart is already between evaluations and gets no pause.
        let root = self.container.upgrade().map(|container| {
            container
                .outermost_container()
                .unwrap_or(container)
        });
        let pause = root
            .as_ref()
            .and_then(|root| root.chart_core())
            .filter(|core| core.runner().is_running())
            .and_then(|core| core.runner().gate().pause());

        if pause.is_some() && !src.is_active() {
            tracing::trace!(state = %src.name, event = %event.name(), "source left before trigger landed");
            return;
        }

        tracing::trace!(state = %src.name, event = %event.name(), "transition triggered");
        self.triggered.store(true, Ordering::SeqCst);
    }
}

/// Handle to a transition.
///
/// Created with [`AbstractState::create_transition`]; the source state owns
/// it. The source, destination and chart are fixed for its whole life.
///
/// A transition with no guards and no events is taken on the first "do"
/// tick of its source state. Guards are ANDed. Once at least one event is
/// added, the transition additionally needs a fresh trigger of one of its
/// events before every attempt.
///
/// # Example
///
/// ```rust
/// use statechart::{Chart, Event};
///
/// let chart = Chart::new("door").unwrap();
/// let open = chart.create_state("open").unwrap();
/// let to_open = chart.initial_state().create_transition(&open).unwrap();
///
/// let push = Event::new("push");
/// assert!(to_open.add_event(&push));
///
/// chart.spin_once();
/// chart.spin_once();
/// assert_eq!(chart.current_state_name(), "initial");
///
/// push.trigger();
/// chart.spin_once();
/// assert_eq!(chart.current_state_name(), "open");
/// ```
#[derive(Clone)]
pub struct Transition {
    pub(crate) node: Arc<TransitionNode>,
}

impl Transition {
    pub(crate) fn from_node(node: Arc<TransitionNode>) -> Self {
        Self { node }
    }

    /// Append a guard. Keep the returned handle to remove it later.
    pub fn create_guard<F>(&self, predicate: F) -> Guard
    where
        F: Fn() -> bool + Send + Sync + 'static,
    {
        let guard = Guard::new(predicate);
        self.node.guards.lock().push(guard.clone());
        guard
    }

    /// Remove a guard. Unknown guards are ignored and reported as `false`.
    pub fn remove_guard(&self, guard: &Guard) -> bool {
        let mut guards = self.node.guards.lock();
        let before = guards.len();
        guards.retain(|g| g != guard);
        guards.len() != before
    }

    pub fn guard_count(&self) -> usize {
        self.node.guards.lock().len()
    }

    /// True iff every guard is satisfied; true with no guards.
    pub fn guards_satisfied(&self) -> bool {
        self.node.guards_satisfied()
    }

    /// Gate this transition on `event`. Returns `false` if already gated on
    /// it.
    pub fn add_event(&self, event: &Event) -> bool {
        if !self.node.events.lock().insert(event.id()) {
            return false;
        }
        event.add_observer(&self.node);
        true
    }

    /// Returns `false` if this transition was not gated on `event`.
    pub fn remove_event(&self, event: &Event) -> bool {
        event.remove_observer(&self.node);
        self.node.events.lock().remove(&event.id())
    }

    pub fn event_count(&self) -> usize {
        self.node.events.lock().len()
    }

    /// Whether the transition would be taken now.
    ///
    /// For an event-gated transition this consumes the pending trigger, so a
    /// second call returns `false` until the event fires again. The chart
    /// calls this once per "do" tick on every outgoing transition of the
    /// current state.
    pub fn should_perform(&self) -> bool {
        self.node.should_perform()
    }

    /// The destination, or `None` once it has been dropped.
    pub fn destination(&self) -> Option<AbstractState> {
        self.node.destination().map(AbstractState::from_node)
    }

    pub fn source(&self) -> Option<AbstractState> {
        self.node.src.upgrade().map(AbstractState::from_node)
    }
}

impl PartialEq for Transition {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }
}

impl Eq for Transition {}

impl fmt::Debug for Transition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = |node: Option<Arc<StateNode>>| node.map(|n| n.name.clone());
        f.debug_struct("Transition")
            .field("src", &name(self.node.src.upgrade()))
            .field("dst", &name(self.node.dst.upgrade()))
            .field("guards", &self.guard_count())
            .field("events", &self.event_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Chart;
    use std::sync::atomic::AtomicUsize;

    fn two_state_chart() -> (Chart, Transition) {
        let chart = Chart::new("c").unwrap();
        let s1 = chart.create_state("s1").unwrap();
        let t = chart.initial_state().create_transition(&s1).unwrap();
        (chart, t)
    }

    #[test]
    fn guard_bookkeeping() {
        let (_chart, t) = two_state_chart();
        assert_eq!(t.guard_count(), 0);

        let g1 = t.create_guard(|| true);
        assert_eq!(t.guard_count(), 1);
        assert!(t.remove_guard(&g1));
        assert_eq!(t.guard_count(), 0);
        assert!(!t.remove_guard(&g1));

        t.create_guard(|| true);
        t.create_guard(|| true);
        assert_eq!(t.guard_count(), 2);
        assert!(g1.is_satisfied());
    }

    #[test]
    fn guards_are_anded_and_all_evaluated() {
        let (_chart, t) = two_state_chart();
        let evaluated = Arc::new(AtomicUsize::new(0));

        assert!(t.guards_satisfied());

        let counter = evaluated.clone();
        t.create_guard(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            false
        });
        let counter = evaluated.clone();
        t.create_guard(move || {
            counter.fetch_add(1, Ordering::SeqCst);
            true
        });

        assert!(!t.guards_satisfied());
        assert_eq!(evaluated.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn event_bookkeeping() {
        let (_chart, t) = two_state_chart();
        let e1 = Event::new("e1");
        let e2 = Event::new("e2");

        assert!(t.add_event(&e1));
        assert!(!t.add_event(&e1));
        assert_eq!(e1.observer_count(), 1);
        assert_eq!(t.event_count(), 1);

        assert!(t.add_event(&e2));
        assert_eq!(t.event_count(), 2);

        assert!(t.remove_event(&e1));
        assert!(!t.remove_event(&e1));
        assert_eq!(e1.observer_count(), 0);
        assert_eq!(t.event_count(), 1);
    }

    #[test]
    fn event_less_transition_follows_guards() {
        let (_chart, t) = two_state_chart();
        assert!(t.should_perform());
        assert!(t.should_perform());

        t.create_guard(|| false);
        assert!(!t.should_perform());
    }

    #[test]
    fn trigger_is_ignored_while_source_inactive() {
        let (_chart, t) = two_state_chart();
        let e = Event::new("e");
        t.add_event(&e);

        e.trigger();
        assert!(!t.should_perform());
    }

    #[test]
    fn trigger_is_consumed_even_when_guard_fails() {
        let (chart, t) = two_state_chart();
        let open = Arc::new(AtomicBool::new(false));
        let flag = open.clone();
        t.create_guard(move || flag.load(Ordering::SeqCst));
        let e = Event::new("e");
        t.add_event(&e);
        chart.initial_state().node.set_active(true);

        e.trigger();
        assert!(!t.should_perform());

        open.store(true, Ordering::SeqCst);
        assert!(!t.should_perform());

        e.trigger();
        assert!(t.should_perform());
        assert!(!t.should_perform());
    }

    #[test]
    fn endpoints_are_reported() {
        let (chart, t) = two_state_chart();
        let s1 = chart.create_state("s1").unwrap();
        assert_eq!(t.destination().as_ref(), Some(&*s1));
        assert_eq!(t.source().as_ref(), Some(&*chart.initial_state()));
    }
}
