//! State nodes and the handles users hold on to.
//!
//! Every node of a chart, leaf or nested chart, is a [`StateNode`]. What
//! "entry", "do" and "exit" mean is decided by matching on [`NodeKind`]:
//! a leaf runs user callbacks, a nested chart drives its own process
//! machine.
//!
//! Ownership runs strictly downwards. A chart owns its states, a state owns
//! its outgoing transitions, and everything pointing back up or across
//! (container, transition endpoints, event observers) is a `Weak`.

use super::action::{noop, Action, EventCallback};
use super::chart::{Chart, ChartCore};
use super::error::{ChartError, Result};
use super::event::{Event, EventId, EventObserver};
use super::transition::{Transition, TransitionNode};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Weak};

pub(crate) enum NodeKind {
    Simple(StateActions),
    Composite(Arc<ChartCore>),
}

pub(crate) struct StateActions {
    entry: RwLock<Action>,
    during: RwLock<Action>,
    exit: RwLock<Action>,
}

impl Default for StateActions {
    fn default() -> Self {
        Self {
            entry: RwLock::new(noop()),
            during: RwLock::new(noop()),
            exit: RwLock::new(noop()),
        }
    }
}

pub(crate) struct StateNode {
    pub(crate) name: String,
    container: RwLock<Weak<StateNode>>,
    active: AtomicBool,
    transitions: Mutex<Vec<Arc<TransitionNode>>>,
    event_callbacks: Mutex<HashMap<EventId, EventCallback>>,
    pub(crate) kind: NodeKind,
}

impl StateNode {
    pub(crate) fn new(name: String, container: Weak<StateNode>, kind: NodeKind) -> Self {
        Self {
            name,
            container: RwLock::new(container),
            active: AtomicBool::new(false),
            transitions: Mutex::new(Vec::new()),
            event_callbacks: Mutex::new(HashMap::new()),
            kind,
        }
    }

    pub(crate) fn simple(name: impl Into<String>, container: Weak<StateNode>) -> Self {
        Self::new(
            name.into(),
            container,
            NodeKind::Simple(StateActions::default()),
        )
    }

    pub(crate) fn chart_core(&self) -> Option<&ChartCore> {
        match &self.kind {
            NodeKind::Composite(core) => Some(core.as_ref()),
            NodeKind::Simple(_) => None,
        }
    }

    pub(crate) fn container(&self) -> Option<Arc<StateNode>> {
        self.container.read().upgrade()
    }

    pub(crate) fn set_container(&self, container: Weak<StateNode>) {
        *self.container.write() = container;
    }

    pub(crate) fn set_active(&self, active: bool) {
        self.active.store(active, Ordering::SeqCst);
    }

    /// Own flag ANDed with every ancestor's; a node without a container is
    /// the root and always active.
    pub(crate) fn is_active(&self) -> bool {
        match self.container() {
            None => true,
            Some(container) => self.active.load(Ordering::SeqCst) && container.is_active(),
        }
    }

    pub(crate) fn outermost_container(&self) -> Option<Arc<StateNode>> {
        let mut outermost = self.container()?;
        while let Some(parent) = outermost.container() {
            outermost = parent;
        }
        Some(outermost)
    }

    pub(crate) fn transitions(&self) -> Vec<Arc<TransitionNode>> {
        self.transitions.lock().clone()
    }

    /// Drop every outgoing transition whose destination is gone. Returns how
    /// many were removed.
    pub(crate) fn purge_expired_transitions(&self) -> usize {
        let mut transitions = self.transitions.lock();
        let before = transitions.len();
        transitions.retain(|t| !t.is_expired());
        let purged = before - transitions.len();
        if purged > 0 {
            tracing::debug!(state = %self.name, purged, "purged expired transitions");
        }
        purged
    }

    pub(crate) fn run_entry(&self) {
        match &self.kind {
            NodeKind::Simple(actions) => {
                let action = actions.entry.read().clone();
                action();
            }
            NodeKind::Composite(core) => core.reset(&self.name),
        }
    }

    pub(crate) fn run_do(&self) {
        match &self.kind {
            NodeKind::Simple(actions) => {
                let action = actions.during.read().clone();
                action();
            }
            NodeKind::Composite(core) => {
                core.step(&self.name);
            }
        }
    }

    pub(crate) fn run_exit(&self) {
        match &self.kind {
            NodeKind::Simple(actions) => {
                let action = actions.exit.read().clone();
                action();
            }
            NodeKind::Composite(_) => {}
        }
    }
}

impl EventObserver for StateNode {
    fn notify(&self, event: &Event) {
        if !self.is_active() {
            return;
        }
        let callback = self.event_callbacks.lock().get(&event.id()).cloned();
        if let Some(callback) = callback {
            tracing::trace!(state = %self.name, event = %event.name(), "event callback");
            callback(event);
        }
    }
}

/// Operations shared by every node of a chart.
///
/// Both [`State`] and [`Chart`] dereference to `AbstractState`, so a chart
/// nested inside another chart can be used wherever a state is expected,
/// e.g. as a transition destination.
#[derive(Clone)]
pub struct AbstractState {
    pub(crate) node: Arc<StateNode>,
}

impl AbstractState {
    pub(crate) fn from_node(node: Arc<StateNode>) -> Self {
        Self { node }
    }

    /// Name, unique within the containing chart.
    pub fn name(&self) -> &str {
        &self.node.name
    }

    /// Create a transition from this state to `dst` that does nothing when
    /// taken.
    ///
    /// Fails unless both endpoints belong to the same chart. A chart added
    /// with [`Chart::add_subchart`] belongs to its parent.
    pub fn create_transition(&self, dst: &AbstractState) -> Result<Transition> {
        self.create_transition_with_action(dst, || {})
    }

    /// Create a transition whose `action` runs when it is taken, after the
    /// exit action of this state and before the entry action of `dst`.
    pub fn create_transition_with_action<F>(&self, dst: &AbstractState, action: F) -> Result<Transition>
    where
        F: Fn() + Send + Sync + 'static,
    {
        let container = match (self.node.container(), dst.node.container()) {
            (Some(src_chart), Some(dst_chart)) if Arc::ptr_eq(&src_chart, &dst_chart) => src_chart,
            _ => {
                return Err(ChartError::DifferentCharts {
                    src: self.name().to_string(),
                    dst: dst.name().to_string(),
                })
            }
        };

        let transition = Arc::new(TransitionNode::new(
            Arc::downgrade(&container),
            Arc::downgrade(&self.node),
            Arc::downgrade(&dst.node),
            Arc::new(action),
        ));
        self.node.transitions.lock().push(transition.clone());
        tracing::debug!(src = %self.name(), dst = %dst.name(), "transition created");
        Ok(Transition::from_node(transition))
    }

    /// Remove an outgoing transition. Returns `false` if it is not one of
    /// this state's transitions.
    pub fn remove_transition(&self, transition: &Transition) -> bool {
        let mut transitions = self.node.transitions.lock();
        let before = transitions.len();
        transitions.retain(|t| !Arc::ptr_eq(t, &transition.node));
        transitions.len() != before
    }

    /// Drop outgoing transitions whose destination has been removed from the
    /// chart. Runs automatically on every "do" tick of this state; call it
    /// directly after removing states programmatically.
    pub fn purge_expired_transitions(&self) -> usize {
        self.node.purge_expired_transitions()
    }

    pub fn transition_count(&self) -> usize {
        self.node.transitions.lock().len()
    }

    /// Handles to all outgoing transitions, in evaluation order.
    pub fn transitions(&self) -> Vec<Transition> {
        self.node
            .transitions()
            .into_iter()
            .map(Transition::from_node)
            .collect()
    }

    /// True if this state's flag is set and so is every enclosing chart's.
    /// A chart without a container is always active.
    pub fn is_active(&self) -> bool {
        self.node.is_active()
    }

    /// Run `callback` whenever `event` fires while this state is active.
    ///
    /// Returns `false`, leaving the existing callback in place, if this
    /// state is already subscribed to `event`.
    pub fn create_event_callback<F>(&self, event: &Event, callback: F) -> bool
    where
        F: Fn(&Event) + Send + Sync + 'static,
    {
        {
            let mut callbacks = self.node.event_callbacks.lock();
            if callbacks.contains_key(&event.id()) {
                return false;
            }
            callbacks.insert(event.id(), Arc::new(callback));
        }
        event.add_observer(&self.node);
        true
    }

    /// Unsubscribe from `event`. Returns `false` if not subscribed.
    pub fn remove_event_callback(&self, event: &Event) -> bool {
        event.remove_observer(&self.node);
        self.node.event_callbacks.lock().remove(&event.id()).is_some()
    }

    /// Number of events this state has callbacks for.
    pub fn event_count(&self) -> usize {
        self.node.event_callbacks.lock().len()
    }

    /// The chart this state lives in, if any.
    pub fn container(&self) -> Option<Chart> {
        self.node.container().and_then(Chart::from_node)
    }

    /// The top-level chart above this state. `None` for a top-level chart.
    pub fn outermost_container(&self) -> Option<Chart> {
        self.node.outermost_container().and_then(Chart::from_node)
    }

    pub fn is_chart(&self) -> bool {
        self.node.chart_core().is_some()
    }

    pub fn as_chart(&self) -> Option<Chart> {
        Chart::from_node(self.node.clone())
    }

    pub fn as_state(&self) -> Option<State> {
        (!self.is_chart()).then(|| State::from_node(self.node.clone()))
    }
}

impl PartialEq for AbstractState {
    fn eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.node, &other.node)
    }
}

impl Eq for AbstractState {}

impl fmt::Debug for AbstractState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AbstractState")
            .field("name", &self.node.name)
            .field("chart", &self.is_chart())
            .finish()
    }
}

/// A leaf state with user-supplied entry, do and exit actions.
///
/// Created with [`Chart::create_state`]. All three actions default to doing
/// nothing.
#[derive(Clone, PartialEq, Eq)]
pub struct State {
    base: AbstractState,
}

impl State {
    pub(crate) fn from_node(node: Arc<StateNode>) -> Self {
        Self {
            base: AbstractState::from_node(node),
        }
    }

    fn actions(&self) -> Option<&StateActions> {
        match &self.base.node.kind {
            NodeKind::Simple(actions) => Some(actions),
            NodeKind::Composite(_) => None,
        }
    }

    /// Called when this state becomes the current state of its chart.
    pub fn set_callback_entry<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        if let Some(actions) = self.actions() {
            *actions.entry.write() = Arc::new(callback);
        }
    }

    /// Called on every tick while this is the current state.
    pub fn set_callback_do<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        if let Some(actions) = self.actions() {
            *actions.during.write() = Arc::new(callback);
        }
    }

    /// Called just before leaving this state.
    pub fn set_callback_exit<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        if let Some(actions) = self.actions() {
            *actions.exit.write() = Arc::new(callback);
        }
    }
}

impl Deref for State {
    type Target = AbstractState;

    fn deref(&self) -> &AbstractState {
        &self.base
    }
}

impl AsRef<AbstractState> for State {
    fn as_ref(&self) -> &AbstractState {
        &self.base
    }
}

impl fmt::Debug for State {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("State").field("name", &self.name()).finish()
    }
}
