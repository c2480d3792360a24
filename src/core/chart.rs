//! Charts: containers of states that are states themselves.
//!
//! A chart advances through a three-phase process machine:
//!
//! - **Entry**: take the pending transition (if any), run the new state's
//!   entry action, notify state-change callbacks, mark the state active.
//! - **Do**: run the state's "do" action, purge expired transitions, then
//!   ask every outgoing transition whether it should be taken. The last one
//!   that answers yes becomes pending.
//! - **Exit**: run the state's exit action and the pending transition's
//!   action, then mark the state inactive.
//!
//! A *step* repeats phases until the chart sits in Do again, so callers
//! always observe a settled current state between steps.

use super::action::StateChangeCallback;
use super::error::{ChartError, Result};
use super::state::{AbstractState, NodeKind, State, StateNode};
use super::transition::TransitionNode;
use crate::runtime::{RunToken, Runner, RunnerConfig};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::sync::{Arc, Weak};
use std::thread;
use std::time::Duration;

const INITIAL: &str = "initial";
const FINAL: &str = "final";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Phase {
    Entry,
    Do,
    Exit,
}

pub(crate) struct ChartCore {
    states: RwLock<HashMap<String, Arc<StateNode>>>,
    initial: Arc<StateNode>,
    final_state: Arc<StateNode>,
    current: Mutex<Arc<StateNode>>,
    pending: Mutex<Option<Arc<TransitionNode>>>,
    phase: Mutex<Phase>,
    state_change_callbacks: RwLock<Vec<StateChangeCallback>>,
    runner: Runner,
}

impl ChartCore {
    /// `initial` and `final` start without a container; the owning chart
    /// adopts them once its node exists.
    fn new() -> Self {
        let initial = Arc::new(StateNode::simple(INITIAL, Weak::new()));
        let final_state = Arc::new(StateNode::simple(FINAL, Weak::new()));
        let states = HashMap::from([
            (INITIAL.to_string(), initial.clone()),
            (FINAL.to_string(), final_state.clone()),
        ]);

        Self {
            states: RwLock::new(states),
            current: Mutex::new(initial.clone()),
            initial,
            final_state,
            pending: Mutex::new(None),
            phase: Mutex::new(Phase::Entry),
            state_change_callbacks: RwLock::new(Vec::new()),
            runner: Runner::default(),
        }
    }

    pub(crate) fn runner(&self) -> &Runner {
        &self.runner
    }

    /// Whether `node` is registered here under its name.
    pub(crate) fn contains(&self, node: &Arc<StateNode>) -> bool {
        self.states
            .read()
            .get(&node.name)
            .is_some_and(|registered| Arc::ptr_eq(registered, node))
    }

    fn current(&self) -> Arc<StateNode> {
        self.current.lock().clone()
    }

    fn phase(&self) -> Phase {
        *self.phase.lock()
    }

    fn set_phase(&self, phase: Phase) {
        *self.phase.lock() = phase;
    }

    fn current_state_name_full(&self) -> String {
        let current = self.current();
        match current.chart_core() {
            Some(nested) => format!("{}:{}", current.name, nested.current_state_name_full()),
            None => current.name.clone(),
        }
    }

    /// Run one phase. Returns the phase that was executed.
    pub(crate) fn tick(&self, chart: &str) -> Phase {
        let phase = self.phase();
        tracing::trace!(chart, ?phase, "tick");

        match phase {
            Phase::Entry => self.enter(chart),
            Phase::Do => self.during(chart),
            Phase::Exit => self.exit(chart),
        }
        phase
    }

    /// Tick until the chart is back in Do. Returns whether a state was
    /// entered on the way.
    pub(crate) fn step(&self, chart: &str) -> bool {
        let mut entered = false;
        loop {
            entered |= self.tick(chart) == Phase::Entry;
            if self.phase() == Phase::Do {
                return entered;
            }
        }
    }

    /// Back to `initial`, in Entry, with nothing pending. Deactivates the
    /// state that was current.
    pub(crate) fn reset(&self, chart: &str) {
        let previous = std::mem::replace(&mut *self.current.lock(), self.initial.clone());
        previous.set_active(false);
        self.pending.lock().take();
        self.set_phase(Phase::Entry);
        tracing::debug!(chart, "chart reset");
    }

    fn enter(&self, chart: &str) {
        let pending = self.pending.lock().take();
        if let Some(transition) = pending {
            match transition.destination() {
                Some(dst) => *self.current.lock() = dst,
                None => tracing::warn!(chart, "pending destination vanished, re-entering current state"),
            }
        }

        let current = self.current();
        tracing::debug!(chart, state = %current.name, "entering state");
        current.run_entry();

        let callbacks = self.state_change_callbacks.read().clone();
        for callback in &callbacks {
            callback.invoke(&current.name);
        }

        self.set_phase(Phase::Do);
        current.set_active(true);
    }

    fn during(&self, chart: &str) {
        let current = self.current();
        current.run_do();
        current.purge_expired_transitions();

        // Every transition is asked so each one consumes its trigger.
        let mut selected = None;
        for transition in current.transitions() {
            if transition.should_perform() {
                selected = Some(transition);
            }
        }

        if let Some(transition) = selected {
            tracing::debug!(
                chart,
                src = %current.name,
                dst = ?transition.destination().map(|dst| dst.name.clone()),
                "transition selected"
            );
            *self.pending.lock() = Some(transition);
            self.set_phase(Phase::Exit);
        }
    }

    fn exit(&self, chart: &str) {
        let current = self.current();
        tracing::debug!(chart, state = %current.name, "leaving state");
        current.run_exit();

        let pending = self.pending.lock().clone();
        if let Some(transition) = pending {
            transition.run_action();
        }

        current.set_active(false);
        self.set_phase(Phase::Entry);
    }
}

/// Background loop of a root chart. Holds only a weak reference so that
/// dropping the last [`Chart`] handle ends the run. Exits once `token` is
/// cleared, even if a newer run has started in the meantime.
fn run_loop(chart: Weak<StateNode>, token: RunToken, idle_backoff: Duration) {
    while token.is_live() {
        let Some(node) = chart.upgrade() else {
            break;
        };
        let Some(core) = node.chart_core() else {
            break;
        };

        let entered = {
            let _step = core.runner.gate().enter_step();
            if !token.is_live() {
                break;
            }
            core.step(&node.name)
        };

        drop(node);
        if !entered {
            if idle_backoff.is_zero() {
                thread::yield_now();
            } else {
                thread::sleep(idle_backoff);
            }
        }
    }
    tracing::trace!("background loop exited");
}

/// A chart of states.
///
/// A chart is also a state: added to another chart with
/// [`Chart::add_subchart`] it can be the source or destination of that
/// chart's transitions. Entering it restarts it from its own `"initial"`
/// state, and every "do" tick of the outer chart advances it by one step.
///
/// Handles are cheap to clone and compare by identity.
///
/// # Example
///
/// ```rust
/// use statechart::Chart;
///
/// let chart = Chart::new("traffic").unwrap();
/// let green = chart.create_state("green").unwrap();
/// chart.initial_state().create_transition(&green).unwrap();
/// green.create_transition(&chart.final_state()).unwrap();
///
/// chart.spin_once();
/// assert_eq!(chart.current_state_name(), "initial");
/// chart.spin_once();
/// assert_eq!(chart.current_state_name(), "green");
/// chart.spin_once();
/// assert_eq!(chart.current_state_name(), "final");
/// ```
#[derive(Clone)]
pub struct Chart {
    base: AbstractState,
    core: Arc<ChartCore>,
}

impl Chart {
    /// Create a top-level chart with its `"initial"` and `"final"` states.
    pub fn new(name: impl Into<String>) -> Result<Self> {
        let name = name.into();
        if name.is_empty() {
            return Err(ChartError::EmptyChartName);
        }

        let core = Arc::new(ChartCore::new());
        let node = Arc::new(StateNode::new(
            name,
            Weak::new(),
            NodeKind::Composite(core.clone()),
        ));
        core.initial.set_container(Arc::downgrade(&node));
        core.final_state.set_container(Arc::downgrade(&node));

        Ok(Self {
            base: AbstractState::from_node(node),
            core,
        })
    }

    /// `None` unless `node` is a chart.
    pub(crate) fn from_node(node: Arc<StateNode>) -> Option<Self> {
        let core = match &node.kind {
            NodeKind::Composite(core) => core.clone(),
            NodeKind::Simple(_) => return None,
        };
        Some(Self {
            base: AbstractState::from_node(node),
            core,
        })
    }

    /// Create a leaf state, or return the existing one with that name.
    ///
    /// Fails on an empty name, or if `name` is taken by a subchart.
    pub fn create_state(&self, name: impl Into<String>) -> Result<State> {
        let name = name.into();
        if name.is_empty() {
            return Err(ChartError::EmptyStateName);
        }

        let mut states = self.core.states.write();
        if let Some(existing) = states.get(&name) {
            return match existing.kind {
                NodeKind::Simple(_) => Ok(State::from_node(existing.clone())),
                NodeKind::Composite(_) => Err(ChartError::NotASimpleState { name }),
            };
        }

        let node = Arc::new(StateNode::simple(name.clone(), Arc::downgrade(&self.node)));
        states.insert(name.clone(), node.clone());
        tracing::debug!(chart = %self.name(), state = %name, "state created");
        Ok(State::from_node(node))
    }

    /// Nest `subchart` in this chart under its own name.
    ///
    /// A subchart already nested elsewhere is moved here. Returns `false`,
    /// changing nothing, if the name is taken or nesting would create a
    /// cycle. A running subchart is stopped first.
    pub fn add_subchart(&self, subchart: &Chart) -> bool {
        let mut ancestor = Some(self.node.clone());
        while let Some(node) = ancestor {
            if Arc::ptr_eq(&node, &subchart.node) {
                return false;
            }
            ancestor = node.container();
        }
        if self.has_state(subchart.name()) {
            return false;
        }

        subchart.stop();
        if let Some(previous) = subchart.node.container().and_then(Chart::from_node) {
            previous.remove_subchart_state(subchart);
        }
        subchart.node.set_container(Arc::downgrade(&self.node));
        self.core
            .states
            .write()
            .insert(subchart.name().to_string(), subchart.node.clone());
        tracing::debug!(chart = %self.name(), subchart = %subchart.name(), "subchart added");
        true
    }

    /// Remove a state by name. `"initial"` and `"final"` cannot be removed.
    ///
    /// Transitions into the removed state are not touched here; they expire
    /// and are purged the next time their source is inspected.
    pub fn remove_state(&self, name: &str) -> bool {
        if name == INITIAL || name == FINAL {
            return false;
        }
        let Some(removed) = self.core.states.write().remove(name) else {
            return false;
        };
        self.detach(&removed);
        true
    }

    /// Remove `state` if it is the node registered here under its name.
    pub fn remove_subchart_state(&self, state: &AbstractState) -> bool {
        let name = state.name();
        if name == INITIAL || name == FINAL {
            return false;
        }
        let removed = {
            let mut states = self.core.states.write();
            match states.get(name) {
                Some(registered) if Arc::ptr_eq(registered, &state.node) => states.remove(name),
                _ => None,
            }
        };
        match removed {
            Some(removed) => {
                self.detach(&removed);
                true
            }
            None => false,
        }
    }

    /// A removed subchart becomes a top-level chart again.
    fn detach(&self, removed: &Arc<StateNode>) {
        if removed.chart_core().is_some() {
            removed.set_container(Weak::new());
        }
        tracing::debug!(chart = %self.name(), state = %removed.name, "state removed");
    }

    pub fn has_state(&self, name: &str) -> bool {
        self.core.states.read().contains_key(name)
    }

    /// Whether this very state, not just one of the same name, belongs here.
    pub fn has_state_handle(&self, state: &AbstractState) -> bool {
        self.core.contains(&state.node)
    }

    pub fn get_state(&self, name: &str) -> Option<AbstractState> {
        self.core
            .states
            .read()
            .get(name)
            .cloned()
            .map(AbstractState::from_node)
    }

    /// Number of states, including `"initial"`, `"final"` and subcharts.
    pub fn state_count(&self) -> usize {
        self.core.states.read().len()
    }

    pub fn initial_state(&self) -> State {
        State::from_node(self.core.initial.clone())
    }

    pub fn final_state(&self) -> State {
        State::from_node(self.core.final_state.clone())
    }

    pub fn current_state_name(&self) -> String {
        self.core.current().name.clone()
    }

    /// Current state name qualified with the current states of nested
    /// charts, e.g. `"sub:s1"`.
    pub fn current_state_name_full(&self) -> String {
        self.core.current_state_name_full()
    }

    /// Register `callback` to receive the name of every state this chart
    /// enters. Callbacks run in registration order.
    pub fn create_state_change_callback<F>(&self, callback: F) -> StateChangeCallback
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        let callback = StateChangeCallback::new(callback);
        self.core.state_change_callbacks.write().push(callback.clone());
        callback
    }

    pub fn remove_state_change_callback(&self, callback: &StateChangeCallback) -> bool {
        let mut callbacks = self.core.state_change_callbacks.write();
        let before = callbacks.len();
        callbacks.retain(|c| c != callback);
        callbacks.len() != before
    }

    fn refuse_while_running(&self, mode: &str) -> bool {
        let running = self.core.runner.is_running();
        if running {
            tracing::warn!(chart = %self.name(), mode, "refused, background run is active");
        }
        running
    }

    /// Step forever on the calling thread. Returns immediately if a
    /// background run is active.
    pub fn spin(&self) {
        if self.refuse_while_running("spin") {
            return;
        }
        loop {
            self.core.step(self.name());
        }
    }

    /// Perform one step. Returns `false` if refused because a background
    /// run is active.
    pub fn spin_once(&self) -> bool {
        if self.refuse_while_running("spin_once") {
            return false;
        }
        self.core.step(self.name());
        true
    }

    /// Tick until the current state is `name`. Never returns if `name` is
    /// not reachable. Returns `false` if refused because a background run is
    /// active.
    pub fn spin_to_state(&self, name: &str) -> bool {
        if self.refuse_while_running("spin_to_state") {
            return false;
        }
        while self.core.current().name != name {
            self.core.tick(self.name());
        }
        true
    }

    /// Step on a dedicated background thread until [`Chart::stop`].
    ///
    /// Returns `Ok(false)` if this chart is nested in another chart or is
    /// already running.
    pub fn spin_async(&self) -> Result<bool> {
        if self.node.container().is_some() {
            tracing::warn!(chart = %self.name(), "refused, nested charts cannot run in the background");
            return Ok(false);
        }

        let config = self.core.runner.config();
        let chart = Arc::downgrade(&self.node);
        let idle_backoff = config.idle_backoff();
        let started = self
            .core
            .runner
            .start(config.thread_name_for(self.name()), move |token| {
                run_loop(chart, token, idle_backoff)
            })?;
        if !started {
            tracing::warn!(chart = %self.name(), "refused, already running");
        }
        Ok(started)
    }

    /// Stop the background run, if any, and wait for its thread. The step
    /// in flight always completes first.
    pub fn stop(&self) {
        self.core.runner.stop();
    }

    /// Stop any background run and return to `"initial"`.
    pub fn reset(&self) {
        self.stop();
        self.core.reset(self.name());
    }

    pub fn is_running(&self) -> bool {
        self.core.runner.is_running()
    }

    /// Applied on the next [`Chart::spin_async`].
    pub fn set_runner_config(&self, config: RunnerConfig) {
        self.core.runner.set_config(config);
    }

    pub fn runner_config(&self) -> RunnerConfig {
        self.core.runner.config()
    }
}

impl Deref for Chart {
    type Target = AbstractState;

    fn deref(&self) -> &AbstractState {
        &self.base
    }
}

impl AsRef<AbstractState> for Chart {
    fn as_ref(&self) -> &AbstractState {
        &self.base
    }
}

impl PartialEq for Chart {
    fn eq(&self, other: &Self) -> bool {
        self.base == other.base
    }
}

impl Eq for Chart {}

impl fmt::Debug for Chart {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Chart")
            .field("name", &self.name())
            .field("current", &self.current_state_name())
            .field("states", &self.state_count())
            .field("running", &self.is_running())
            .finish()
    }
}
