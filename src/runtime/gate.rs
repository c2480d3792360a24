//! Rendezvous between the background step loop and event delivery.
//!
//! The runner wraps every step in [`PauseGate::enter_step`]. A thread that
//! needs the chart to hold still calls [`PauseGate::pause`], which waits for
//! the step in flight to finish and keeps new steps from starting until the
//! returned guard is dropped. No lock is held while either side runs user
//! code.

use parking_lot::{Condvar, Mutex};
use std::thread::{self, ThreadId};

#[derive(Default)]
struct GateState {
    /// Thread running the step in flight.
    stepper: Option<ThreadId>,
    pauses: usize,
}

#[derive(Default)]
pub(crate) struct PauseGate {
    state: Mutex<GateState>,
    changed: Condvar,
}

impl PauseGate {
    /// Block until no pause is outstanding and no other step is in flight,
    /// then mark a step as running on the calling thread.
    pub(crate) fn enter_step(&self) -> StepGuard<'_> {
        let mut state = self.state.lock();
        while state.pauses > 0 || state.stepper.is_some() {
            self.changed.wait(&mut state);
        }
        state.stepper = Some(thread::current().id());
        StepGuard { gate: self }
    }

    /// Block until the step in flight (if any) completes. Steps stay held
    /// off until the guard is dropped.
    ///
    /// Returns `None` when called from inside the step in flight: that
    /// thread is already between evaluations.
    pub(crate) fn pause(&self) -> Option<PauseGuard<'_>> {
        let current = thread::current().id();
        let mut state = self.state.lock();
        if state.stepper == Some(current) {
            return None;
        }
        state.pauses += 1;
        while state.stepper.is_some() {
            self.changed.wait(&mut state);
        }
        Some(PauseGuard { gate: self })
    }

    /// True when the calling thread runs the step in flight.
    pub(crate) fn in_step(&self) -> bool {
        self.state.lock().stepper == Some(thread::current().id())
    }
}

pub(crate) struct StepGuard<'a> {
    gate: &'a PauseGate,
}

impl Drop for StepGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.gate.state.lock();
        state.stepper = None;
        self.gate.changed.notify_all();
    }
}

pub(crate) struct PauseGuard<'a> {
    gate: &'a PauseGate,
}

impl Drop for PauseGuard<'_> {
    fn drop(&mut self) {
        let mut state = self.gate.state.lock();
        state.pauses -= 1;
        if state.pauses == 0 {
            self.gate.changed.notify_all();
        }
    }
}
