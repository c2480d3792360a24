//! Background execution of a root chart.
//!
//! A [`Runner`] owns at most one dedicated thread per run. It knows nothing
//! about charts: the chart hands it a loop body, which polls its
//! [`RunToken`] once per completed step.

mod config;
mod gate;

pub use config::RunnerConfig;
pub(crate) use gate::PauseGate;

use crate::core::ChartError;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Liveness of one run. Cleared by [`Runner::stop`]; a later start hands out
/// a fresh token, so a worker left over from an earlier run still sees its
/// own token cleared.
#[derive(Clone, Debug)]
pub(crate) struct RunToken(Arc<AtomicBool>);

impl RunToken {
    fn live() -> Self {
        Self(Arc::new(AtomicBool::new(true)))
    }

    pub(crate) fn is_live(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }

    fn cancel(&self) {
        self.0.store(false, Ordering::SeqCst);
    }
}

struct Run {
    token: RunToken,
    handle: JoinHandle<()>,
}

#[derive(Default)]
pub(crate) struct Runner {
    running: AtomicBool,
    run: Mutex<Option<Run>>,
    /// Held by a stopping thread for as long as it joins the worker.
    joining: Mutex<()>,
    gate: PauseGate,
    config: Mutex<RunnerConfig>,
}

impl Runner {
    pub(crate) fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    pub(crate) fn gate(&self) -> &PauseGate {
        &self.gate
    }

    pub(crate) fn config(&self) -> RunnerConfig {
        self.config.lock().clone()
    }

    pub(crate) fn set_config(&self, config: RunnerConfig) {
        *self.config.lock() = config;
    }

    /// Spawn `body` on a named thread unless a run is already active.
    ///
    /// Returns `Ok(false)` when already running.
    pub(crate) fn start<F>(&self, thread_name: String, body: F) -> Result<bool, ChartError>
    where
        F: FnOnce(RunToken) + Send + 'static,
    {
        if self.running.swap(true, Ordering::SeqCst) {
            return Ok(false);
        }

        let token = RunToken::live();
        let worker_token = token.clone();
        let mut run = self.run.lock();
        match thread::Builder::new()
            .name(thread_name.clone())
            .spawn(move || body(worker_token))
        {
            Ok(handle) => {
                *run = Some(Run { token, handle });
                tracing::info!(thread = %thread_name, "background runner started");
                Ok(true)
            }
            Err(err) => {
                self.running.store(false, Ordering::SeqCst);
                tracing::error!(thread = %thread_name, error = %err, "cannot spawn background runner");
                Err(ChartError::Spawn(err))
            }
        }
    }

    /// Signal the worker to exit after its current step and wait for it.
    /// A concurrent caller waits for the same join before returning.
    ///
    /// From inside a step the signal is sent but nothing is joined; the
    /// worker ends once that step returns.
    pub(crate) fn stop(&self) {
        if self.gate.in_step() {
            self.running.store(false, Ordering::SeqCst);
            if let Some(run) = self.run.lock().take() {
                run.token.cancel();
                tracing::debug!("background runner stopped from inside a step");
            }
            return;
        }

        let _joining = self.joining.lock();
        self.running.store(false, Ordering::SeqCst);
        let Some(run) = self.run.lock().take() else {
            return;
        };
        run.token.cancel();

        let handle = run.handle;
        if handle.thread().id() == thread::current().id() {
            tracing::debug!("background runner stopped from its own thread");
            return;
        }

        let name = handle.thread().name().map(str::to_owned);
        if handle.join().is_err() {
            tracing::error!(thread = ?name, "background runner panicked");
        } else {
            tracing::info!(thread = ?name, "background runner stopped");
        }
    }
}

impl Drop for Runner {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::time::Duration;

    fn counting_loop(ticks: &Arc<AtomicUsize>) -> impl FnOnce(RunToken) + Send {
        let ticks = ticks.clone();
        move |token| {
            while token.is_live() {
                ticks.fetch_add(1, Ordering::SeqCst);
                thread::sleep(Duration::from_millis(1));
            }
        }
    }

    #[test]
    fn start_then_stop() {
        let runner = Runner::default();
        let ticks = Arc::new(AtomicUsize::new(0));

        assert!(runner
            .start("runner-test".into(), counting_loop(&ticks))
            .unwrap());
        assert!(runner.is_running());

        while ticks.load(Ordering::SeqCst) == 0 {
            thread::yield_now();
        }

        runner.stop();
        assert!(!runner.is_running());
        let after_stop = ticks.load(Ordering::SeqCst);
        thread::sleep(Duration::from_millis(10));
        assert_eq!(ticks.load(Ordering::SeqCst), after_stop);
    }

    #[test]
    fn second_start_is_refused() {
        let runner = Runner::default();
        let ticks = Arc::new(AtomicUsize::new(0));

        assert!(runner
            .start("runner-test".into(), counting_loop(&ticks))
            .unwrap());
        assert!(!runner
            .start("runner-test".into(), counting_loop(&ticks))
            .unwrap());

        runner.stop();
    }

    #[test]
    fn stop_is_idempotent() {
        let runner = Runner::default();
        runner.stop();
        runner.stop();
        assert!(!runner.is_running());
    }

    #[test]
    fn restart_hands_out_a_fresh_token() {
        let runner = Runner::default();
        let (token_tx, token_rx) = std::sync::mpsc::channel();

        let tx = token_tx.clone();
        runner
            .start("runner-test".into(), move |token| tx.send(token).unwrap())
            .unwrap();
        let first = token_rx.recv().unwrap();
        runner.stop();
        assert!(!first.is_live());

        runner
            .start("runner-test".into(), move |token| token_tx.send(token).unwrap())
            .unwrap();
        let second = token_rx.recv().unwrap();
        assert!(second.is_live());
        assert!(!first.is_live());
        runner.stop();
        assert!(!second.is_live());
    }

    #[test]
    fn concurrent_stop_waits_for_the_join() {
        let runner = Arc::new(Runner::default());
        let finished = Arc::new(AtomicBool::new(false));

        let done = finished.clone();
        runner
            .start("runner-test".into(), move |token| {
                while token.is_live() {
                    thread::sleep(Duration::from_millis(1));
                }
                thread::sleep(Duration::from_millis(50));
                done.store(true, Ordering::SeqCst);
            })
            .unwrap();

        let first = {
            let runner = runner.clone();
            thread::spawn(move || runner.stop())
        };
        while runner.is_running() {
            thread::yield_now();
        }
        runner.stop();
        assert!(finished.load(Ordering::SeqCst));
        first.join().unwrap();
    }
}
