//! Statechart: a hierarchical state machine engine
//!
//! Build a [`Chart`] of states and transitions, gate transitions with guards
//! and events, nest charts inside charts, then drive the chart one step at a
//! time or on a background thread while events arrive from anywhere.
//!
//! # Core Concepts
//!
//! - **Chart**: a container of named states, always holding `"initial"` and
//!   `"final"`; also usable as a state of another chart
//! - **State**: a leaf with entry, do and exit actions
//! - **Transition**: an edge taken when all its guards hold and, if it has
//!   events, one of them has fired since the last attempt
//! - **Event**: a named broadcast, safe to trigger from any thread
//!
//! # Example
//!
//! ```rust
//! use statechart::{Chart, Event};
//! use std::sync::atomic::{AtomicBool, Ordering};
//! use std::sync::Arc;
//!
//! let chart = Chart::new("kettle")?;
//! let heating = chart.create_state("heating")?;
//! let boiled = Arc::new(AtomicBool::new(false));
//!
//! chart.initial_state().create_transition(&heating)?;
//! let done = heating.create_transition(&chart.final_state())?;
//! let flag = boiled.clone();
//! done.create_guard(move || flag.load(Ordering::SeqCst));
//!
//! let switch_off = Event::new("switch-off");
//! done.add_event(&switch_off);
//!
//! chart.spin_to_state("heating");
//! boiled.store(true, Ordering::SeqCst);
//! switch_off.trigger();
//! chart.spin_once();
//! assert_eq!(chart.current_state_name(), "final");
//! # Ok::<(), statechart::ChartError>(())
//! ```

pub mod core;
pub mod runtime;

// Re-export commonly used types
pub use crate::core::{
    AbstractState, Chart, ChartError, Event, EventId, EventObserver, Guard, Result, State,
    StateChangeCallback, Transition,
};
pub use runtime::RunnerConfig;
