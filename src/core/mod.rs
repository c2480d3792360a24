//! The statechart engine.
//!
//! - [`Event`]s broadcast to the states and transitions observing them
//! - [`Guard`]s gate [`Transition`]s
//! - [`State`]s are leaves with entry/do/exit actions
//! - [`Chart`]s contain states and can nest as states of other charts
//!
//! Everything here is reached through cheap, cloneable handles that
//! compare by identity.

mod action;
mod chart;
mod error;
mod event;
mod guard;
mod state;
mod transition;

pub use action::StateChangeCallback;
pub use chart::Chart;
pub use error::{ChartError, Result};
pub use event::{Event, EventId, EventObserver};
pub use guard::Guard;
pub use state::{AbstractState, State};
pub use transition::Transition;
