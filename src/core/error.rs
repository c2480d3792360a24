//! Configuration errors raised while building a chart.

use thiserror::Error;

/// Errors that can occur when constructing charts, states and transitions.
///
/// Every variant is a configuration mistake made by the caller. Nothing in
/// the engine retries or recovers from them.
#[derive(Debug, Error)]
pub enum ChartError {
    #[error("Chart name is empty")]
    EmptyChartName,

    #[error("State name is empty")]
    EmptyStateName,

    #[error("'{dst}' and '{src}' are not in the same chart")]
    DifferentCharts { src: String, dst: String },

    #[error("'{name}' already exists in this chart and is not a simple state")]
    NotASimpleState { name: String },

    #[error("Failed to spawn the background runner: {0}")]
    Spawn(#[from] std::io::Error),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, ChartError>;
