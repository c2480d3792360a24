//! Configuration of the background runner.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Settings read each time [`Chart::spin_async`](crate::Chart::spin_async)
/// starts a runner. Changing them while the chart is running takes effect on
/// the next start.
///
/// # Example
///
/// ```rust
/// use statechart::RunnerConfig;
/// use std::time::Duration;
///
/// let config = RunnerConfig::default()
///     .with_thread_name("door-controller")
///     .with_idle_backoff(Duration::from_millis(1));
///
/// assert_eq!(config.thread_name.as_deref(), Some("door-controller"));
/// assert_eq!(config.idle_backoff(), Duration::from_millis(1));
/// ```
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunnerConfig {
    /// OS thread name. Defaults to `statechart-<chart name>`.
    pub thread_name: Option<String>,

    /// Sleep after a step that entered no new state, in microseconds.
    /// Zero keeps the loop spinning, yielding to the scheduler between steps.
    pub idle_backoff_us: u64,
}

impl RunnerConfig {
    pub fn with_thread_name(mut self, name: impl Into<String>) -> Self {
        self.thread_name = Some(name.into());
        self
    }

    pub fn with_idle_backoff(mut self, backoff: Duration) -> Self {
        self.idle_backoff_us = u64::try_from(backoff.as_micros()).unwrap_or(u64::MAX);
        self
    }

    pub fn idle_backoff(&self) -> Duration {
        Duration::from_micros(self.idle_backoff_us)
    }

    pub(crate) fn thread_name_for(&self, chart: &str) -> String {
        self.thread_name
            .clone()
            .unwrap_or_else(|| format!("statechart-{chart}"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_busy_loops_with_derived_thread_name() {
        let config = RunnerConfig::default();
        assert_eq!(config.idle_backoff(), Duration::ZERO);
        assert_eq!(config.thread_name_for("door"), "statechart-door");
    }

    #[test]
    fn explicit_thread_name_wins() {
        let config = RunnerConfig::default().with_thread_name("worker");
        assert_eq!(config.thread_name_for("door"), "worker");
    }

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let config: RunnerConfig = serde_json::from_str(r#"{"idle_backoff_us": 250}"#).unwrap();
        assert_eq!(config.thread_name, None);
        assert_eq!(config.idle_backoff(), Duration::from_micros(250));

        let empty: RunnerConfig = serde_json::from_str("{}").unwrap();
        assert_eq!(empty, RunnerConfig::default());
    }

    #[test]
    fn config_serializes_correctly() {
        let config = RunnerConfig::default()
            .with_thread_name("runner")
            .with_idle_backoff(Duration::from_millis(2));
        let json = serde_json::to_string(&config).unwrap();
        let deserialized: RunnerConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }
}
