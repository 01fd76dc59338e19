//! Execution tuning shared by schedulers and the orchestrator

use crate::scenario::ThinkTime;
use stampede_config::ExecutionConfig;
use std::time::Duration;

/// Timing and randomness settings for a run
#[derive(Debug, Clone)]
pub struct ExecutionSettings {
    /// Interval between scheduler reconciliation ticks
    pub tick_interval: Duration,
    /// Drain window when the run ends or is stopped
    pub graceful_stop: Duration,
    /// Drain window for virtual users removed by a falling stage
    pub graceful_ramp_down: Duration,
    pub max_duration: Option<Duration>,
    pub seed: Option<u64>,
    pub threshold_check_interval: Option<Duration>,
    /// Pause between iterations for scenarios without their own
    pub think_time: ThinkTime,
}

impl Default for ExecutionSettings {
    fn default() -> Self {
        Self::from(&ExecutionConfig::default())
    }
}

impl From<&ExecutionConfig> for ExecutionSettings {
    fn from(config: &ExecutionConfig) -> Self {
        Self {
            tick_interval: config.tick_interval,
            graceful_stop: config.graceful_stop,
            graceful_ramp_down: config.graceful_ramp_down,
            max_duration: config.max_duration,
            seed: config.seed,
            threshold_check_interval: config.threshold_check_interval,
            think_time: ThinkTime::from(config.think_time),
        }
    }
}
