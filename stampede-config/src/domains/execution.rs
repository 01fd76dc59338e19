//! Execution tuning: scheduling, draining and randomness

use crate::error::ConfigResult;
use crate::validation::{validate_positive_duration, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Scheduler and virtual user execution settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Interval between scheduler reconciliation ticks
    #[serde(with = "humantime_serde", default = "default_tick_interval")]
    pub tick_interval: Duration,

    /// Time in-flight iterations get to finish when the run ends or is stopped
    #[serde(with = "humantime_serde", default = "default_graceful_stop")]
    pub graceful_stop: Duration,

    /// Time in-flight iterations get to finish when a stage lowers concurrency
    #[serde(with = "humantime_serde", default = "default_graceful_stop")]
    pub graceful_ramp_down: Duration,

    /// Hard deadline for the whole run
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub max_duration: Option<Duration>,

    /// Seed for scenario routing and per-VU randomness
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,

    /// Interval for evaluating thresholds while the run is in progress
    #[serde(with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub threshold_check_interval: Option<Duration>,

    /// Default pause between iterations
    pub think_time: ThinkTimeConfig,
}

/// Bounded random pause, drawn uniformly from `[min, max]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct ThinkTimeConfig {
    #[serde(with = "humantime_serde")]
    pub min: Duration,
    #[serde(with = "humantime_serde")]
    pub max: Duration,
}

impl ThinkTimeConfig {
    pub fn fixed(duration: Duration) -> Self {
        Self {
            min: duration,
            max: duration,
        }
    }
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            tick_interval: default_tick_interval(),
            graceful_stop: default_graceful_stop(),
            graceful_ramp_down: default_graceful_stop(),
            max_duration: None,
            seed: None,
            threshold_check_interval: None,
            think_time: ThinkTimeConfig::default(),
        }
    }
}

impl Validatable for ExecutionConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive_duration(self.tick_interval, "tick_interval", self.domain_name())?;

        if let Some(max_duration) = self.max_duration {
            validate_positive_duration(max_duration, "max_duration", self.domain_name())?;
        }

        if let Some(interval) = self.threshold_check_interval {
            validate_positive_duration(interval, "threshold_check_interval", self.domain_name())?;
        }

        self.think_time.validate()?;

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "execution"
    }
}

impl Validatable for ThinkTimeConfig {
    fn validate(&self) -> ConfigResult<()> {
        if self.min > self.max {
            return Err(self.validation_error(format!(
                "min ({:?}) must not exceed max ({:?})",
                self.min, self.max
            )));
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "think_time"
    }
}

fn default_tick_interval() -> Duration {
    Duration::from_millis(100)
}

fn default_graceful_stop() -> Duration {
    Duration::from_secs(30)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_execution_defaults() {
        let config = ExecutionConfig::default();
        assert_eq!(config.tick_interval, Duration::from_millis(100));
        assert_eq!(config.graceful_stop, Duration::from_secs(30));
        assert_eq!(config.graceful_ramp_down, Duration::from_secs(30));
        assert!(config.seed.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_execution_validation() {
        let mut config = ExecutionConfig::default();
        config.tick_interval = Duration::ZERO;
        assert!(config.validate().is_err());

        let mut config = ExecutionConfig::default();
        config.think_time = ThinkTimeConfig {
            min: Duration::from_secs(3),
            max: Duration::from_secs(1),
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_execution_yaml() {
        let yaml = r#"
tick_interval: 250ms
graceful_stop: 5s
seed: 7
think_time: { min: 1s, max: 3s }
"#;
        let config: ExecutionConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.tick_interval, Duration::from_millis(250));
        assert_eq!(config.graceful_stop, Duration::from_secs(5));
        assert_eq!(config.graceful_ramp_down, Duration::from_secs(30));
        assert_eq!(config.seed, Some(7));
        assert_eq!(config.think_time.max, Duration::from_secs(3));
    }
}
