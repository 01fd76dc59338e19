//! Stages and ramp profiles

use crate::error::{EngineError, EngineResult};
use serde::{Deserialize, Serialize};
use stampede_config::StageConfig;
use std::time::Duration;

/// Interpolated values this close below an integer count as that integer
const ROUNDING_EPSILON: f64 = 1e-9;

/// One window of a ramp profile
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stage {
    #[serde(with = "humantime_serde")]
    pub duration: Duration,
    pub target: u32,
    pub hold: bool,
}

impl Stage {
    /// Move linearly from the previous target to `target`
    pub fn ramp(duration: Duration, target: u32) -> Self {
        Self {
            duration,
            target,
            hold: false,
        }
    }

    /// Stay at `target` for the whole stage
    pub fn hold(duration: Duration, target: u32) -> Self {
        Self {
            duration,
            target,
            hold: true,
        }
    }
}

impl From<&StageConfig> for Stage {
    fn from(config: &StageConfig) -> Self {
        Self {
            duration: config.duration,
            target: config.target,
            hold: config.hold,
        }
    }
}

/// Ordered stages describing desired concurrency over time
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RampProfile {
    stages: Vec<Stage>,
}

impl RampProfile {
    pub fn new(stages: Vec<Stage>) -> EngineResult<Self> {
        if stages.is_empty() {
            return Err(EngineError::InvalidStage(
                "a ramp profile needs at least one stage".to_string(),
            ));
        }
        if let Some(idx) = stages.iter().position(|s| s.duration.is_zero()) {
            return Err(EngineError::InvalidStage(format!(
                "stage {} has a zero duration",
                idx + 1
            )));
        }
        if stages
            .iter()
            .try_fold(Duration::ZERO, |total, s| total.checked_add(s.duration))
            .is_none()
        {
            return Err(EngineError::InvalidStage(
                "total stage duration is too long to represent".to_string(),
            ));
        }
        Ok(Self { stages })
    }

    /// `vus` virtual users for `duration`
    pub fn constant(vus: u32, duration: Duration) -> EngineResult<Self> {
        Self::new(vec![Stage::hold(duration, vus)])
    }

    pub fn from_config(stages: &[StageConfig]) -> EngineResult<Self> {
        Self::new(stages.iter().map(Stage::from).collect())
    }

    pub fn stages(&self) -> &[Stage] {
        &self.stages
    }

    pub fn total_duration(&self) -> Duration {
        self.stages
            .iter()
            .fold(Duration::ZERO, |total, s| total.saturating_add(s.duration))
    }

    /// Highest concurrency the profile ever asks for
    pub fn peak(&self) -> u32 {
        self.stages.iter().map(|s| s.target).max().unwrap_or(0)
    }

    /// Desired concurrency `elapsed` into the profile.
    ///
    /// Ramping stages interpolate linearly from the previous stage's target
    /// (0 before the first stage) and round down. Past the end the last
    /// target is returned.
    pub fn desired_at(&self, elapsed: Duration) -> u32 {
        let mut stage_start = Duration::ZERO;
        let mut previous = 0u32;

        for stage in &self.stages {
            let stage_end = stage_start.saturating_add(stage.duration);
            if elapsed < stage_end {
                if stage.hold {
                    return stage.target;
                }
                let progress = (elapsed - stage_start).as_secs_f64() / stage.duration.as_secs_f64();
                let from = f64::from(previous);
                let to = f64::from(stage.target);
                let value = from + (to - from) * progress;
                return (value + ROUNDING_EPSILON).floor().max(0.0) as u32;
            }
            stage_start = stage_end;
            previous = stage.target;
        }

        previous
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_ramp_then_hold() {
        let profile = RampProfile::new(vec![Stage::ramp(secs(10), 10), Stage::hold(secs(5), 10)]).unwrap();

        assert_eq!(profile.desired_at(Duration::ZERO), 0);
        assert_eq!(profile.desired_at(secs(5)), 5);
        assert_eq!(profile.desired_at(Duration::from_millis(9_990)), 9);
        assert_eq!(profile.desired_at(secs(10)), 10);
        assert_eq!(profile.desired_at(secs(12)), 10);
        assert_eq!(profile.desired_at(secs(60)), 10);
        assert_eq!(profile.total_duration(), secs(15));
    }

    #[test]
    fn test_ramp_down_rounds_down() {
        let profile = RampProfile::new(vec![Stage::hold(secs(2), 10), Stage::ramp(secs(4), 0)]).unwrap();

        assert_eq!(profile.desired_at(secs(1)), 10);
        assert_eq!(profile.desired_at(secs(3)), 7);
        assert_eq!(profile.desired_at(secs(4)), 5);
        assert_eq!(profile.desired_at(secs(6)), 0);
        assert_eq!(profile.peak(), 10);
    }

    #[test]
    fn test_interpolation_is_not_lost_to_float_error() {
        let profile = RampProfile::new(vec![Stage::ramp(secs(3), 3)]).unwrap();
        assert_eq!(profile.desired_at(secs(1)), 1);
        assert_eq!(profile.desired_at(secs(2)), 2);
    }

    #[test]
    fn test_profile_validation() {
        assert!(RampProfile::new(Vec::new()).is_err());
        assert!(RampProfile::new(vec![Stage::ramp(Duration::ZERO, 5)]).is_err());
        assert!(RampProfile::constant(3, secs(1)).is_ok());
    }

    #[test]
    fn test_overlong_profiles() {
        assert!(RampProfile::new(vec![Stage::hold(Duration::MAX, 2), Stage::hold(secs(1), 2)]).is_err());

        let endless = RampProfile::new(vec![Stage::ramp(Duration::MAX, 10)]).unwrap();
        assert_eq!(endless.total_duration(), Duration::MAX);
        assert_eq!(endless.desired_at(secs(3_600)), 0);
    }

    #[test]
    fn test_from_config() {
        let configs: Vec<StageConfig> = vec!["10s:4".parse().unwrap(), "5s:4:hold".parse().unwrap()];
        let profile = RampProfile::from_config(&configs).unwrap();
        assert_eq!(profile.stages()[1], Stage::hold(secs(5), 4));
    }
}
