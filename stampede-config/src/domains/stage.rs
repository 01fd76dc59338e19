//! Ramp profile stages

use crate::error::{ConfigError, ConfigResult};
use crate::validation::{validate_positive_duration, Validatable};
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use std::time::Duration;

/// One window of a ramp profile
///
/// Without `hold`, concurrency moves linearly from the previous stage's
/// target to `target` over `duration`. With `hold`, concurrency sits at
/// `target` for the whole stage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageConfig {
    /// Length of the stage
    #[serde(with = "humantime_serde")]
    pub duration: Duration,

    /// Concurrency reached at the end of the stage
    pub target: u32,

    /// Keep concurrency constant at `target` instead of ramping
    #[serde(default = "crate::domains::utils::default_false")]
    pub hold: bool,
}

impl StageConfig {
    pub fn ramp(duration: Duration, target: u32) -> Self {
        Self {
            duration,
            target,
            hold: false,
        }
    }

    pub fn hold(duration: Duration, target: u32) -> Self {
        Self {
            duration,
            target,
            hold: true,
        }
    }
}

impl Validatable for StageConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive_duration(self.duration, "duration", self.domain_name())
    }

    fn domain_name(&self) -> &'static str {
        "stages"
    }
}

/// Parses the command line form `DURATION:TARGET[:hold]`, e.g. `30s:10` or `1m:50:hold`
impl FromStr for StageConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut parts = s.split(':');
        let (Some(duration), Some(target)) = (parts.next(), parts.next()) else {
            return Err(ConfigError::ValidationError(format!(
                "invalid stage '{}', expected DURATION:TARGET[:hold]",
                s
            )));
        };

        let duration = humantime::parse_duration(duration.trim()).map_err(|e| {
            ConfigError::ValidationError(format!("invalid stage duration '{}': {}", duration, e))
        })?;
        let target = target.trim().parse::<u32>().map_err(|e| {
            ConfigError::ValidationError(format!("invalid stage target '{}': {}", target, e))
        })?;

        let hold = match parts.next().map(str::trim) {
            None => false,
            Some(flag) if flag.eq_ignore_ascii_case("hold") => true,
            Some(other) => {
                return Err(ConfigError::ValidationError(format!(
                    "invalid stage modifier '{}', only 'hold' is supported",
                    other
                )))
            }
        };

        if parts.next().is_some() {
            return Err(ConfigError::ValidationError(format!(
                "invalid stage '{}', too many segments",
                s
            )));
        }

        let stage = Self {
            duration,
            target,
            hold,
        };
        stage.validate()?;
        Ok(stage)
    }
}
