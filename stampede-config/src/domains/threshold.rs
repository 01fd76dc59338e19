//! Threshold configuration

use crate::error::ConfigResult;
use crate::validation::{validate_required_string, Validatable};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a failing threshold affects the run verdict
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    /// Failing fails the run
    #[default]
    Error,
    /// Failing is reported but the run still passes
    Warning,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "error"),
            Severity::Warning => write!(f, "warning"),
        }
    }
}

/// A pass/fail expression evaluated against one metric
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ThresholdConfig {
    /// Metric name, including an optional `{key:value}` tag selector
    pub metric: String,

    /// Expression such as `p(95) < 2000` or `rate < 0.01`
    pub expr: String,

    #[serde(default)]
    pub severity: Severity,

    /// Stop the run as soon as a periodic check sees this threshold failing
    #[serde(default = "crate::domains::utils::default_false")]
    pub abort_on_fail: bool,
}

impl ThresholdConfig {
    pub fn new(metric: impl Into<String>, expr: impl Into<String>) -> Self {
        Self {
            metric: metric.into(),
            expr: expr.into(),
            severity: Severity::Error,
            abort_on_fail: false,
        }
    }
}

impl Validatable for ThresholdConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.metric, "metric", self.domain_name())?;
        validate_required_string(&self.expr, "expr", self.domain_name())?;
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "thresholds"
    }
}
