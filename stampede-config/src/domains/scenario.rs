//! Scenario and request step configuration

use crate::domains::execution::ThinkTimeConfig;
use crate::domains::stage::StageConfig;
use crate::error::ConfigResult;
use crate::validation::{
    validate_enum_choice, validate_positive_duration, validate_required_string, Validatable,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;

/// HTTP methods accepted in request steps
pub const SUPPORTED_METHODS: [&str; 7] = ["GET", "POST", "PUT", "DELETE", "PATCH", "HEAD", "OPTIONS"];

/// A named, weighted user journey
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScenarioConfig {
    /// Unique scenario name, also used as the `scenario` metric tag
    pub name: String,

    /// Relative selection weight within the shared pool
    #[serde(default = "crate::domains::utils::default_weight")]
    pub weight: f64,

    /// Own ramp profile; when set the scenario runs outside the shared pool
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stages: Option<Vec<StageConfig>>,

    /// Think time override between iterations
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub think_time: Option<ThinkTimeConfig>,

    /// Requests executed in order on every iteration
    #[serde(default)]
    pub requests: Vec<RequestStepConfig>,
}

impl ScenarioConfig {
    /// Whether this scenario is routed through the shared virtual user pool
    pub fn uses_shared_pool(&self) -> bool {
        self.stages.is_none()
    }
}

impl Validatable for ScenarioConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.name, "name", self.domain_name())?;

        if !self.weight.is_finite() || self.weight < 0.0 {
            return Err(self.validation_error(format!(
                "scenario '{}' weight must be a finite number >= 0, got {}",
                self.name, self.weight
            )));
        }

        if let Some(ref stages) = self.stages {
            if stages.is_empty() {
                return Err(self.validation_error(format!(
                    "scenario '{}' declares an empty stage list",
                    self.name
                )));
            }
            for stage in stages {
                stage.validate()?;
            }
        }

        if let Some(ref think_time) = self.think_time {
            think_time.validate()?;
        }

        if self.requests.is_empty() {
            return Err(self.validation_error(format!(
                "scenario '{}' must declare at least one request",
                self.name
            )));
        }

        for step in &self.requests {
            step.validate()?;
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "scenarios"
    }
}

/// A single declarative HTTP request inside a scenario, setup or teardown
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestStepConfig {
    /// Step name, used as the `name` tag on request metrics
    pub name: String,

    /// HTTP method
    #[serde(default = "default_method")]
    pub method: String,

    /// Path relative to `base_url`, or an absolute URL
    pub path: String,

    /// Request headers; values may reference `${env:NAME}` or captured `${field}`
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub headers: HashMap<String, String>,

    /// JSON request body
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<serde_json::Value>,

    /// Per-request timeout overriding `default_timeout`
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub timeout: Option<Duration>,

    /// Status the response must carry; any 2xx/3xx is accepted when unset
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect_status: Option<u16>,

    /// Top-level JSON field that must be present in the response and is
    /// captured for later steps
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub capture: Option<String>,

    /// Pause after this step completes
    #[serde(default, with = "humantime_serde", skip_serializing_if = "Option::is_none")]
    pub pause: Option<Duration>,
}

impl RequestStepConfig {
    pub fn get(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            method: default_method(),
            path: path.into(),
            headers: HashMap::new(),
            body: None,
            timeout: None,
            expect_status: None,
            capture: None,
            pause: None,
        }
    }
}

impl Validatable for RequestStepConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(&self.name, "name", self.domain_name())?;
        validate_required_string(&self.path, "path", self.domain_name())?;
        validate_enum_choice(&self.method, &SUPPORTED_METHODS, "method", self.domain_name())?;

        if let Some(timeout) = self.timeout {
            validate_positive_duration(timeout, "timeout", self.domain_name())?;
        }

        if let Some(status) = self.expect_status {
            if !(100..=599).contains(&status) {
                return Err(self.validation_error(format!(
                    "request '{}' expect_status {} is not a valid HTTP status",
                    self.name, status
                )));
            }
        }

        if let Some(ref capture) = self.capture {
            validate_required_string(capture, "capture", self.domain_name())?;
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "scenarios.requests"
    }
}

fn default_method() -> String {
    "GET".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn scenario(name: &str) -> ScenarioConfig {
        ScenarioConfig {
            name: name.to_string(),
            weight: 1.0,
            stages: None,
            think_time: None,
            requests: vec![RequestStepConfig::get("home", "/")],
        }
    }

    #[test]
    fn test_scenario_validation() {
        assert!(scenario("browse").validate().is_ok());

        let mut negative = scenario("browse");
        negative.weight = -1.0;
        assert!(negative.validate().is_err());

        let mut nan = scenario("browse");
        nan.weight = f64::NAN;
        assert!(nan.validate().is_err());

        let mut empty = scenario("browse");
        empty.requests.clear();
        assert!(empty.validate().is_err());

        let mut no_stages = scenario("browse");
        no_stages.stages = Some(Vec::new());
        assert!(no_stages.validate().is_err());
    }

    #[test]
    fn test_zero_weight_is_valid() {
        let mut idle = scenario("idle");
        idle.weight = 0.0;
        assert!(idle.validate().is_ok());
    }

    #[test]
    fn test_request_step_validation() {
        let mut step = RequestStepConfig::get("login", "/api/login");
        assert!(step.validate().is_ok());

        step.method = "post".to_string();
        assert!(step.validate().is_ok());

        step.method = "BREW".to_string();
        assert!(step.validate().is_err());

        let mut bad_status = RequestStepConfig::get("login", "/api/login");
        bad_status.expect_status = Some(42);
        assert!(bad_status.validate().is_err());
    }

    #[test]
    fn test_request_step_yaml() {
        let yaml = r#"
name: login
method: POST
path: /api/login
body: { email: "a@b.c", password: "secret" }
timeout: 2s
capture: token
"#;
        let step: RequestStepConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(step.method, "POST");
        assert_eq!(step.timeout, Some(Duration::from_secs(2)));
        assert_eq!(step.capture.as_deref(), Some("token"));
        assert_eq!(step.body.unwrap()["email"], "a@b.c");
    }
}
