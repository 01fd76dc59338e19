//! Domain-specific configuration modules

pub mod execution;
pub mod http;
pub mod logging;
pub mod output;
pub mod scenario;
pub mod stage;
pub mod threshold;
pub mod utils;

use crate::error::{ConfigError, ConfigResult};
use crate::validation::{validate_positive_duration, validate_unique_names, validate_url, Validatable};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Main Stampede configuration combining all domains
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StampedeConfig {
    /// Base URL of the system under test
    pub base_url: String,

    /// Timeout applied to requests that do not set their own
    #[serde(with = "humantime_serde", default = "default_timeout")]
    pub default_timeout: Duration,

    /// Ramp profile of the shared virtual user pool
    #[serde(default)]
    pub stages: Vec<stage::StageConfig>,

    /// Weighted user journeys
    #[serde(default)]
    pub scenarios: Vec<scenario::ScenarioConfig>,

    /// Pass/fail criteria
    #[serde(default)]
    pub thresholds: Vec<threshold::ThresholdConfig>,

    /// Requests run once before any virtual user starts
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub setup: Vec<scenario::RequestStepConfig>,

    /// Requests run once after every virtual user has stopped
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub teardown: Vec<scenario::RequestStepConfig>,

    #[serde(default)]
    pub execution: execution::ExecutionConfig,

    #[serde(default)]
    pub http: http::HttpConfig,

    #[serde(default)]
    pub logging: logging::LoggingConfig,

    #[serde(default)]
    pub output: output::OutputConfig,
}

impl StampedeConfig {
    /// Validate all domain configurations
    pub fn validate_all(&self) -> ConfigResult<()> {
        validate_url(&self.base_url, "base_url", "run")?;
        validate_positive_duration(self.default_timeout, "default_timeout", "run")?;

        if self.scenarios.is_empty() {
            return Err(ConfigError::ValidationError(
                "at least one scenario must be configured".to_string(),
            ));
        }

        validate_unique_names(self.scenarios.iter().map(|s| s.name.as_str()), "scenario name", "scenarios")?;
        for scenario in &self.scenarios {
            scenario.validate()?;
        }

        for stage in &self.stages {
            stage.validate()?;
        }

        let shared: Vec<_> = self.scenarios.iter().filter(|s| s.uses_shared_pool()).collect();
        if !shared.is_empty() {
            if self.stages.is_empty() {
                return Err(ConfigError::ValidationError(format!(
                    "scenario '{}' has no own stages and no shared stages are configured",
                    shared[0].name
                )));
            }
            if shared.iter().map(|s| s.weight).sum::<f64>() <= 0.0 {
                return Err(ConfigError::ValidationError(
                    "scenarios in the shared pool must have a total weight greater than 0".to_string(),
                ));
            }
        }

        for threshold in &self.thresholds {
            threshold.validate()?;
        }

        for step in self.setup.iter().chain(self.teardown.iter()) {
            step.validate()?;
        }

        self.execution.validate()?;
        self.http.validate()?;
        self.logging.validate()?;
        self.output.validate()?;

        Ok(())
    }

    /// Replace the shared ramp profile
    pub fn with_stages(mut self, stages: Vec<stage::StageConfig>) -> Self {
        self.stages = stages;
        self
    }

    /// Total length of the shared ramp profile
    pub fn shared_duration(&self) -> Duration {
        self.stages
            .iter()
            .fold(Duration::ZERO, |total, s| total.saturating_add(s.duration))
    }

    /// Build a small but complete sample configuration
    pub fn sample() -> Self {
        let mut login = scenario::RequestStepConfig::get("login", "/api/auth/login");
        login.method = "POST".to_string();
        login.body = Some(serde_json::json!({
            "email": "${env:STAMPEDE_USER}",
            "password": "${env:STAMPEDE_PASSWORD}"
        }));
        login.capture = Some("token".to_string());

        let mut orders = scenario::RequestStepConfig::get("orders", "/api/orders");
        orders
            .headers
            .insert("Authorization".to_string(), "Bearer ${token}".to_string());

        Self {
            base_url: "http://localhost:3000".to_string(),
            default_timeout: default_timeout(),
            stages: vec![
                stage::StageConfig::ramp(Duration::from_secs(30), 20),
                stage::StageConfig::hold(Duration::from_secs(60), 20),
                stage::StageConfig::ramp(Duration::from_secs(30), 0),
            ],
            scenarios: vec![
                scenario::ScenarioConfig {
                    name: "browse".to_string(),
                    weight: 80.0,
                    stages: None,
                    think_time: Some(execution::ThinkTimeConfig {
                        min: Duration::from_secs(1),
                        max: Duration::from_secs(3),
                    }),
                    requests: vec![
                        scenario::RequestStepConfig::get("products", "/api/products"),
                        scenario::RequestStepConfig::get("product", "/api/products/1"),
                    ],
                },
                scenario::ScenarioConfig {
                    name: "purchase".to_string(),
                    weight: 20.0,
                    stages: None,
                    think_time: None,
                    requests: vec![login, orders],
                },
            ],
            thresholds: vec![
                threshold::ThresholdConfig::new("http_req_duration", "p(95) < 2000"),
                threshold::ThresholdConfig::new("http_req_failed", "rate < 0.01"),
            ],
            setup: Vec::new(),
            teardown: Vec::new(),
            execution: execution::ExecutionConfig::default(),
            http: http::HttpConfig::default(),
            logging: logging::LoggingConfig::default(),
            output: output::OutputConfig::default(),
        }
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        serde_yaml::to_string(&Self::sample())
            .unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}

fn default_timeout() -> Duration {
    Duration::from_secs(30)
}
