//! Configuration loading and environment variable handling

use crate::domains::scenario::RequestStepConfig;
use crate::domains::StampedeConfig;
use crate::error::{ConfigError, ConfigResult};
use regex::Regex;
use std::path::Path;
use std::str::FromStr;
use std::sync::OnceLock;
use tracing::debug;

/// Configuration loader with environment variable support
pub struct ConfigLoader {
    /// Environment variable prefix
    prefix: String,
}

impl ConfigLoader {
    /// Create a new config loader with default prefix
    pub fn new() -> Self {
        Self {
            prefix: "STAMPEDE".to_string(),
        }
    }

    /// Create a new config loader with custom prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML or JSON file, apply environment
    /// overrides and validate every domain
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<StampedeConfig> {
        let config = self.read_file(path)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load configuration and apply environment overrides without validating,
    /// for callers that still layer command line overrides on top
    pub fn read_file(&self, path: impl AsRef<Path>) -> ConfigResult<StampedeConfig> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path)?;

        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| ext.eq_ignore_ascii_case("json"));

        let mut config: StampedeConfig = if is_json {
            serde_json::from_str(&content)?
        } else {
            serde_yaml::from_str(&content)?
        };
        debug!("Parsed configuration from {:?}", path);

        self.apply_env_overrides(&mut config)?;
        self.expand_placeholders(&mut config)?;
        Ok(config)
    }

    /// Load configuration from a YAML string
    pub fn from_yaml_str(&self, content: &str) -> ConfigResult<StampedeConfig> {
        let mut config: StampedeConfig = serde_yaml::from_str(content)?;
        self.apply_env_overrides(&mut config)?;
        self.expand_placeholders(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Apply environment variable overrides to configuration
    fn apply_env_overrides(&self, config: &mut StampedeConfig) -> ConfigResult<()> {
        if let Ok(base_url) = self.get_env_var("BASE_URL") {
            config.base_url = base_url;
        }

        if let Ok(timeout) = self.get_env_var("DEFAULT_TIMEOUT") {
            config.default_timeout = parse_env_duration("DEFAULT_TIMEOUT", &timeout)?;
        }

        if let Ok(seed) = self.get_env_var("SEED") {
            let seed = seed
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid SEED: {}", e)))?;
            config.execution.seed = Some(seed);
        }

        if let Ok(graceful) = self.get_env_var("GRACEFUL_STOP") {
            config.execution.graceful_stop = parse_env_duration("GRACEFUL_STOP", &graceful)?;
        }

        if let Ok(user_agent) = self.get_env_var("HTTP_USER_AGENT") {
            config.http.user_agent = user_agent;
        }

        if let Ok(verify_ssl) = self.get_env_var("HTTP_VERIFY_SSL") {
            config.http.verify_ssl = verify_ssl
                .parse()
                .map_err(|e| ConfigError::EnvError(format!("Invalid HTTP_VERIFY_SSL: {}", e)))?;
        }

        if let Ok(log_level) = self.get_env_var("LOG_LEVEL") {
            config.logging.level = crate::domains::logging::LogLevel::from_str(&log_level)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_LEVEL: {}", log_level)))?;
        }

        if let Ok(format) = self.get_env_var("LOG_FORMAT") {
            config.logging.format = crate::domains::logging::LogFormat::from_str(&format)
                .map_err(|_| ConfigError::EnvError(format!("Invalid LOG_FORMAT: {}", format)))?;
        }

        Ok(())
    }

    /// Resolve `${env:NAME}` references in URLs, paths, headers and bodies
    fn expand_placeholders(&self, config: &mut StampedeConfig) -> ConfigResult<()> {
        config.base_url = expand_env_placeholders(&config.base_url)?;

        let steps = config
            .scenarios
            .iter_mut()
            .flat_map(|s| s.requests.iter_mut())
            .chain(config.setup.iter_mut())
            .chain(config.teardown.iter_mut());

        for step in steps {
            expand_step(step)?;
        }

        Ok(())
    }

    /// Get environment variable with prefix
    fn get_env_var(&self, name: &str) -> Result<String, std::env::VarError> {
        std::env::var(format!("{}_{}", self.prefix, name))
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

fn expand_step(step: &mut RequestStepConfig) -> ConfigResult<()> {
    step.path = expand_env_placeholders(&step.path)?;
    for value in step.headers.values_mut() {
        *value = expand_env_placeholders(value)?;
    }
    if let Some(ref mut body) = step.body {
        expand_json(body)?;
    }
    Ok(())
}

fn expand_json(value: &mut serde_json::Value) -> ConfigResult<()> {
    match value {
        serde_json::Value::String(s) => *s = expand_env_placeholders(s)?,
        serde_json::Value::Array(items) => {
            for item in items {
                expand_json(item)?;
            }
        }
        serde_json::Value::Object(map) => {
            for item in map.values_mut() {
                expand_json(item)?;
            }
        }
        _ => {}
    }
    Ok(())
}

fn env_placeholder() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"\$\{env:([A-Za-z_][A-Za-z0-9_]*)\}").expect("placeholder pattern is valid")
    })
}

/// Replace every `${env:NAME}` in `input` with the value of `NAME`.
///
/// Other `${...}` placeholders are left untouched; they are resolved from
/// captured response fields while a scenario runs.
pub fn expand_env_placeholders(input: &str) -> ConfigResult<String> {
    let pattern = env_placeholder();
    let mut missing = None;

    let expanded = pattern.replace_all(input, |caps: &regex::Captures<'_>| {
        let name = &caps[1];
        match std::env::var(name) {
            Ok(value) => value,
            Err(_) => {
                missing.get_or_insert_with(|| name.to_string());
                String::new()
            }
        }
    });

    match missing {
        Some(name) => Err(ConfigError::EnvError(format!(
            "environment variable '{}' referenced in configuration is not set",
            name
        ))),
        None => Ok(expanded.into_owned()),
    }
}

fn parse_env_duration(name: &str, value: &str) -> ConfigResult<std::time::Duration> {
    if let Ok(seconds) = value.parse::<u64>() {
        return Ok(std::time::Duration::from_secs(seconds));
    }
    humantime::parse_duration(value)
        .map_err(|e| ConfigError::EnvError(format!("Invalid {}: {}", name, e)))
}
