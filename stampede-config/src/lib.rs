//! Domain-driven configuration management for Stampede
//!
//! A run is described by a single document (YAML, or JSON by file extension)
//! split into functional domains: the load shape (stages, scenarios,
//! thresholds), execution tuning, the HTTP client, logging and report output.
//! Every domain carries defaults, validation and environment overrides.

pub mod error;
pub mod loader;
pub mod validation;

// Domain-specific configuration modules
pub mod domains;

// Re-export main types
pub use error::{ConfigError, ConfigResult};
pub use loader::{expand_env_placeholders, ConfigLoader};
pub use validation::Validatable;

// Re-export domain configurations
pub use domains::{
    execution::{ExecutionConfig, ThinkTimeConfig},
    http::{ConnectionPoolConfig, HttpConfig},
    logging::{LogFormat, LogLevel, LoggingConfig},
    output::{OutputConfig, ReportFormat, SinkConfig},
    scenario::{RequestStepConfig, ScenarioConfig},
    stage::StageConfig,
    threshold::{Severity, ThresholdConfig},
    StampedeConfig,
};
