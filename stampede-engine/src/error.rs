//! Engine error types

use crate::threshold::ThresholdError;
use stampede_http::HttpError;
use stampede_metrics::MetricsError;

/// Errors that stop a run from starting or completing
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    #[error("No routable scenario: {0}")]
    NoRoutableScenario(String),

    #[error("Invalid stage: {0}")]
    InvalidStage(String),

    #[error("Invalid scenario: {0}")]
    InvalidScenario(String),

    #[error("Setup failed: {0:#}")]
    Setup(anyhow::Error),

    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Threshold(#[from] ThresholdError),

    #[error(transparent)]
    Metrics(#[from] MetricsError),

    #[error(transparent)]
    Http(#[from] HttpError),
}

/// Result type for engine operations
pub type EngineResult<T> = Result<T, EngineError>;
