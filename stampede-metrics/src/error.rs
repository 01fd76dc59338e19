//! Metrics error types

use crate::metric::MetricKind;

/// Error type for metric registration
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum MetricsError {
    #[error("Metric name cannot be empty")]
    EmptyName,

    #[error("Metric '{name}' is registered as {registered}, cannot use it as {requested}")]
    KindMismatch {
        name: String,
        registered: MetricKind,
        requested: MetricKind,
    },
}

/// Result type for metrics operations
pub type MetricsResult<T> = Result<T, MetricsError>;
