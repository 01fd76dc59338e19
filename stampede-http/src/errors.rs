//! HTTP error types

use crate::types::HttpMethodError;
use std::time::Duration;

/// Error type for HTTP operations.
///
/// Cloneable so a [`RequestResult`](crate::RequestResult) can hand it out
/// while keeping its own copy.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum HttpError {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Unexpected status {status} from {url}")]
    Status { status: u16, url: String },

    #[error("Request cancelled")]
    Cancelled,

    #[error("Invalid HTTP method: {0}")]
    InvalidMethod(#[from] HttpMethodError),

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    #[error("Invalid header name: {0}")]
    InvalidHeaderName(String),

    #[error("Invalid header value for {0}")]
    InvalidHeaderValue(String),

    #[error("Invalid JSON: {0}")]
    InvalidJson(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("Metrics error: {0}")]
    Metrics(#[from] stampede_metrics::MetricsError),
}

impl HttpError {
    /// Whether the request reached the point of waiting on the server and got
    /// nothing back
    pub fn is_dropped(&self) -> bool {
        matches!(self, HttpError::Network(_) | HttpError::Timeout(_))
    }
}

impl From<serde_json::Error> for HttpError {
    fn from(err: serde_json::Error) -> Self {
        HttpError::InvalidJson(err.to_string())
    }
}
