//! Error types for report delivery

use thiserror::Error;

/// Errors that can occur while writing a report
#[derive(Error, Debug)]
pub enum OutputError {
    #[error("Failed to serialize report as {format}: {error}")]
    Serialization { format: String, error: String },

    #[error("Filesystem error during {operation} on {path}: {error}")]
    Filesystem {
        path: String,
        operation: String,
        error: String,
    },

    #[error("File already exists and overwrite is disabled: {path}")]
    FileExists { path: String },

    #[error("Failed to write to {stream}: {error}")]
    Stdio { stream: String, error: String },

    #[error("Format '{format}' is not supported by the {sink} sink")]
    UnsupportedFormat { sink: String, format: String },

    #[error("{failed} of {total} report sinks failed: {}", .details.join("; "))]
    SinksFailed {
        failed: usize,
        total: usize,
        details: Vec<String>,
    },
}

impl OutputError {
    pub(crate) fn serialization(format: &str, error: impl ToString) -> Self {
        OutputError::Serialization {
            format: format.to_string(),
            error: error.to_string(),
        }
    }
}
