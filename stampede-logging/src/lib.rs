//! # Stampede Logging
//!
//! Installs the global `tracing` subscriber from a [`LoggingConfig`]. Logs go
//! to stderr so reports written to stdout stay machine readable.

mod init;

pub use init::{build_filter, init_logging, LoggingError};
pub use stampede_config::{LogFormat, LogLevel, LoggingConfig};
