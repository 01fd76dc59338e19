//! # Stampede Output
//!
//! Report sinks for the final result of a load test run.
//!
//! A [`ReportWriter`] fans one [`RunResult`](stampede_engine::RunResult) out to
//! every configured [`ReportSink`]: a human readable summary or JSON/YAML on
//! stdout, or JSON/YAML files.
//!
//! ```rust,no_run
//! use stampede_config::OutputConfig;
//! use stampede_output::ReportWriter;
//!
//! # async fn example(result: stampede_engine::RunResult) -> Result<(), Box<dyn std::error::Error>> {
//! let writer = ReportWriter::from_config(&OutputConfig::default())?;
//! writer.write(&result).await?;
//! # Ok(())
//! # }
//! ```

pub mod errors;
pub mod format;
pub mod sink;
pub mod sinks;
pub mod summary;
pub mod writer;

pub use errors::OutputError;
pub use format::encode;
pub use sink::ReportSink;
pub use sinks::{filesystem::FileSinkConfig, FileSink, StdoutSink};
pub use summary::render_summary;
pub use writer::{create_sink, ReportWriter};
