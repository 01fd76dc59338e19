//! The report sink interface

use crate::errors::OutputError;
use async_trait::async_trait;
use stampede_engine::RunResult;

/// A destination for the final result of a run
#[async_trait]
pub trait ReportSink: Send + Sync {
    async fn write(&self, result: &RunResult) -> Result<(), OutputError>;

    /// Short description used in logs, e.g. `file:results/run.json`
    fn describe(&self) -> String;
}
