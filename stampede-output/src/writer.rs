//! Fan-out of one run result to every configured sink

use std::sync::Arc;

use futures::future::join_all;
use stampede_config::{OutputConfig, SinkConfig};
use stampede_engine::RunResult;
use tracing::{error, info};

use crate::{
    errors::OutputError,
    sink::ReportSink,
    sinks::{filesystem::FileSinkConfig, FileSink, StdoutSink},
};

/// Writes a run result to several sinks. A failing sink does not stop the others.
#[derive(Default)]
pub struct ReportWriter {
    sinks: Vec<Arc<dyn ReportSink>>,
}

impl ReportWriter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &OutputConfig) -> Result<Self, OutputError> {
        let mut writer = Self::new();
        for sink in &config.sinks {
            writer.add(create_sink(sink)?);
        }
        Ok(writer)
    }

    pub fn add(&mut self, sink: Arc<dyn ReportSink>) {
        self.sinks.push(sink);
    }

    pub fn with_sink(mut self, sink: Arc<dyn ReportSink>) -> Self {
        self.add(sink);
        self
    }

    pub fn len(&self) -> usize {
        self.sinks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sinks.is_empty()
    }

    /// Write to every sink and collect the failures
    pub async fn write(&self, result: &RunResult) -> Result<(), OutputError> {
        let outcomes = join_all(self.sinks.iter().map(|sink| async move {
            let outcome = sink.write(result).await;
            (sink.describe(), outcome)
        }))
        .await;

        let mut details = Vec::new();
        for (name, outcome) in outcomes {
            match outcome {
                Ok(()) => info!("Wrote report to {}", name),
                Err(e) => {
                    error!("Failed to write report to {}: {}", name, e);
                    details.push(format!("{}: {}", name, e));
                }
            }
        }

        if details.is_empty() {
            Ok(())
        } else {
            Err(OutputError::SinksFailed {
                failed: details.len(),
                total: self.sinks.len(),
                details,
            })
        }
    }
}

/// Build a sink from its configuration
pub fn create_sink(config: &SinkConfig) -> Result<Arc<dyn ReportSink>, OutputError> {
    match config {
        SinkConfig::Stdout { format } => Ok(Arc::new(StdoutSink::new(*format))),
        SinkConfig::File {
            path,
            format,
            create_dirs,
            overwrite,
        } => {
            let sink = FileSink::new(FileSinkConfig {
                path: path.clone(),
                format: *format,
                create_dirs: *create_dirs,
                overwrite: *overwrite,
            })?;
            Ok(Arc::new(sink))
        }
    }
}
