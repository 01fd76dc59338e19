//! Standard output sink

use async_trait::async_trait;
use stampede_config::ReportFormat;
use stampede_engine::RunResult;
use tokio::io::{AsyncWriteExt, BufWriter};

use crate::{errors::OutputError, format::encode, sink::ReportSink};

/// Writes the report to stdout
#[derive(Debug, Clone, Copy, Default)]
pub struct StdoutSink {
    format: ReportFormat,
}

impl StdoutSink {
    pub fn new(format: ReportFormat) -> Self {
        Self { format }
    }

    pub fn format(&self) -> ReportFormat {
        self.format
    }
}

#[async_trait]
impl ReportSink for StdoutSink {
    async fn write(&self, result: &RunResult) -> Result<(), OutputError> {
        let data = encode(result, self.format)?;
        let io_err = |e: std::io::Error| OutputError::Stdio {
            stream: "stdout".to_string(),
            error: e.to_string(),
        };

        let mut writer = BufWriter::new(tokio::io::stdout());
        writer.write_all(&data).await.map_err(io_err)?;
        if !data.ends_with(b"\n") {
            writer.write_all(b"\n").await.map_err(io_err)?;
        }
        writer.flush().await.map_err(io_err)?;
        Ok(())
    }

    fn describe(&self) -> String {
        format!("stdout:{}", self.format)
    }
}
