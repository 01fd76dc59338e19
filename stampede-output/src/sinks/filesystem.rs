//! File sink

use async_trait::async_trait;
use stampede_config::ReportFormat;
use stampede_engine::RunResult;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

use crate::{errors::OutputError, format::encode, sink::ReportSink};

/// Configuration for a file sink
#[derive(Debug, Clone)]
pub struct FileSinkConfig {
    pub path: PathBuf,
    pub format: ReportFormat,
    pub create_dirs: bool,
    pub overwrite: bool,
}

impl FileSinkConfig {
    pub fn new(path: impl Into<PathBuf>, format: ReportFormat) -> Self {
        Self {
            path: path.into(),
            format,
            create_dirs: true,
            overwrite: false,
        }
    }
}

/// Writes the report to a file as JSON or YAML
#[derive(Debug, Clone)]
pub struct FileSink {
    config: FileSinkConfig,
}

impl FileSink {
    pub fn new(config: FileSinkConfig) -> Result<Self, OutputError> {
        if config.format == ReportFormat::Summary {
            return Err(OutputError::UnsupportedFormat {
                sink: "file".to_string(),
                format: config.format.to_string(),
            });
        }
        Ok(Self { config })
    }

    pub fn path(&self) -> &Path {
        &self.config.path
    }

    fn fs_error(&self, path: &Path, operation: &str, error: std::io::Error) -> OutputError {
        OutputError::Filesystem {
            path: path.display().to_string(),
            operation: operation.to_string(),
            error: error.to_string(),
        }
    }
}

#[async_trait]
impl ReportSink for FileSink {
    async fn write(&self, result: &RunResult) -> Result<(), OutputError> {
        let path = self.config.path.as_path();

        let exists = fs::try_exists(path)
            .await
            .map_err(|e| self.fs_error(path, "stat", e))?;
        if exists && !self.config.overwrite {
            return Err(OutputError::FileExists {
                path: path.display().to_string(),
            });
        }

        if self.config.create_dirs {
            if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
                fs::create_dir_all(parent)
                    .await
                    .map_err(|e| self.fs_error(parent, "create_dirs", e))?;
            }
        }

        let data = encode(result, self.config.format)?;
        fs::write(path, &data)
            .await
            .map_err(|e| self.fs_error(path, "write", e))?;

        debug!("Wrote {} bytes of {} report to {}", data.len(), self.config.format, path.display());
        Ok(())
    }

    fn describe(&self) -> String {
        format!("file:{}", self.config.path.display())
    }
}
