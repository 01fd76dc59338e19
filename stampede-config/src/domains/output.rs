//! Report output configuration

use crate::error::{ConfigError, ConfigResult};
use crate::validation::{validate_required_string, Validatable};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;

/// Where the final run result is written
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct OutputConfig {
    pub sinks: Vec<SinkConfig>,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            sinks: vec![SinkConfig::Stdout {
                format: ReportFormat::Summary,
            }],
        }
    }
}

/// A single report destination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum SinkConfig {
    Stdout {
        #[serde(default)]
        format: ReportFormat,
    },
    File {
        path: PathBuf,
        #[serde(default = "default_file_format")]
        format: ReportFormat,
        #[serde(default = "crate::domains::utils::default_true")]
        create_dirs: bool,
        #[serde(default = "crate::domains::utils::default_true")]
        overwrite: bool,
    },
}

/// Serialization format of a report
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReportFormat {
    /// Human readable end-of-run summary
    #[default]
    Summary,
    /// Pretty JSON
    Json,
    /// Minified JSON
    JsonCompact,
    Yaml,
}

impl ReportFormat {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReportFormat::Summary => "summary",
            ReportFormat::Json => "json",
            ReportFormat::JsonCompact => "json_compact",
            ReportFormat::Yaml => "yaml",
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ReportFormat {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "summary" => Ok(ReportFormat::Summary),
            "json" => Ok(ReportFormat::Json),
            "json_compact" | "json-compact" => Ok(ReportFormat::JsonCompact),
            "yaml" | "yml" => Ok(ReportFormat::Yaml),
            other => Err(ConfigError::ValidationError(format!(
                "unknown report format '{}'",
                other
            ))),
        }
    }
}

/// Parses the command line form of `--out`:
/// `stdout`, `summary`, `json`, `yaml` (stdout in that format) or
/// `FORMAT=PATH` for a file
impl FromStr for SinkConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.split_once('=') {
            Some((format, path)) => {
                validate_required_string(path, "path", "output")?;
                let format: ReportFormat = format.parse()?;
                if format == ReportFormat::Summary {
                    return Err(ConfigError::ValidationError(
                        "the summary format can only be written to stdout".to_string(),
                    ));
                }
                Ok(SinkConfig::File {
                    path: PathBuf::from(path),
                    format,
                    create_dirs: true,
                    overwrite: true,
                })
            }
            None if s.eq_ignore_ascii_case("stdout") => Ok(SinkConfig::Stdout {
                format: ReportFormat::Summary,
            }),
            None => Ok(SinkConfig::Stdout { format: s.parse()? }),
        }
    }
}

impl Validatable for OutputConfig {
    fn validate(&self) -> ConfigResult<()> {
        for sink in &self.sinks {
            sink.validate()?;
        }
        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "output"
    }
}

impl Validatable for SinkConfig {
    fn validate(&self) -> ConfigResult<()> {
        match self {
            SinkConfig::Stdout { .. } => Ok(()),
            SinkConfig::File { path, format, .. } => {
                if path.as_os_str().is_empty() {
                    return Err(self.validation_error("file sink path cannot be empty"));
                }
                if *format == ReportFormat::Summary {
                    return Err(self.validation_error("file sinks support json, json_compact and yaml"));
                }
                Ok(())
            }
        }
    }

    fn domain_name(&self) -> &'static str {
        "output.sinks"
    }
}

fn default_file_format() -> ReportFormat {
    ReportFormat::Json
}
