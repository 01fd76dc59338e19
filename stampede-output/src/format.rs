//! Serialization of run results

use crate::errors::OutputError;
use crate::summary::render_summary;
use stampede_config::ReportFormat;
use stampede_engine::RunResult;

/// Encode a run result in the given format
pub fn encode(result: &RunResult, format: ReportFormat) -> Result<Vec<u8>, OutputError> {
    match format {
        ReportFormat::Summary => Ok(render_summary(result).into_bytes()),
        ReportFormat::Json => {
            serde_json::to_vec_pretty(result).map_err(|e| OutputError::serialization("json", e))
        }
        ReportFormat::JsonCompact => {
            serde_json::to_vec(result).map_err(|e| OutputError::serialization("json_compact", e))
        }
        ReportFormat::Yaml => serde_yaml::to_string(result)
            .map(String::into_bytes)
            .map_err(|e| OutputError::serialization("yaml", e)),
    }
}
