//! The incident report document and its atomic writer.

use crate::aggregate::{Detection, Tally};
use crate::config::AnalysisConfig;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("failed to write report {path}: {source}")]
    Write { path: PathBuf, #[source] source: std::io::Error },
    #[error("failed to serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportStatus {
    Ok,
    Error,
}

/// The single document a run produces. `status` is authoritative: an `ok`
/// report may legitimately carry no detections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IncidentReport {
    pub event_id: String,
    #[serde(rename = "model")]
    pub model_name: String,
    pub frames_analyzed: usize,
    pub threshold: f32,
    pub summary: BTreeMap<String, u32>,
    pub detections: Vec<Detection>,
    pub latency_ms: u64,
    pub status: ReportStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IncidentReport {
    pub fn completed(event_id: &str, config: &AnalysisConfig, tally: Tally, latency_ms: u64) -> Self {
        Self {
            event_id: event_id.to_string(),
            model_name: config.model_name.clone(),
            frames_analyzed: tally.frames_analyzed,
            threshold: config.threshold,
            summary: tally.summary,
            detections: tally.detections,
            latency_ms,
            status: ReportStatus::Ok,
            error: None,
        }
    }

    /// Schema-valid report for a run that could not finish. Carries no
    /// partial results.
    pub fn failed(
        event_id: &str,
        config: &AnalysisConfig,
        message: impl Into<String>,
        latency_ms: u64,
    ) -> Self {
        Self {
            event_id: event_id.to_string(),
            model_name: config.model_name.clone(),
            frames_analyzed: 0,
            threshold: config.threshold,
            summary: config.categories.iter().map(|c| (c.name.clone(), 0)).collect(),
            detections: Vec::new(),
            latency_ms,
            status: ReportStatus::Error,
            error: Some(message.into()),
        }
    }

    pub fn is_ok(&self) -> bool {
        self.status == ReportStatus::Ok
    }

    pub fn to_json(&self) -> Result<String, ReportError> {
        let mut body = serde_json::to_string_pretty(self)?;
        body.push('\n');
        Ok(body)
    }
}

/// Write `report` to `path` all-or-nothing.
///
/// The body goes to a temp file next to the destination and is renamed into
/// place, so readers see either the old file, nothing, or the full report.
pub fn write_report(report: &IncidentReport, path: &Path) -> Result<(), ReportError> {
    let write_err = |source: std::io::Error| ReportError::Write { path: path.to_path_buf(), source };

    let body = report.to_json()?;
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    std::fs::create_dir_all(dir).map_err(write_err)?;

    let mut tmp = tempfile::Builder::new()
        .prefix(".tmp_")
        .suffix(".json")
        .tempfile_in(dir)
        .map_err(write_err)?;
    tmp.write_all(body.as_bytes()).map_err(write_err)?;
    tmp.as_file().sync_all().map_err(write_err)?;
    tmp.persist(path).map_err(|e| write_err(e.error))?;

    log::debug!("report written to {}", path.display());
    Ok(())
}
