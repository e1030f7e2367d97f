//! Per-run summary records under `<out_dir>/runs/`.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};
use uuid::Uuid;

use crate::guard::ContaminationEvent;
use crate::orchestrator::{LabelStatus, RunResult};
use crate::types::ProgramIdentity;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RunSummary {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub sessions_opened: usize,
    /// `ok`, or the verdict message.
    pub verdict: String,
    pub exit_code: u8,
    pub programs: Vec<ProgramSummary>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub contamination: Vec<ContaminationEvent>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramSummary {
    pub label: String,
    pub status: LabelStatus,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub identity: Option<ProgramIdentity>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exercises: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub artifact: Option<PathBuf>,
    pub duration_ms: u64,
}

impl RunSummary {
    /// Summarize `result`. `artifacts` maps labels to the files written for them.
    pub fn from_result(result: &RunResult, artifacts: &[(String, PathBuf)]) -> Self {
        let (verdict, exit_code) = match result.ensure_clean() {
            Ok(()) => ("ok".to_string(), 0),
            Err(e) => (e.to_string(), e.exit_code()),
        };
        let programs = result
            .outcomes
            .iter()
            .map(|o| ProgramSummary {
                label: o.label.clone(),
                status: o.status,
                identity: o.identity,
                exercises: o.program.as_ref().map(|p| p.exercises.len()),
                error_kind: o.error.as_ref().map(|e| e.kind().to_string()),
                error: o.error.as_ref().map(|e| e.to_string()),
                artifact: artifacts
                    .iter()
                    .find(|(label, _)| *label == o.label)
                    .map(|(_, path)| path.clone()),
                duration_ms: o.duration.as_millis() as u64,
            })
            .collect();

        Self {
            run_id: Uuid::new_v4(),
            started_at: result.started_at,
            finished_at: Utc::now(),
            sessions_opened: result.sessions_opened,
            verdict,
            exit_code,
            programs,
            contamination: result.contamination.events.clone(),
        }
    }

    pub fn file_name(&self) -> String {
        format!(
            "{}_{}.json",
            self.started_at.format("%Y-%m-%dT%H-%M-%S"),
            &self.run_id.to_string()[..8]
        )
    }

    /// Save under `<out_dir>/runs/` and return the file path.
    pub fn save(&self, out_dir: &Path) -> Result<PathBuf> {
        let runs_dir = out_dir.join("runs");
        fs::create_dir_all(&runs_dir).context("Failed to create runs directory")?;
        let run_file = runs_dir.join(self.file_name());
        let json = serde_json::to_string_pretty(self).context("Failed to serialize run summary")?;
        fs::write(&run_file, json).context("Failed to write run summary file")?;
        Ok(run_file)
    }
}

/// Summary files under `<out_dir>/runs/`, most recent first.
pub fn list_runs(out_dir: &Path) -> Result<Vec<PathBuf>> {
    let runs_dir = out_dir.join("runs");
    if !runs_dir.exists() {
        return Ok(Vec::new());
    }

    let mut runs: Vec<PathBuf> = fs::read_dir(&runs_dir)?
        .filter_map(|e| e.ok())
        .map(|e| e.path())
        .filter(|p| p.extension().map(|e| e == "json").unwrap_or(false))
        .collect();

    runs.sort();
    runs.reverse();
    Ok(runs)
}
