//! Run outcomes and progress events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::{PipelineError, RunError};
use crate::guard::ContaminationReport;
use crate::portal::CapturedResponse;
use crate::types::{ExtractedProgram, ProgramIdentity};

/// Final status of one label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LabelStatus {
    Succeeded,
    Failed,
    Contaminated,
    Skipped,
}

impl LabelStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            LabelStatus::Succeeded => "succeeded",
            LabelStatus::Failed => "failed",
            LabelStatus::Contaminated => "contaminated",
            LabelStatus::Skipped => "skipped",
        }
    }
}

/// Which step a pipeline is in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Login,
    SubmitCode,
    Extract,
}

impl PipelineStage {
    pub fn describe(self) -> &'static str {
        match self {
            PipelineStage::Login => "signing in",
            PipelineStage::SubmitCode => "redeeming access code",
            PipelineStage::Extract => "waiting for program data",
        }
    }
}

/// Events emitted while a run progresses.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RunEvent {
    RunStarted {
        total: usize,
        parallel: usize,
    },
    Stage {
        label: String,
        stage: PipelineStage,
    },
    ProgramFinished {
        label: String,
        status: LabelStatus,
        detail: Option<String>,
    },
    RunCompleted {
        succeeded: usize,
        failed: usize,
        contaminated: usize,
        skipped: usize,
    },
}

/// What happened to one request.
#[derive(Debug)]
pub struct ProgramOutcome {
    pub label: String,
    pub status: LabelStatus,
    pub identity: Option<ProgramIdentity>,
    pub program: Option<ExtractedProgram>,
    pub error: Option<PipelineError>,
    /// Everything the session captured, for diagnostics.
    pub captures: Vec<CapturedResponse>,
    pub duration: Duration,
}

impl ProgramOutcome {
    pub fn succeeded(
        identity: ProgramIdentity,
        program: ExtractedProgram,
        captures: Vec<CapturedResponse>,
        duration: Duration,
    ) -> Self {
        Self {
            label: program.label.clone(),
            status: LabelStatus::Succeeded,
            identity: Some(identity),
            program: Some(program),
            error: None,
            captures,
            duration,
        }
    }

    pub fn failed(
        label: &str,
        error: PipelineError,
        captures: Vec<CapturedResponse>,
        duration: Duration,
    ) -> Self {
        Self {
            label: label.to_string(),
            status: LabelStatus::Failed,
            identity: None,
            program: None,
            error: Some(error),
            captures,
            duration,
        }
    }

    pub fn skipped(label: &str) -> Self {
        Self {
            label: label.to_string(),
            status: LabelStatus::Skipped,
            identity: None,
            program: None,
            error: Some(PipelineError::Skipped),
            captures: Vec::new(),
            duration: Duration::ZERO,
        }
    }

    pub fn is_success(&self) -> bool {
        self.status == LabelStatus::Succeeded
    }

    /// Demote a succeeded outcome whose artifact could not be written.
    pub fn mark_write_failed(&mut self, reason: String) {
        self.status = LabelStatus::Failed;
        self.error = Some(PipelineError::ArtifactWrite { reason });
    }

    /// A one-line explanation for non-successful outcomes.
    pub fn detail(&self) -> Option<String> {
        match (self.status, &self.error, self.identity) {
            (LabelStatus::Contaminated, _, Some(identity)) => {
                Some(format!("shares {} with another label", identity))
            }
            (_, Some(error), _) => Some(error.to_string()),
            _ => None,
        }
    }
}

/// Per-request outcomes (request order), the contamination report and the
/// number of sessions opened.
#[derive(Debug)]
pub struct RunResult {
    pub outcomes: Vec<ProgramOutcome>,
    pub contamination: ContaminationReport,
    pub sessions_opened: usize,
    pub started_at: DateTime<Utc>,
    pub duration: Duration,
}

impl RunResult {
    pub fn count(&self, status: LabelStatus) -> usize {
        self.outcomes.iter().filter(|o| o.status == status).count()
    }

    /// Outcomes whose artifacts may be written.
    pub fn publishable(&self) -> impl Iterator<Item = &ProgramOutcome> {
        self.outcomes.iter().filter(|o| o.is_success())
    }

    /// The first run-fatal failure, in request order.
    pub fn fatal_failure(&self) -> Option<(&str, &PipelineError)> {
        self.outcomes.iter().find_map(|o| {
            o.error
                .as_ref()
                .filter(|e| e.is_run_fatal())
                .map(|e| (o.label.as_str(), e))
        })
    }

    /// The run verdict: authentication, then contamination, then partial
    /// failure. Skipped labels count as failed for the partial verdict.
    pub fn ensure_clean(&self) -> Result<(), RunError> {
        if let Some((label, PipelineError::Auth { reason })) = self.fatal_failure() {
            return Err(RunError::Authentication {
                label: label.to_string(),
                source: PipelineError::Auth {
                    reason: reason.clone(),
                },
            });
        }
        if !self.contamination.is_clean() {
            return Err(RunError::ContaminationDetected {
                groups: self.contamination.groups(),
            });
        }
        let failed = self.count(LabelStatus::Failed) + self.count(LabelStatus::Skipped);
        if failed > 0 {
            return Err(RunError::PartialFailure {
                failed,
                total: self.outcomes.len(),
            });
        }
        Ok(())
    }
}
