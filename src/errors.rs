//! Typed error hierarchy for ptsite.
//!
//! Two top-level enums cover the two scopes a failure can have:
//! - `PipelineError`: one program's login/code/extract pipeline
//! - `RunError`: verdicts that apply to the whole export run

use std::time::Duration;
use thiserror::Error;

/// Errors from a single program pipeline. Recorded against one label and
/// never allowed to abort sibling pipelines, except `Auth`, which the
/// orchestrator escalates to [`RunError::Authentication`].
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Authentication failed: {reason}")]
    Auth { reason: String },

    #[error("Access code rejected: {reason}")]
    CodeRejected { reason: String },

    #[error("No program data response within {waited:?}")]
    ExtractionTimeout { waited: Duration },

    #[error("Program data is missing or has the wrong type at '{field}'")]
    SchemaMismatch { field: String },

    #[error("Step '{step}' did not complete within {waited:?}")]
    StepTimeout { step: &'static str, waited: Duration },

    #[error("Program pipeline did not finish within {waited:?}")]
    PipelineTimeout { waited: Duration },

    #[error("Session misuse: {0}")]
    SessionMisuse(String),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Skipped after authentication failure in another pipeline")]
    Skipped,

    #[error("Could not write artifact: {reason}")]
    ArtifactWrite { reason: String },
}

impl PipelineError {
    /// Whether this failure means no session can proceed for the credential.
    pub fn is_run_fatal(&self) -> bool {
        matches!(self, PipelineError::Auth { .. })
    }

    /// Short machine-friendly kind, used in the run summary.
    pub fn kind(&self) -> &'static str {
        match self {
            PipelineError::Auth { .. } => "auth",
            PipelineError::CodeRejected { .. } => "code_rejected",
            PipelineError::ExtractionTimeout { .. } => "extraction_timeout",
            PipelineError::SchemaMismatch { .. } => "schema_mismatch",
            PipelineError::StepTimeout { .. } => "step_timeout",
            PipelineError::PipelineTimeout { .. } => "pipeline_timeout",
            PipelineError::SessionMisuse(_) => "session_misuse",
            PipelineError::Http(_) => "http",
            PipelineError::Skipped => "skipped",
            PipelineError::ArtifactWrite { .. } => "artifact_write",
        }
    }
}

/// Whole-run verdicts.
#[derive(Debug, Error)]
pub enum RunError {
    #[error("Authentication failed while opening the session for '{label}': {source}")]
    Authentication {
        label: String,
        #[source]
        source: PipelineError,
    },

    #[error("Contamination detected: {}", format_groups(.groups))]
    ContaminationDetected { groups: Vec<Vec<String>> },

    #[error("{failed} of {total} program(s) failed")]
    PartialFailure { failed: usize, total: usize },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl RunError {
    /// Process exit status for this verdict.
    pub fn exit_code(&self) -> u8 {
        match self {
            RunError::PartialFailure { .. } | RunError::Other(_) => 1,
            RunError::Authentication { .. } => 2,
            RunError::ContaminationDetected { .. } => 3,
        }
    }
}

fn format_groups(groups: &[Vec<String>]) -> String {
    groups
        .iter()
        .map(|labels| format!("[{}]", labels.join(", ")))
        .collect::<Vec<_>>()
        .join(" ")
}
