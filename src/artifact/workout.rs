//! `workout_<slug>.json` files: the stable contract with the site generator.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::orchestrator::RunResult;
use crate::types::{ExtractedProgram, WorkoutArtifact};
use crate::util::slugify;

pub const ARTIFACT_PREFIX: &str = "workout_";

pub fn artifact_path(out_dir: &Path, label: &str) -> PathBuf {
    out_dir.join(format!("{}{}.json", ARTIFACT_PREFIX, slugify(label)))
}

/// Write one program's artifact, replacing any previous file for the label.
pub fn write_artifact(out_dir: &Path, program: &ExtractedProgram) -> Result<PathBuf> {
    fs::create_dir_all(out_dir)
        .with_context(|| format!("Failed to create output directory: {}", out_dir.display()))?;
    let path = artifact_path(out_dir, &program.label);
    let mut json = serde_json::to_string_pretty(&WorkoutArtifact::from(program))
        .context("Failed to serialize workout artifact")?;
    json.push('\n');
    fs::write(&path, json)
        .with_context(|| format!("Failed to write artifact: {}", path.display()))?;
    info!(
        label = %program.label,
        exercises = program.exercises.len(),
        path = %path.display(),
        "wrote artifact"
    );
    Ok(path)
}

/// Write artifacts for every successful outcome. Failed, skipped and
/// contaminated labels get nothing. A label whose write fails is demoted to
/// failed and the remaining labels are still written.
pub fn write_run_artifacts(out_dir: &Path, result: &mut RunResult) -> Vec<(String, PathBuf)> {
    let mut written = Vec::new();
    for outcome in result.outcomes.iter_mut().filter(|o| o.is_success()) {
        let Some(program) = &outcome.program else {
            continue;
        };
        match write_artifact(out_dir, program) {
            Ok(path) => written.push((outcome.label.clone(), path)),
            Err(e) => {
                let reason = format!("{:#}", e);
                warn!(label = %outcome.label, error = %reason, "could not write artifact");
                outcome.mark_write_failed(reason);
            }
        }
    }
    written
}

pub fn read_artifact(path: &Path) -> Result<WorkoutArtifact> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read artifact: {}", path.display()))?;
    serde_json::from_str(&content)
        .with_context(|| format!("Failed to parse artifact: {}", path.display()))
}
