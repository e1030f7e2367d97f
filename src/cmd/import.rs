//! `ptsite import`: turn a saved data-endpoint response into an artifact.

use anyhow::{Context, Result, bail};
use console::style;
use ptsite::artifact::write_artifact;
use ptsite::extract::parse_payload;
use ptsite::normalize::normalize;
use std::path::Path;
use tracing::debug;

use super::resolve_out_dir;
use crate::Cli;

pub fn cmd_import(cli: &Cli, file: &Path, label: &str) -> Result<()> {
    let label = label.trim();
    if label.is_empty() {
        bail!("--name must not be empty");
    }

    let body = std::fs::read(file)
        .with_context(|| format!("Failed to read {}", file.display()))?;
    let extracted = parse_payload(&body)
        .with_context(|| format!("{} is not a program response", file.display()))?;
    debug!(identity = %extracted.identity, "parsed saved response");

    let program = normalize(label, &extracted.payload);
    let out_dir = resolve_out_dir(cli)?;
    let path = write_artifact(&out_dir, &program)?;

    println!(
        "{} '{}' ({} exercises) -> {}",
        style("Imported").green().bold(),
        program.name,
        program.exercises.len(),
        path.display()
    );
    Ok(())
}
