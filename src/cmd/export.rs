//! `ptsite export`: one isolated portal session per configured program.

use anyhow::Result;
use console::style;
use ptsite::artifact::{DiagnosticsSink, RunSummary, write_run_artifacts};
use ptsite::config::{CliOverrides, Config};
use ptsite::orchestrator::{IsolationOrchestrator, RunEvent};
use ptsite::portal::HttpDriverFactory;
use ptsite::ui::{RunUI, UiMode};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::Cli;

/// Flags of the `export` subcommand.
#[derive(Debug, Clone, Default)]
pub struct ExportArgs {
    pub headed: bool,
    pub only: Option<String>,
    pub parallel: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub capture: bool,
}

pub async fn cmd_export(cli: &Cli, args: ExportArgs) -> Result<()> {
    let overrides = CliOverrides {
        headed: args.headed,
        capture: args.capture,
        only: args.only,
        parallel: args.parallel,
        timeout_secs: args.timeout_secs,
        out_dir: cli.out_dir.clone(),
    };
    let config = Config::load(cli.config.as_deref(), &overrides)?;
    let credential = config.require_credential()?;
    let programs = config.require_programs()?.to_vec();
    let out_dir = config.run.out_dir.clone();

    info!(
        programs = programs.len(),
        parallel = config.run.parallel,
        portal = %config.portal.base,
        "starting export"
    );

    let factory = HttpDriverFactory::new(config.portal.clone(), config.run.timeouts.step)
        .with_visible(!config.run.headless);

    let (event_tx, mut event_rx) = mpsc::channel::<RunEvent>(100);

    let ui_mode = UiMode::detect();
    let ui = Arc::new(RunUI::new(programs.len(), ui_mode));

    let ui_clone = ui.clone();
    let display_handle = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            ui_clone.handle_event(&event);
        }
    });

    if ui_mode == UiMode::Full {
        println!();
        println!("{}", style("ptsite export").bold().cyan());
        println!("─────────────────────────");
        println!("Portal: {}", config.portal.base);
        println!("Programs: {}", programs.len());
        println!("Max parallel: {}", config.run.parallel);
    }

    let orchestrator = IsolationOrchestrator::new(
        Arc::new(factory),
        credential.clone(),
        config.portal.data_pattern(),
        config.run.timeouts,
    )
    .with_parallel(config.run.parallel)
    .with_event_channel(event_tx);

    let mut result = orchestrator.run(&programs).await;

    // Dropping the orchestrator closes the channel and lets the display drain.
    drop(orchestrator);
    display_handle.await.ok();

    // Write failures demote their label; the verdict below accounts for them.
    let written = write_run_artifacts(&out_dir, &mut result);

    if config.run.capture {
        let scrubbed = programs
            .iter()
            .map(|p| p.code.as_str().to_string())
            .chain([
                credential.username().to_string(),
                credential.password().to_string(),
            ]);
        let sink = DiagnosticsSink::new(&out_dir).with_scrubbed(scrubbed);
        for outcome in &result.outcomes {
            if outcome.captures.is_empty() {
                continue;
            }
            if let Err(e) = sink.write(&outcome.label, &outcome.captures) {
                warn!(label = %outcome.label, error = %e, "could not write diagnostics");
            }
        }
    }

    let summary = RunSummary::from_result(&result, &written);
    let summary_path = match summary.save(&out_dir) {
        Ok(path) => Some(path),
        Err(e) => {
            warn!(error = %e, "could not save run summary");
            None
        }
    };

    ui.print_summary(&result, &written, summary_path.as_deref());

    result.ensure_clean()?;
    Ok(())
}
