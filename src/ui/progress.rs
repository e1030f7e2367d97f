use crate::orchestrator::{LabelStatus, PipelineStage, RunEvent, RunResult};
use crate::ui::icons::{CHECK, CLOCK, CROSS, FILE_NEW, KEY, SEARCH, SKIP, SPARKLE, TICKET, WARNING};
use console::{Term, style};
use indicatif::{MultiProgress, ProgressBar, ProgressStyle};
use std::collections::HashMap;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use std::time::Duration;

/// Output mode for the run UI.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UiMode {
    /// Progress bars and colors.
    #[default]
    Full,
    /// One plain line per finished program.
    Minimal,
}

impl UiMode {
    /// Full on an interactive terminal, minimal otherwise.
    pub fn detect() -> Self {
        if Term::stdout().is_term() {
            Self::Full
        } else {
            Self::Minimal
        }
    }
}

/// Terminal UI for an export run, driven by [`RunEvent`]s.
///
/// A header bar counts finished programs; each running program gets its own
/// spinner showing the current pipeline stage. The per-label lock is only
/// held for short map updates.
pub struct RunUI {
    mode: UiMode,
    multi: MultiProgress,
    header_bar: ProgressBar,
    bars: Mutex<HashMap<String, ProgressBar>>,
    term: Term,
}

impl RunUI {
    pub fn new(total: usize, mode: UiMode) -> Self {
        let multi = MultiProgress::new();

        let header_style = ProgressStyle::default_bar()
            .template("{prefix:.bold} [{bar:40.cyan/blue}] {pos}/{len} {msg}")
            .expect("progress bar template is a valid static string")
            .progress_chars("█▓▒░");

        let header_bar = if mode == UiMode::Full {
            multi.add(ProgressBar::new(total as u64))
        } else {
            ProgressBar::hidden()
        };
        header_bar.set_style(header_style);
        header_bar.set_prefix("Programs");

        Self {
            mode,
            multi,
            header_bar,
            bars: Mutex::new(HashMap::new()),
            term: Term::stdout(),
        }
    }

    pub fn handle_event(&self, event: &RunEvent) {
        match self.mode {
            UiMode::Minimal => self.handle_minimal(event),
            UiMode::Full => self.handle_full(event),
        }
    }

    fn handle_minimal(&self, event: &RunEvent) {
        match event {
            RunEvent::RunStarted { total, parallel } => {
                let _ = writeln!(&self.term, "Exporting {} program(s), parallel {}", total, parallel);
            }
            RunEvent::ProgramFinished {
                label,
                status,
                detail,
            } => {
                let _ = match detail {
                    Some(detail) => writeln!(&self.term, "{} {}: {}", label, status.as_str(), detail),
                    None => writeln!(&self.term, "{} {}", label, status.as_str()),
                };
            }
            _ => {}
        }
    }

    fn handle_full(&self, event: &RunEvent) {
        match event {
            RunEvent::RunStarted { total, parallel } => {
                self.header_bar.set_message(if *parallel > 1 {
                    format!("{} in parallel", parallel)
                } else {
                    "one session at a time".to_string()
                });
                self.multi
                    .println(format!(
                        "{} Exporting {} program(s)",
                        SPARKLE,
                        style(total).yellow().bold()
                    ))
                    .ok();
            }
            RunEvent::Stage { label, stage } => self.on_stage(label, *stage),
            RunEvent::ProgramFinished {
                label,
                status,
                detail,
            } => self.on_finished(label, *status, detail.as_deref()),
            RunEvent::RunCompleted { .. } => self.header_bar.finish_and_clear(),
        }
    }

    fn on_stage(&self, label: &str, stage: PipelineStage) {
        let icon = match stage {
            PipelineStage::Login => KEY,
            PipelineStage::SubmitCode => TICKET,
            PipelineStage::Extract => SEARCH,
        };
        let mut bars = self.bars.lock().unwrap();
        let bar = bars.entry(label.to_string()).or_insert_with(|| {
            let bar = self.multi.add(ProgressBar::new_spinner());
            bar.set_style(
                ProgressStyle::default_spinner()
                    .template("  {spinner} {prefix:.bold} {msg}")
                    .expect("progress bar template is a valid static string"),
            );
            bar.set_prefix(format!("[{}]", label));
            bar.enable_steady_tick(Duration::from_millis(100));
            bar
        });
        bar.set_message(format!("{}{}", icon, stage.describe()));
    }

    fn on_finished(&self, label: &str, status: LabelStatus, detail: Option<&str>) {
        if let Some(bar) = self.bars.lock().unwrap().remove(label) {
            bar.finish_and_clear();
        }
        self.header_bar.inc(1);

        let line = match status {
            LabelStatus::Succeeded => format!("  {}{}", CHECK, style(label).green().bold()),
            LabelStatus::Failed => format!(
                "  {}{}: {}",
                CROSS,
                style(label).red().bold(),
                detail.unwrap_or("failed")
            ),
            LabelStatus::Skipped => format!(
                "  {}{} {}",
                SKIP,
                style(label).yellow(),
                style("skipped").dim()
            ),
            // Contamination is only known after every pipeline finished.
            LabelStatus::Contaminated => format!("  {}{}", WARNING, style(label).yellow().bold()),
        };
        self.multi.println(line).ok();
    }

    /// Per-label summary, printed after the run and after artifacts are written.
    pub fn print_summary(
        &self,
        result: &RunResult,
        written: &[(String, PathBuf)],
        summary_file: Option<&Path>,
    ) {
        let mut out = Vec::new();
        out.push(String::new());
        out.push(format!("{}", style("─".repeat(60)).cyan()));

        for outcome in &result.outcomes {
            let (icon, status) = match outcome.status {
                LabelStatus::Succeeded => (CHECK, style("succeeded").green()),
                LabelStatus::Failed => (CROSS, style("failed").red()),
                LabelStatus::Contaminated => (WARNING, style("contaminated").red().bold()),
                LabelStatus::Skipped => (SKIP, style("skipped").yellow()),
            };
            let mut line = format!("{}{:<16} {}", icon, outcome.label, status);
            if let Some((_, path)) = written.iter().find(|(label, _)| *label == outcome.label) {
                let exercises = outcome
                    .program
                    .as_ref()
                    .map(|p| p.exercises.len())
                    .unwrap_or_default();
                line.push_str(&format!(
                    "  {}{} ({} exercises)",
                    FILE_NEW,
                    path.display(),
                    exercises
                ));
            } else if let Some(detail) = outcome.detail() {
                line.push_str(&format!("  {}", style(detail).dim()));
            }
            out.push(line);
        }

        for event in &result.contamination.events {
            out.push(format!(
                "{}{} [{}] returned the same program ({}); artifacts withheld",
                WARNING,
                style("Contamination:").red().bold(),
                event.labels.join(", "),
                event.identity
            ));
        }

        out.push(format!("{}", style("─".repeat(60)).cyan()));
        out.push(format!(
            "{}Sessions opened: {}  |  Duration: {}",
            CLOCK,
            style(result.sessions_opened).cyan(),
            style(format_duration(result.duration)).cyan()
        ));
        if let Some(path) = summary_file {
            out.push(format!("   Run summary: {}", style(path.display()).dim()));
        }

        for line in out {
            let _ = writeln!(&self.term, "{}", line);
        }
    }
}

/// Format a duration as a human-readable string.
pub fn format_duration(d: Duration) -> String {
    let secs = d.as_secs();
    if secs >= 3600 {
        format!("{}h {}m {}s", secs / 3600, (secs % 3600) / 60, secs % 60)
    } else if secs >= 60 {
        format!("{}m {}s", secs / 60, secs % 60)
    } else if secs > 0 {
        format!("{}s", secs)
    } else {
        format!("{}ms", d.as_millis())
    }
}
