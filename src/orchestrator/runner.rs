//! Isolation orchestrator: one fresh session per access code.
//!
//! For every request the orchestrator opens a new driver, signs in with the
//! shared credential, redeems that request's code (and only that code),
//! extracts and normalizes the program, then closes the session whether or
//! not anything failed. Failures are recorded per label and never abort
//! sibling pipelines, except authentication failures, which stop new
//! pipelines from starting.

use chrono::Utc;
use futures::stream::{self, StreamExt};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::time::{Duration, Instant};
use tokio::sync::mpsc;
use tracing::{info, warn};

use crate::config::Timeouts;
use crate::errors::PipelineError;
use crate::extract::ProgramExtractor;
use crate::guard::ContaminationGuard;
use crate::normalize::normalize;
use crate::orchestrator::state::{
    LabelStatus, PipelineStage, ProgramOutcome, RunEvent, RunResult,
};
use crate::portal::DriverFactory;
use crate::session::Session;
use crate::types::{Credential, ExtractedProgram, ProgramIdentity, ProgramRequest};

pub struct IsolationOrchestrator {
    factory: Arc<dyn DriverFactory>,
    credential: Arc<Credential>,
    extractor: ProgramExtractor,
    timeouts: Timeouts,
    parallel: usize,
    event_tx: Option<mpsc::Sender<RunEvent>>,
}

/// Shared between the pipelines of one run.
struct RunTally {
    sessions_opened: AtomicUsize,
    aborted: AtomicBool,
}

impl IsolationOrchestrator {
    /// `data_pattern` identifies data-endpoint responses (a URL substring).
    pub fn new(
        factory: Arc<dyn DriverFactory>,
        credential: Credential,
        data_pattern: &str,
        timeouts: Timeouts,
    ) -> Self {
        Self {
            factory,
            credential: Arc::new(credential),
            extractor: ProgramExtractor::new(data_pattern, timeouts.extract),
            timeouts,
            parallel: 1,
            event_tx: None,
        }
    }

    /// Run up to `parallel` pipelines at once. 1 (the default) is sequential.
    pub fn with_parallel(mut self, parallel: usize) -> Self {
        self.parallel = parallel.max(1);
        self
    }

    /// Set the event channel for progress updates.
    pub fn with_event_channel(mut self, tx: mpsc::Sender<RunEvent>) -> Self {
        self.event_tx = Some(tx);
        self
    }

    /// Export every request. Always returns a complete result; use
    /// [`RunResult::ensure_clean`] for the verdict.
    pub async fn run(&self, requests: &[ProgramRequest]) -> RunResult {
        let started_at = Utc::now();
        let timer = Instant::now();
        let tally = RunTally {
            sessions_opened: AtomicUsize::new(0),
            aborted: AtomicBool::new(false),
        };

        info!(
            programs = requests.len(),
            parallel = self.parallel,
            "starting export run"
        );
        self.emit(RunEvent::RunStarted {
            total: requests.len(),
            parallel: self.parallel,
        })
        .await;

        let mut outcomes = if self.parallel <= 1 {
            let mut outcomes = Vec::with_capacity(requests.len());
            for request in requests {
                outcomes.push(self.run_one(request, &tally).await);
            }
            outcomes
        } else {
            let tally = &tally;
            let mut indexed: Vec<(usize, ProgramOutcome)> = stream::iter(requests.iter().enumerate())
                .map(|(index, request)| async move { (index, self.run_one(request, tally).await) })
                .buffer_unordered(self.parallel)
                .collect()
                .await;
            indexed.sort_by_key(|(index, _)| *index);
            indexed.into_iter().map(|(_, outcome)| outcome).collect()
        };

        let contamination = ContaminationGuard::inspect(
            outcomes
                .iter()
                .filter_map(|o| o.identity.map(|identity| (o.label.as_str(), identity))),
        );
        for event in &contamination.events {
            warn!(
                identity = %event.identity,
                labels = ?event.labels,
                "contamination: one program returned for several labels"
            );
        }
        for outcome in outcomes.iter_mut() {
            if contamination.contains(&outcome.label) {
                outcome.status = LabelStatus::Contaminated;
            }
        }

        let result = RunResult {
            outcomes,
            contamination,
            sessions_opened: tally.sessions_opened.load(Ordering::SeqCst),
            started_at,
            duration: timer.elapsed(),
        };

        self.emit(RunEvent::RunCompleted {
            succeeded: result.count(LabelStatus::Succeeded),
            failed: result.count(LabelStatus::Failed),
            contaminated: result.count(LabelStatus::Contaminated),
            skipped: result.count(LabelStatus::Skipped),
        })
        .await;
        info!(
            sessions = result.sessions_opened,
            succeeded = result.count(LabelStatus::Succeeded),
            elapsed_ms = result.duration.as_millis() as u64,
            "export run finished"
        );
        result
    }

    async fn run_one(&self, request: &ProgramRequest, tally: &RunTally) -> ProgramOutcome {
        if tally.aborted.load(Ordering::SeqCst) {
            let outcome = ProgramOutcome::skipped(&request.label);
            self.emit_finished(&outcome).await;
            return outcome;
        }

        let timer = Instant::now();
        let mut session =
            match Session::open(self.factory.as_ref(), &request.label, self.timeouts.step) {
                Ok(session) => session,
                Err(e) => {
                    warn!(label = %request.label, error = %e, "could not open session");
                    let outcome =
                        ProgramOutcome::failed(&request.label, e, Vec::new(), timer.elapsed());
                    self.emit_finished(&outcome).await;
                    return outcome;
                }
            };
        tally.sessions_opened.fetch_add(1, Ordering::SeqCst);

        let deadline = tokio::time::Instant::now() + self.timeouts.pipeline;
        let mut extract_wait = None;
        let pipeline = self.pipeline(&mut session, request, deadline, &mut extract_wait);
        let finished = tokio::time::timeout_at(deadline, pipeline).await;
        let result = match finished {
            Ok(result) => result,
            // The budget ran out while waiting for data: that is a missing data response.
            Err(_) => Err(match extract_wait {
                Some(waited) => PipelineError::ExtractionTimeout { waited },
                None => PipelineError::PipelineTimeout {
                    waited: self.timeouts.pipeline,
                },
            }),
        };
        let captures = session.close().await;

        let outcome = match result {
            Ok((identity, program)) => {
                info!(
                    label = %request.label,
                    %identity,
                    exercises = program.exercises.len(),
                    "program extracted"
                );
                ProgramOutcome::succeeded(identity, program, captures, timer.elapsed())
            }
            Err(e) => {
                if e.is_run_fatal() {
                    tally.aborted.store(true, Ordering::SeqCst);
                }
                warn!(label = %request.label, kind = e.kind(), error = %e, "program failed");
                ProgramOutcome::failed(&request.label, e, captures, timer.elapsed())
            }
        };
        self.emit_finished(&outcome).await;
        outcome
    }

    async fn pipeline(
        &self,
        session: &mut Session,
        request: &ProgramRequest,
        deadline: tokio::time::Instant,
        extract_wait: &mut Option<Duration>,
    ) -> Result<(ProgramIdentity, ExtractedProgram), PipelineError> {
        self.emit_stage(&request.label, PipelineStage::Login).await;
        session.login(&self.credential).await?;

        self.emit_stage(&request.label, PipelineStage::SubmitCode).await;
        session.submit_code(&request.code).await?;

        self.emit_stage(&request.label, PipelineStage::Extract).await;
        let remaining = deadline.saturating_duration_since(tokio::time::Instant::now());
        *extract_wait = Some(self.timeouts.extract.min(remaining));
        let extracted = self.extractor.extract(session, remaining).await?;
        Ok((extracted.identity, normalize(&request.label, &extracted.payload)))
    }

    async fn emit_stage(&self, label: &str, stage: PipelineStage) {
        self.emit(RunEvent::Stage {
            label: label.to_string(),
            stage,
        })
        .await;
    }

    async fn emit_finished(&self, outcome: &ProgramOutcome) {
        self.emit(RunEvent::ProgramFinished {
            label: outcome.label.clone(),
            status: outcome.status,
            detail: outcome.detail(),
        })
        .await;
    }

    /// Emit an event to the event channel if configured.
    async fn emit(&self, event: RunEvent) {
        if let Some(ref tx) = self.event_tx {
            tx.send(event).await.ok();
        }
    }
}
