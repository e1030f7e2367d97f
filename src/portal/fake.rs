//! Scripted in-memory portal for unit tests.

use async_trait::async_trait;
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::errors::PipelineError;
use crate::portal::capture::{CapturedResponse, ResponseMatcher};
use crate::portal::driver::{DriverFactory, PortalDriver};
use crate::types::{AccessCode, Credential};

pub(crate) const DATA_URL: &str =
    "https://portal.test/api/v4/plus/episode/episode_with_video_urls?old_versions=1";

/// How the fake portal treats one label's session.
#[derive(Debug, Clone)]
pub(crate) enum Behaviour {
    /// Serve this data-endpoint body after the code is redeemed.
    Program(Vec<u8>),
    LoginFails,
    LoginHangs,
    RejectCode,
    NeverRespond,
}

#[derive(Debug, Default)]
pub(crate) struct Counters {
    pub opened: AtomicUsize,
    pub closed: AtomicUsize,
    pub live: AtomicUsize,
    pub max_live: AtomicUsize,
    pub redeemed: Mutex<Vec<(String, String)>>,
}

pub(crate) struct FakeFactory {
    script: HashMap<String, Behaviour>,
    delay: Duration,
    pub counters: Arc<Counters>,
}

impl FakeFactory {
    pub fn new() -> Self {
        Self {
            script: HashMap::new(),
            delay: Duration::ZERO,
            counters: Arc::new(Counters::default()),
        }
    }

    pub fn with(mut self, label: &str, behaviour: Behaviour) -> Self {
        self.script.insert(label.to_string(), behaviour);
        self
    }

    /// Sleep this long before serving the data response.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn opened(&self) -> usize {
        self.counters.opened.load(Ordering::SeqCst)
    }

    pub fn closed(&self) -> usize {
        self.counters.closed.load(Ordering::SeqCst)
    }

    pub fn max_live(&self) -> usize {
        self.counters.max_live.load(Ordering::SeqCst)
    }

    pub fn redeemed(&self) -> Vec<(String, String)> {
        self.counters.redeemed.lock().unwrap().clone()
    }
}

impl DriverFactory for FakeFactory {
    fn new_driver(&self, label: &str) -> Result<Box<dyn PortalDriver>, PipelineError> {
        self.counters.opened.fetch_add(1, Ordering::SeqCst);
        let live = self.counters.live.fetch_add(1, Ordering::SeqCst) + 1;
        self.counters.max_live.fetch_max(live, Ordering::SeqCst);
        Ok(Box::new(FakeDriver {
            label: label.to_string(),
            behaviour: self
                .script
                .get(label)
                .cloned()
                .unwrap_or(Behaviour::NeverRespond),
            delay: self.delay,
            counters: Arc::clone(&self.counters),
            captures: Vec::new(),
            redeemed: false,
            closed: false,
        }))
    }
}

pub(crate) struct FakeDriver {
    label: String,
    behaviour: Behaviour,
    delay: Duration,
    counters: Arc<Counters>,
    captures: Vec<CapturedResponse>,
    redeemed: bool,
    closed: bool,
}

#[async_trait]
impl PortalDriver for FakeDriver {
    async fn login(&mut self, _credential: &Credential) -> Result<(), PipelineError> {
        match self.behaviour {
            Behaviour::LoginFails => Err(PipelineError::Auth {
                reason: "portal stayed on the sign-in page".into(),
            }),
            Behaviour::LoginHangs => std::future::pending().await,
            _ => Ok(()),
        }
    }

    async fn redeem_code(&mut self, code: &AccessCode) -> Result<(), PipelineError> {
        self.counters
            .redeemed
            .lock()
            .unwrap()
            .push((self.label.clone(), code.as_str().to_string()));
        if matches!(self.behaviour, Behaviour::RejectCode) {
            return Err(PipelineError::CodeRejected {
                reason: "portal returned to /access_token".into(),
            });
        }
        self.redeemed = true;
        Ok(())
    }

    async fn next_response(
        &mut self,
        matcher: &ResponseMatcher,
    ) -> Result<CapturedResponse, PipelineError> {
        let Behaviour::Program(body) = &self.behaviour else {
            return std::future::pending().await;
        };
        if !self.redeemed {
            return std::future::pending().await;
        }
        let body = body.clone();
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let response = CapturedResponse {
            method: "GET".into(),
            url: DATA_URL.into(),
            status: 200,
            content_type: Some("application/json".into()),
            body,
            elapsed: self.delay,
        };
        self.captures.push(response.clone());
        assert!(matcher.matches(&response), "fake data URL must match");
        Ok(response)
    }

    fn captures(&self) -> &[CapturedResponse] {
        &self.captures
    }

    async fn close(&mut self) {
        if !self.closed {
            self.closed = true;
            self.counters.closed.fetch_add(1, Ordering::SeqCst);
            self.counters.live.fetch_sub(1, Ordering::SeqCst);
        }
    }
}

/// A data-endpoint body with `count` generated exercises.
pub(crate) fn program_body(program_id: u64, episode_id: u64, name: &str, count: usize) -> Vec<u8> {
    let exercises: Vec<_> = (1..=count)
        .map(|i| {
            json!({
                "name": format!("Exercise {}", i),
                "description": format!("<p>Step {}</p>", i),
                "note": "",
                "min_sets": 2,
                "min_reps": 10,
                "program_exercise_attributes": [
                    { "type": "sets", "value": 3 },
                    { "type": "hold", "value": "5 seconds" }
                ]
            })
        })
        .collect();
    serde_json::to_vec(&json!({
        "episode": { "id": episode_id, "name": name },
        "program": {
            "id": program_id,
            "name": format!("{} program", name),
            "program_exercises": exercises
        }
    }))
    .unwrap()
}
