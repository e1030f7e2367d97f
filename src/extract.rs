//! Program extraction from a code-bound session.
//!
//! The extractor waits (bounded) for the data-endpoint response, parses it and
//! checks the fields the rest of the pipeline relies on. The payload types are
//! deliberately lenient about everything else: the portal adds and drops
//! optional fields freely.

use serde::de::{self, Deserializer};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::time::Duration;
use tracing::debug;

use crate::errors::PipelineError;
use crate::portal::ResponseMatcher;
use crate::session::Session;
use crate::types::ProgramIdentity;

/// `{ episode: {...}, program: {...} }` as served by the data endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramPayload {
    #[serde(default)]
    pub episode: Option<EpisodeInfo>,
    pub program: ProgramInfo,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EpisodeInfo {
    #[serde(default, deserialize_with = "optional_id")]
    pub id: Option<u64>,
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProgramInfo {
    #[serde(deserialize_with = "required_id")]
    pub id: u64,
    #[serde(default)]
    pub name: Option<String>,
    pub program_exercises: Vec<ExercisePayload>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExercisePayload {
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub note: Option<String>,
    #[serde(default)]
    pub min_sets: Option<Value>,
    #[serde(default)]
    pub min_reps: Option<Value>,
    #[serde(default)]
    pub program_exercise_attributes: Option<Vec<ExerciseAttribute>>,
}

/// A `{type, value}` dosage attribute such as `sets`, `reps` or `hold`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExerciseAttribute {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub value: Option<Value>,
}

impl ExercisePayload {
    /// The first attribute of `kind` (case-insensitive) with a non-null value.
    pub fn attribute(&self, kind: &str) -> Option<&Value> {
        self.program_exercise_attributes
            .iter()
            .flatten()
            .filter(|a| a.kind.as_deref().is_some_and(|k| k.eq_ignore_ascii_case(kind)))
            .find_map(|a| a.value.as_ref().filter(|v| !v.is_null()))
    }
}

/// A validated payload and the identity it reports.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedPayload {
    pub identity: ProgramIdentity,
    pub payload: ProgramPayload,
}

/// Waits for and validates the program data in a bound session.
#[derive(Debug, Clone)]
pub struct ProgramExtractor {
    matcher: ResponseMatcher,
    timeout: Duration,
}

impl ProgramExtractor {
    /// `data_pattern` is a URL substring identifying data-endpoint responses.
    pub fn new(data_pattern: impl Into<String>, timeout: Duration) -> Self {
        Self {
            matcher: ResponseMatcher::new(data_pattern),
            timeout,
        }
    }

    /// Wait for the data response, for at most the configured timeout or
    /// `remaining`, whichever is shorter.
    pub async fn extract(
        &self,
        session: &mut Session,
        remaining: Duration,
    ) -> Result<ExtractedPayload, PipelineError> {
        let waited = self.timeout.min(remaining);
        let response = tokio::time::timeout(waited, session.await_response(&self.matcher))
            .await
            .map_err(|_| PipelineError::ExtractionTimeout { waited })??;

        debug!(
            label = session.label(),
            url = %response.url,
            bytes = response.body.len(),
            "program data captured"
        );
        parse_payload(&response.body)
    }
}

/// Parse and validate a raw data-endpoint body.
pub fn parse_payload(body: &[u8]) -> Result<ExtractedPayload, PipelineError> {
    let value: Value = serde_json::from_slice(body).map_err(|_| mismatch("<body>"))?;
    check_required_fields(&value)?;

    let payload: ProgramPayload =
        serde_json::from_value(value).map_err(|e| mismatch(&format!("program ({})", e)))?;
    let identity = ProgramIdentity {
        program_id: payload.program.id,
        episode_id: payload.episode.as_ref().and_then(|e| e.id),
    };
    Ok(ExtractedPayload { identity, payload })
}

fn check_required_fields(value: &Value) -> Result<(), PipelineError> {
    let program = value
        .get("program")
        .filter(|p| p.is_object())
        .ok_or_else(|| mismatch("program"))?;
    program
        .get("id")
        .and_then(as_id)
        .ok_or_else(|| mismatch("program.id"))?;
    let exercises = program
        .get("program_exercises")
        .and_then(Value::as_array)
        .ok_or_else(|| mismatch("program.program_exercises"))?;
    for (i, exercise) in exercises.iter().enumerate() {
        if !exercise.get("name").is_some_and(Value::is_string) {
            return Err(mismatch(&format!("program.program_exercises[{}].name", i)));
        }
    }
    Ok(())
}

fn mismatch(field: &str) -> PipelineError {
    PipelineError::SchemaMismatch {
        field: field.to_string(),
    }
}

/// Ids arrive as numbers, occasionally as numeric strings.
fn as_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn required_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<u64, D::Error> {
    let value = Value::deserialize(deserializer)?;
    as_id(&value).ok_or_else(|| de::Error::custom("expected a numeric id"))
}

fn optional_id<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Option<u64>, D::Error> {
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.as_ref().and_then(as_id))
}
