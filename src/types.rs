//! Core domain types shared across the export pipeline.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Portal login. Read once at startup and shared read-only by every session.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    username: String,
    password: String,
}

impl Credential {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn password(&self) -> &str {
        &self.password
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("username", &"<redacted>")
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Short code that binds a portal session to one program.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AccessCode(String);

impl AccessCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Masked form for logs: first two characters, the rest starred.
    pub fn masked(&self) -> String {
        let visible: String = self.0.chars().take(2).collect();
        let hidden = self.0.chars().count().saturating_sub(2);
        format!("{}{}", visible, "*".repeat(hidden))
    }
}

impl fmt::Debug for AccessCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessCode({})", self.masked())
    }
}

/// One configured (label, access code) pair.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramRequest {
    pub label: String,
    pub code: AccessCode,
}

impl ProgramRequest {
    pub fn new(label: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            code: AccessCode::new(code),
        }
    }

    pub fn slug(&self) -> String {
        crate::util::slugify(&self.label)
    }
}

/// The portal's own identifiers for a program, as returned in the data response.
///
/// Only used to detect contamination; never written to artifacts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ProgramIdentity {
    pub program_id: u64,
    pub episode_id: Option<u64>,
}

impl fmt::Display for ProgramIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.episode_id {
            Some(episode) => write!(f, "program {} / episode {}", self.program_id, episode),
            None => write!(f, "program {}", self.program_id),
        }
    }
}

/// One exercise in the stable artifact schema consumed by the site generator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Exercise {
    pub name: String,
    /// Rich text from the portal, kept verbatim.
    pub description: String,
    pub sets: Option<u32>,
    pub reps: Option<u32>,
    pub hold: Option<String>,
    pub note: Option<String>,
}

/// A normalized program for one label.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ExtractedProgram {
    pub label: String,
    pub name: String,
    pub exercises: Vec<Exercise>,
}

/// The on-disk shape of `workout_<slug>.json`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkoutArtifact {
    pub name: String,
    pub exercises: Vec<Exercise>,
}

impl From<&ExtractedProgram> for WorkoutArtifact {
    fn from(program: &ExtractedProgram) -> Self {
        Self {
            name: program.name.clone(),
            exercises: program.exercises.clone(),
        }
    }
}
