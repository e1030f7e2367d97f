//! Post-extraction contamination detection.
//!
//! The portal's "current program" is sticky per session, so the code that was
//! sent proves nothing about what came back. The guard compares the identities
//! the portal actually returned: any identity reported for two different labels
//! means at least one of them is somebody else's program.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

use crate::types::ProgramIdentity;

/// One identity claimed by two or more labels.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContaminationEvent {
    pub identity: ProgramIdentity,
    /// Labels in request order.
    pub labels: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ContaminationReport {
    pub events: Vec<ContaminationEvent>,
}

impl ContaminationReport {
    pub fn is_clean(&self) -> bool {
        self.events.is_empty()
    }

    pub fn contains(&self, label: &str) -> bool {
        self.events
            .iter()
            .any(|e| e.labels.iter().any(|l| l == label))
    }

    /// Label groups, one per event.
    pub fn groups(&self) -> Vec<Vec<String>> {
        self.events.iter().map(|e| e.labels.clone()).collect()
    }
}

pub struct ContaminationGuard;

impl ContaminationGuard {
    /// Inspect `(label, identity)` records given in request order.
    ///
    /// Events are ordered by identity, labels within an event by request order.
    pub fn inspect<'a, I>(records: I) -> ContaminationReport
    where
        I: IntoIterator<Item = (&'a str, ProgramIdentity)>,
    {
        let mut by_identity: BTreeMap<ProgramIdentity, Vec<String>> = BTreeMap::new();
        for (label, identity) in records {
            by_identity.entry(identity).or_default().push(label.to_string());
        }

        let events = by_identity
            .into_iter()
            .filter(|(_, labels)| labels.len() > 1)
            .map(|(identity, labels)| ContaminationEvent { identity, labels })
            .collect();
        ContaminationReport { events }
    }
}
