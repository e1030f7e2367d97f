//! Optional on-disk capture of everything a session saw.
//!
//! Layout under `<out_dir>/diagnostics/<slug>/`:
//! - `NN-<status>-<path>.txt`: one redacted body per response
//! - `network.json`: method, URL, status, content type and timing per response

use anyhow::{Context, Result};
use reqwest::Url;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::debug;

use crate::portal::{CapturedResponse, redact_secrets};
use crate::util::slugify;

const MAX_PATH_PART: usize = 60;

pub struct DiagnosticsSink {
    root: PathBuf,
    /// Literal values scrubbed from every body and URL, longest first.
    scrub: Vec<String>,
}

impl DiagnosticsSink {
    pub fn new(out_dir: &Path) -> Self {
        Self {
            root: out_dir.join("diagnostics"),
            scrub: Vec::new(),
        }
    }

    /// Also replace these literal values wherever they appear.
    pub fn with_scrubbed(mut self, values: impl IntoIterator<Item = String>) -> Self {
        self.scrub.extend(values.into_iter().filter(|v| !v.is_empty()));
        self.scrub.sort_by(|a, b| b.len().cmp(&a.len()));
        self.scrub.dedup();
        self
    }

    /// Write one label's captures, replacing any earlier capture for it.
    pub fn write(&self, label: &str, captures: &[CapturedResponse]) -> Result<PathBuf> {
        let dir = self.root.join(slugify(label));
        if dir.exists() {
            fs::remove_dir_all(&dir)
                .with_context(|| format!("Failed to clear {}", dir.display()))?;
        }
        fs::create_dir_all(&dir)
            .with_context(|| format!("Failed to create {}", dir.display()))?;

        for (index, response) in captures.iter().enumerate() {
            let name = format!(
                "{:02}-{}-{}.txt",
                index + 1,
                response.status,
                path_part(&response.url)
            );
            let body = self.redact(&response.body_text());
            fs::write(dir.join(&name), body)
                .with_context(|| format!("Failed to write capture {}", name))?;
        }

        let network: Vec<CapturedResponse> = captures
            .iter()
            .map(|r| CapturedResponse {
                url: self.redact(&r.url),
                body: Vec::new(),
                ..r.clone()
            })
            .collect();
        let json = serde_json::to_string_pretty(&network)
            .context("Failed to serialize network log")?;
        fs::write(dir.join("network.json"), json).context("Failed to write network.json")?;

        debug!(label, responses = captures.len(), dir = %dir.display(), "diagnostics written");
        Ok(dir)
    }

    fn redact(&self, text: &str) -> String {
        let mut out = redact_secrets(text);
        for value in &self.scrub {
            out = out.replace(value.as_str(), "<REDACTED>");
        }
        out
    }
}

/// A filesystem-safe rendering of a URL's path.
fn path_part(url: &str) -> String {
    let path = Url::parse(url)
        .map(|u| u.path().to_string())
        .unwrap_or_default();
    let cleaned: String = path
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    let trimmed = cleaned.trim_matches('_');
    if trimmed.is_empty() {
        "root".to_string()
    } else {
        trimmed.chars().take(MAX_PATH_PART).collect()
    }
}
