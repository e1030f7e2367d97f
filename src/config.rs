//! Layered configuration for ptsite.
//!
//! Settings are resolved in order: built-in defaults → `ptsite.toml` →
//! environment (a `.env` file is loaded first via `dotenvy`) → CLI flags.
//! The credential is only ever read from the environment.
//!
//! # Configuration File Format
//!
//! ```toml
//! [portal]
//! base_url = "https://www.medbridgego.com"
//! sign_in_path = "/sign_in"
//! access_code_path = "/access_token"
//! data_endpoint = "/api/v4/plus/episode/episode_with_video_urls"
//! episodes_endpoint = "/api/v4/plus/episodes/"
//!
//! [run]
//! headless = true
//! parallel = 1
//! step_timeout_secs = 20
//! extract_timeout_secs = 20
//! pipeline_timeout_secs = 90
//! out_dir = "out"
//! dist_dir = "dist"
//! capture = false
//!
//! [[programs]]
//! label = "knee"
//! code = "ABC123"
//! ```

use anyhow::{Context, Result, anyhow, bail};
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::types::{Credential, ProgramRequest};
use crate::util::slugify;

pub const CONFIG_FILE_NAME: &str = "ptsite.toml";

pub const ENV_USER: &str = "PORTAL_USER";
pub const ENV_PASS: &str = "PORTAL_PASS";
pub const ENV_PROGRAMS: &str = "PORTAL_PROGRAMS";
pub const ENV_BASE_URL: &str = "PORTAL_BASE_URL";
pub const ENV_HEADED: &str = "PTSITE_HEADED";
pub const ENV_CAPTURE: &str = "PTSITE_CAPTURE";

/// Where the portal lives and which paths make up the discovered flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortalSection {
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_sign_in_path")]
    pub sign_in_path: String,
    #[serde(default = "default_access_code_path")]
    pub access_code_path: String,
    #[serde(default = "default_data_endpoint")]
    pub data_endpoint: String,
    /// Lists the account's episodes; used to pick the episode when the code
    /// submission carried no id.
    #[serde(default = "default_episodes_endpoint")]
    pub episodes_endpoint: String,
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_base_url() -> String {
    "https://www.medbridgego.com".to_string()
}

fn default_sign_in_path() -> String {
    "/sign_in".to_string()
}

fn default_access_code_path() -> String {
    "/access_token".to_string()
}

fn default_data_endpoint() -> String {
    "/api/v4/plus/episode/episode_with_video_urls".to_string()
}

fn default_episodes_endpoint() -> String {
    "/api/v4/plus/episodes/".to_string()
}

fn default_user_agent() -> String {
    concat!("ptsite/", env!("CARGO_PKG_VERSION"), " (read-only aggregation)").to_string()
}

impl Default for PortalSection {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            sign_in_path: default_sign_in_path(),
            access_code_path: default_access_code_path(),
            data_endpoint: default_data_endpoint(),
            episodes_endpoint: default_episodes_endpoint(),
            user_agent: default_user_agent(),
        }
    }
}

/// Run behaviour: isolation mode, timeouts, output locations.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RunSection {
    #[serde(default = "default_headless")]
    pub headless: bool,
    #[serde(default = "default_parallel")]
    pub parallel: usize,
    #[serde(default = "default_step_timeout_secs")]
    pub step_timeout_secs: u64,
    #[serde(default = "default_extract_timeout_secs")]
    pub extract_timeout_secs: u64,
    #[serde(default = "default_pipeline_timeout_secs")]
    pub pipeline_timeout_secs: u64,
    #[serde(default = "default_out_dir")]
    pub out_dir: PathBuf,
    #[serde(default = "default_dist_dir")]
    pub dist_dir: PathBuf,
    #[serde(default)]
    pub capture: bool,
}

fn default_headless() -> bool {
    true
}

fn default_parallel() -> usize {
    1
}

fn default_step_timeout_secs() -> u64 {
    20
}

fn default_extract_timeout_secs() -> u64 {
    20
}

fn default_pipeline_timeout_secs() -> u64 {
    90
}

fn default_out_dir() -> PathBuf {
    PathBuf::from("out")
}

fn default_dist_dir() -> PathBuf {
    PathBuf::from("dist")
}

impl Default for RunSection {
    fn default() -> Self {
        Self {
            headless: default_headless(),
            parallel: default_parallel(),
            step_timeout_secs: default_step_timeout_secs(),
            extract_timeout_secs: default_extract_timeout_secs(),
            pipeline_timeout_secs: default_pipeline_timeout_secs(),
            out_dir: default_out_dir(),
            dist_dir: default_dist_dir(),
            capture: false,
        }
    }
}

/// A `[[programs]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProgramEntry {
    pub label: String,
    pub code: String,
}

/// The complete ptsite.toml structure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PtsiteToml {
    #[serde(default)]
    pub portal: PortalSection,
    #[serde(default)]
    pub run: RunSection,
    #[serde(default)]
    pub programs: Vec<ProgramEntry>,
}

impl PtsiteToml {
    /// Load configuration from a TOML file.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;
        Self::parse(&content)
    }

    /// Parse configuration from a TOML string.
    pub fn parse(content: &str) -> Result<Self> {
        toml::from_str(content).context("Failed to parse ptsite.toml")
    }

    /// Load from `path`, or defaults when the file does not exist.
    pub fn load_or_default(path: &Path) -> Result<Self> {
        if path.exists() {
            Self::load(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to a TOML file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self).context("Failed to serialize ptsite.toml")?;
        std::fs::write(path, content)
            .with_context(|| format!("Failed to write config file: {}", path.display()))?;
        Ok(())
    }

    /// Validate the file contents and return human-readable problems.
    pub fn validate(&self) -> Vec<String> {
        let mut warnings = Vec::new();

        if let Err(e) = Url::parse(&self.portal.base_url) {
            warnings.push(format!(
                "Invalid portal.base_url '{}': {}",
                self.portal.base_url, e
            ));
        }
        for (key, path) in [
            ("sign_in_path", &self.portal.sign_in_path),
            ("access_code_path", &self.portal.access_code_path),
            ("data_endpoint", &self.portal.data_endpoint),
            ("episodes_endpoint", &self.portal.episodes_endpoint),
        ] {
            if !path.starts_with('/') {
                warnings.push(format!("portal.{} must start with '/': '{}'", key, path));
            }
        }
        if self.run.parallel == 0 {
            warnings.push("run.parallel must be at least 1".to_string());
        }
        for (key, secs) in [
            ("step_timeout_secs", self.run.step_timeout_secs),
            ("extract_timeout_secs", self.run.extract_timeout_secs),
            ("pipeline_timeout_secs", self.run.pipeline_timeout_secs),
        ] {
            if secs == 0 {
                warnings.push(format!("run.{} must be greater than 0", key));
            }
        }
        if let Err(e) = validate_programs(&to_requests(&self.programs)) {
            warnings.push(e.to_string());
        }

        warnings
    }
}

/// Flags from the command line that override file and environment values.
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub headed: bool,
    pub capture: bool,
    pub only: Option<String>,
    pub parallel: Option<usize>,
    pub timeout_secs: Option<u64>,
    pub out_dir: Option<PathBuf>,
}

/// Portal URLs, resolved against the configured base.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PortalEndpoints {
    pub base: Url,
    pub sign_in: Url,
    pub access_code: Url,
    pub data: Url,
    pub episodes: Url,
    pub user_agent: String,
}

impl PortalEndpoints {
    pub fn from_section(section: &PortalSection) -> Result<Self> {
        let base = Url::parse(&section.base_url)
            .with_context(|| format!("Invalid portal base URL '{}'", section.base_url))?;
        let join = |path: &str| {
            base.join(path)
                .with_context(|| format!("Invalid portal path '{}'", path))
        };
        Ok(Self {
            sign_in: join(&section.sign_in_path)?,
            access_code: join(&section.access_code_path)?,
            data: join(&section.data_endpoint)?,
            episodes: join(&section.episodes_endpoint)?,
            user_agent: section.user_agent.clone(),
            base,
        })
    }

    /// Substring identifying data-endpoint responses.
    pub fn data_pattern(&self) -> &str {
        self.data.path()
    }
}

/// Bounds for every suspension point of a pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Timeouts {
    /// Login and code submission, each.
    pub step: Duration,
    /// Waiting for the data-endpoint response.
    pub extract: Duration,
    /// The whole login → code → extract pipeline for one program.
    pub pipeline: Duration,
}

impl Default for Timeouts {
    fn default() -> Self {
        Self {
            step: Duration::from_secs(default_step_timeout_secs()),
            extract: Duration::from_secs(default_extract_timeout_secs()),
            pipeline: Duration::from_secs(default_pipeline_timeout_secs()),
        }
    }
}

/// Resolved run options.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOptions {
    pub headless: bool,
    pub parallel: usize,
    pub timeouts: Timeouts,
    pub out_dir: PathBuf,
    pub dist_dir: PathBuf,
    pub capture: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        let run = RunSection::default();
        Self {
            headless: run.headless,
            parallel: run.parallel,
            timeouts: Timeouts::default(),
            out_dir: run.out_dir,
            dist_dir: run.dist_dir,
            capture: run.capture,
        }
    }
}

/// Runtime configuration: the merge of file, environment and CLI.
#[derive(Debug, Clone)]
pub struct Config {
    pub portal: PortalEndpoints,
    pub run: RunOptions,
    pub programs: Vec<ProgramRequest>,
    credential: Option<Credential>,
}

impl Config {
    /// Load `.env`, read the config file (if any) and merge everything.
    pub fn load(config_path: Option<&Path>, cli: &CliOverrides) -> Result<Self> {
        // A missing .env is normal; the process environment still applies.
        let _ = dotenvy::dotenv();

        let toml = match config_path {
            Some(path) => PtsiteToml::load(path)?,
            None => PtsiteToml::load_or_default(Path::new(CONFIG_FILE_NAME))?,
        };
        Self::resolve(toml, |key| std::env::var(key).ok(), cli)
    }

    /// Merge a parsed file with an environment lookup and CLI overrides.
    pub fn resolve<F>(mut toml: PtsiteToml, env: F, cli: &CliOverrides) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(base) = env(ENV_BASE_URL).filter(|v| !v.trim().is_empty()) {
            toml.portal.base_url = base.trim().to_string();
        }
        let portal = PortalEndpoints::from_section(&toml.portal)?;

        let mut programs = match env(ENV_PROGRAMS).filter(|v| !v.trim().is_empty()) {
            Some(raw) => parse_programs_env(&raw)?,
            None => to_requests(&toml.programs),
        };

        if let Some(only) = &cli.only {
            let wanted = slugify(only);
            programs.retain(|p| p.slug() == wanted);
            if programs.is_empty() {
                bail!("No program matching --only '{}' (slug: '{}')", only, wanted);
            }
        }

        let headless = !(cli.headed || env(ENV_HEADED).is_some_and(|v| is_truthy(&v)))
            && toml.run.headless;
        let capture =
            cli.capture || env(ENV_CAPTURE).is_some_and(|v| is_truthy(&v)) || toml.run.capture;

        let mut timeouts = Timeouts {
            step: Duration::from_secs(toml.run.step_timeout_secs),
            extract: Duration::from_secs(toml.run.extract_timeout_secs),
            pipeline: Duration::from_secs(toml.run.pipeline_timeout_secs),
        };
        if let Some(secs) = cli.timeout_secs {
            timeouts.pipeline = Duration::from_secs(secs);
        }
        if timeouts.step.is_zero() || timeouts.extract.is_zero() || timeouts.pipeline.is_zero() {
            bail!("Timeouts must be greater than zero");
        }

        let parallel = cli.parallel.unwrap_or(toml.run.parallel);
        if parallel == 0 {
            bail!("parallel must be at least 1");
        }

        let credential = match (env(ENV_USER), env(ENV_PASS)) {
            (Some(user), Some(pass)) if !user.is_empty() && !pass.is_empty() => {
                Some(Credential::new(user, pass))
            }
            _ => None,
        };

        Ok(Self {
            portal,
            run: RunOptions {
                headless,
                parallel,
                timeouts,
                out_dir: cli.out_dir.clone().unwrap_or(toml.run.out_dir),
                dist_dir: toml.run.dist_dir,
                capture,
            },
            programs,
            credential,
        })
    }

    /// The credential, or an error naming the variables to set.
    pub fn require_credential(&self) -> Result<Credential> {
        self.credential.clone().ok_or_else(|| {
            anyhow!(
                "Set {} and {} in the environment or .env",
                ENV_USER,
                ENV_PASS
            )
        })
    }

    /// Programs, validated for an export run.
    pub fn require_programs(&self) -> Result<&[ProgramRequest]> {
        if self.programs.is_empty() {
            bail!(
                "No programs configured. Add [[programs]] to {} or set {}=label:code,...",
                CONFIG_FILE_NAME,
                ENV_PROGRAMS
            );
        }
        validate_programs(&self.programs)?;
        Ok(&self.programs)
    }
}

fn to_requests(entries: &[ProgramEntry]) -> Vec<ProgramRequest> {
    entries
        .iter()
        .map(|e| ProgramRequest::new(e.label.trim(), e.code.trim()))
        .collect()
}

/// Parse `label1:code1,label2:code2`.
pub fn parse_programs_env(value: &str) -> Result<Vec<ProgramRequest>> {
    let mut programs = Vec::new();
    for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        let (label, code) = part
            .split_once(':')
            .map(|(l, c)| (l.trim(), c.trim()))
            .filter(|(l, c)| !l.is_empty() && !c.is_empty())
            .ok_or_else(|| {
                anyhow!(
                    "Invalid {} entry '{}': expected label:code",
                    ENV_PROGRAMS,
                    part.split(':').next().unwrap_or_default()
                )
            })?;
        programs.push(ProgramRequest::new(label, code));
    }
    if programs.is_empty() {
        bail!("{} is set but contains no label:code pairs", ENV_PROGRAMS);
    }
    Ok(programs)
}

/// Labels must be non-empty and unique, and so must their slugs (they name files).
pub fn validate_programs(programs: &[ProgramRequest]) -> Result<()> {
    let mut labels = HashSet::new();
    let mut slugs = HashSet::new();
    for program in programs {
        if program.label.trim().is_empty() {
            bail!("Program label must not be empty");
        }
        if program.code.as_str().trim().is_empty() {
            bail!("Access code for '{}' must not be empty", program.label);
        }
        if !labels.insert(program.label.as_str()) {
            bail!("Duplicate program label '{}'", program.label);
        }
        if !slugs.insert(program.slug()) {
            bail!(
                "Program label '{}' collides with another label once slugified ('{}')",
                program.label,
                program.slug()
            );
        }
    }
    Ok(())
}

fn is_truthy(value: &str) -> bool {
    matches!(
        value.trim().to_ascii_lowercase().as_str(),
        "1" | "true" | "yes"
    )
}
