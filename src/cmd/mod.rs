//! CLI command implementations.
//!
//! | Module   | Commands handled |
//! |----------|------------------|
//! | `export` | `Export`         |
//! | `import` | `Import`         |
//! | `site`   | `BuildSite`      |
//! | `config` | `Config`         |

pub mod config;
pub mod export;
pub mod import;
pub mod site;

pub use config::cmd_config;
pub use export::{ExportArgs, cmd_export};
pub use import::cmd_import;
pub use site::cmd_build_site;

use anyhow::Result;
use ptsite::config::{CONFIG_FILE_NAME, PtsiteToml};
use std::path::PathBuf;

use crate::Cli;

/// `--config`, else `./ptsite.toml`.
pub fn config_path(cli: &Cli) -> PathBuf {
    cli.config
        .clone()
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE_NAME))
}

/// The config file, or defaults when it does not exist. An explicit
/// `--config` must exist.
pub fn load_toml(cli: &Cli) -> Result<PtsiteToml> {
    match &cli.config {
        Some(path) => PtsiteToml::load(path),
        None => PtsiteToml::load_or_default(&config_path(cli)),
    }
}

/// `--out-dir`, else `run.out_dir` from the config file.
pub fn resolve_out_dir(cli: &Cli) -> Result<PathBuf> {
    match &cli.out_dir {
        Some(dir) => Ok(dir.clone()),
        None => Ok(load_toml(cli)?.run.out_dir),
    }
}
