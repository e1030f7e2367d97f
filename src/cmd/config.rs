//! Configuration view and validation commands: `ptsite config`.

use anyhow::Result;
use ptsite::artifact::list_runs;
use ptsite::config::{CliOverrides, Config, ENV_PASS, ENV_USER, ProgramEntry, PtsiteToml};

use super::config_path;
use crate::{Cli, ConfigCommands};

pub fn cmd_config(cli: &Cli, command: Option<ConfigCommands>) -> Result<()> {
    let path = config_path(cli);

    match command {
        None | Some(ConfigCommands::Show) => {
            println!();
            println!("ptsite Configuration");
            println!("====================");
            println!();

            let toml = if path.exists() {
                println!("Config file: {}", path.display());
                PtsiteToml::load(&path)?
            } else {
                println!("No config file at {} (using defaults)", path.display());
                PtsiteToml::default()
            };
            println!();

            println!("[portal]");
            println!("  base_url = \"{}\"", toml.portal.base_url);
            println!("  sign_in_path = \"{}\"", toml.portal.sign_in_path);
            println!("  access_code_path = \"{}\"", toml.portal.access_code_path);
            println!("  data_endpoint = \"{}\"", toml.portal.data_endpoint);
            println!("  episodes_endpoint = \"{}\"", toml.portal.episodes_endpoint);
            println!();
            println!("[run]");
            println!("  headless = {}", toml.run.headless);
            println!("  parallel = {}", toml.run.parallel);
            println!("  step_timeout_secs = {}", toml.run.step_timeout_secs);
            println!("  extract_timeout_secs = {}", toml.run.extract_timeout_secs);
            println!("  pipeline_timeout_secs = {}", toml.run.pipeline_timeout_secs);
            println!("  out_dir = \"{}\"", toml.run.out_dir.display());
            println!("  dist_dir = \"{}\"", toml.run.dist_dir.display());
            println!("  capture = {}", toml.run.capture);
            println!();

            // Effective values include the environment; codes stay masked.
            println!("Effective values (with env/CLI overrides):");
            let overrides = CliOverrides {
                out_dir: cli.out_dir.clone(),
                ..Default::default()
            };
            match Config::load(cli.config.as_deref(), &overrides) {
                Ok(config) => {
                    println!("  portal = {}", config.portal.base);
                    println!("  out_dir = {}", config.run.out_dir.display());
                    println!(
                        "  credential = {}",
                        if config.require_credential().is_ok() {
                            "set"
                        } else {
                            "missing"
                        }
                    );
                    if config.programs.is_empty() {
                        println!("  programs = (none)");
                    }
                    for program in &config.programs {
                        println!("  program {} = {}", program.label, program.code.masked());
                    }
                    let runs = list_runs(&config.run.out_dir)?;
                    if let Some(latest) = runs.first() {
                        println!("  runs recorded = {} (latest: {})", runs.len(), latest.display());
                    }
                }
                Err(e) => println!("  error: {:#}", e),
            }
            println!();
        }
        Some(ConfigCommands::Validate) => {
            println!();
            println!("Validating configuration...");
            println!();

            if !path.exists() {
                println!("No {} found. Using defaults (valid).", path.display());
                return Ok(());
            }

            let _ = dotenvy::dotenv();
            let toml = PtsiteToml::load(&path)?;
            let mut warnings = toml.validate();
            if std::env::var(ENV_USER).is_err() || std::env::var(ENV_PASS).is_err() {
                warnings.push(format!(
                    "{} and {} are not set; export will refuse to run",
                    ENV_USER, ENV_PASS
                ));
            }

            if warnings.is_empty() {
                println!("Configuration is valid.");
            } else {
                println!("Configuration warnings:");
                for warning in warnings {
                    println!("  - {}", warning);
                }
            }
            println!();
        }
        Some(ConfigCommands::Init) => {
            if path.exists() {
                println!("{} already exists", path.display());
                println!("Delete it first if you want to recreate it.");
                return Ok(());
            }

            let mut toml = PtsiteToml::default();
            toml.programs.push(ProgramEntry {
                label: "knee".to_string(),
                code: "CHANGEME".to_string(),
            });
            toml.save(&path)?;

            println!("Created {}", path.display());
            println!();
            println!("Next steps:");
            println!("  - replace the [[programs]] entries with your labels and access codes");
            println!("  - put {} and {} in .env", ENV_USER, ENV_PASS);
            println!();
        }
    }

    Ok(())
}
