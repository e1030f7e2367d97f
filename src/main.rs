use anyhow::Result;
use clap::{Parser, Subcommand};
use ptsite::errors::RunError;
use ptsite::logging::{self, LoggingOptions};
use std::path::PathBuf;
use std::process::ExitCode;

mod cmd;

#[derive(Parser)]
#[command(name = "ptsite")]
#[command(
    version,
    about = "Export rehab-portal exercise programs into a static site, one isolated session per access code"
)]
pub struct Cli {
    /// Increase log verbosity (-v debug, -vv trace)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,

    /// Path to ptsite.toml (defaults to ./ptsite.toml)
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Output directory for artifacts, diagnostics and run summaries
    #[arg(long, global = true)]
    pub out_dir: Option<PathBuf>,

    /// Emit console logs as JSON lines
    #[arg(long, global = true)]
    pub log_json: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Log in once per program, redeem its access code and save the program
    Export {
        /// Log every portal transition at info level
        #[arg(long)]
        headed: bool,

        /// Export only the program with this label (matched by slug)
        #[arg(long)]
        only: Option<String>,

        /// Maximum concurrent sessions
        #[arg(long)]
        parallel: Option<usize>,

        /// Per-program pipeline timeout in seconds
        #[arg(long)]
        timeout: Option<u64>,

        /// Write redacted responses under <out-dir>/diagnostics/
        #[arg(long)]
        capture: bool,
    },
    /// Convert a saved data-endpoint response into a workout artifact
    Import {
        /// JSON file saved from the portal's data endpoint
        file: PathBuf,

        /// Program label (names the artifact)
        #[arg(long)]
        name: String,
    },
    /// Render the static site from the exported artifacts
    BuildSite,
    /// View, validate or create configuration
    Config {
        #[command(subcommand)]
        command: Option<ConfigCommands>,
    },
}

#[derive(Subcommand, Clone)]
pub enum ConfigCommands {
    /// Show the effective configuration
    Show,
    /// Validate configuration and show any warnings
    Validate,
    /// Write a default ptsite.toml
    Init,
}

async fn dispatch(cli: &Cli) -> Result<()> {
    let log_dir = match &cli.command {
        Commands::Export { .. } => Some(cmd::resolve_out_dir(cli)?.join("logs")),
        _ => None,
    };
    let _log_guard = logging::init(&LoggingOptions {
        verbose: cli.verbose,
        json: cli.log_json,
        log_dir,
    })?;

    match &cli.command {
        Commands::Export {
            headed,
            only,
            parallel,
            timeout,
            capture,
        } => {
            cmd::cmd_export(
                cli,
                cmd::ExportArgs {
                    headed: *headed,
                    only: only.clone(),
                    parallel: *parallel,
                    timeout_secs: *timeout,
                    capture: *capture,
                },
            )
            .await
        }
        Commands::Import { file, name } => cmd::cmd_import(cli, file, name),
        Commands::BuildSite => cmd::cmd_build_site(cli),
        Commands::Config { command } => cmd::cmd_config(cli, command.clone()),
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match dispatch(&cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("Error: {:#}", err);
            let code = err
                .downcast_ref::<RunError>()
                .map(RunError::exit_code)
                .unwrap_or(1);
            ExitCode::from(code)
        }
    }
}
