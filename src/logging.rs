//! Tracing subscriber setup.
//!
//! Console logs go to stderr so they never interleave with progress bars on
//! stdout. When a log directory is given, a plain-text debug log is also
//! written to `<dir>/ptsite.log` through a non-blocking appender; keep the
//! returned [`LogGuard`] alive until exit so it gets flushed.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::debug;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

pub const LOG_FILE_NAME: &str = "ptsite.log";

#[derive(Debug, Clone, Default)]
pub struct LoggingOptions {
    /// Number of `-v` flags.
    pub verbose: u8,
    /// Emit console logs as JSON lines.
    pub json: bool,
    /// Directory for the file sink; `None` disables it.
    pub log_dir: Option<PathBuf>,
}

/// Flushes the file sink on drop.
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

/// Console filter for a verbosity level. `RUST_LOG` takes precedence.
pub fn console_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "ptsite=debug,warn",
        2 => "ptsite=trace,info",
        _ => "trace",
    }
}

pub fn init(options: &LoggingOptions) -> Result<LogGuard> {
    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(console_level(options.verbose)));

    let console_layer = if options.json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(console_filter)
            .boxed()
    } else {
        fmt::layer()
            .with_writer(std::io::stderr)
            .with_target(options.verbose >= 2)
            .with_line_number(options.verbose >= 3)
            .with_filter(console_filter)
            .boxed()
    };

    let (file_layer, guard) = match &options.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
            let appender = tracing_appender::rolling::never(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(EnvFilter::new("ptsite=debug,warn"));
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(console_layer)
        .with(file_layer)
        .try_init()
        .context("Failed to initialize logging")?;

    debug!(verbose = options.verbose, "logging initialized");
    Ok(LogGuard { _file: guard })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_console_level_by_verbosity() {
        assert_eq!(console_level(0), "warn");
        assert_eq!(console_level(1), "ptsite=debug,warn");
        assert_eq!(console_level(2), "ptsite=trace,info");
        assert_eq!(console_level(9), "trace");
    }

    #[test]
    fn test_console_levels_parse() {
        for v in 0..4 {
            assert!(EnvFilter::try_new(console_level(v)).is_ok());
        }
    }
}
