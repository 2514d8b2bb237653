// src/logging.rs

//! Logging setup for `taskweave` using `tracing` + `tracing-subscriber`.
//!
//! Priority for determining the filter:
//! 1. `--log-level` CLI flag (if provided)
//! 2. `TASKWEAVE_LOG` environment variable, either a bare level ("debug")
//!    or a full `EnvFilter` directive ("taskweave::registry=trace,info")
//! 3. default to `info`
//!
//! Logs go to STDERR; STDOUT is reserved for the run summary and dry-run
//! output.

use anyhow::{Result, anyhow};
use tracing::level_filters::LevelFilter;
use tracing_subscriber::{EnvFilter, fmt};

use crate::cli::LogLevel;

pub const LOG_ENV_VAR: &str = "TASKWEAVE_LOG";

/// Initialise the global logging subscriber.
///
/// Call once at startup; a second call returns an error.
pub fn init_logging(cli_level: Option<LogLevel>) -> Result<()> {
    let filter = match cli_level {
        Some(lvl) => EnvFilter::default().add_directive(level_filter(lvl).into()),
        None => env_filter(std::env::var(LOG_ENV_VAR).ok().as_deref()),
    };

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow!("failed to initialise logging: {e}"))
}

fn level_filter(lvl: LogLevel) -> LevelFilter {
    match lvl {
        LogLevel::Error => LevelFilter::ERROR,
        LogLevel::Warn => LevelFilter::WARN,
        LogLevel::Info => LevelFilter::INFO,
        LogLevel::Debug => LevelFilter::DEBUG,
        LogLevel::Trace => LevelFilter::TRACE,
    }
}

/// Filter from the env var value; unset or unparseable falls back to `info`.
fn env_filter(value: Option<&str>) -> EnvFilter {
    let value = value.map(str::trim).filter(|s| !s.is_empty());
    let value = match value {
        Some(v) if v.eq_ignore_ascii_case("warning") => "warn",
        Some(v) => v,
        None => "info",
    };
    EnvFilter::try_new(value).unwrap_or_else(|_| EnvFilter::new("info"))
}
