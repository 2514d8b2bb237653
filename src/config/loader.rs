// src/config/loader.rs

use std::fs;
use std::path::{Path, PathBuf};

use tracing::debug;

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Read and deserialize a workflow file without semantic validation.
///
/// Use [`load_and_validate`] to also check dependencies and durations.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    debug!(path = %path.display(), "loading workflow file");

    let contents = fs::read_to_string(path)?;
    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a workflow file and validate it.
///
/// Checks for:
/// - at least one task,
/// - sane `[orchestrator]` values,
/// - parseable `timeout` / `poll_interval` durations,
/// - unknown or self `after` references,
/// - dependency cycles.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    let raw_config = load_from_path(&path)?;
    ConfigFile::try_from(raw_config)
}

/// `Taskweave.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Taskweave.toml")
}
