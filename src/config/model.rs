// src/config/model.rs

use std::collections::BTreeMap;

use serde::Deserialize;

use crate::events::DEFAULT_HISTORY_CAPACITY;
use crate::orchestrator::DEFAULT_POOL_SIZE;
use crate::types::{ExecutionMode, Priority};

/// Workflow file as read from TOML, before validation.
///
/// ```toml
/// [orchestrator]
/// workers = 4
///
/// [task.fetch]
/// cmd = "git fetch"
///
/// [task.build]
/// cmd = "cargo build"
/// after = ["fetch"]
/// priority = "high"
/// ```
///
/// Use [`ConfigFile::try_from`] (or `load_and_validate`) to get a checked
/// [`ConfigFile`].
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RawConfigFile {
    #[serde(default)]
    pub orchestrator: OrchestratorSection,

    /// All tasks from `[task.<name>]`, keyed by task name.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// Validated workflow file.
///
/// Only constructible through validation, so every `after` reference names a
/// known task, the dependency graph is acyclic and all durations parse.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    pub orchestrator: OrchestratorSection,
    pub task: BTreeMap<String, TaskConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(
        orchestrator: OrchestratorSection,
        task: BTreeMap<String, TaskConfig>,
    ) -> Self {
        Self { orchestrator, task }
    }
}

/// `[orchestrator]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct OrchestratorSection {
    /// Worker pool size for parallel tasks.
    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Number of events kept in the bus history; 0 disables it.
    #[serde(default = "default_history_capacity")]
    pub history_capacity: usize,

    /// Scheduling iteration cap for a run.
    #[serde(default = "default_max_iterations")]
    pub max_iterations: usize,

    /// Duration string (e.g. `"100ms"`) slept between polls when nothing is
    /// ready but tasks are still in flight.
    #[serde(default = "default_poll_interval")]
    pub poll_interval: String,
}

fn default_workers() -> usize {
    DEFAULT_POOL_SIZE
}

fn default_history_capacity() -> usize {
    DEFAULT_HISTORY_CAPACITY
}

fn default_max_iterations() -> usize {
    100
}

fn default_poll_interval() -> String {
    "100ms".to_string()
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            workers: default_workers(),
            history_capacity: default_history_capacity(),
            max_iterations: default_max_iterations(),
            poll_interval: default_poll_interval(),
        }
    }
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct TaskConfig {
    /// Shell command to execute.
    pub cmd: String,

    #[serde(default)]
    pub description: String,

    #[serde(default)]
    pub priority: Priority,

    /// `"sequential"` (default) or `"parallel"`.
    #[serde(default)]
    pub mode: ExecutionMode,

    /// Names of tasks that must complete before this one is ready.
    #[serde(default)]
    pub after: Vec<String>,

    /// Worker identity reported in lifecycle events.
    #[serde(default)]
    pub worker: Option<String>,

    /// Duration string; the command is killed and the task failed when it
    /// runs longer.
    #[serde(default)]
    pub timeout: Option<String>,

    /// Extra environment variables for the command.
    #[serde(default)]
    pub env: BTreeMap<String, String>,
}

impl TaskConfig {
    pub fn new(cmd: impl Into<String>) -> Self {
        Self {
            cmd: cmd.into(),
            description: String::new(),
            priority: Priority::default(),
            mode: ExecutionMode::default(),
            after: Vec::new(),
            worker: None,
            timeout: None,
            env: BTreeMap::new(),
        }
    }
}
