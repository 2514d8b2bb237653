// src/errors.rs

//! Crate-wide error type and result alias.

use std::time::Duration;

use thiserror::Error;

use crate::types::TaskId;

#[derive(Error, Debug)]
pub enum TaskweaveError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error("Cycle detected in task graph: {0}")]
    DagCycle(String),

    #[error("Task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("No callable bound to task: {0}")]
    NoCallable(TaskId),

    #[error("Task not runnable: {0}")]
    TaskNotRunnable(TaskId),

    #[error("Task {task} failed: {message}")]
    TaskFailed { task: TaskId, message: String },

    #[error("Task {task} timed out after {after:?}")]
    TimedOut { task: TaskId, after: Duration },

    #[error("Task cancelled: {0}")]
    Cancelled(TaskId),

    #[error("Orchestrator has been shut down")]
    ShutDown,

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, TaskweaveError>;
