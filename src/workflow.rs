// src/workflow.rs

//! Turning a validated workflow file into orchestrator tasks.
//!
//! Each `[task.<name>]` becomes one registry task bound to a [`ShellTask`].
//! Tasks are created in topological order so `after` names can be resolved
//! to the ids of already-created tasks.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use tracing::{debug, info};

use crate::config::validate::toposorted_names;
use crate::config::{ConfigFile, TaskConfig};
use crate::errors::{Result, TaskweaveError};
use crate::events::{EventBus, EventKind, LogHandler};
use crate::exec::ShellTask;
use crate::orchestrator::{Orchestrator, RunOptions, RunReport, TaskDefinition};
use crate::registry::TaskSpec;
use crate::types::{TaskId, TaskStatus, parse_duration};

/// Orchestrator populated from a workflow file.
#[derive(Debug)]
pub struct Workflow {
    orchestrator: Orchestrator,
    ids: BTreeMap<String, TaskId>,
    options: RunOptions,
}

/// Final state of a workflow run.
#[derive(Debug, Clone)]
pub struct WorkflowSummary {
    pub report: RunReport,
    /// `(task name, final status)` in creation order.
    pub tasks: Vec<(String, TaskStatus)>,
}

impl WorkflowSummary {
    /// `true` when the run finished and every task completed.
    pub fn is_success(&self) -> bool {
        self.report.finished
            && self
                .tasks
                .iter()
                .all(|(_, status)| *status == TaskStatus::Completed)
    }

    pub fn count(&self, status: TaskStatus) -> usize {
        self.tasks.iter().filter(|(_, s)| *s == status).count()
    }
}

impl Workflow {
    /// Build the bus, orchestrator and one task per `[task.<name>]`.
    pub fn from_config(cfg: &ConfigFile) -> Result<Self> {
        let section = &cfg.orchestrator;
        let poll_interval = duration_field("[orchestrator].poll_interval", &section.poll_interval)?;

        let bus = Arc::new(EventBus::with_capacity(section.history_capacity));
        bus.subscribe("log", EventKind::ALL, Arc::new(LogHandler), None);
        debug!(history_capacity = bus.history_capacity(), "event bus ready");

        let orchestrator = Orchestrator::new(bus, section.workers);

        let mut ids = BTreeMap::new();
        for name in toposorted_names(&cfg.task)? {
            let Some(task) = cfg.task.get(&name) else {
                continue;
            };
            let id = create_task(&orchestrator, &name, task, &ids)?;
            debug!(task = %name, id = %id, "registered workflow task");
            ids.insert(name, id);
        }

        info!(tasks = ids.len(), workers = section.workers, "workflow loaded");

        Ok(Self {
            orchestrator,
            ids,
            options: RunOptions {
                max_iterations: section.max_iterations,
                poll_interval,
                cancel_blocked: true,
            },
        })
    }

    pub fn orchestrator(&self) -> &Orchestrator {
        &self.orchestrator
    }

    pub fn options(&self) -> RunOptions {
        self.options
    }

    /// Registry id of the task declared as `[task.<name>]`.
    pub fn task_id(&self, name: &str) -> Option<&TaskId> {
        self.ids.get(name)
    }

    /// Run every task to completion, then shut the orchestrator down.
    ///
    /// The orchestrator is shut down even when the run itself fails.
    pub async fn run(&self) -> Result<WorkflowSummary> {
        let outcome = self.orchestrator.run_until_complete(self.options).await;
        self.orchestrator.shutdown().await;
        let report = outcome?;

        let tasks = self
            .orchestrator
            .all_tasks()
            .into_iter()
            .map(|t| (t.name, t.status))
            .collect();

        Ok(WorkflowSummary { report, tasks })
    }
}

fn create_task(
    orchestrator: &Orchestrator,
    name: &str,
    task: &TaskConfig,
    ids: &BTreeMap<String, TaskId>,
) -> Result<TaskId> {
    let mut spec = TaskSpec::new(name)
        .description(task.description.clone())
        .priority(task.priority)
        .mode(task.mode)
        .metadata("cmd", task.cmd.clone());

    if let Some(worker) = &task.worker {
        spec = spec.worker(worker.clone());
    }

    for dep in &task.after {
        let dep_id = ids.get(dep).ok_or_else(|| {
            TaskweaveError::ConfigError(format!(
                "task '{name}' has unknown dependency '{dep}' in `after`"
            ))
        })?;
        spec = spec.depends_on(dep_id.clone());
    }

    let mut definition = TaskDefinition::new(Arc::new(ShellTask::new(name, task.cmd.clone())))
        .args(json!({ "env": task.env }));
    if let Some(timeout) = task.timeout.as_deref() {
        definition = definition.timeout(duration_field(&format!("task '{name}' timeout"), timeout)?);
    }

    Ok(orchestrator.create_task(spec, definition))
}

fn duration_field(field: &str, value: &str) -> Result<Duration> {
    parse_duration(value).map_err(|e| TaskweaveError::ConfigError(format!("{field}: {e}")))
}
