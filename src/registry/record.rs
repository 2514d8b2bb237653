// src/registry/record.rs

//! Registry-side task bookkeeping: the `TaskSpec` creation request and the status record.

use std::collections::BTreeSet;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};

use crate::types::{ExecutionMode, Priority, TaskId, TaskStatus, WorkerId};

/// Everything needed to register a new task.
///
/// ```
/// use taskweave::registry::TaskSpec;
/// use taskweave::types::{ExecutionMode, Priority};
///
/// let spec = TaskSpec::new("index")
///     .description("rebuild the search index")
///     .priority(Priority::High)
///     .mode(ExecutionMode::Parallel);
/// assert_eq!(spec.name, "index");
/// ```
#[derive(Debug, Clone, Default)]
pub struct TaskSpec {
    pub name: String,
    pub description: String,
    pub priority: Priority,
    pub worker_id: Option<WorkerId>,
    pub parent_id: Option<TaskId>,
    pub dependencies: BTreeSet<TaskId>,
    pub mode: ExecutionMode,
    pub metadata: Map<String, Value>,
}

impl TaskSpec {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn worker(mut self, worker_id: impl Into<WorkerId>) -> Self {
        self.worker_id = Some(worker_id.into());
        self
    }

    pub fn parent(mut self, parent_id: impl Into<TaskId>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }

    pub fn depends_on(mut self, task_id: impl Into<TaskId>) -> Self {
        self.dependencies.insert(task_id.into());
        self
    }

    pub fn depends_on_all<I, S>(mut self, task_ids: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<TaskId>,
    {
        self.dependencies
            .extend(task_ids.into_iter().map(Into::into));
        self
    }

    pub fn mode(mut self, mode: ExecutionMode) -> Self {
        self.mode = mode;
        self
    }

    pub fn metadata(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Snapshot of a task's registry state.
///
/// The registry hands out clones; mutating one has no effect on the
/// registry.
#[derive(Debug, Clone, Serialize)]
pub struct TaskRecord {
    pub id: TaskId,
    pub name: String,
    pub description: String,
    pub priority: Priority,
    pub status: TaskStatus,
    pub worker_id: Option<WorkerId>,
    pub parent_id: Option<TaskId>,
    pub dependencies: BTreeSet<TaskId>,
    pub created_at: DateTime<Utc>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
    pub result: Option<Value>,
    pub mode: ExecutionMode,
    pub metadata: Map<String, Value>,
    /// Creation sequence number; defines creation order.
    #[serde(skip)]
    pub(crate) seq: u64,
}

impl TaskRecord {
    pub(crate) fn from_spec(id: TaskId, seq: u64, spec: TaskSpec) -> Self {
        Self {
            id,
            name: spec.name,
            description: spec.description,
            priority: spec.priority,
            status: TaskStatus::Pending,
            worker_id: spec.worker_id,
            parent_id: spec.parent_id,
            dependencies: spec.dependencies,
            created_at: Utc::now(),
            started_at: None,
            completed_at: None,
            error: None,
            result: None,
            mode: spec.mode,
            metadata: spec.metadata,
            seq,
        }
    }

    /// Wall-clock time between start and completion, if both happened.
    pub fn duration(&self) -> Option<Duration> {
        let started = self.started_at?;
        let completed = self.completed_at?;
        (completed - started).to_std().ok()
    }

    /// Pending, with every dependency in `completed`.
    pub fn is_ready(&self, completed: &BTreeSet<&str>) -> bool {
        self.status == TaskStatus::Pending
            && self
                .dependencies
                .iter()
                .all(|dep| completed.contains(dep.as_str()))
    }
}
