// src/registry/store.rs

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::Arc;

use chrono::Utc;
use parking_lot::Mutex;
use serde_json::{Value, json};
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::events::{Event, EventBus, EventKind};
use crate::registry::graph::{blocked_ids, find_cycle};
use crate::registry::record::{TaskRecord, TaskSpec};
use crate::types::{TaskId, TaskStatus};

#[derive(Debug, Default)]
struct RegistryState {
    tasks: HashMap<TaskId, TaskRecord>,
    children: HashMap<TaskId, Vec<TaskId>>,
    next_seq: u64,
}

fn sorted_by_creation<'a>(records: impl Iterator<Item = &'a TaskRecord>) -> Vec<TaskRecord> {
    let mut out: Vec<TaskRecord> = records.cloned().collect();
    out.sort_by_key(|r| r.seq);
    out
}

/// Single source of truth for task existence and status.
///
/// It is responsible for:
/// - registering tasks and parent/child edges
/// - enforcing the status state machine
/// - computing dependency-aware readiness
/// - emitting lifecycle events on every successful transition
///
/// All access is serialized by one mutex. Event payloads are built while the
/// lock is held, and the lock is released before the event bus is called.
///
/// Rejected transitions (unknown task, wrong status) are reported as `false`
/// plus a log line rather than an error: concurrent schedulers routinely race
/// over the same ready task.
pub struct TaskRegistry {
    state: Mutex<RegistryState>,
    bus: Arc<EventBus>,
}

impl fmt::Debug for TaskRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskRegistry")
            .field("tasks", &self.state.lock().tasks.len())
            .finish_non_exhaustive()
    }
}

impl TaskRegistry {
    pub fn new(bus: Arc<EventBus>) -> Self {
        Self {
            state: Mutex::new(RegistryState::default()),
            bus,
        }
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    /// Register a new pending task and return its id.
    pub fn create(&self, spec: TaskSpec) -> TaskId {
        let id = Uuid::new_v4().to_string();
        let mut state = self.state.lock();

        let seq = state.next_seq;
        state.next_seq += 1;

        if let Some(parent) = spec.parent_id.clone() {
            state.children.entry(parent).or_default().push(id.clone());
        }

        let record = TaskRecord::from_spec(id.clone(), seq, spec);
        info!(
            task = %id,
            name = %record.name,
            priority = %record.priority,
            dependencies = record.dependencies.len(),
            "created task"
        );
        state.tasks.insert(id.clone(), record);

        id
    }

    /// `Pending -> Running`. Emits [`EventKind::Started`].
    pub fn start(&self, id: &str, worker_id: Option<&str>) -> bool {
        let event = {
            let mut state = self.state.lock();
            let Some(task) = state.tasks.get_mut(id) else {
                error!(task = %id, "cannot start unknown task");
                return false;
            };

            if task.status != TaskStatus::Pending {
                warn!(task = %id, status = %task.status, "task cannot start from current status");
                return false;
            }

            task.status = TaskStatus::Running;
            task.started_at = Some(Utc::now());
            if let Some(worker) = worker_id {
                task.worker_id = Some(worker.to_string());
            }

            info!(task = %id, name = %task.name, worker = ?task.worker_id, "started task");

            Event::new(EventKind::Started, id)
                .with_worker(task.worker_id.clone())
                .with_data("name", task.name.clone())
                .with_data("priority", task.priority.as_str())
        };

        self.bus.emit(event);
        true
    }

    /// `Running -> Completed`. Emits [`EventKind::Completed`] with the
    /// computed duration.
    pub fn complete(&self, id: &str, result: Value) -> bool {
        let event = {
            let mut state = self.state.lock();
            let Some(task) = state.tasks.get_mut(id) else {
                error!(task = %id, "cannot complete unknown task");
                return false;
            };

            if task.status != TaskStatus::Running {
                warn!(task = %id, status = %task.status, "task cannot complete from current status");
                return false;
            }

            task.status = TaskStatus::Completed;
            task.completed_at = Some(Utc::now());
            task.result = Some(result.clone());

            let duration = task.duration().map(|d| d.as_secs_f64());
            info!(task = %id, name = %task.name, duration_secs = ?duration, "completed task");

            Event::new(EventKind::Completed, id)
                .with_worker(task.worker_id.clone())
                .with_data("name", task.name.clone())
                .with_data("result", result)
                .with_data("duration_seconds", json!(duration))
        };

        self.bus.emit(event);
        true
    }

    /// Any non-terminal status `-> Failed`. Emits [`EventKind::Failed`].
    pub fn fail(&self, id: &str, error: impl Into<String>) -> bool {
        let error = error.into();
        let event = {
            let mut state = self.state.lock();
            let Some(task) = state.tasks.get_mut(id) else {
                error!(task = %id, "cannot fail unknown task");
                return false;
            };

            if task.status.is_terminal() {
                warn!(task = %id, status = %task.status, "task already terminal; ignoring failure");
                return false;
            }

            task.status = TaskStatus::Failed;
            task.completed_at = Some(Utc::now());
            task.error = Some(error.clone());

            error!(task = %id, name = %task.name, error = %error, "failed task");

            Event::new(EventKind::Failed, id)
                .with_worker(task.worker_id.clone())
                .with_data("name", task.name.clone())
                .with_error(error)
        };

        self.bus.emit(event);
        true
    }

    /// Any non-terminal status `-> Cancelled`. Emits [`EventKind::Cancelled`].
    pub fn cancel(&self, id: &str, reason: Option<&str>) -> bool {
        let event = {
            let mut state = self.state.lock();
            let Some(task) = state.tasks.get_mut(id) else {
                error!(task = %id, "cannot cancel unknown task");
                return false;
            };

            if task.status.is_terminal() {
                warn!(task = %id, status = %task.status, "task already terminal; ignoring cancellation");
                return false;
            }

            task.status = TaskStatus::Cancelled;
            task.completed_at = Some(Utc::now());
            task.error = reason.map(str::to_string);

            warn!(task = %id, name = %task.name, reason = ?reason, "cancelled task");

            let mut event = Event::new(EventKind::Cancelled, id)
                .with_worker(task.worker_id.clone())
                .with_data("name", task.name.clone());
            if let Some(reason) = reason {
                event = event.with_error(reason);
            }
            event
        };

        self.bus.emit(event);
        true
    }

    pub fn get(&self, id: &str) -> Option<TaskRecord> {
        self.state.lock().tasks.get(id).cloned()
    }

    pub fn status_of(&self, id: &str) -> Option<TaskStatus> {
        self.state.lock().tasks.get(id).map(|t| t.status)
    }

    /// Pending tasks whose dependencies have all completed, highest priority
    /// first, ties in creation order.
    pub fn ready_tasks(&self) -> Vec<TaskRecord> {
        let state = self.state.lock();

        let completed: BTreeSet<&str> = state
            .tasks
            .values()
            .filter(|t| t.status == TaskStatus::Completed)
            .map(|t| t.id.as_str())
            .collect();

        let mut ready: Vec<TaskRecord> = state
            .tasks
            .values()
            .filter(|t| t.is_ready(&completed))
            .cloned()
            .collect();

        ready.sort_by(|a, b| b.priority.cmp(&a.priority).then(a.seq.cmp(&b.seq)));
        ready
    }

    /// Children of `parent_id`, in creation order.
    pub fn children(&self, parent_id: &str) -> Vec<TaskRecord> {
        let state = self.state.lock();
        state
            .children
            .get(parent_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| state.tasks.get(id))
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    pub fn has_pending_or_running(&self) -> bool {
        self.state
            .lock()
            .tasks
            .values()
            .any(|t| matches!(t.status, TaskStatus::Pending | TaskStatus::Running))
    }

    pub fn tasks_by_status(&self, status: TaskStatus) -> Vec<TaskRecord> {
        let state = self.state.lock();
        sorted_by_creation(state.tasks.values().filter(|t| t.status == status))
    }

    /// Every task, in creation order.
    pub fn all_tasks(&self) -> Vec<TaskRecord> {
        let state = self.state.lock();
        sorted_by_creation(state.tasks.values())
    }

    pub fn len(&self) -> usize {
        self.state.lock().tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.state.lock().tasks.is_empty()
    }

    /// One dependency cycle among non-terminal tasks, if any.
    pub fn dependency_cycle(&self) -> Option<Vec<TaskId>> {
        find_cycle(&self.state.lock().tasks)
    }

    /// Pending tasks that can never become ready, in creation order.
    pub fn blocked_tasks(&self) -> Vec<TaskRecord> {
        let state = self.state.lock();
        let blocked = blocked_ids(&state.tasks);
        sorted_by_creation(
            state
                .tasks
                .values()
                .filter(|t| t.status == TaskStatus::Pending && blocked.contains(&t.id)),
        )
    }

    /// Drop every task and parent/child edge.
    pub fn clear(&self) {
        let mut state = self.state.lock();
        state.tasks.clear();
        state.children.clear();
        debug!("cleared all tasks");
    }
}
