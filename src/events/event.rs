// src/events/event.rs

//! Immutable lifecycle event records.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{Map, Value};
use uuid::Uuid;

use crate::types::{TaskId, WorkerId};

/// Kind of lifecycle notification carried by an [`Event`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    Started,
    Completed,
    Failed,
    Cancelled,
    WorkerReady,
    WorkerBusy,
}

impl EventKind {
    /// Every kind, handy for catch-all subscriptions.
    pub const ALL: [EventKind; 6] = [
        EventKind::Started,
        EventKind::Completed,
        EventKind::Failed,
        EventKind::Cancelled,
        EventKind::WorkerReady,
        EventKind::WorkerBusy,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            EventKind::Started => "started",
            EventKind::Completed => "completed",
            EventKind::Failed => "failed",
            EventKind::Cancelled => "cancelled",
            EventKind::WorkerReady => "worker_ready",
            EventKind::WorkerBusy => "worker_busy",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A task or worker lifecycle transition.
///
/// Built with the `with_*` methods, then handed to
/// [`EventBus::emit`](super::EventBus::emit). The bus stores it behind an
/// `Arc` and subscribers only ever see `&Event`, so it cannot change after
/// emission.
#[derive(Debug, Clone, Serialize)]
pub struct Event {
    pub id: Uuid,
    pub kind: EventKind,
    pub timestamp: DateTime<Utc>,
    pub task_id: TaskId,
    pub worker_id: Option<WorkerId>,
    pub data: Map<String, Value>,
    pub error: Option<String>,
}

impl Event {
    pub fn new(kind: EventKind, task_id: impl Into<TaskId>) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            timestamp: Utc::now(),
            task_id: task_id.into(),
            worker_id: None,
            data: Map::new(),
            error: None,
        }
    }

    pub fn with_worker(mut self, worker_id: Option<WorkerId>) -> Self {
        self.worker_id = worker_id;
        self
    }

    pub fn with_data(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.data.insert(key.into(), value.into());
        self
    }

    pub fn with_error(mut self, error: impl Into<String>) -> Self {
        self.error = Some(error.into());
        self
    }
}
