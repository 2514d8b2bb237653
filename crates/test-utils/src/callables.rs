//! Ready-made task callables for tests.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::anyhow;
use serde_json::{Value, json};
use taskweave::orchestrator::{FnTask, TaskContext, TaskRef};

/// Shared, ordered log of callable invocations.
#[derive(Debug, Clone, Default)]
pub struct CallLog(Arc<Mutex<Vec<String>>>);

impl CallLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&self, entry: impl Into<String>) {
        self.0.lock().unwrap().push(entry.into());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().unwrap().clone()
    }
}

/// Records `label` in `log` and returns `label` as its result.
pub fn recording(log: &CallLog, label: &str) -> TaskRef {
    let log = log.clone();
    let label = label.to_string();
    FnTask::arc(move |_ctx: TaskContext| {
        let log = log.clone();
        let label = label.clone();
        async move {
            log.push(label.clone());
            anyhow::Ok(json!(label))
        }
    })
}

/// Records `label` in `log`, then fails with `message`.
pub fn failing(log: &CallLog, label: &str, message: &str) -> TaskRef {
    let log = log.clone();
    let label = label.to_string();
    let message = message.to_string();
    FnTask::arc(move |_ctx: TaskContext| {
        let log = log.clone();
        let label = label.clone();
        let message = message.clone();
        async move {
            log.push(label);
            Err::<Value, _>(anyhow!(message))
        }
    })
}

/// Sleeps for `delay`, then returns its task id.
pub fn sleeping(delay: Duration) -> TaskRef {
    FnTask::arc(move |ctx: TaskContext| async move {
        tokio::time::sleep(delay).await;
        anyhow::Ok(Value::String(ctx.task_id))
    })
}

/// Returns its argument bag unchanged.
pub fn echo_args() -> TaskRef {
    FnTask::arc(|ctx: TaskContext| async move { anyhow::Ok(ctx.args) })
}

/// Panics with `message` when run.
pub fn panicking(message: &'static str) -> TaskRef {
    FnTask::arc(move |_ctx: TaskContext| async move {
        if !message.is_empty() {
            panic!("{message}");
        }
        anyhow::Ok(Value::Null)
    })
}
