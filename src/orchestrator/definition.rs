// src/orchestrator/definition.rs

use std::fmt;
use std::time::Duration;

use serde_json::Value;

use super::callable::TaskRef;

/// Executable half of a task: the callable, its argument bag and an
/// optional deadline.
///
/// Kept in the orchestrator's own table, separate from the registry's
/// status record.
#[derive(Clone)]
pub struct TaskDefinition {
    pub callable: TaskRef,
    pub args: Value,
    pub timeout: Option<Duration>,
}

impl TaskDefinition {
    pub fn new(callable: TaskRef) -> Self {
        Self {
            callable,
            args: Value::Null,
            timeout: None,
        }
    }

    pub fn args(mut self, args: Value) -> Self {
        self.args = args;
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl fmt::Debug for TaskDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskDefinition")
            .field("args", &self.args)
            .field("timeout", &self.timeout)
            .finish_non_exhaustive()
    }
}
