// src/orchestrator/callable.rs

//! Task callables: the unit of work bound to a task.
//!
//! A callable receives a [`TaskContext`] (task id, argument bag, worker id,
//! cancellation token) and returns a JSON result or an error.

use std::fmt;
use std::future::Future;
use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use serde_json::Value;
use tokio_util::sync::CancellationToken;

use crate::types::{TaskId, WorkerId};

/// Per-invocation context handed to a [`TaskFn`].
#[derive(Debug, Clone)]
pub struct TaskContext {
    pub task_id: TaskId,
    pub args: Value,
    pub worker_id: Option<WorkerId>,
    /// Fires when the task is cancelled or its deadline passes.
    pub cancel: CancellationToken,
}

impl TaskContext {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }
}

/// An executable unit of work.
///
/// The orchestrator drops the returned future as soon as the task is
/// cancelled or times out; long CPU-bound sections should also poll
/// [`TaskContext::is_cancelled`].
#[async_trait]
pub trait TaskFn: Send + Sync + 'static {
    async fn run(&self, ctx: TaskContext) -> Result<Value>;
}

/// Shared handle to a callable.
pub type TaskRef = Arc<dyn TaskFn>;

/// Closure-backed callable.
///
/// ```
/// use serde_json::json;
/// use taskweave::orchestrator::{FnTask, TaskContext, TaskRef};
///
/// let task: TaskRef = FnTask::arc(|ctx: TaskContext| async move {
///     anyhow::Ok(json!({ "echo": ctx.args }))
/// });
/// # let _ = task;
/// ```
pub struct FnTask<F> {
    f: F,
}

impl<F, Fut> FnTask<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    pub fn new(f: F) -> Self {
        Self { f }
    }

    pub fn arc(f: F) -> Arc<Self> {
        Arc::new(Self::new(f))
    }
}

impl<F> fmt::Debug for FnTask<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnTask").finish_non_exhaustive()
    }
}

#[async_trait]
impl<F, Fut> TaskFn for FnTask<F>
where
    F: Fn(TaskContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value>> + Send + 'static,
{
    async fn run(&self, ctx: TaskContext) -> Result<Value> {
        (self.f)(ctx).await
    }
}
