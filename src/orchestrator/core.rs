// src/orchestrator/core.rs

use std::any::Any;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use futures::FutureExt;
use parking_lot::Mutex;
use serde_json::Value;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::errors::{Result, TaskweaveError};
use crate::events::{Event, EventBus, EventKind};
use crate::orchestrator::callable::TaskContext;
use crate::orchestrator::definition::TaskDefinition;
use crate::orchestrator::observer::SchedulingObserver;
use crate::orchestrator::pool::WorkerPool;
use crate::registry::{TaskRecord, TaskRegistry, TaskSpec};
use crate::types::{ExecutionMode, TaskId, TaskStatus};

/// Default number of pool workers.
pub const DEFAULT_POOL_SIZE: usize = 4;

/// Result map of a batch: one slot per task id.
///
/// A `None` slot means the task was attempted but produced no result.
pub type BatchResults = HashMap<TaskId, Option<Value>>;

/// Parameters of [`Orchestrator::run_until_complete`].
#[derive(Debug, Clone, Copy)]
pub struct RunOptions {
    /// Upper bound on scheduling iterations; guards against dependency sets
    /// that can never be satisfied.
    pub max_iterations: usize,
    /// Sleep between polls when nothing is ready but work is still in flight.
    pub poll_interval: Duration,
    /// When nothing is ready, cancel pending tasks that can never become
    /// ready (failed, cancelled or unknown dependencies) instead of polling
    /// until the iteration cap.
    pub cancel_blocked: bool,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            max_iterations: 100,
            poll_interval: Duration::from_millis(100),
            cancel_blocked: false,
        }
    }
}

/// Summary of a [`Orchestrator::run_until_complete`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunReport {
    pub iterations: usize,
    /// Number of task executions attempted.
    pub executed: usize,
    /// `true` if no task was left pending or running.
    pub finished: bool,
}

/// How a single invocation ended.
enum Outcome {
    Finished(anyhow::Result<Value>),
    Panicked(String),
    TimedOut(Duration),
    Cancelled,
}

struct Inner {
    registry: Arc<TaskRegistry>,
    definitions: Mutex<HashMap<TaskId, TaskDefinition>>,
    running: Mutex<HashMap<TaskId, CancellationToken>>,
    pool: WorkerPool,
    subscriber_id: String,
    shut_down: AtomicBool,
}

/// Binds callables to registry tasks and executes them.
///
/// Cheap to clone; clones share the same registry, definitions and pool.
///
/// Three strategies are available:
/// - [`execute_task`](Self::execute_task): one task on the caller.
/// - [`execute_sequential`](Self::execute_sequential): list order on the
///   caller, stopping at the first failure.
/// - [`execute_parallel`](Self::execute_parallel): through the bounded
///   worker pool with a join-all barrier.
///
/// [`run_until_complete`](Self::run_until_complete) repeatedly polls
/// `ready_tasks()` and dispatches whatever is ready.
#[derive(Clone)]
pub struct Orchestrator {
    inner: Arc<Inner>,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("registry", &self.inner.registry)
            .field("pool", &self.inner.pool)
            .field("shut_down", &self.inner.shut_down.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

impl Orchestrator {
    /// Build an orchestrator (and a fresh registry) on top of `bus`.
    pub fn new(bus: Arc<EventBus>, pool_size: usize) -> Self {
        Self::with_registry(Arc::new(TaskRegistry::new(bus)), pool_size)
    }

    /// Build an orchestrator over an existing registry.
    ///
    /// Subscribes an observer to `Completed` / `Failed` events on the
    /// registry's bus; [`shutdown`](Self::shutdown) removes it.
    pub fn with_registry(registry: Arc<TaskRegistry>, pool_size: usize) -> Self {
        let subscriber_id = format!("orchestrator-{}", Uuid::new_v4().simple());
        let observer = SchedulingObserver::new(Arc::downgrade(&registry));
        registry.bus().subscribe(
            subscriber_id.clone(),
            [EventKind::Completed, EventKind::Failed],
            Arc::new(observer),
            None,
        );

        let pool = WorkerPool::new(pool_size);
        info!(workers = pool.size(), "initialised orchestrator");

        Self {
            inner: Arc::new(Inner {
                registry,
                definitions: Mutex::new(HashMap::new()),
                running: Mutex::new(HashMap::new()),
                pool,
                subscriber_id,
                shut_down: AtomicBool::new(false),
            }),
        }
    }

    pub fn registry(&self) -> &Arc<TaskRegistry> {
        &self.inner.registry
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        self.inner.registry.bus()
    }

    pub fn pool_size(&self) -> usize {
        self.inner.pool.size()
    }

    pub fn is_shut_down(&self) -> bool {
        self.inner.shut_down.load(Ordering::SeqCst)
    }

    /// Register a task and bind its callable.
    pub fn create_task(&self, spec: TaskSpec, definition: TaskDefinition) -> TaskId {
        let id = self.inner.registry.create(spec);
        self.inner
            .definitions
            .lock()
            .insert(id.clone(), definition);
        id
    }

    pub fn has_callable(&self, id: &str) -> bool {
        self.inner.definitions.lock().contains_key(id)
    }

    pub fn task_status(&self, id: &str) -> Option<TaskStatus> {
        self.inner.registry.status_of(id)
    }

    pub fn all_tasks(&self) -> Vec<TaskRecord> {
        self.inner.registry.all_tasks()
    }

    /// Run one task to completion on the calling task.
    ///
    /// Errors from the callable are recorded on the task (status `Failed`)
    /// and returned to the caller.
    pub async fn execute_task(&self, id: &str) -> Result<Value> {
        self.inner.execute_task(id).await
    }

    /// Run `ids` strictly in order, stopping at the first task that does not
    /// succeed. The returned map only holds the tasks that ran successfully
    /// before the stop.
    pub async fn execute_sequential(&self, ids: &[TaskId]) -> BatchResults {
        self.run_sequential(ids).await.0
    }

    /// Sequential execution plus the number of tasks actually attempted.
    async fn run_sequential(&self, ids: &[TaskId]) -> (BatchResults, usize) {
        info!(count = ids.len(), "executing tasks sequentially");

        let mut results = BatchResults::with_capacity(ids.len());
        let mut attempted = 0;
        for id in ids {
            attempted += 1;
            match self.inner.execute_task(id).await {
                Ok(value) => {
                    results.insert(id.clone(), Some(value));
                }
                Err(err) => {
                    error!(
                        task = %id,
                        error = %err,
                        completed = results.len(),
                        "task failed; stopping sequential execution"
                    );
                    break;
                }
            }
        }

        (results, attempted)
    }

    /// Submit every id to the worker pool and wait for all of them.
    ///
    /// Not fail-fast: each id gets exactly one slot in the result map, `None`
    /// for tasks that failed, timed out, were cancelled or were not runnable.
    pub async fn execute_parallel(&self, ids: &[TaskId]) -> Result<BatchResults> {
        if self.is_shut_down() {
            return Err(TaskweaveError::ShutDown);
        }

        let mut seen = HashSet::with_capacity(ids.len());
        let unique: Vec<&TaskId> = ids.iter().filter(|id| seen.insert(id.as_str())).collect();
        if unique.len() < ids.len() {
            warn!(
                submitted = ids.len(),
                unique = unique.len(),
                "duplicate task ids in parallel batch; each runs once"
            );
        }

        info!(
            count = unique.len(),
            workers = self.inner.pool.size(),
            "executing tasks in parallel"
        );

        let handles: Vec<_> = unique
            .into_iter()
            .map(|id| {
                let inner = Arc::clone(&self.inner);
                let task_id = id.clone();
                let handle = self
                    .inner
                    .pool
                    .submit(async move { inner.execute_task(&task_id).await });
                (id.clone(), handle)
            })
            .collect();

        let mut results = BatchResults::with_capacity(handles.len());
        for (id, handle) in handles {
            let slot = match handle.await {
                Ok(Ok(value)) => Some(value),
                Ok(Err(err)) => {
                    warn!(task = %id, error = %err, "parallel task produced no result");
                    None
                }
                Err(join_err) => {
                    error!(task = %id, error = %join_err, "pool worker aborted");
                    None
                }
            };
            results.insert(id, slot);
        }

        Ok(results)
    }

    /// Execute every child of `parent_id` with the given strategy.
    pub async fn execute_group(&self, parent_id: &str, mode: ExecutionMode) -> Result<BatchResults> {
        let children = self.inner.registry.children(parent_id);
        if children.is_empty() {
            warn!(parent = %parent_id, "no child tasks found");
            return Ok(BatchResults::new());
        }

        let ids: Vec<TaskId> = children.into_iter().map(|t| t.id).collect();
        match mode {
            ExecutionMode::Parallel => self.execute_parallel(&ids).await,
            ExecutionMode::Sequential => Ok(self.execute_sequential(&ids).await),
        }
    }

    /// Poll for ready tasks and execute them until nothing is pending or
    /// running, or `options.max_iterations` is reached.
    ///
    /// Each iteration runs the ready `Parallel` tasks as one pool batch, then
    /// the ready `Sequential` tasks in priority order. Ready tasks without a
    /// bound callable are left for whoever registered them.
    pub async fn run_until_complete(&self, options: RunOptions) -> Result<RunReport> {
        info!(
            max_iterations = options.max_iterations,
            poll_interval = ?options.poll_interval,
            "starting run-until-complete"
        );

        let registry = &self.inner.registry;
        let mut iterations = 0;
        let mut executed = 0;

        while iterations < options.max_iterations {
            iterations += 1;

            let ready: Vec<TaskRecord> = registry
                .ready_tasks()
                .into_iter()
                .filter(|t| self.has_callable(&t.id))
                .collect();

            if ready.is_empty() {
                if !registry.has_pending_or_running() {
                    info!(iterations, "all tasks finished");
                    break;
                }
                if options.cancel_blocked && self.cancel_blocked_tasks() > 0 {
                    continue;
                }
                debug!(iterations, "nothing ready; waiting for in-flight tasks");
                tokio::time::sleep(options.poll_interval).await;
                continue;
            }

            let (parallel, sequential): (Vec<TaskRecord>, Vec<TaskRecord>) = ready
                .into_iter()
                .partition(|t| t.mode == ExecutionMode::Parallel);

            if !parallel.is_empty() {
                let ids: Vec<TaskId> = parallel.into_iter().map(|t| t.id).collect();
                executed += ids.len();
                self.execute_parallel(&ids).await?;
            }

            if !sequential.is_empty() {
                let ids: Vec<TaskId> = sequential.into_iter().map(|t| t.id).collect();
                let (_, attempted) = self.run_sequential(&ids).await;
                executed += attempted;
            }
        }

        let finished = !registry.has_pending_or_running();
        if !finished {
            let pending: Vec<String> = registry
                .tasks_by_status(TaskStatus::Pending)
                .into_iter()
                .map(|t| t.name)
                .collect();
            warn!(
                max_iterations = options.max_iterations,
                ?pending,
                "reached max iterations with unfinished tasks"
            );
            if let Some(cycle) = registry.dependency_cycle() {
                warn!(?cycle, "dependency cycle detected among unfinished tasks");
            }
        }

        Ok(RunReport {
            iterations,
            executed,
            finished,
        })
    }

    fn cancel_blocked_tasks(&self) -> usize {
        let blocked = self.inner.registry.blocked_tasks();
        let mut cancelled = 0;
        for task in blocked {
            warn!(task = %task.id, name = %task.name, "cancelling task with unsatisfiable dependencies");
            if self
                .inner
                .registry
                .cancel(&task.id, Some("dependency did not complete"))
            {
                cancelled += 1;
            }
        }
        cancelled
    }

    /// Cancel a task.
    ///
    /// A task currently executing through this orchestrator has its
    /// cancellation token fired and is recorded as `Cancelled` once the
    /// executor observes it. Any other non-terminal task is cancelled in the
    /// registry directly.
    pub fn cancel_task(&self, id: &str) -> bool {
        if let Some(token) = self.inner.running.lock().get(id) {
            info!(task = %id, "cancelling running task");
            token.cancel();
            return true;
        }
        self.inner.registry.cancel(id, Some("cancelled before start"))
    }

    /// Wait for outstanding pool work, close the pool and drop this
    /// orchestrator's bus subscription.
    ///
    /// Calling it again is a no-op.
    pub async fn shutdown(&self) {
        if self.inner.shut_down.swap(true, Ordering::SeqCst) {
            debug!("orchestrator already shut down");
            return;
        }

        info!(in_flight = self.inner.pool.in_flight(), "shutting down orchestrator");
        self.inner.pool.drain().await;
        self.inner
            .registry
            .bus()
            .unsubscribe(&self.inner.subscriber_id);
    }
}

impl Inner {
    async fn execute_task(&self, id: &str) -> Result<Value> {
        let record = self
            .registry
            .get(id)
            .ok_or_else(|| TaskweaveError::TaskNotFound(id.to_string()))?;
        let definition = self
            .definitions
            .lock()
            .get(id)
            .cloned()
            .ok_or_else(|| TaskweaveError::NoCallable(id.to_string()))?;

        // Only the caller that wins `start` owns the token slot.
        if !self.registry.start(id, None) {
            return Err(TaskweaveError::TaskNotRunnable(id.to_string()));
        }
        let token = CancellationToken::new();
        self.running.lock().insert(id.to_string(), token.clone());

        // A cancel_task between `start` and the insert went to the registry.
        if self.registry.status_of(id) != Some(TaskStatus::Running) {
            self.running.lock().remove(id);
            info!(task = %id, "task cancelled before its callable ran");
            return Err(TaskweaveError::Cancelled(id.to_string()));
        }

        info!(task = %id, name = %record.name, "executing task");

        let worker_id = record.worker_id.clone();
        if let Some(worker) = &worker_id {
            self.registry.bus().emit(
                Event::new(EventKind::WorkerBusy, id)
                    .with_worker(Some(worker.clone()))
                    .with_data("name", record.name.clone()),
            );
        }

        let ctx = TaskContext {
            task_id: id.to_string(),
            args: definition.args.clone(),
            worker_id: worker_id.clone(),
            cancel: token.clone(),
        };

        let outcome = invoke(&definition, ctx, &token).await;
        self.running.lock().remove(id);

        match outcome {
            Outcome::Finished(Ok(value)) => {
                if !self.registry.complete(id, value.clone()) {
                    let status = self.registry.status_of(id);
                    warn!(task = %id, ?status, "result discarded; task no longer running");
                    return Err(match status {
                        Some(TaskStatus::Cancelled) => TaskweaveError::Cancelled(id.to_string()),
                        _ => TaskweaveError::TaskNotRunnable(id.to_string()),
                    });
                }
                if let Some(worker) = worker_id {
                    self.registry.bus().emit(
                        Event::new(EventKind::WorkerReady, id)
                            .with_worker(Some(worker))
                            .with_data("name", record.name),
                    );
                }
                Ok(value)
            }
            Outcome::Finished(Err(err)) => {
                let message = format!("{err:#}");
                self.registry.fail(id, message.clone());
                Err(TaskweaveError::TaskFailed {
                    task: id.to_string(),
                    message,
                })
            }
            Outcome::Panicked(message) => {
                let message = format!("task panicked: {message}");
                self.registry.fail(id, message.clone());
                Err(TaskweaveError::TaskFailed {
                    task: id.to_string(),
                    message,
                })
            }
            Outcome::TimedOut(after) => {
                token.cancel();
                self.registry
                    .fail(id, format!("timed out after {after:?}"));
                Err(TaskweaveError::TimedOut {
                    task: id.to_string(),
                    after,
                })
            }
            Outcome::Cancelled => {
                self.registry.cancel(id, Some("cancelled while running"));
                Err(TaskweaveError::Cancelled(id.to_string()))
            }
        }
    }
}

/// Run the callable, racing it against its cancellation token and optional
/// deadline. The callable future is dropped as soon as either fires.
async fn invoke(definition: &TaskDefinition, ctx: TaskContext, token: &CancellationToken) -> Outcome {
    let run = AssertUnwindSafe(definition.callable.run(ctx)).catch_unwind();

    let guarded = async {
        let result = match definition.timeout {
            Some(limit) => match tokio::time::timeout(limit, run).await {
                Ok(result) => result,
                Err(_) => return Outcome::TimedOut(limit),
            },
            None => run.await,
        };
        match result {
            Ok(result) => Outcome::Finished(result),
            Err(payload) => Outcome::Panicked(panic_message(payload.as_ref())),
        }
    };

    tokio::select! {
        biased;
        _ = token.cancelled() => Outcome::Cancelled,
        outcome = guarded => outcome,
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
