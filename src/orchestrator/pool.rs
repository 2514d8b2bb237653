// src/orchestrator/pool.rs

//! Bounded worker pool used by parallel execution.
//!
//! Every submission is spawned onto the Tokio runtime through a
//! [`TaskTracker`] and must acquire one of `size` semaphore permits before it
//! runs, so at most `size` callables execute at once. [`WorkerPool::drain`]
//! waits for everything already submitted, then closes the semaphore.

use std::future::Future;
use std::sync::Arc;

use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tokio_util::task::TaskTracker;
use tracing::debug;

use crate::errors::{Result, TaskweaveError};

#[derive(Debug)]
pub struct WorkerPool {
    size: usize,
    permits: Arc<Semaphore>,
    tracker: TaskTracker,
}

impl WorkerPool {
    /// `size` is clamped to at least 1.
    pub fn new(size: usize) -> Self {
        let size = size.max(1);
        Self {
            size,
            permits: Arc::new(Semaphore::new(size)),
            tracker: TaskTracker::new(),
        }
    }

    pub fn size(&self) -> usize {
        self.size
    }

    /// Number of submissions that have not finished yet.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    pub fn is_closed(&self) -> bool {
        self.permits.is_closed()
    }

    /// Queue `work` on the pool.
    ///
    /// The returned handle resolves to the work's own result, or to
    /// [`TaskweaveError::ShutDown`] if the pool closed before a permit was
    /// granted.
    pub fn submit<F, T>(&self, work: F) -> JoinHandle<Result<T>>
    where
        F: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let permits = Arc::clone(&self.permits);
        self.tracker.spawn(async move {
            let _permit = permits
                .acquire_owned()
                .await
                .map_err(|_| TaskweaveError::ShutDown)?;
            work.await
        })
    }

    /// Wait for every submitted job to finish, then refuse new permits.
    pub async fn drain(&self) {
        self.tracker.close();
        debug!(in_flight = self.tracker.len(), "draining worker pool");
        self.tracker.wait().await;
        self.permits.close();
    }
}
