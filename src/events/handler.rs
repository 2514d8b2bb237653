// src/events/handler.rs

//! Subscriber seam for the event bus.
//!
//! - [`Handle`] is the single-method trait every observer implements.
//! - [`FnHandler`] adapts a plain closure.
//! - [`LogHandler`] writes every event it receives to `tracing`.

use std::fmt;

use anyhow::Result;
use tracing::{info, warn};

use super::event::{Event, EventKind};

/// An observer of lifecycle events.
///
/// Handlers run synchronously on the emitting thread, after the bus has
/// released its own lock. Returning an error (or panicking) is logged by the
/// bus and never reaches the emitter or the remaining subscribers.
pub trait Handle: Send + Sync + 'static {
    fn handle(&self, event: &Event) -> Result<()>;

    /// Name used in log lines about this handler.
    fn name(&self) -> &str {
        std::any::type_name::<Self>()
    }
}

/// Closure-backed handler.
pub struct FnHandler<F> {
    name: String,
    f: F,
}

impl<F> FnHandler<F>
where
    F: Fn(&Event) -> Result<()> + Send + Sync + 'static,
{
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            f,
        }
    }
}

impl<F> fmt::Debug for FnHandler<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnHandler")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

impl<F> Handle for FnHandler<F>
where
    F: Fn(&Event) -> Result<()> + Send + Sync + 'static,
{
    fn handle(&self, event: &Event) -> Result<()> {
        (self.f)(event)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

/// Built-in observer that logs every event at `info` (failures at `warn`).
#[derive(Debug, Default, Clone, Copy)]
pub struct LogHandler;

impl Handle for LogHandler {
    fn handle(&self, event: &Event) -> Result<()> {
        match event.kind {
            EventKind::Failed | EventKind::Cancelled => warn!(
                kind = %event.kind,
                task = %event.task_id,
                worker = ?event.worker_id,
                error = ?event.error,
                "task event"
            ),
            _ => info!(
                kind = %event.kind,
                task = %event.task_id,
                worker = ?event.worker_id,
                "task event"
            ),
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "log"
    }
}
