// src/orchestrator/observer.rs

//! The orchestrator's own event subscription.
//!
//! Purely observational: it logs completions and failures and reports how
//! many tasks are ready. Scheduling itself is driven by polling
//! `ready_tasks()` in `run_until_complete`.

use std::sync::Weak;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::events::{Event, EventKind, Handle};
use crate::registry::TaskRegistry;

/// Holds a weak registry handle: the registry owns the bus, which owns this
/// handler.
pub(crate) struct SchedulingObserver {
    registry: Weak<TaskRegistry>,
}

impl SchedulingObserver {
    pub(crate) fn new(registry: Weak<TaskRegistry>) -> Self {
        Self { registry }
    }
}

impl Handle for SchedulingObserver {
    fn handle(&self, event: &Event) -> Result<()> {
        match event.kind {
            EventKind::Completed => {
                debug!(task = %event.task_id, "received completion event");
                if let Some(registry) = self.registry.upgrade() {
                    let ready = registry.ready_tasks().len();
                    if ready > 0 {
                        info!(
                            task = %event.task_id,
                            ready,
                            "tasks ready after completion"
                        );
                    }
                }
            }
            EventKind::Failed => {
                warn!(
                    task = %event.task_id,
                    error = event.error.as_deref().unwrap_or("unknown error"),
                    "received failure event"
                );
            }
            _ => {}
        }
        Ok(())
    }

    fn name(&self) -> &str {
        "orchestrator"
    }
}
