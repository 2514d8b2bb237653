#![allow(dead_code)]

use std::sync::Arc;

use taskweave::events::{EventBus, EventKind};
use taskweave::orchestrator::Orchestrator;

pub use taskweave_test_utils::callables::{self, CallLog};
pub use taskweave_test_utils::{init_tracing, with_timeout};

/// Fresh bus + orchestrator pair with the given pool size.
pub fn orchestrator(pool_size: usize) -> (Arc<EventBus>, Orchestrator) {
    init_tracing();
    let bus = Arc::new(EventBus::new());
    let orch = Orchestrator::new(Arc::clone(&bus), pool_size);
    (bus, orch)
}

/// Task ids of the recorded events of `kind`, oldest first.
pub fn event_tasks(bus: &EventBus, kind: EventKind) -> Vec<String> {
    let mut ids: Vec<String> = bus
        .history(Some(kind), None, usize::MAX)
        .into_iter()
        .map(|e| e.task_id.clone())
        .collect();
    ids.reverse();
    ids
}
