// src/events/bus.rs

//! Synchronous publish-subscribe hub for lifecycle events.
//!
//! One mutex guards the subscriber list and the bounded history. It is
//! always released before any handler runs, so a handler may itself emit,
//! subscribe or unsubscribe without deadlocking.

use std::any::Any;
use std::collections::{HashSet, VecDeque};
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::{debug, error};

use super::event::{Event, EventKind};
use super::handler::{FnHandler, Handle};
use crate::types::TaskId;

/// Default number of events retained in the history ring.
pub const DEFAULT_HISTORY_CAPACITY: usize = 1000;

struct Subscription {
    subscriber_id: String,
    kinds: HashSet<EventKind>,
    handler: Arc<dyn Handle>,
    task_filter: Option<TaskId>,
}

impl Subscription {
    fn matches(&self, event: &Event) -> bool {
        self.kinds.contains(&event.kind)
            && self
                .task_filter
                .as_ref()
                .is_none_or(|task| *task == event.task_id)
    }
}

#[derive(Default)]
struct BusState {
    subscriptions: Vec<Subscription>,
    history: VecDeque<Arc<Event>>,
}

/// Event bus shared (via `Arc`) by the registry, the orchestrator and any
/// external observers.
pub struct EventBus {
    state: Mutex<BusState>,
    history_capacity: usize,
}

impl fmt::Debug for EventBus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.state.lock();
        f.debug_struct("EventBus")
            .field("subscriptions", &state.subscriptions.len())
            .field("history", &state.history.len())
            .field("history_capacity", &self.history_capacity)
            .finish()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_HISTORY_CAPACITY)
    }

    /// Create a bus retaining at most `history_capacity` events.
    ///
    /// A capacity of 0 disables history retention entirely.
    pub fn with_capacity(history_capacity: usize) -> Self {
        Self {
            state: Mutex::new(BusState::default()),
            history_capacity,
        }
    }

    pub fn history_capacity(&self) -> usize {
        self.history_capacity
    }

    /// Register `handler` for the given event kinds.
    ///
    /// Subscribing again under an id that is already in use adds another
    /// entry; [`unsubscribe`](Self::unsubscribe) removes all of them.
    pub fn subscribe(
        &self,
        subscriber_id: impl Into<String>,
        kinds: impl IntoIterator<Item = EventKind>,
        handler: Arc<dyn Handle>,
        task_filter: Option<TaskId>,
    ) -> String {
        let subscriber_id = subscriber_id.into();
        let kinds: HashSet<EventKind> = kinds.into_iter().collect();

        debug!(
            subscriber = %subscriber_id,
            handler = handler.name(),
            ?kinds,
            task_filter = ?task_filter,
            "adding event subscription"
        );

        self.state.lock().subscriptions.push(Subscription {
            subscriber_id: subscriber_id.clone(),
            kinds,
            handler,
            task_filter,
        });

        subscriber_id
    }

    /// Closure shorthand for [`subscribe`](Self::subscribe).
    pub fn subscribe_fn<F>(
        &self,
        subscriber_id: impl Into<String>,
        kinds: impl IntoIterator<Item = EventKind>,
        f: F,
        task_filter: Option<TaskId>,
    ) -> String
    where
        F: Fn(&Event) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        let subscriber_id = subscriber_id.into();
        let handler = Arc::new(FnHandler::new(subscriber_id.clone(), f));
        self.subscribe(subscriber_id, kinds, handler, task_filter)
    }

    /// Remove every subscription registered under `subscriber_id`.
    ///
    /// Returns `true` if at least one entry was removed.
    pub fn unsubscribe(&self, subscriber_id: &str) -> bool {
        let mut state = self.state.lock();
        let before = state.subscriptions.len();
        state
            .subscriptions
            .retain(|sub| sub.subscriber_id != subscriber_id);
        let removed = state.subscriptions.len() < before;

        if removed {
            debug!(subscriber = %subscriber_id, "removed event subscription");
        }

        removed
    }

    /// Record `event` in the history and deliver it to every matching
    /// subscriber, in registration order.
    ///
    /// Returns the number of handlers the event was delivered to (including
    /// those that failed).
    pub fn emit(&self, event: Event) -> usize {
        let event = Arc::new(event);

        let targets: Vec<(String, Arc<dyn Handle>)> = {
            let mut state = self.state.lock();

            if self.history_capacity > 0 {
                state.history.push_back(Arc::clone(&event));
                while state.history.len() > self.history_capacity {
                    state.history.pop_front();
                }
            }

            state
                .subscriptions
                .iter()
                .filter(|sub| sub.matches(&event))
                .map(|sub| (sub.subscriber_id.clone(), Arc::clone(&sub.handler)))
                .collect()
        };

        debug!(
            kind = %event.kind,
            task = %event.task_id,
            subscribers = targets.len(),
            "emitting event"
        );

        for (subscriber_id, handler) in &targets {
            match panic::catch_unwind(AssertUnwindSafe(|| handler.handle(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => {
                    error!(
                        subscriber = %subscriber_id,
                        handler = handler.name(),
                        kind = %event.kind,
                        task = %event.task_id,
                        error = %err,
                        "event handler returned an error"
                    );
                }
                Err(payload) => {
                    error!(
                        subscriber = %subscriber_id,
                        handler = handler.name(),
                        kind = %event.kind,
                        task = %event.task_id,
                        panic = %panic_message(payload.as_ref()),
                        "event handler panicked"
                    );
                }
            }
        }

        targets.len()
    }

    /// Most-recent-first slice of the history, optionally filtered by kind
    /// and/or task id.
    pub fn history(
        &self,
        kind: Option<EventKind>,
        task_id: Option<&str>,
        limit: usize,
    ) -> Vec<Arc<Event>> {
        let state = self.state.lock();
        state
            .history
            .iter()
            .rev()
            .filter(|ev| kind.is_none_or(|k| ev.kind == k))
            .filter(|ev| task_id.is_none_or(|t| ev.task_id == t))
            .take(limit)
            .cloned()
            .collect()
    }

    pub fn history_len(&self) -> usize {
        self.state.lock().history.len()
    }

    pub fn clear_history(&self) {
        self.state.lock().history.clear();
        debug!("cleared event history");
    }

    pub fn subscriber_count(&self) -> usize {
        self.state.lock().subscriptions.len()
    }

    /// Drop every subscription and the whole history.
    pub fn reset(&self) {
        let mut state = self.state.lock();
        state.subscriptions.clear();
        state.history.clear();
        debug!("event bus reset");
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

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use super::*;

    fn recorder(bus: &EventBus, id: &str, kinds: &[EventKind]) -> Arc<StdMutex<Vec<EventKind>>> {
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe_fn(
            id,
            kinds.iter().copied(),
            move |ev| {
                sink.lock().unwrap().push(ev.kind);
                Ok(())
            },
            None,
        );
        seen
    }

    #[test]
    fn only_subscribed_kinds_are_delivered() {
        let bus = EventBus::new();
        let seen = recorder(&bus, "s", &[EventKind::Completed]);

        bus.emit(Event::new(EventKind::Started, "t1"));
        bus.emit(Event::new(EventKind::Completed, "t1"));

        assert_eq!(*seen.lock().unwrap(), vec![EventKind::Completed]);
    }

    #[test]
    fn task_filter_restricts_delivery() {
        let bus = EventBus::new();
        let seen = Arc::new(StdMutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        bus.subscribe_fn(
            "only-t2",
            EventKind::ALL,
            move |ev| {
                sink.lock().unwrap().push(ev.task_id.clone());
                Ok(())
            },
            Some("t2".to_string()),
        );

        bus.emit(Event::new(EventKind::Started, "t1"));
        bus.emit(Event::new(EventKind::Started, "t2"));

        assert_eq!(*seen.lock().unwrap(), vec!["t2".to_string()]);
    }

    #[test]
    fn history_is_capped_and_most_recent_first() {
        let bus = EventBus::with_capacity(3);
        for i in 0..5 {
            bus.emit(Event::new(EventKind::Started, format!("t{i}")));
        }

        let history = bus.history(None, None, 100);
        let ids: Vec<_> = history.iter().map(|e| e.task_id.as_str()).collect();
        assert_eq!(ids, vec!["t4", "t3", "t2"]);
    }

    #[test]
    fn zero_capacity_keeps_no_history() {
        let bus = EventBus::with_capacity(0);
        bus.emit(Event::new(EventKind::Started, "t"));
        assert_eq!(bus.history_len(), 0);
    }

    #[test]
    fn history_filters_by_kind_and_task() {
        let bus = EventBus::new();
        bus.emit(Event::new(EventKind::Started, "a"));
        bus.emit(Event::new(EventKind::Completed, "a"));
        bus.emit(Event::new(EventKind::Started, "b"));

        assert_eq!(bus.history(Some(EventKind::Started), None, 10).len(), 2);
        assert_eq!(bus.history(None, Some("a"), 10).len(), 2);
        assert_eq!(bus.history(Some(EventKind::Started), Some("b"), 10).len(), 1);
        assert_eq!(bus.history(None, None, 1)[0].task_id, "b");
    }

    #[test]
    fn failing_and_panicking_handlers_do_not_block_others() {
        let bus = EventBus::new();
        bus.subscribe_fn("err", EventKind::ALL, |_| anyhow::bail!("boom"), None);
        bus.subscribe_fn("panic", EventKind::ALL, |_| panic!("kaboom"), None);
        let seen = recorder(&bus, "ok", &EventKind::ALL);

        let delivered = bus.emit(Event::new(EventKind::Failed, "t"));

        assert_eq!(delivered, 3);
        assert_eq!(*seen.lock().unwrap(), vec![EventKind::Failed]);
        assert_eq!(bus.history_len(), 1);
    }

    #[test]
    fn resubscribing_accumulates_and_unsubscribe_removes_all() {
        let bus = EventBus::new();
        let seen = recorder(&bus, "dup", &[EventKind::Started]);
        let sink = Arc::clone(&seen);
        bus.subscribe_fn(
            "dup",
            [EventKind::Started],
            move |ev| {
                sink.lock().unwrap().push(ev.kind);
                Ok(())
            },
            None,
        );

        bus.emit(Event::new(EventKind::Started, "t"));
        assert_eq!(seen.lock().unwrap().len(), 2);

        assert!(bus.unsubscribe("dup"));
        assert!(!bus.unsubscribe("dup"));
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn handler_may_reenter_the_bus() {
        let bus = Arc::new(EventBus::new());
        let inner = Arc::clone(&bus);
        bus.subscribe_fn(
            "reentrant",
            [EventKind::Completed],
            move |ev| {
                inner.emit(Event::new(EventKind::WorkerReady, ev.task_id.clone()));
                inner.unsubscribe("reentrant");
                Ok(())
            },
            None,
        );

        bus.emit(Event::new(EventKind::Completed, "t"));

        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.history(Some(EventKind::WorkerReady), None, 10).len(), 1);
    }

    #[test]
    fn reset_clears_everything() {
        let bus = EventBus::new();
        let _ = recorder(&bus, "s", &EventKind::ALL);
        bus.emit(Event::new(EventKind::Started, "t"));

        bus.reset();

        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(bus.history_len(), 0);
    }
}
