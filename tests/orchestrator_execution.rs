// tests/orchestrator_execution.rs

mod common;

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::{Duration, Instant};

use serde_json::json;
use taskweave::errors::TaskweaveError;
use taskweave::events::EventKind;
use taskweave::orchestrator::{FnTask, TaskContext, TaskDefinition};
use taskweave::registry::TaskSpec;
use taskweave::types::{ExecutionMode, TaskStatus};

use common::{CallLog, callables, event_tasks, orchestrator, with_timeout};

#[tokio::test]
async fn execute_task_completes_and_returns_result() {
    let (bus, orch) = orchestrator(2);
    let id = orch.create_task(
        TaskSpec::new("echo"),
        TaskDefinition::new(callables::echo_args()).args(json!({ "x": 1 })),
    );

    let out = orch.execute_task(&id).await.unwrap();

    assert_eq!(out, json!({ "x": 1 }));
    let record = orch.registry().get(&id).unwrap();
    assert_eq!(record.status, TaskStatus::Completed);
    assert_eq!(record.result, Some(json!({ "x": 1 })));
    assert_eq!(event_tasks(&bus, EventKind::Started), vec![id.clone()]);
    assert_eq!(event_tasks(&bus, EventKind::Completed), vec![id]);
}

#[tokio::test]
async fn execute_task_records_failure_and_returns_error() {
    let (bus, orch) = orchestrator(2);
    let log = CallLog::new();
    let id = orch.create_task(
        TaskSpec::new("broken"),
        TaskDefinition::new(callables::failing(&log, "broken", "disk full")),
    );

    let err = orch.execute_task(&id).await.unwrap_err();

    assert!(matches!(&err, TaskweaveError::TaskFailed { message, .. } if message.contains("disk full")));
    let record = orch.registry().get(&id).unwrap();
    assert_eq!(record.status, TaskStatus::Failed);
    assert!(record.error.unwrap().contains("disk full"));

    let failed = bus.history(Some(EventKind::Failed), Some(id.as_str()), 1);
    assert_eq!(failed.len(), 1);
    assert!(failed[0].error.as_deref().unwrap().contains("disk full"));
}

#[tokio::test]
async fn execute_task_rejects_non_pending_and_unknown_tasks() {
    let (_bus, orch) = orchestrator(1);
    let log = CallLog::new();
    let id = orch.create_task(
        TaskSpec::new("once"),
        TaskDefinition::new(callables::recording(&log, "once")),
    );

    orch.execute_task(&id).await.unwrap();
    let second = orch.execute_task(&id).await;

    assert!(matches!(second, Err(TaskweaveError::TaskNotRunnable(_))));
    assert_eq!(log.entries(), vec!["once"]);
    assert!(matches!(
        orch.execute_task("missing").await,
        Err(TaskweaveError::TaskNotFound(_))
    ));
}

#[tokio::test]
async fn execute_task_without_callable_fails_fast() {
    let (_bus, orch) = orchestrator(1);
    let id = orch.registry().create(TaskSpec::new("bare"));

    let err = orch.execute_task(&id).await.unwrap_err();

    assert!(matches!(err, TaskweaveError::NoCallable(_)));
    assert_eq!(orch.task_status(&id), Some(TaskStatus::Pending));
}

#[tokio::test]
async fn sequential_stops_at_first_failure() {
    let (_bus, orch) = orchestrator(2);
    let log = CallLog::new();
    let a = orch.create_task(TaskSpec::new("A"), TaskDefinition::new(callables::recording(&log, "A")));
    let b = orch.create_task(
        TaskSpec::new("B"),
        TaskDefinition::new(callables::failing(&log, "B", "boom")),
    );
    let c = orch.create_task(TaskSpec::new("C"), TaskDefinition::new(callables::recording(&log, "C")));

    let results = orch.execute_sequential(&[a.clone(), b.clone(), c.clone()]).await;

    assert_eq!(log.entries(), vec!["A", "B"]);
    assert_eq!(results.len(), 1);
    assert_eq!(results[&a], Some(json!("A")));
    assert!(!results.contains_key(&c));
    assert_eq!(orch.task_status(&b), Some(TaskStatus::Failed));
    assert_eq!(orch.task_status(&c), Some(TaskStatus::Pending));
}

#[tokio::test]
async fn parallel_runs_concurrently_with_one_slot_per_task() {
    let (_bus, orch) = orchestrator(4);
    let ids: Vec<_> = (0..3)
        .map(|i| {
            orch.create_task(
                TaskSpec::new(format!("sleep-{i}")),
                TaskDefinition::new(callables::sleeping(Duration::from_millis(50))),
            )
        })
        .collect();

    let started = Instant::now();
    let results = with_timeout(orch.execute_parallel(&ids)).await.unwrap();
    let elapsed = started.elapsed();

    assert!(elapsed < Duration::from_millis(120), "took {elapsed:?}");
    assert_eq!(results.len(), 3);
    for id in &ids {
        assert_eq!(results[id], Some(json!(id)));
        assert_eq!(orch.task_status(id), Some(TaskStatus::Completed));
    }
}

#[tokio::test]
async fn parallel_failures_become_empty_slots() {
    let (_bus, orch) = orchestrator(2);
    let log = CallLog::new();
    let ok = orch.create_task(TaskSpec::new("ok"), TaskDefinition::new(callables::recording(&log, "ok")));
    let bad = orch.create_task(
        TaskSpec::new("bad"),
        TaskDefinition::new(callables::failing(&log, "bad", "nope")),
    );

    let results = orch.execute_parallel(&[ok.clone(), bad.clone()]).await.unwrap();

    assert_eq!(results.len(), 2);
    assert_eq!(results[&ok], Some(json!("ok")));
    assert_eq!(results[&bad], None);
    assert_eq!(orch.task_status(&bad), Some(TaskStatus::Failed));
}

#[tokio::test]
async fn parallel_respects_pool_size() {
    let (_bus, orch) = orchestrator(2);
    let active = Arc::new(AtomicUsize::new(0));
    let peak = Arc::new(AtomicUsize::new(0));

    let ids: Vec<_> = (0..6)
        .map(|i| {
            let active = Arc::clone(&active);
            let peak = Arc::clone(&peak);
            let callable = FnTask::arc(move |_ctx: TaskContext| {
                let active = Arc::clone(&active);
                let peak = Arc::clone(&peak);
                async move {
                    let now = active.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(20)).await;
                    active.fetch_sub(1, Ordering::SeqCst);
                    anyhow::Ok(json!(null))
                }
            });
            orch.create_task(TaskSpec::new(format!("t{i}")), TaskDefinition::new(callable))
        })
        .collect();

    let results = with_timeout(orch.execute_parallel(&ids)).await.unwrap();

    assert_eq!(results.len(), 6);
    assert!(peak.load(Ordering::SeqCst) <= 2);
}

#[tokio::test]
async fn parallel_runs_duplicate_ids_once() {
    let (_bus, orch) = orchestrator(2);
    let log = CallLog::new();
    let id = orch.create_task(TaskSpec::new("dup"), TaskDefinition::new(callables::recording(&log, "dup")));

    let results = orch
        .execute_parallel(&[id.clone(), id.clone()])
        .await
        .unwrap();

    assert_eq!(results.len(), 1);
    assert_eq!(log.entries(), vec!["dup"]);
}

#[tokio::test]
async fn group_dispatches_children_by_mode() {
    let (_bus, orch) = orchestrator(2);
    let log = CallLog::new();
    let parent = orch.registry().create(TaskSpec::new("parent"));
    let first = orch.create_task(
        TaskSpec::new("first").parent(parent.clone()),
        TaskDefinition::new(callables::recording(&log, "first")),
    );
    let second = orch.create_task(
        TaskSpec::new("second").parent(parent.clone()),
        TaskDefinition::new(callables::recording(&log, "second")),
    );

    let results = orch
        .execute_group(&parent, ExecutionMode::Sequential)
        .await
        .unwrap();

    assert_eq!(log.entries(), vec!["first", "second"]);
    assert_eq!(results.len(), 2);
    assert_eq!(results[&first], Some(json!("first")));
    assert_eq!(results[&second], Some(json!("second")));

    let empty = orch
        .execute_group("no-such-parent", ExecutionMode::Parallel)
        .await
        .unwrap();
    assert!(empty.is_empty());
}

#[tokio::test]
async fn timeout_fails_the_task() {
    let (_bus, orch) = orchestrator(1);
    let id = orch.create_task(
        TaskSpec::new("slow"),
        TaskDefinition::new(callables::sleeping(Duration::from_secs(10)))
            .timeout(Duration::from_millis(50)),
    );

    let err = with_timeout(orch.execute_task(&id)).await.unwrap_err();

    assert!(matches!(err, TaskweaveError::TimedOut { .. }));
    let record = orch.registry().get(&id).unwrap();
    assert_eq!(record.status, TaskStatus::Failed);
    assert!(record.error.unwrap().contains("timed out"));
}

#[tokio::test]
async fn panicking_callable_is_recorded_as_failure() {
    let (_bus, orch) = orchestrator(1);
    let id = orch.create_task(
        TaskSpec::new("panics"),
        TaskDefinition::new(callables::panicking("kaboom")),
    );

    let err = orch.execute_task(&id).await.unwrap_err();

    assert!(matches!(&err, TaskweaveError::TaskFailed { message, .. } if message.contains("kaboom")));
    assert_eq!(orch.task_status(&id), Some(TaskStatus::Failed));
}

#[tokio::test]
async fn cancel_pending_task() {
    let (bus, orch) = orchestrator(1);
    let log = CallLog::new();
    let id = orch.create_task(TaskSpec::new("idle"), TaskDefinition::new(callables::recording(&log, "idle")));

    assert!(orch.cancel_task(&id));
    assert!(!orch.cancel_task(&id));
    assert_eq!(orch.task_status(&id), Some(TaskStatus::Cancelled));
    assert_eq!(event_tasks(&bus, EventKind::Cancelled), vec![id.clone()]);

    let err = orch.execute_task(&id).await.unwrap_err();
    assert!(matches!(err, TaskweaveError::TaskNotRunnable(_)));
    assert!(log.entries().is_empty());
}

#[tokio::test]
async fn cancel_running_task() {
    let (_bus, orch) = orchestrator(1);
    let id = orch.create_task(
        TaskSpec::new("long"),
        TaskDefinition::new(callables::sleeping(Duration::from_secs(10))),
    );

    let runner = {
        let orch = orch.clone();
        let id = id.clone();
        tokio::spawn(async move { orch.execute_task(&id).await })
    };

    // Wait until the task is running before cancelling it.
    with_timeout(async {
        while orch.task_status(&id) != Some(TaskStatus::Running) {
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
    })
    .await;

    assert!(orch.cancel_task(&id));
    let outcome = with_timeout(runner).await.unwrap();

    assert!(matches!(outcome, Err(TaskweaveError::Cancelled(_))));
    assert_eq!(orch.task_status(&id), Some(TaskStatus::Cancelled));
}

#[tokio::test]
async fn racing_executions_leave_the_winner_cancellable() {
    let (bus, orch) = orchestrator(2);
    let id = orch.create_task(
        TaskSpec::new("contested"),
        TaskDefinition::new(callables::sleeping(Duration::from_secs(10))),
    );

    let (first, second, cancelled) = with_timeout(async {
        tokio::join!(orch.execute_task(&id), orch.execute_task(&id), async {
            while orch.task_status(&id) != Some(TaskStatus::Running) {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
            tokio::time::sleep(Duration::from_millis(20)).await;
            orch.cancel_task(&id)
        })
    })
    .await;

    assert!(cancelled);
    let outcomes = [first, second];
    let count = |pred: fn(&TaskweaveError) -> bool| {
        outcomes
            .iter()
            .filter(|o| matches!(o, Err(e) if pred(e)))
            .count()
    };
    assert_eq!(count(|e| matches!(e, TaskweaveError::Cancelled(_))), 1);
    assert_eq!(count(|e| matches!(e, TaskweaveError::TaskNotRunnable(_))), 1);
    assert_eq!(orch.task_status(&id), Some(TaskStatus::Cancelled));
    assert_eq!(event_tasks(&bus, EventKind::Cancelled), vec![id]);
}

#[tokio::test]
async fn result_of_task_cancelled_mid_run_is_discarded() {
    let (bus, orch) = orchestrator(1);
    let registry = Arc::clone(orch.registry());
    let callable = FnTask::arc(move |ctx: TaskContext| {
        let registry = Arc::clone(&registry);
        async move {
            registry.cancel(&ctx.task_id, Some("withdrawn"));
            anyhow::Ok(json!("late"))
        }
    });
    let id = orch.create_task(
        TaskSpec::new("withdrawn").worker("w-1"),
        TaskDefinition::new(callable),
    );

    let err = orch.execute_task(&id).await.unwrap_err();

    assert!(matches!(err, TaskweaveError::Cancelled(_)));
    let record = orch.registry().get(&id).unwrap();
    assert_eq!(record.status, TaskStatus::Cancelled);
    assert!(record.result.is_none());
    assert!(event_tasks(&bus, EventKind::Completed).is_empty());
    assert!(event_tasks(&bus, EventKind::WorkerReady).is_empty());
    assert_eq!(event_tasks(&bus, EventKind::WorkerBusy), vec![id]);
}

#[tokio::test]
async fn worker_events_bracket_successful_runs() {
    let (bus, orch) = orchestrator(1);
    let log = CallLog::new();
    let id = orch.create_task(
        TaskSpec::new("agent-task").worker("agent-7"),
        TaskDefinition::new(callables::recording(&log, "agent-task")),
    );

    orch.execute_task(&id).await.unwrap();

    let kinds: Vec<EventKind> = bus
        .history(None, Some(id.as_str()), usize::MAX)
        .into_iter()
        .rev()
        .map(|e| e.kind)
        .collect();
    assert_eq!(
        kinds,
        vec![
            EventKind::Started,
            EventKind::WorkerBusy,
            EventKind::Completed,
            EventKind::WorkerReady
        ]
    );
    let ready = bus.history(Some(EventKind::WorkerReady), None, 1);
    assert_eq!(ready[0].worker_id.as_deref(), Some("agent-7"));
}

#[tokio::test]
async fn shutdown_is_idempotent_and_closes_the_pool() {
    let (bus, orch) = orchestrator(2);
    let subscribers_before = bus.subscriber_count();
    assert_eq!(subscribers_before, 1);

    orch.shutdown().await;
    orch.shutdown().await;

    assert!(orch.is_shut_down());
    assert_eq!(bus.subscriber_count(), 0);

    let log = CallLog::new();
    let id = orch.create_task(TaskSpec::new("late"), TaskDefinition::new(callables::recording(&log, "late")));
    assert!(matches!(
        orch.execute_parallel(&[id.clone()]).await,
        Err(TaskweaveError::ShutDown)
    ));

    // Caller-side execution still works.
    assert_eq!(orch.execute_task(&id).await.unwrap(), json!("late"));
}
