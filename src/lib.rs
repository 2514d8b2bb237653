// src/lib.rs

pub mod cli;
pub mod config;
pub mod errors;
pub mod events;
pub mod exec;
pub mod logging;
pub mod orchestrator;
pub mod registry;
pub mod types;
pub mod workflow;

use anyhow::Result;
use tracing::{debug, info};

use crate::cli::CliArgs;
use crate::config::ConfigFile;
use crate::config::loader::load_and_validate;
use crate::config::validate::toposorted_names;
use crate::types::TaskStatus;
use crate::workflow::{Workflow, WorkflowSummary};

/// High-level entry point used by `main.rs`.
///
/// Loads and validates the workflow file, applies CLI overrides, then either
/// prints the plan (`--dry-run`) or runs every task to completion.
///
/// Returns `Ok(true)` when every task completed.
pub async fn run(args: CliArgs) -> Result<bool> {
    let mut cfg = load_and_validate(&args.config)?;

    if let Some(workers) = args.workers {
        cfg.orchestrator.workers = usize::from(workers);
    }
    if let Some(max_iterations) = args.max_iterations {
        cfg.orchestrator.max_iterations = max_iterations as usize;
    }

    if args.dry_run {
        print_dry_run(&cfg)?;
        return Ok(true);
    }

    let workflow = Workflow::from_config(&cfg)?;

    // Ctrl-C cancels everything still pending or running.
    {
        let orchestrator = workflow.orchestrator().clone();
        tokio::spawn(async move {
            if let Err(e) = tokio::signal::ctrl_c().await {
                eprintln!("failed to listen for Ctrl+C: {e}");
                return;
            }
            info!("interrupt received; cancelling unfinished tasks");
            for task in orchestrator.all_tasks() {
                if !task.status.is_terminal() {
                    orchestrator.cancel_task(&task.id);
                }
            }
        });
    }

    let summary = workflow.run().await?;
    print_summary(&summary);

    Ok(summary.is_success())
}

/// Print tasks in execution order with their dependencies and commands.
fn print_dry_run(cfg: &ConfigFile) -> Result<()> {
    let section = &cfg.orchestrator;
    println!("taskweave dry-run");
    println!("  orchestrator.workers = {}", section.workers);
    println!("  orchestrator.max_iterations = {}", section.max_iterations);
    println!("  orchestrator.poll_interval = {}", section.poll_interval);
    println!("  orchestrator.history_capacity = {}", section.history_capacity);
    println!();

    println!("tasks ({}):", cfg.task.len());
    for name in toposorted_names(&cfg.task)? {
        let Some(task) = cfg.task.get(&name) else {
            continue;
        };
        println!("  - {name} [{}, {:?}]", task.priority, task.mode);
        println!("      cmd: {}", task.cmd);
        if !task.description.is_empty() {
            println!("      description: {}", task.description);
        }
        if !task.after.is_empty() {
            println!("      after: {:?}", task.after);
        }
        if let Some(ref worker) = task.worker {
            println!("      worker: {worker}");
        }
        if let Some(ref timeout) = task.timeout {
            println!("      timeout: {timeout}");
        }
        if !task.env.is_empty() {
            println!("      env: {:?}", task.env.keys().collect::<Vec<_>>());
        }
    }

    debug!("dry-run complete (no execution)");
    Ok(())
}

fn print_summary(summary: &WorkflowSummary) {
    println!(
        "taskweave: {} completed, {} failed, {} cancelled, {} pending ({} iterations)",
        summary.count(TaskStatus::Completed),
        summary.count(TaskStatus::Failed),
        summary.count(TaskStatus::Cancelled),
        summary.count(TaskStatus::Pending),
        summary.report.iterations,
    );
    for (name, status) in &summary.tasks {
        if *status != TaskStatus::Completed {
            println!("  {name}: {status}");
        }
    }
}
