// src/config/validate.rs

use std::collections::BTreeMap;

use petgraph::algo::toposort;
use petgraph::graphmap::DiGraphMap;

use crate::config::model::{ConfigFile, RawConfigFile, TaskConfig};
use crate::errors::{Result, TaskweaveError};
use crate::types::parse_duration;

impl TryFrom<RawConfigFile> for ConfigFile {
    type Error = TaskweaveError;

    fn try_from(raw: RawConfigFile) -> std::result::Result<Self, Self::Error> {
        validate_raw_config(&raw)?;
        Ok(ConfigFile::new_unchecked(raw.orchestrator, raw.task))
    }
}

fn validate_raw_config(cfg: &RawConfigFile) -> Result<()> {
    ensure_has_tasks(cfg)?;
    validate_orchestrator_section(cfg)?;
    validate_tasks(cfg)?;
    validate_task_dependencies(cfg)?;
    validate_dag(cfg)?;
    Ok(())
}

fn ensure_has_tasks(cfg: &RawConfigFile) -> Result<()> {
    if cfg.task.is_empty() {
        return Err(TaskweaveError::ConfigError(
            "config must contain at least one [task.<name>] section".to_string(),
        ));
    }
    Ok(())
}

fn validate_orchestrator_section(cfg: &RawConfigFile) -> Result<()> {
    let section = &cfg.orchestrator;

    if section.workers == 0 {
        return Err(TaskweaveError::ConfigError(
            "[orchestrator].workers must be >= 1 (got 0)".to_string(),
        ));
    }

    if section.max_iterations == 0 {
        return Err(TaskweaveError::ConfigError(
            "[orchestrator].max_iterations must be >= 1 (got 0)".to_string(),
        ));
    }

    parse_duration(&section.poll_interval).map_err(|e| {
        TaskweaveError::ConfigError(format!("[orchestrator].poll_interval: {e}"))
    })?;

    Ok(())
}

fn validate_tasks(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        if task.cmd.trim().is_empty() {
            return Err(TaskweaveError::ConfigError(format!(
                "task '{name}' has an empty `cmd`"
            )));
        }

        if let Some(timeout) = task.timeout.as_deref() {
            let after = parse_duration(timeout).map_err(|e| {
                TaskweaveError::ConfigError(format!("task '{name}' has invalid `timeout`: {e}"))
            })?;
            if after.is_zero() {
                return Err(TaskweaveError::ConfigError(format!(
                    "task '{name}' has a zero `timeout`"
                )));
            }
        }
    }
    Ok(())
}

fn validate_task_dependencies(cfg: &RawConfigFile) -> Result<()> {
    for (name, task) in cfg.task.iter() {
        for dep in task.after.iter() {
            if dep == name {
                return Err(TaskweaveError::ConfigError(format!(
                    "task '{name}' cannot depend on itself in `after`"
                )));
            }
            if !cfg.task.contains_key(dep) {
                return Err(TaskweaveError::ConfigError(format!(
                    "task '{name}' has unknown dependency '{dep}' in `after`"
                )));
            }
        }
    }
    Ok(())
}

fn validate_dag(cfg: &RawConfigFile) -> Result<()> {
    toposorted_names(&cfg.task).map(|_| ())
}

/// Task names ordered so that every task comes after its `after` entries.
///
/// Edge direction is dep -> task: `[task.B] after = ["A"]` adds `A -> B`.
pub(crate) fn toposorted_names(tasks: &BTreeMap<String, TaskConfig>) -> Result<Vec<String>> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for name in tasks.keys() {
        graph.add_node(name.as_str());
    }

    for (name, task) in tasks.iter() {
        for dep in task.after.iter() {
            graph.add_edge(dep.as_str(), name.as_str(), ());
        }
    }

    toposort(&graph, None)
        .map(|order| order.into_iter().map(str::to_string).collect())
        .map_err(|cycle| {
            TaskweaveError::DagCycle(format!(
                "cycle detected in task DAG involving task '{}'",
                cycle.node_id()
            ))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn raw(tasks: &[(&str, &[&str])]) -> RawConfigFile {
        let mut cfg = RawConfigFile::default();
        for (name, after) in tasks {
            let mut task = TaskConfig::new(format!("echo {name}"));
            task.after = after.iter().map(|s| s.to_string()).collect();
            cfg.task.insert(name.to_string(), task);
        }
        cfg
    }

    #[test]
    fn toposort_puts_dependencies_first() {
        let cfg = raw(&[("c", &["b"]), ("b", &["a"]), ("a", &[])]);
        let order = toposorted_names(&cfg.task).unwrap();
        let pos = |n: &str| order.iter().position(|x| x == n).unwrap();
        assert!(pos("a") < pos("b"));
        assert!(pos("b") < pos("c"));
    }

    #[test]
    fn self_dependency_is_rejected() {
        let cfg = raw(&[("a", &["a"])]);
        let err = ConfigFile::try_from(cfg).unwrap_err();
        assert!(matches!(err, TaskweaveError::ConfigError(msg) if msg.contains("itself")));
    }

    #[test]
    fn zero_workers_is_rejected() {
        let mut cfg = raw(&[("a", &[])]);
        cfg.orchestrator.workers = 0;
        let err = ConfigFile::try_from(cfg).unwrap_err();
        assert!(matches!(err, TaskweaveError::ConfigError(msg) if msg.contains("workers")));
    }

    #[test]
    fn bad_timeout_is_rejected() {
        let mut cfg = raw(&[("a", &[])]);
        if let Some(task) = cfg.task.get_mut("a") {
            task.timeout = Some("soon".into());
        }
        let err = ConfigFile::try_from(cfg).unwrap_err();
        assert!(matches!(err, TaskweaveError::ConfigError(msg) if msg.contains("timeout")));
    }
}
