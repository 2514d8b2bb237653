// src/registry/graph.rs

//! Dependency-graph diagnostics over the registry's task table.
//!
//! The registry accepts any dependency set at creation time (a dependency
//! may name a task that is registered later), so cycles and dangling
//! references are only detected here, on demand.

use std::collections::{HashMap, HashSet};

use petgraph::algo::tarjan_scc;
use petgraph::graphmap::DiGraphMap;

use crate::registry::record::TaskRecord;
use crate::types::{TaskId, TaskStatus};

/// Find one dependency cycle among non-terminal tasks.
///
/// Edge direction is `dependency -> dependent`. Returns the ids of the
/// strongly connected component in creation order, or `None` if the graph
/// is acyclic.
pub(crate) fn find_cycle(tasks: &HashMap<TaskId, TaskRecord>) -> Option<Vec<TaskId>> {
    let mut graph: DiGraphMap<&str, ()> = DiGraphMap::new();

    for (id, record) in tasks {
        if record.status.is_terminal() {
            continue;
        }
        graph.add_node(id.as_str());
        for dep in &record.dependencies {
            let live = tasks
                .get(dep)
                .is_some_and(|d| !d.status.is_terminal());
            if live {
                graph.add_edge(dep.as_str(), id.as_str(), ());
            }
        }
    }

    let cycle = tarjan_scc(&graph).into_iter().find(|component| {
        component.len() > 1
            || component
                .first()
                .is_some_and(|node| graph.contains_edge(*node, *node))
    })?;

    let mut ids: Vec<&TaskRecord> = cycle.iter().filter_map(|id| tasks.get(*id)).collect();
    ids.sort_by_key(|r| r.seq);
    Some(ids.into_iter().map(|r| r.id.clone()).collect())
}

/// Pending tasks that can never become ready.
///
/// A pending task is blocked when one of its dependencies is unknown,
/// failed, cancelled, part of a cycle, or itself blocked.
pub(crate) fn blocked_ids(tasks: &HashMap<TaskId, TaskRecord>) -> HashSet<TaskId> {
    let mut blocked: HashSet<TaskId> = find_cycle(tasks)
        .map(|ids| ids.into_iter().collect())
        .unwrap_or_default();

    loop {
        let newly: Vec<TaskId> = tasks
            .values()
            .filter(|r| r.status == TaskStatus::Pending && !blocked.contains(&r.id))
            .filter(|r| {
                r.dependencies.iter().any(|dep| match tasks.get(dep) {
                    None => true,
                    Some(d) => {
                        matches!(d.status, TaskStatus::Failed | TaskStatus::Cancelled)
                            || blocked.contains(dep)
                    }
                })
            })
            .map(|r| r.id.clone())
            .collect();

        if newly.is_empty() {
            break;
        }
        blocked.extend(newly);
    }

    blocked
}
