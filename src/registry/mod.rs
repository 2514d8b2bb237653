// src/registry/mod.rs

//! Task registry: authoritative task state and the dependency graph.
//!
//! - [`record`] holds the creation request and the per-task status record.
//! - [`store`] contains the thread-safe [`TaskRegistry`] state machine.
//! - [`graph`] provides cycle / blocked-task diagnostics.

pub mod graph;
pub mod record;
pub mod store;

pub use record::{TaskRecord, TaskSpec};
pub use store::TaskRegistry;
