// src/orchestrator/mod.rs

//! Binding callables to registry tasks and executing them.

mod callable;
mod core;
mod definition;
mod observer;
mod pool;

pub use callable::{FnTask, TaskContext, TaskFn, TaskRef};
pub use core::{BatchResults, DEFAULT_POOL_SIZE, Orchestrator, RunOptions, RunReport};
pub use definition::TaskDefinition;
pub use pool::WorkerPool;
