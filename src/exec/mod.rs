// src/exec/mod.rs

//! Process execution layer.
//!
//! [`ShellTask`] is the callable used for tasks declared in a workflow file:
//! it runs the task's `cmd` with `tokio::process::Command`.

pub mod shell;

pub use shell::ShellTask;
