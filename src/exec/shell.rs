// src/exec/shell.rs

//! Shell command callable.

use std::process::Stdio;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncReadExt, BufReader};
use tokio::process::Command;
use tracing::{debug, info};

use crate::orchestrator::{TaskContext, TaskFn};

/// Runs `cmd` through the platform shell.
///
/// - Stdout is captured and returned as `{"stdout": ..., "exit_code": 0}`.
/// - Stderr is consumed line by line and logged at debug.
/// - A non-zero exit status is an error carrying the exit code.
/// - String entries of `args.env` are added to the child environment.
///
/// The child is killed when the task is cancelled or times out, since the
/// orchestrator drops this future and the process is `kill_on_drop`.
#[derive(Debug, Clone)]
pub struct ShellTask {
    name: String,
    cmd: String,
}

impl ShellTask {
    pub fn new(name: impl Into<String>, cmd: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            cmd: cmd.into(),
        }
    }

    fn command(&self) -> Command {
        if cfg!(windows) {
            let mut c = Command::new("cmd");
            c.arg("/C").arg(&self.cmd);
            c
        } else {
            let mut c = Command::new("sh");
            c.arg("-c").arg(&self.cmd);
            c
        }
    }
}

#[async_trait]
impl TaskFn for ShellTask {
    async fn run(&self, ctx: TaskContext) -> Result<Value> {
        info!(task = %self.name, cmd = %self.cmd, "starting task process");

        let mut cmd = self.command();
        if let Some(env) = ctx.args.get("env").and_then(Value::as_object) {
            for (key, value) in env {
                if let Some(value) = value.as_str() {
                    cmd.env(key, value);
                }
            }
        }
        cmd.stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);

        let mut child = cmd
            .spawn()
            .with_context(|| format!("spawning process for task '{}'", self.name))?;

        if let Some(stderr) = child.stderr.take() {
            let name = self.name.clone();
            tokio::spawn(async move {
                let mut lines = BufReader::new(stderr).lines();
                while let Ok(Some(line)) = lines.next_line().await {
                    debug!(task = %name, "stderr: {}", line);
                }
            });
        }

        let mut stdout = String::new();
        if let Some(mut out) = child.stdout.take() {
            out.read_to_string(&mut stdout)
                .await
                .with_context(|| format!("reading stdout of task '{}'", self.name))?;
        }

        let status = child
            .wait()
            .await
            .with_context(|| format!("waiting for process of task '{}'", self.name))?;
        let code = status.code().unwrap_or(-1);

        info!(
            task = %self.name,
            exit_code = code,
            success = status.success(),
            "task process exited"
        );

        if !status.success() {
            bail!("command `{}` exited with status {code}", self.cmd);
        }

        Ok(json!({ "stdout": stdout, "exit_code": code }))
    }
}
