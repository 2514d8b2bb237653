#![allow(dead_code)]

use taskweave::config::{ConfigFile, RawConfigFile, TaskConfig};
use taskweave::types::{ExecutionMode, Priority};

/// Builder for `ConfigFile` to simplify test setup.
pub struct ConfigFileBuilder {
    config: RawConfigFile,
}

impl ConfigFileBuilder {
    pub fn new() -> Self {
        Self {
            config: RawConfigFile::default(),
        }
    }

    pub fn with_task(mut self, name: &str, task: TaskConfig) -> Self {
        self.config.task.insert(name.to_string(), task);
        self
    }

    pub fn workers(mut self, workers: usize) -> Self {
        self.config.orchestrator.workers = workers;
        self
    }

    pub fn max_iterations(mut self, max_iterations: usize) -> Self {
        self.config.orchestrator.max_iterations = max_iterations;
        self
    }

    pub fn poll_interval(mut self, interval: &str) -> Self {
        self.config.orchestrator.poll_interval = interval.to_string();
        self
    }

    /// Unvalidated config, for exercising validation failures.
    pub fn build_raw(self) -> RawConfigFile {
        self.config
    }

    pub fn build(self) -> ConfigFile {
        ConfigFile::try_from(self.config).expect("Failed to build valid config from builder")
    }
}

impl Default for ConfigFileBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// Builder for `TaskConfig`.
pub struct TaskConfigBuilder {
    task: TaskConfig,
}

impl TaskConfigBuilder {
    pub fn new(cmd: &str) -> Self {
        Self {
            task: TaskConfig::new(cmd),
        }
    }

    pub fn after(mut self, dep: &str) -> Self {
        self.task.after.push(dep.to_string());
        self
    }

    pub fn priority(mut self, priority: Priority) -> Self {
        self.task.priority = priority;
        self
    }

    pub fn parallel(mut self) -> Self {
        self.task.mode = ExecutionMode::Parallel;
        self
    }

    pub fn worker(mut self, worker: &str) -> Self {
        self.task.worker = Some(worker.to_string());
        self
    }

    pub fn timeout(mut self, timeout: &str) -> Self {
        self.task.timeout = Some(timeout.to_string());
        self
    }

    pub fn env(mut self, key: &str, value: &str) -> Self {
        self.task.env.insert(key.to_string(), value.to_string());
        self
    }

    pub fn build(self) -> TaskConfig {
        self.task
    }
}
