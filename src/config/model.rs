// src/config/model.rs

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::time::Duration;

use serde::Deserialize;

use crate::errors::{JobGraphError, Result};
use crate::types::TaskGuard;

pub const JOB_POOL_SIZE_ENV: &str = "JOBGRAPH_JOB_POOL_SIZE";
pub const TASK_POOL_SIZE_ENV: &str = "JOBGRAPH_TASK_POOL_SIZE";

/// Top-level configuration as read from a TOML file.
///
/// ```toml
/// [engine]
/// job_pool_size = 10
/// task_pool_size = 40
///
/// [task.build]
/// cmd = "make"
///
/// [task.test]
/// cmd = "make test"
/// after = ["build"]
/// ```
///
/// Every section is optional at parse time; validation requires at least
/// one task.
#[derive(Debug, Clone, Deserialize)]
pub struct RawConfigFile {
    #[serde(default)]
    pub engine: EngineConfig,

    /// All tasks from `[task.<name>]`, keyed by task name.
    #[serde(default)]
    pub task: BTreeMap<String, TaskConfig>,
}

/// A configuration that passed validation.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    engine: EngineConfig,
    task: BTreeMap<String, TaskConfig>,
}

impl ConfigFile {
    pub(crate) fn new_unchecked(engine: EngineConfig, task: BTreeMap<String, TaskConfig>) -> Self {
        Self { engine, task }
    }

    pub fn engine(&self) -> &EngineConfig {
        &self.engine
    }

    pub fn tasks(&self) -> &BTreeMap<String, TaskConfig> {
        &self.task
    }
}

/// `[engine]` section: pool sizes and shutdown behaviour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct EngineConfig {
    /// Jobs whose scheduling loops may run at once.
    #[serde(default = "default_job_pool_size")]
    pub job_pool_size: usize,

    /// Task bodies that may run at once, across all jobs.
    #[serde(default = "default_task_pool_size")]
    pub task_pool_size: usize,

    /// How long `shutdown` waits for aborted jobs to wind down.
    #[serde(default = "default_shutdown_timeout_secs")]
    pub shutdown_timeout_secs: u64,
}

fn default_job_pool_size() -> usize {
    10
}

fn default_task_pool_size() -> usize {
    40
}

fn default_shutdown_timeout_secs() -> u64 {
    60
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            job_pool_size: default_job_pool_size(),
            task_pool_size: default_task_pool_size(),
            shutdown_timeout_secs: default_shutdown_timeout_secs(),
        }
    }
}

impl EngineConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_secs(self.shutdown_timeout_secs)
    }

    /// Apply `JOBGRAPH_JOB_POOL_SIZE` / `JOBGRAPH_TASK_POOL_SIZE` from
    /// `lookup`. Unset variables leave the value alone.
    pub fn with_env_overrides(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self> {
        if let Some(size) = parse_pool_size(&lookup, JOB_POOL_SIZE_ENV)? {
            self.job_pool_size = size;
        }
        if let Some(size) = parse_pool_size(&lookup, TASK_POOL_SIZE_ENV)? {
            self.task_pool_size = size;
        }
        Ok(self)
    }
}

fn parse_pool_size(lookup: &impl Fn(&str) -> Option<String>, var: &str) -> Result<Option<usize>> {
    let Some(value) = lookup(var) else {
        return Ok(None);
    };
    value.trim().parse::<usize>().map(Some).map_err(|err| {
        JobGraphError::ConfigError(format!("{var} must be a positive integer (got {value:?}): {err}"))
    })
}

/// `[task.<name>]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct TaskConfig {
    /// The command to execute.
    pub cmd: String,

    /// Tasks that must complete before this one.
    #[serde(default)]
    pub after: Vec<String>,

    /// When to run once the `after` tasks are done. Defaults to
    /// `all_predecessors_succeeded`.
    #[serde(default)]
    pub guard: Option<TaskGuard>,

    /// Working directory for the command.
    #[serde(default)]
    pub cwd: Option<PathBuf>,
}

impl TaskConfig {
    pub fn effective_guard(&self) -> TaskGuard {
        self.guard.unwrap_or(TaskGuard::AllPredecessorsSucceeded)
    }
}
