// src/engine/store.rs

//! Persistence hook.
//!
//! A [`JobStore`] mirrors job and task state somewhere durable. Every hook
//! is best effort: errors from state-transition hooks are logged and
//! dropped. The one exception is [`JobStore::graph_updated`] after a
//! MetaTask expansion, whose failure fails the MetaTask node.
//!
//! `graph_updated` runs while the job's state is locked and must not call
//! back into the [`Job`](crate::engine::Job).

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::bail;
use parking_lot::Mutex;

use crate::engine::snapshot::{JobId, JobSnapshot, TaskSnapshot};

pub trait JobStore: Send + Sync {
    /// Job accepted by the engine.
    fn job_created(&self, job: &JobSnapshot) -> anyhow::Result<()>;

    /// Job state, status or failure reason changed.
    fn job_updated(&self, job: &JobSnapshot) -> anyhow::Result<()>;

    /// Task state or status changed.
    fn task_updated(&self, job: JobId, task: &TaskSnapshot) -> anyhow::Result<()>;

    /// Graph shape changed after a MetaTask expansion.
    fn graph_updated(&self, job: &JobSnapshot) -> anyhow::Result<()>;
}

/// Store that keeps the latest snapshot per job in memory.
#[derive(Debug, Default)]
pub struct InMemoryStore {
    jobs: Mutex<HashMap<JobId, JobSnapshot>>,
    task_updates: Mutex<Vec<(JobId, TaskSnapshot)>>,
    graph_updates: Mutex<Vec<JobId>>,
    fail_graph_updates: AtomicBool,
}

impl InMemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later `graph_updated` call fail.
    pub fn fail_graph_updates(&self, fail: bool) {
        self.fail_graph_updates.store(fail, Ordering::SeqCst);
    }

    pub fn job(&self, id: JobId) -> Option<JobSnapshot> {
        self.jobs.lock().get(&id).cloned()
    }

    /// Every task update seen so far, oldest first.
    pub fn task_updates(&self) -> Vec<(JobId, TaskSnapshot)> {
        self.task_updates.lock().clone()
    }

    pub fn graph_update_count(&self, id: JobId) -> usize {
        self.graph_updates.lock().iter().filter(|j| **j == id).count()
    }
}

impl JobStore for InMemoryStore {
    fn job_created(&self, job: &JobSnapshot) -> anyhow::Result<()> {
        self.jobs.lock().insert(job.id, job.clone());
        Ok(())
    }

    fn job_updated(&self, job: &JobSnapshot) -> anyhow::Result<()> {
        self.jobs.lock().insert(job.id, job.clone());
        Ok(())
    }

    fn task_updated(&self, job: JobId, task: &TaskSnapshot) -> anyhow::Result<()> {
        self.task_updates.lock().push((job, task.clone()));
        Ok(())
    }

    fn graph_updated(&self, job: &JobSnapshot) -> anyhow::Result<()> {
        if self.fail_graph_updates.load(Ordering::SeqCst) {
            bail!("graph update rejected for job {}", job.id);
        }
        self.graph_updates.lock().push(job.id);
        self.jobs.lock().insert(job.id, job.clone());
        Ok(())
    }
}
