// src/engine/snapshot.rs

//! Point-in-time copies of job and task state.
//!
//! Listeners and stores receive snapshots rather than live references so
//! they never observe the graph while the scheduling loop mutates it.

use std::fmt;

use chrono::{DateTime, Utc};

use crate::dag::{TaskId, TaskNode};
use crate::task::LockObjectReference;
use crate::types::{JobState, JobStatus, TaskGuard, TaskState, TaskStatus};

/// Engine-assigned job identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct JobId(pub(crate) u64);

impl JobId {
    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TaskSnapshot {
    pub id: TaskId,
    pub name: String,
    pub guard: TaskGuard,
    pub state: TaskState,
    pub status: TaskStatus,
    pub failure_reason: Option<String>,
    pub queued_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// MetaTask node whose expansion created this task.
    pub producer: Option<TaskId>,
    /// Objects the task touches.
    pub lock_objects: Vec<LockObjectReference>,
}

impl From<&TaskNode> for TaskSnapshot {
    fn from(node: &TaskNode) -> Self {
        Self {
            id: node.id(),
            name: node.name(),
            guard: node.guard(),
            state: node.state(),
            status: node.status(),
            failure_reason: node.failure_reason().map(str::to_string),
            queued_at: node.queued_at(),
            started_at: node.started_at(),
            completed_at: node.completed_at(),
            producer: node.producer(),
            lock_objects: node.task().safe_lock_objects(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct JobSnapshot {
    pub id: JobId,
    pub name: String,
    pub state: JobState,
    pub status: JobStatus,
    pub failure_reason: Option<String>,
    pub queued_at: Option<DateTime<Utc>>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    /// Objects supplied at submission.
    pub lock_objects: Vec<LockObjectReference>,
    /// Tasks in dependency order, sentinels excluded.
    pub tasks: Vec<TaskSnapshot>,
}

impl JobSnapshot {
    /// First task with the given name.
    pub fn task(&self, name: &str) -> Option<&TaskSnapshot> {
        self.tasks.iter().find(|t| t.name == name)
    }

    /// Position of the named task in `tasks`.
    pub fn position(&self, name: &str) -> Option<usize> {
        self.tasks.iter().position(|t| t.name == name)
    }
}

impl fmt::Display for JobSnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Job [id={}, name={}, state={}, status={}]",
            self.id, self.name, self.state, self.status
        )
    }
}
