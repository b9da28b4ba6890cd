// src/dag/task_node.rs

//! Per-task execution record held by a [`TaskGraph`](crate::dag::TaskGraph).

use std::collections::{BTreeSet, HashMap};
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::{DateTime, Utc};

use crate::task::{OutputValue, TaskRef};
use crate::types::{TaskGuard, TaskState, TaskStatus};

static NEXT_TASK_ID: AtomicU64 = AtomicU64::new(1);

/// Process-unique identity of a task node.
///
/// A task imported into another graph gets a fresh node and therefore a
/// fresh id; the [`TaskRef`] stays the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TaskId(u64);

impl TaskId {
    pub(crate) fn next() -> Self {
        TaskId(NEXT_TASK_ID.fetch_add(1, Ordering::Relaxed))
    }

    pub fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TaskId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A task plus everything the scheduler tracks about one execution of it.
#[derive(Debug)]
pub struct TaskNode {
    id: TaskId,
    task: TaskRef,
    guard: TaskGuard,
    state: TaskState,
    status: TaskStatus,
    failure_reason: Option<String>,
    queued_at: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    outputs: HashMap<String, OutputValue>,
    /// MetaTask node whose expansion created this node.
    producer: Option<TaskId>,
    /// Nodes created by this node's expansion.
    children: BTreeSet<TaskId>,
}

impl TaskNode {
    pub(crate) fn new(task: TaskRef, guard: TaskGuard) -> Self {
        Self {
            id: TaskId::next(),
            task,
            guard,
            state: TaskState::NotRunning,
            status: TaskStatus::Passed,
            failure_reason: None,
            queued_at: None,
            started_at: None,
            completed_at: None,
            outputs: HashMap::new(),
            producer: None,
            children: BTreeSet::new(),
        }
    }

    /// Fresh, not-yet-run copy of `other` for import into another graph.
    pub(crate) fn imported_from(other: &TaskNode) -> Self {
        let mut node = Self::new(other.task.clone(), other.guard);
        node.producer = other.producer;
        node
    }

    pub fn id(&self) -> TaskId {
        self.id
    }

    pub fn task(&self) -> &TaskRef {
        &self.task
    }

    pub fn name(&self) -> String {
        self.task.safe_name()
    }

    pub fn guard(&self) -> TaskGuard {
        self.guard
    }

    pub(crate) fn set_guard(&mut self, guard: TaskGuard) {
        self.guard = guard;
    }

    pub fn state(&self) -> TaskState {
        self.state
    }

    pub fn status(&self) -> TaskStatus {
        self.status
    }

    pub fn failure_reason(&self) -> Option<&str> {
        self.failure_reason.as_deref()
    }

    pub fn queued_at(&self) -> Option<DateTime<Utc>> {
        self.queued_at
    }

    pub fn started_at(&self) -> Option<DateTime<Utc>> {
        self.started_at
    }

    pub fn completed_at(&self) -> Option<DateTime<Utc>> {
        self.completed_at
    }

    pub fn producer(&self) -> Option<TaskId> {
        self.producer
    }

    pub fn children(&self) -> impl Iterator<Item = TaskId> + '_ {
        self.children.iter().copied()
    }

    pub fn output(&self, name: &str) -> Option<&OutputValue> {
        self.outputs.get(name)
    }

    pub fn output_names(&self) -> impl Iterator<Item = &str> {
        self.outputs.keys().map(|k| k.as_str())
    }

    /// Move to `state`, stamping the matching timestamp with `at`.
    ///
    /// Returns `false` if the node was already in `state`.
    pub(crate) fn set_state_at(&mut self, state: TaskState, at: DateTime<Utc>) -> bool {
        if self.state == state {
            return false;
        }
        self.state = state;
        match state {
            TaskState::Queued => self.queued_at = Some(at),
            TaskState::Running => self.started_at = Some(at),
            TaskState::Completed => self.completed_at = Some(at),
            TaskState::NotRunning | TaskState::Pending => {}
        }
        true
    }

    pub(crate) fn set_state(&mut self, state: TaskState) -> bool {
        self.set_state_at(state, Utc::now())
    }

    /// Returns `false` if the node already had `status`.
    pub(crate) fn set_status(&mut self, status: TaskStatus, reason: Option<String>) -> bool {
        if self.status == status {
            return false;
        }
        self.status = status;
        self.failure_reason = reason;
        true
    }

    pub(crate) fn record_outputs(&mut self, outputs: HashMap<String, OutputValue>) {
        self.outputs.extend(outputs);
    }

    pub(crate) fn set_producer(&mut self, producer: TaskId) {
        self.producer = Some(producer);
    }

    pub(crate) fn add_child(&mut self, child: TaskId) {
        self.children.insert(child);
    }
}

impl fmt::Display for TaskNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "TaskNode [task={}, state={}, status={}, guard={}]",
            self.name(),
            self.state,
            self.status,
            self.guard
        )
    }
}
