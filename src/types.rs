// src/types.rs

//! Lifecycle and outcome enumerations shared by tasks and jobs.

use std::fmt;

use serde::Deserialize;

/// Execution lifecycle of a single task node.
///
/// `NotRunning -> Queued -> (Pending) -> Running -> Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TaskState {
    #[default]
    NotRunning,
    /// Handed to the task pool, not yet started.
    Queued,
    /// Waiting on a predecessor that has not reached a terminal state.
    Pending,
    Running,
    Completed,
}

impl TaskState {
    pub fn is_terminal(self) -> bool {
        matches!(self, TaskState::Completed)
    }

    pub fn is_running(self) -> bool {
        matches!(self, TaskState::Running)
    }
}

/// Outcome of a task node. Only meaningful once the node is `Completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum TaskStatus {
    #[default]
    Passed,
    Failed,
    Skipped,
    Aborted,
}

impl TaskStatus {
    pub fn is_successful(self) -> bool {
        matches!(self, TaskStatus::Passed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum JobState {
    #[default]
    NotRunning,
    Queued,
    Running,
    Completed,
}

impl JobState {
    pub fn is_terminal(self) -> bool {
        matches!(self, JobState::Completed)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum JobStatus {
    #[default]
    Passed,
    Failed,
    Aborted,
}

impl JobStatus {
    pub fn is_successful(self) -> bool {
        matches!(self, JobStatus::Passed)
    }
}

/// Conditional-execution policy evaluated once all direct predecessors of a
/// task are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskGuard {
    /// Run regardless of how the predecessors ended.
    #[default]
    AllPredecessorsCompleted,
    /// Run only if every direct predecessor passed; otherwise skip.
    AllPredecessorsSucceeded,
    /// Run only if every transitive ancestor passed; otherwise skip.
    AllAncestorsSucceeded,
}

macro_rules! screaming_display {
    ($ty:ty { $($variant:ident => $text:literal),+ $(,)? }) => {
        impl fmt::Display for $ty {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                let text = match self {
                    $(Self::$variant => $text),+
                };
                f.pad(text)
            }
        }
    };
}

screaming_display!(TaskState {
    NotRunning => "NOT_RUNNING",
    Queued => "QUEUED",
    Pending => "PENDING",
    Running => "RUNNING",
    Completed => "COMPLETED",
});

screaming_display!(TaskStatus {
    Passed => "PASSED",
    Failed => "FAILED",
    Skipped => "SKIPPED",
    Aborted => "ABORTED",
});

screaming_display!(JobState {
    NotRunning => "NOT_RUNNING",
    Queued => "QUEUED",
    Running => "RUNNING",
    Completed => "COMPLETED",
});

screaming_display!(JobStatus {
    Passed => "PASSED",
    Failed => "FAILED",
    Aborted => "ABORTED",
});

screaming_display!(TaskGuard {
    AllPredecessorsCompleted => "ALL_PREDECESSORS_COMPLETED",
    AllPredecessorsSucceeded => "ALL_PREDECESSORS_SUCCEEDED",
    AllAncestorsSucceeded => "ALL_ANCESTORS_SUCCEEDED",
});
