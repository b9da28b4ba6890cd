// src/engine/listener.rs

//! Observer hooks for job completion and task state changes.
//!
//! Both traits are implemented for plain closures, so most callers never
//! name them:
//!
//! ```
//! use std::sync::Arc;
//! use jobgraph::engine::{JobCompletionListener, JobSnapshot};
//!
//! let listener: Arc<dyn JobCompletionListener> =
//!     Arc::new(|job: &JobSnapshot| println!("{job} finished"));
//! # let _ = listener;
//! ```

use std::fmt;

use crate::engine::snapshot::{JobSnapshot, TaskSnapshot};

/// Called once, off the scheduling loop, after a job reaches COMPLETED.
pub trait JobCompletionListener: Send + Sync {
    fn completed(&self, job: &JobSnapshot);
}

impl<F> JobCompletionListener for F
where
    F: Fn(&JobSnapshot) + Send + Sync,
{
    fn completed(&self, job: &JobSnapshot) {
        self(job)
    }
}

/// Called, off the scheduling loop, whenever a task's state or status
/// changes.
pub trait TaskChangeListener: Send + Sync {
    fn task_changed(&self, task: &TaskSnapshot);
}

impl<F> TaskChangeListener for F
where
    F: Fn(&TaskSnapshot) + Send + Sync,
{
    fn task_changed(&self, task: &TaskSnapshot) {
        self(task)
    }
}

/// Handle returned when registering an engine-wide listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}
