// src/task/task_ref.rs

use std::fmt;
use std::hash::{Hash, Hasher};
use std::ops::Deref;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;

use tracing::error;

use crate::task::{LockObjectReference, Task};

/// Placeholder reported when a task's `name()` panics.
pub const UNNAMED_TASK: &str = "** Fail to generate Task Name **";

/// Shared handle to a task.
///
/// Equality and hashing use the identity of the underlying allocation: two
/// handles are equal only if they were cloned from the same `TaskRef`. The
/// same handle can be placed in several graphs; merging graphs matches
/// nodes by this identity.
#[derive(Clone)]
pub struct TaskRef(Arc<dyn Task>);

impl TaskRef {
    pub fn new<T: Task>(task: T) -> Self {
        Self(Arc::new(task))
    }

    pub fn from_arc(task: Arc<dyn Task>) -> Self {
        Self(task)
    }

    pub fn task(&self) -> &dyn Task {
        self.0.as_ref()
    }

    /// The task's name, or [`UNNAMED_TASK`] if producing it panics.
    pub fn safe_name(&self) -> String {
        match catch_unwind(AssertUnwindSafe(|| self.0.name())) {
            Ok(name) => name,
            Err(_) => {
                error!("failed to get task name");
                UNNAMED_TASK.to_string()
            }
        }
    }

    /// The objects the task touches; empty if producing them panics.
    pub fn safe_lock_objects(&self) -> Vec<LockObjectReference> {
        catch_unwind(AssertUnwindSafe(|| self.0.lock_objects())).unwrap_or_else(|_| {
            error!(task = %self.safe_name(), "failed to get task lock objects");
            Vec::new()
        })
    }

    fn addr(&self) -> *const () {
        Arc::as_ptr(&self.0) as *const ()
    }
}

impl Deref for TaskRef {
    type Target = dyn Task;

    fn deref(&self) -> &Self::Target {
        self.0.as_ref()
    }
}

impl PartialEq for TaskRef {
    fn eq(&self, other: &Self) -> bool {
        self.addr() == other.addr()
    }
}

impl Eq for TaskRef {}

impl Hash for TaskRef {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.addr().hash(state);
    }
}

impl fmt::Debug for TaskRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("TaskRef").field(&self.safe_name()).finish()
    }
}
