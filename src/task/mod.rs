// src/task/mod.rs

//! Interfaces implemented by the units of work a job runs.
//!
//! - [`Task`] is the basic unit: a name, an async body, the objects it
//!   touches and the named values it consumes/produces.
//! - [`MetaTask`] is a task whose body produces another [`TaskGraph`] that
//!   is spliced into the running job right after it.
//! - [`UnlockTask`] marks tasks that release domain locks. The engine does
//!   not understand locking; it only uses these to force the release when a
//!   job is torn down and to estimate lock overlap between jobs.
//! - [`TaskRef`] is the shared, identity-compared handle graphs are built
//!   from.

pub mod lock;
pub mod ports;
pub mod task_ref;

use futures::future::BoxFuture;

use crate::dag::TaskGraph;

pub use lock::{LockObjectReference, ObjectType};
pub use ports::{DataKey, OutputValue, TaskContext, TaskPorts};
pub use task_ref::TaskRef;

/// A unit of work scheduled by a [`Job`](crate::engine::Job).
///
/// `execute` runs on the task pool. Errors are recorded on the task node as
/// a failure and never abort the job by themselves.
pub trait Task: Send + Sync + 'static {
    fn name(&self) -> String;

    fn execute<'a>(&'a self, ctx: &'a mut TaskContext) -> BoxFuture<'a, anyhow::Result<()>>;

    /// Objects this task touches. Recorded on every task snapshot, so it
    /// reaches listeners and the job store.
    fn lock_objects(&self) -> Vec<LockObjectReference> {
        Vec::new()
    }

    /// Named inputs resolved from upstream outputs, and named outputs this
    /// task records for downstream tasks.
    fn ports(&self) -> TaskPorts {
        TaskPorts::default()
    }

    fn as_meta(&self) -> Option<&dyn MetaTask> {
        None
    }

    fn as_unlock(&self) -> Option<&dyn UnlockTask> {
        None
    }
}

/// A task that expands the job graph at runtime.
pub trait MetaTask: Task {
    /// Read right after a successful `execute`. `None` or an empty graph
    /// leaves the job graph untouched.
    fn task_graph(&self) -> Option<TaskGraph>;
}

/// A task whose side effect releases one or more domain locks.
pub trait UnlockTask: Task {
    /// Lock references this task releases.
    fn lock_references(&self) -> Vec<LockObjectReference>;

    /// Release the locks without going through `execute`.
    ///
    /// Called after the job's state is unlocked, so it may call back into
    /// the [`Job`](crate::engine::Job).
    fn release(&self);
}
