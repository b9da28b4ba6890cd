// src/engine/mod.rs

//! Job execution engine.
//!
//! - [`job_engine`] holds the job and task pools and accepts submissions.
//! - [`job`] drives one task graph from Start to End.
//! - [`guard`] is the pure decision of what happens to a successor when
//!   one of its predecessors completes.
//! - [`listener`] and [`store`] are the observation and persistence hooks;
//!   both receive the value types from [`snapshot`].

pub mod guard;
pub mod job;
pub mod job_engine;
pub mod listener;
pub mod snapshot;
pub mod store;

pub use guard::GuardDecision;
pub use job::{Job, JobRunner, TASK_FAILURE_REASON};
pub use job_engine::{DEADLOCK_ABORT_REASON, JobEngine, SHUTDOWN_ABORT_REASON, SubmitOptions};
pub use listener::{JobCompletionListener, ListenerId, TaskChangeListener};
pub use snapshot::{JobId, JobSnapshot, TaskSnapshot};
pub use store::{InMemoryStore, JobStore};
