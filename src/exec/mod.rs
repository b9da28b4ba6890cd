// src/exec/mod.rs

//! Task execution layer.
//!
//! - [`runner`] runs one task node body on the bounded task pool and
//!   reports back to the owning job via [`NodeEvent`]s.
//! - [`command`] provides [`CommandTask`], a task that runs a shell command
//!   with `tokio::process::Command`.

pub mod command;
pub mod runner;

pub use command::{CommandTask, LAST_LINE, UPSTREAM_ENV};
pub use runner::{NodeDispatch, NodeEvent, NodeReport, spawn_node};
