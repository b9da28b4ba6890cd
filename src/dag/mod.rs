// src/dag/mod.rs

//! Graph representation of a job.
//!
//! - [`graph`] is a generic directed graph with traversal helpers.
//! - [`task_node`] is the per-task execution record and its id type.
//! - [`task_graph`] wraps a [`Graph`] of task ids between a Start and an
//!   End sentinel and provides the builder operations jobs are made of.

pub mod graph;
pub mod task_graph;
pub mod task_node;

pub use graph::{Graph, NodeVisitor, Preorder};
pub use task_graph::TaskGraph;
pub use task_node::{TaskId, TaskNode};
