// src/engine/guard.rs

//! Pure successor evaluation.
//!
//! When a node completes, the job asks this module what to do with each of
//! its successors. The decision only reads the graph; applying it (queueing,
//! marking PENDING or SKIPPED) is the job's business.

use crate::dag::{TaskGraph, TaskId};
use crate::types::{TaskGuard, TaskState};

/// What the scheduler should do with a successor of a completed node.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GuardDecision {
    /// Already queued, running or completed. Nothing to do.
    Ignore,
    /// Some direct predecessor is not terminal yet; mark the node PENDING.
    Wait,
    /// Hand the node to the task pool.
    Dispatch,
    /// The guard rejected the node; mark it SKIPPED and complete it.
    Skip,
}

/// Decide what happens to `id` now that one of its predecessors completed.
///
/// Unknown ids are ignored.
pub fn evaluate(graph: &TaskGraph, id: TaskId) -> GuardDecision {
    let Some(node) = graph.node(id) else {
        return GuardDecision::Ignore;
    };

    match node.state() {
        TaskState::Queued | TaskState::Running | TaskState::Completed => {
            return GuardDecision::Ignore;
        }
        TaskState::NotRunning | TaskState::Pending => {}
    }

    let predecessors = graph.predecessors(id);
    if !all_terminal(graph, predecessors.iter().copied()) {
        return GuardDecision::Wait;
    }

    let allowed = match node.guard() {
        TaskGuard::AllPredecessorsCompleted => true,
        TaskGuard::AllPredecessorsSucceeded => all_successful(graph, predecessors),
        TaskGuard::AllAncestorsSucceeded => all_successful(graph, graph.ancestors(id)),
    };

    if allowed {
        GuardDecision::Dispatch
    } else {
        GuardDecision::Skip
    }
}

fn all_terminal(graph: &TaskGraph, ids: impl IntoIterator<Item = TaskId>) -> bool {
    ids.into_iter()
        .all(|id| graph.node(id).is_some_and(|n| n.state().is_terminal()))
}

fn all_successful(graph: &TaskGraph, ids: impl IntoIterator<Item = TaskId>) -> bool {
    ids.into_iter()
        .all(|id| graph.node(id).is_some_and(|n| n.status().is_successful()))
}
