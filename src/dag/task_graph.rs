// src/dag/task_graph.rs

//! Task graphs: the workflow shape a job executes.
//!
//! Every [`TaskGraph`] carries two no-op sentinel nodes, Start and End.
//! All builder operations keep the following true:
//!
//! - Start has no incoming edges.
//! - every node is reachable from Start and reaches End.
//! - a graph with no tasks has a single Start -> End edge.
//!
//! Graphs are not checked for cycles; callers must not wire a task after
//! one of its own descendants.

use std::collections::{HashMap, HashSet};
use std::fmt;

use futures::future::BoxFuture;
use tracing::debug;

use crate::dag::graph::Graph;
use crate::dag::task_node::{TaskId, TaskNode};
use crate::errors::{JobGraphError, Result};
use crate::task::{OutputValue, Task, TaskContext, TaskRef};
use crate::types::TaskGuard;

/// No-op body shared by the Start and End sentinels.
struct Sentinel(&'static str);

impl Task for Sentinel {
    fn name(&self) -> String {
        self.0.to_string()
    }

    fn execute<'a>(&'a self, _ctx: &'a mut TaskContext) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async { Ok(()) })
    }
}

#[derive(Debug)]
pub struct TaskGraph {
    graph: Graph<TaskId>,
    nodes: HashMap<TaskId, TaskNode>,
    start: TaskId,
    end: TaskId,
}

impl Default for TaskGraph {
    fn default() -> Self {
        Self::new()
    }
}

impl TaskGraph {
    pub fn new() -> Self {
        let start = TaskNode::new(
            TaskRef::new(Sentinel("Start")),
            TaskGuard::AllPredecessorsCompleted,
        );
        let end = TaskNode::new(
            TaskRef::new(Sentinel("End")),
            TaskGuard::AllPredecessorsCompleted,
        );
        let (start_id, end_id) = (start.id(), end.id());

        let mut graph = Graph::new();
        graph.add_edge(start_id, end_id);

        let mut nodes = HashMap::new();
        nodes.insert(start_id, start);
        nodes.insert(end_id, end);

        Self {
            graph,
            nodes,
            start: start_id,
            end: end_id,
        }
    }

    /// Add `task` as a new parallel branch off Start.
    ///
    /// The task runs only if Start succeeded, which it always does.
    pub fn add_task(&mut self, task: TaskRef) -> Result<TaskId> {
        self.add_task_with_guard(task, TaskGuard::AllPredecessorsSucceeded, &[])
    }

    /// Add `task` after each of `predecessors`; it runs only if all of them
    /// succeeded.
    pub fn add_task_after(&mut self, task: TaskRef, predecessors: &[&TaskRef]) -> Result<TaskId> {
        self.add_task_with_guard(task, TaskGuard::AllPredecessorsSucceeded, predecessors)
    }

    /// Add `task` after each of `predecessors` (Start if empty) with an
    /// explicit guard.
    ///
    /// A predecessor that was a leaf loses its direct edge to End. The new
    /// task is wired to End until something is chained after it.
    pub fn add_task_with_guard(
        &mut self,
        task: TaskRef,
        guard: TaskGuard,
        predecessors: &[&TaskRef],
    ) -> Result<TaskId> {
        if self.task_id(&task).is_some() {
            return Err(JobGraphError::DuplicateTask(task.safe_name()));
        }

        let predecessor_ids = if predecessors.is_empty() {
            vec![self.start]
        } else {
            predecessors
                .iter()
                .map(|p| self.require_task_id(p))
                .collect::<Result<Vec<_>>>()?
        };

        let node = TaskNode::new(task, guard);
        let id = node.id();
        self.graph.add_node(id);
        self.nodes.insert(id, node);

        for predecessor in predecessor_ids {
            self.graph.add_edge(predecessor, id);
            self.graph.add_edge(id, self.end);
            if self.graph.contains_edge(predecessor, self.end) {
                self.graph.remove_edge(predecessor, self.end);
            }
        }

        Ok(id)
    }

    /// Chain `task` after every current leaf; it becomes End's only
    /// predecessor.
    pub fn append_task(&mut self, task: TaskRef) -> Result<TaskId> {
        self.append_task_with_guard(task, TaskGuard::AllPredecessorsSucceeded)
    }

    pub fn append_task_with_guard(&mut self, task: TaskRef, guard: TaskGuard) -> Result<TaskId> {
        if self.task_id(&task).is_some() {
            return Err(JobGraphError::DuplicateTask(task.safe_name()));
        }

        let node = TaskNode::new(task, guard);
        let id = node.id();
        self.nodes.insert(id, node);

        let leaves = self.graph.predecessors(self.end);
        self.graph.add_edges_to(leaves.iter().copied(), id);
        for leaf in leaves {
            self.graph.remove_edge(leaf, self.end);
        }
        self.graph.add_edge(id, self.end);

        Ok(id)
    }

    /// Merge `other` as an independent parallel branch off Start.
    ///
    /// Imported root tasks get the `AllPredecessorsCompleted` guard.
    pub fn add_task_graph(&mut self, other: &TaskGraph) -> Result<Vec<TaskId>> {
        let start = self.start_task().clone();
        self.add_task_graph_with_guard(other, TaskGuard::AllPredecessorsCompleted, &start)
    }

    /// Merge `other` after a latch-on `predecessor`; imported roots run only
    /// if it succeeded.
    pub fn add_task_graph_after(
        &mut self,
        other: &TaskGraph,
        predecessor: &TaskRef,
    ) -> Result<Vec<TaskId>> {
        self.add_task_graph_with_guard(other, TaskGuard::AllPredecessorsSucceeded, predecessor)
    }

    /// Copy every task and internal edge of `other` into this graph.
    ///
    /// `other`'s roots become successors of `predecessor` with `guard`, and
    /// `other`'s leaves are wired to this graph's End. If anything latched
    /// on, `predecessor` loses its direct edge to End. Returns the ids of the
    /// imported nodes; a task already present in this graph reuses its
    /// existing node.
    pub fn add_task_graph_with_guard(
        &mut self,
        other: &TaskGraph,
        guard: TaskGuard,
        predecessor: &TaskRef,
    ) -> Result<Vec<TaskId>> {
        if other.is_empty() {
            return Ok(Vec::new());
        }

        let predecessor_id = self.require_task_id(predecessor)?;
        let mapping = self.copy_nodes_and_edges(other);

        let mut latched = false;
        for root in other.graph.successors(other.start) {
            if let Some(&id) = mapping.get(&root) {
                self.graph.add_edge(predecessor_id, id);
                if let Some(node) = self.nodes.get_mut(&id) {
                    node.set_guard(guard);
                }
                latched = true;
            }
        }
        if latched {
            self.graph.remove_edge(predecessor_id, self.end);
        }

        for leaf in other.graph.predecessors(other.end) {
            if let Some(&id) = mapping.get(&leaf) {
                self.graph.add_edge(id, self.end);
            }
        }

        let mut imported: Vec<TaskId> = mapping.into_values().collect();
        imported.sort();
        imported.dedup();
        Ok(imported)
    }

    /// Splice `other` between Start and its current successors.
    pub fn insert_task_graph(&mut self, other: &TaskGraph) -> Result<Vec<TaskId>> {
        let start = self.start_task().clone();
        self.insert_task_graph_after(other, &start)
    }

    /// Splice `other` between `predecessor` and the tasks that currently
    /// depend on it.
    ///
    /// `other`'s roots run after `predecessor`; everything that depended on
    /// `predecessor` now depends on `other`'s leaves instead.
    pub fn insert_task_graph_after(
        &mut self,
        other: &TaskGraph,
        predecessor: &TaskRef,
    ) -> Result<Vec<TaskId>> {
        if other.is_empty() {
            return Ok(Vec::new());
        }

        let predecessor_id = self.require_task_id(predecessor)?;
        let successors_before = self.graph.successors(predecessor_id);

        let imported = self.add_task_graph_after(other, predecessor)?;

        for leaf in other.graph.predecessors(other.end) {
            if other.is_start_or_end(leaf) {
                continue;
            }
            let Some(id) = self.task_id(other.task_of(leaf)) else {
                continue;
            };
            // Drop the End edge first so a leaf stays grounded when the only
            // former successor is End itself.
            self.graph.remove_edge(id, self.end);
            for &successor in &successors_before {
                self.graph.add_edge(id, successor);
                self.graph.remove_edge(predecessor_id, successor);
            }
        }

        debug!(
            predecessor = %predecessor.safe_name(),
            imported = imported.len(),
            "inserted task graph"
        );

        Ok(imported)
    }

    fn copy_nodes_and_edges(&mut self, other: &TaskGraph) -> HashMap<TaskId, TaskId> {
        let mut mapping = HashMap::new();

        for id in other.graph.nodes() {
            if other.is_start_or_end(id) {
                continue;
            }
            let Some(source) = other.nodes.get(&id) else {
                continue;
            };
            let local = match self.task_id(source.task()) {
                Some(existing) => {
                    debug!(task = %source.name(), "task already in graph; reusing node");
                    existing
                }
                None => {
                    let node = TaskNode::imported_from(source);
                    let local = node.id();
                    self.graph.add_node(local);
                    self.nodes.insert(local, node);
                    local
                }
            };
            mapping.insert(id, local);
        }

        for (src, dst) in other.graph.edges() {
            if let (Some(&s), Some(&d)) = (mapping.get(&src), mapping.get(&dst)) {
                self.graph.add_edge(s, d);
            }
        }

        mapping
    }

    fn require_task_id(&self, task: &TaskRef) -> Result<TaskId> {
        self.task_id(task)
            .ok_or_else(|| JobGraphError::TaskNotFound(task.safe_name()))
    }

    fn task_of(&self, id: TaskId) -> &TaskRef {
        self.nodes[&id].task()
    }

    /// Id of the node wrapping `task`, compared by identity.
    pub fn task_id(&self, task: &TaskRef) -> Option<TaskId> {
        self.nodes
            .values()
            .find(|node| node.task() == task)
            .map(|node| node.id())
    }

    /// Node wrapping `task`, compared by identity.
    pub fn get_task_node(&self, task: &TaskRef) -> Option<&TaskNode> {
        self.task_id(task).and_then(|id| self.nodes.get(&id))
    }

    pub fn node(&self, id: TaskId) -> Option<&TaskNode> {
        self.nodes.get(&id)
    }

    pub(crate) fn node_mut(&mut self, id: TaskId) -> Option<&mut TaskNode> {
        self.nodes.get_mut(&id)
    }

    pub fn nodes(&self) -> impl Iterator<Item = &TaskNode> {
        self.nodes.values()
    }

    pub fn graph(&self) -> &Graph<TaskId> {
        &self.graph
    }

    pub fn start_id(&self) -> TaskId {
        self.start
    }

    pub fn end_id(&self) -> TaskId {
        self.end
    }

    pub fn start_task(&self) -> &TaskRef {
        self.task_of(self.start)
    }

    pub fn end_task(&self) -> &TaskRef {
        self.task_of(self.end)
    }

    pub fn is_start_or_end(&self, id: TaskId) -> bool {
        id == self.start || id == self.end
    }

    pub fn successors(&self, id: TaskId) -> Vec<TaskId> {
        self.graph.successors(id)
    }

    pub fn predecessors(&self, id: TaskId) -> Vec<TaskId> {
        self.graph.predecessors(id)
    }

    pub fn ancestors(&self, id: TaskId) -> HashSet<TaskId> {
        self.graph.ancestors(id)
    }

    /// All node ids, sentinels included, in dependency order.
    pub fn topological_order(&self) -> Vec<TaskId> {
        self.graph.topological_sort()
    }

    /// Number of tasks, not counting the sentinels.
    pub fn task_count(&self) -> usize {
        self.graph.node_count() - 2
    }

    pub fn is_empty(&self) -> bool {
        self.task_count() == 0
    }

    /// Find the value an upstream task produced under `name`.
    ///
    /// Direct predecessors are checked first, then each predecessor's own
    /// ancestry in turn; the first match wins. When two ancestors produce
    /// the same name the winner depends on edge iteration order.
    pub fn search_predecessor_outputs(&self, id: TaskId, name: &str) -> Option<OutputValue> {
        let mut searched = HashSet::new();
        self.search_outputs_from(id, name, &mut searched)
    }

    fn search_outputs_from(
        &self,
        id: TaskId,
        name: &str,
        searched: &mut HashSet<TaskId>,
    ) -> Option<OutputValue> {
        if !searched.insert(id) {
            return None;
        }

        let predecessors = self.graph.predecessors(id);
        for predecessor in &predecessors {
            if let Some(value) = self.nodes.get(predecessor).and_then(|n| n.output(name)) {
                return Some(value.clone());
            }
        }
        for predecessor in predecessors {
            if let Some(value) = self.search_outputs_from(predecessor, name, searched) {
                return Some(value);
            }
        }
        None
    }
}

impl fmt::Display for TaskGraph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "TaskGraph [")?;
        writeln!(f, "Nodes:")?;
        for id in self.topological_order() {
            if let Some(node) = self.nodes.get(&id) {
                writeln!(f, "\t{node}")?;
            }
        }
        writeln!(f, "Edges:")?;
        for (src, dst) in self.graph.edges() {
            writeln!(
                f,
                "\t{} ==> {}",
                self.task_of(src).safe_name(),
                self.task_of(dst).safe_name()
            )?;
        }
        write!(f, "]")
    }
}
