// tests/task_graph.rs

mod common;
use crate::common::{ExecutionLog, RecordingTask, graphs_equivalent, task_graph_shape, task_ref};

use std::collections::BTreeSet;
use std::error::Error;

use jobgraph::dag::TaskGraph;
use jobgraph::errors::JobGraphError;
use jobgraph::task::TaskRef;
use jobgraph::types::TaskGuard;

type TestResult = Result<(), Box<dyn Error>>;

fn task(name: &str) -> TaskRef {
    let log = ExecutionLog::new();
    task_ref(RecordingTask::new(name, &log)).1
}

fn edges(pairs: &[(&str, &str)]) -> BTreeSet<(String, String)> {
    pairs
        .iter()
        .map(|(a, b)| (a.to_string(), b.to_string()))
        .collect()
}

fn guard_of(graph: &TaskGraph, task: &TaskRef) -> TaskGuard {
    graph.get_task_node(task).unwrap().guard()
}

#[test]
fn new_graph_links_start_to_end() {
    let graph = TaskGraph::new();

    assert!(graph.is_empty());
    assert_eq!(graph.task_count(), 0);
    assert_eq!(task_graph_shape(&graph), edges(&[("Start", "End")]));
}

#[test]
fn add_task_creates_parallel_branches() -> TestResult {
    let mut graph = TaskGraph::new();
    let a = task("A");
    let b = task("B");
    graph.add_task(a.clone())?;
    graph.add_task(b.clone())?;

    assert_eq!(graph.task_count(), 2);
    assert_eq!(
        task_graph_shape(&graph),
        edges(&[("Start", "A"), ("Start", "B"), ("A", "End"), ("B", "End")])
    );
    assert_eq!(guard_of(&graph, &a), TaskGuard::AllPredecessorsSucceeded);
    Ok(())
}

#[test]
fn add_task_after_replaces_leaf_edges() -> TestResult {
    let mut graph = TaskGraph::new();
    let a = task("A");
    let b = task("B");
    let c = task("C");
    graph.add_task(a.clone())?;
    graph.add_task(b.clone())?;
    graph.add_task_after(c.clone(), &[&a, &b])?;

    assert_eq!(
        task_graph_shape(&graph),
        edges(&[
            ("Start", "A"),
            ("Start", "B"),
            ("A", "C"),
            ("B", "C"),
            ("C", "End"),
        ])
    );
    Ok(())
}

#[test]
fn append_task_chains_after_every_leaf() -> TestResult {
    let mut graph = TaskGraph::new();
    let a = task("A");
    let b = task("B");
    let c = task("C");
    let d = task("D");
    graph.add_task(a.clone())?;
    graph.add_task(b.clone())?;
    graph.add_task_after(c.clone(), &[&a, &b])?;
    let d_id = graph.append_task(d.clone())?;

    let c_id = graph.task_id(&c).unwrap();
    assert_eq!(graph.predecessors(d_id), vec![c_id]);
    assert_eq!(graph.predecessors(graph.end_id()), vec![d_id]);
    Ok(())
}

#[test]
fn append_on_parallel_leaves_joins_them() -> TestResult {
    let mut graph = TaskGraph::new();
    let a = task("A");
    let b = task("B");
    let join = task("join");
    graph.add_task(a)?;
    graph.add_task(b)?;
    graph.append_task_with_guard(join.clone(), TaskGuard::AllPredecessorsCompleted)?;

    assert_eq!(
        task_graph_shape(&graph),
        edges(&[("Start", "A"), ("Start", "B"), ("A", "join"), ("B", "join"), ("join", "End")])
    );
    assert_eq!(guard_of(&graph, &join), TaskGuard::AllPredecessorsCompleted);
    Ok(())
}

#[test]
fn unknown_predecessor_is_rejected() {
    let mut graph = TaskGraph::new();
    let stranger = task("stranger");

    let err = graph.add_task_after(task("A"), &[&stranger]).unwrap_err();
    assert!(matches!(err, JobGraphError::TaskNotFound(name) if name == "stranger"));
    assert!(graph.is_empty());
}

#[test]
fn duplicate_task_is_rejected() -> TestResult {
    let mut graph = TaskGraph::new();
    let a = task("A");
    graph.add_task(a.clone())?;

    let err = graph.add_task(a).unwrap_err();
    assert!(matches!(err, JobGraphError::DuplicateTask(_)));
    assert_eq!(graph.task_count(), 1);
    Ok(())
}

#[test]
fn lookup_is_by_identity_not_name() -> TestResult {
    let mut graph = TaskGraph::new();
    let first = task("same");
    let second = task("same");
    graph.add_task(first.clone())?;
    graph.add_task(second.clone())?;

    assert_eq!(graph.task_count(), 2);
    assert_ne!(graph.task_id(&first), graph.task_id(&second));
    assert!(graph.get_task_node(&task("same")).is_none());
    Ok(())
}

#[test]
fn add_task_graph_without_predecessor_is_a_parallel_branch() -> TestResult {
    let mut graph = TaskGraph::new();
    graph.add_task(task("A"))?;

    let mut other = TaskGraph::new();
    let x = task("X");
    let y = task("Y");
    other.add_task(x.clone())?;
    other.add_task_after(y.clone(), &[&x])?;

    let imported = graph.add_task_graph(&other)?;

    assert_eq!(imported.len(), 2);
    assert_eq!(
        task_graph_shape(&graph),
        edges(&[
            ("Start", "A"),
            ("A", "End"),
            ("Start", "X"),
            ("X", "Y"),
            ("Y", "End"),
        ])
    );
    assert_eq!(guard_of(&graph, &x), TaskGuard::AllPredecessorsCompleted);
    assert_eq!(guard_of(&graph, &y), TaskGuard::AllPredecessorsSucceeded);
    // The source graph is copied, not consumed.
    assert_eq!(other.task_count(), 2);
    Ok(())
}

#[test]
fn add_task_graph_after_latches_onto_predecessor() -> TestResult {
    let mut graph = TaskGraph::new();
    let a = task("A");
    graph.add_task(a.clone())?;

    let mut other = TaskGraph::new();
    let x = task("X");
    other.add_task(x.clone())?;

    graph.add_task_graph_after(&other, &a)?;

    assert_eq!(
        task_graph_shape(&graph),
        edges(&[("Start", "A"), ("A", "X"), ("X", "End")])
    );
    assert_eq!(guard_of(&graph, &x), TaskGuard::AllPredecessorsSucceeded);
    Ok(())
}

#[test]
fn insert_task_graph_interposes_between_predecessor_and_successors() -> TestResult {
    let mut graph = TaskGraph::new();
    let m = task("M");
    let s = task("S");
    graph.add_task(m.clone())?;
    graph.add_task_after(s.clone(), &[&m])?;

    let mut sub = TaskGraph::new();
    sub.add_task(task("X"))?;
    sub.add_task(task("Y"))?;

    graph.insert_task_graph_after(&sub, &m)?;

    assert_eq!(
        task_graph_shape(&graph),
        edges(&[
            ("Start", "M"),
            ("M", "X"),
            ("M", "Y"),
            ("X", "S"),
            ("Y", "S"),
            ("S", "End"),
        ])
    );
    Ok(())
}

#[test]
fn insert_after_a_leaf_keeps_end_reachable() -> TestResult {
    let mut graph = TaskGraph::new();
    let m = task("M");
    graph.add_task(m.clone())?;

    let mut sub = TaskGraph::new();
    let x = task("X");
    let y = task("Y");
    sub.add_task(x.clone())?;
    sub.append_task(y)?;

    graph.insert_task_graph_after(&sub, &m)?;

    assert_eq!(
        task_graph_shape(&graph),
        edges(&[("Start", "M"), ("M", "X"), ("X", "Y"), ("Y", "End")])
    );
    Ok(())
}

#[test]
fn insert_task_graph_at_start_runs_before_everything() -> TestResult {
    let mut graph = TaskGraph::new();
    graph.add_task(task("A"))?;

    let mut sub = TaskGraph::new();
    sub.add_task(task("setup"))?;

    graph.insert_task_graph(&sub)?;

    assert_eq!(
        task_graph_shape(&graph),
        edges(&[("Start", "setup"), ("setup", "A"), ("A", "End")])
    );
    Ok(())
}

#[test]
fn merging_an_empty_graph_is_a_no_op() -> TestResult {
    let mut graph = TaskGraph::new();
    let a = task("A");
    graph.add_task(a.clone())?;
    let before = task_graph_shape(&graph);

    assert!(graph.add_task_graph(&TaskGraph::new())?.is_empty());
    assert!(graph.add_task_graph_after(&TaskGraph::new(), &a)?.is_empty());
    assert!(graph.insert_task_graph_after(&TaskGraph::new(), &a)?.is_empty());
    assert_eq!(task_graph_shape(&graph), before);
    Ok(())
}

#[test]
fn differently_built_graphs_are_equivalent() -> TestResult {
    let mut chained = TaskGraph::new();
    let a1 = task("A");
    chained.add_task(a1.clone())?;
    chained.add_task_after(task("B"), &[&a1])?;

    let mut appended = TaskGraph::new();
    appended.add_task(task("A"))?;
    appended.append_task(task("B"))?;

    assert!(graphs_equivalent(&chained, &appended));

    appended.append_task_with_guard(task("C"), TaskGuard::AllAncestorsSucceeded)?;
    assert!(!graphs_equivalent(&chained, &appended));
    Ok(())
}

#[test]
fn display_lists_nodes_and_edges() -> TestResult {
    let mut graph = TaskGraph::new();
    graph.add_task(task("A"))?;

    let text = graph.to_string();
    assert!(text.contains("TaskNode [task=A, state=NOT_RUNNING, status=PASSED"));
    assert!(text.contains("Start ==> A"));
    assert!(text.contains("A ==> End"));
    Ok(())
}
