// tests/command_task.rs

#![cfg(unix)]

mod common;
use crate::common::{engine, init_tracing, with_timeout};

use std::error::Error;

use jobgraph::dag::TaskGraph;
use jobgraph::engine::SubmitOptions;
use jobgraph::exec::{CommandTask, LAST_LINE};
use jobgraph::task::TaskRef;
use jobgraph::types::{JobStatus, TaskStatus};

type TestResult = Result<(), Box<dyn Error>>;

fn last_line(graph: &TaskGraph, task: &TaskRef) -> Option<String> {
    graph
        .get_task_node(task)?
        .output(LAST_LINE.name())?
        .downcast_ref::<String>()
        .cloned()
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn last_line_is_passed_downstream() -> TestResult {
    init_tracing();
    let engine = engine(1, 4);

    let produce = TaskRef::new(CommandTask::new("produce", "echo first; echo 'second line'"));
    let consume = TaskRef::new(CommandTask::new(
        "consume",
        "echo \"got: $JOBGRAPH_UPSTREAM_OUTPUT\"",
    ));
    let mut graph = TaskGraph::new();
    graph.add_task(produce.clone())?;
    graph.add_task_after(consume.clone(), &[&produce])?;

    let job = engine.submit("shell", graph, SubmitOptions::new())?;
    with_timeout(job.wait_for_completion()).await;

    assert_eq!(job.status(), JobStatus::Passed);
    job.inspect_graph(|graph| {
        assert_eq!(last_line(graph, &produce).as_deref(), Some("second line"));
        assert_eq!(last_line(graph, &consume).as_deref(), Some("got: second line"));
    });
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn nonzero_exit_fails_the_task() -> TestResult {
    init_tracing();
    let engine = engine(1, 4);

    let mut graph = TaskGraph::new();
    graph.add_task(TaskRef::new(CommandTask::new("broken", "echo oops >&2; exit 3")))?;

    let job = engine.submit("shell", graph, SubmitOptions::new())?;
    with_timeout(job.wait_for_completion()).await;

    let snapshot = job.snapshot();
    let broken = snapshot.task("broken").unwrap();
    assert_eq!(broken.status, TaskStatus::Failed);
    let reason = broken.failure_reason.as_deref().unwrap_or_default();
    assert!(reason.contains("exited with code 3"), "unexpected reason: {reason}");
    assert_eq!(job.status(), JobStatus::Failed);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn cwd_is_honoured() -> TestResult {
    init_tracing();
    let engine = engine(1, 4);
    let dir = tempfile::tempdir()?;
    std::fs::write(dir.path().join("marker.txt"), "present\n")?;

    let task = TaskRef::new(CommandTask::new("read", "cat marker.txt").with_cwd(dir.path()));
    let mut graph = TaskGraph::new();
    graph.add_task(task.clone())?;

    let job = engine.submit("shell", graph, SubmitOptions::new())?;
    with_timeout(job.wait_for_completion()).await;

    assert_eq!(job.status(), JobStatus::Passed);
    let line = job.inspect_graph(|graph| last_line(graph, &task));
    assert_eq!(line.as_deref(), Some("present"));
    Ok(())
}
