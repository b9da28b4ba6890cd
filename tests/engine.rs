// tests/engine.rs

mod common;
use crate::common::{
    ExecutionLog, RecordingTask, RecordingUnlockTask, engine, eventually, init_tracing, task_ref,
    with_timeout,
};

use std::error::Error;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use parking_lot::Mutex;

use jobgraph::config::EngineConfig;
use jobgraph::dag::TaskGraph;
use jobgraph::engine::{
    DEADLOCK_ABORT_REASON, JobEngine, JobSnapshot, SHUTDOWN_ABORT_REASON, SubmitOptions,
};
use jobgraph::errors::JobGraphError;
use jobgraph::task::{LockObjectReference, ObjectType, TaskRef};
use jobgraph::types::{JobState, JobStatus, TaskState, TaskStatus};

type TestResult = Result<(), Box<dyn Error>>;

fn slow(name: &str, log: &ExecutionLog) -> TaskRef {
    task_ref(RecordingTask::new(name, log).with_delay(Duration::from_secs(30))).1
}

fn quick_graph(name: &str, log: &ExecutionLog) -> Result<TaskGraph, JobGraphError> {
    let mut graph = TaskGraph::new();
    graph.add_task(task_ref(RecordingTask::new(name, log)).1)?;
    Ok(graph)
}

/// A long task followed by an unlock task holding `lock`.
fn locked_graph(
    log: &ExecutionLog,
    lock: &LockObjectReference,
) -> Result<TaskGraph, JobGraphError> {
    let mut graph = TaskGraph::new();
    graph.add_task(slow("work", log))?;
    graph.append_task(task_ref(RecordingUnlockTask::new("unlock", log, vec![lock.clone()])).1)?;
    Ok(graph)
}

#[test]
fn default_config_matches_documented_pool_sizes() {
    let engine = JobEngine::new(EngineConfig::default());

    assert_eq!(engine.config().job_pool_size, 10);
    assert_eq!(engine.config().task_pool_size, 40);
    assert!(!engine.is_active());
    assert!(!engine.is_shutdown());
    engine.log_status();
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn submit_after_shutdown_is_rejected() -> TestResult {
    init_tracing();
    let engine = engine(2, 4);
    let log = ExecutionLog::new();

    engine.shutdown().await;
    assert!(engine.is_shutdown());

    let err = engine
        .submit("late", quick_graph("A", &log)?, SubmitOptions::new())
        .unwrap_err();
    assert!(matches!(err, JobGraphError::EngineShutdown));
    assert_eq!(engine.active_job_count(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn shutdown_aborts_running_jobs() -> TestResult {
    init_tracing();
    let engine = engine(2, 4);
    let log = ExecutionLog::new();

    let mut graph = TaskGraph::new();
    graph.add_task(slow("A", &log))?;
    let job = engine.submit("long", graph, SubmitOptions::new())?;
    eventually(|| engine.is_active()).await;

    with_timeout(engine.shutdown()).await;
    with_timeout(job.wait_for_completion()).await;

    assert_eq!(job.status(), JobStatus::Aborted);
    assert_eq!(job.failure_reason().as_deref(), Some(SHUTDOWN_ABORT_REASON));
    assert_eq!(engine.active_job_count(), 0);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn job_pool_runs_one_job_at_a_time() -> TestResult {
    init_tracing();
    let engine = engine(1, 8);
    let log = ExecutionLog::new();

    let mut jobs = Vec::new();
    for name in ["first", "second"] {
        let mut graph = TaskGraph::new();
        graph.add_task(
            task_ref(RecordingTask::new(name, &log).with_delay(Duration::from_millis(50))).1,
        )?;
        jobs.push(engine.submit(name, graph, SubmitOptions::new())?);
    }
    for job in &jobs {
        with_timeout(job.wait_for_completion()).await;
    }

    let mut snapshots: Vec<JobSnapshot> = jobs.iter().map(|job| job.snapshot()).collect();
    snapshots.sort_by_key(|s| s.started_at);
    assert!(snapshots[1].started_at >= snapshots[0].completed_at);
    assert!(snapshots.iter().all(|s| s.status == JobStatus::Passed));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn overlapping_locks_on_a_full_pool_are_a_deadlock() -> TestResult {
    init_tracing();
    let engine = engine(1, 8);
    let log = ExecutionLog::new();
    let lock = LockObjectReference::new(42, "vc-42", ObjectType::VirtualizationConnector);

    let holder = engine.submit("holder", locked_graph(&log, &lock)?, SubmitOptions::new())?;
    eventually(|| engine.is_active()).await;
    assert!(holder.current_lock_references().contains(&lock));

    let rejected: Arc<Mutex<Option<JobSnapshot>>> = Arc::new(Mutex::new(None));
    let sink = rejected.clone();
    let options = SubmitOptions::new().on_completion(Arc::new(move |job: &JobSnapshot| {
        *sink.lock() = Some(job.clone());
    }));

    let err = engine
        .submit("contender", locked_graph(&log, &lock)?, options)
        .unwrap_err();
    assert!(matches!(&err, JobGraphError::Deadlock(name) if name == "contender"));

    eventually(|| rejected.lock().is_some()).await;
    let contender = rejected.lock().clone().unwrap();
    assert_eq!(contender.state, JobState::Completed);
    assert_eq!(contender.status, JobStatus::Aborted);
    assert_eq!(contender.failure_reason.as_deref(), Some(DEADLOCK_ABORT_REASON));
    assert_eq!(engine.active_job_count(), 1);

    engine.shutdown().await;
    with_timeout(holder.wait_for_completion()).await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn disjoint_locks_just_wait_for_a_slot() -> TestResult {
    init_tracing();
    let engine = engine(1, 8);
    let log = ExecutionLog::new();
    let held = LockObjectReference::new(1, "sg-1", ObjectType::SecurityGroup);
    let other = LockObjectReference::new(2, "sg-2", ObjectType::SecurityGroup);

    let holder = engine.submit("holder", locked_graph(&log, &held)?, SubmitOptions::new())?;
    eventually(|| engine.is_active()).await;

    let waiting = engine.submit("waiting", locked_graph(&log, &other)?, SubmitOptions::new())?;
    assert_eq!(waiting.state(), JobState::Queued);
    assert_eq!(engine.active_job_count(), 2);

    engine.shutdown().await;
    with_timeout(holder.wait_for_completion()).await;
    with_timeout(waiting.wait_for_completion()).await;
    assert_eq!(waiting.status(), JobStatus::Aborted);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn job_by_task_finds_active_jobs_only() -> TestResult {
    init_tracing();
    let engine = engine(2, 8);
    let log = ExecutionLog::new();

    let task = slow("A", &log);
    let mut graph = TaskGraph::new();
    graph.add_task(task.clone())?;
    let job = engine.submit("owner", graph, SubmitOptions::new())?;

    let found = engine.job_by_task(&task).expect("job is active");
    assert_eq!(found.id(), job.id());
    assert!(engine.job_by_task(&slow("stranger", &log)).is_none());

    job.abort("done looking");
    with_timeout(job.wait_for_completion()).await;
    assert!(engine.job_by_task(&task).is_none());
    // Aborted if the body had started, skipped if it was still queued.
    let status = job.snapshot().task("A").unwrap().status;
    assert!(matches!(status, TaskStatus::Aborted | TaskStatus::Skipped));
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn engine_listeners_apply_to_later_jobs_until_removed() -> TestResult {
    init_tracing();
    let engine = engine(2, 8);
    let log = ExecutionLog::new();
    let calls = Arc::new(AtomicUsize::new(0));

    let counter = calls.clone();
    let id = engine.add_job_completion_listener(Arc::new(move |_: &JobSnapshot| {
        counter.fetch_add(1, Ordering::SeqCst);
    }));

    let job = engine.submit("one", quick_graph("A", &log)?, SubmitOptions::new())?;
    with_timeout(job.wait_for_completion()).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    assert!(engine.remove_job_completion_listener(id));
    assert!(!engine.remove_job_completion_listener(id));

    let job = engine.submit("two", quick_graph("B", &log)?, SubmitOptions::new())?;
    with_timeout(job.wait_for_completion()).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn finished_jobs_leave_the_active_list() -> TestResult {
    init_tracing();
    let engine = engine(2, 8);
    let log = ExecutionLog::new();

    let job = engine.submit("brief", quick_graph("A", &log)?, SubmitOptions::new())?;
    with_timeout(job.wait_for_completion()).await;

    assert_eq!(engine.active_job_count(), 0);
    assert!(engine.active_jobs().is_empty());
    eventually(|| !engine.is_active()).await;
    engine.log_status();
    assert_eq!(
        job.snapshot().task("A").unwrap().state,
        TaskState::Completed
    );
    Ok(())
}
