// src/exec/runner.rs

//! Runs a single task node body on the task pool.
//!
//! Each body runs on its own blocking-pool thread while it holds a task
//! pool permit, so bodies may block or do blocking I/O without stalling the
//! runtime's workers or the scheduling loops. Async bodies are driven on
//! that thread with [`Handle::block_on`].
//!
//! Workers never touch the job graph. They report back to the owning job
//! through [`NodeEvent`]s and the job's scheduling loop applies the
//! resulting state changes, outputs and graph expansion.

use std::any::Any;
use std::collections::HashMap;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use futures::FutureExt;
use futures::future::{AbortHandle, Abortable};
use tokio::runtime::Handle;
use tokio::sync::{Semaphore, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, warn};

use crate::dag::{TaskGraph, TaskId};
use crate::task::{OutputValue, TaskContext, TaskRef};

/// Progress notifications flowing into a job's scheduling loop.
#[derive(Debug)]
pub enum NodeEvent {
    /// The body acquired a task pool slot and is about to run.
    Started { id: TaskId, at: DateTime<Utc> },
    /// The body returned, failed or panicked.
    Finished { id: TaskId, report: NodeReport },
    /// The node was completed without running (skipped or swept); only its
    /// successors need evaluating.
    Settled { id: TaskId },
}

/// Everything a finished body hands back to the scheduler.
#[derive(Debug)]
pub struct NodeReport {
    /// `Err` carries the failure cause, error chain included.
    pub result: Result<(), String>,
    /// Declared outputs written by a successful body.
    pub outputs: HashMap<String, OutputValue>,
    /// Graph produced by a successful MetaTask body.
    pub expansion: Option<TaskGraph>,
    pub finished_at: DateTime<Utc>,
}

impl NodeReport {
    fn failed(reason: impl Into<String>) -> Self {
        Self {
            result: Err(reason.into()),
            outputs: HashMap::new(),
            expansion: None,
            finished_at: Utc::now(),
        }
    }
}

/// A node ready to run, with its inputs already resolved.
#[derive(Debug)]
pub struct NodeDispatch {
    pub id: TaskId,
    pub task: TaskRef,
    pub ctx: TaskContext,
    /// Set once the body holds a task pool permit, before `Started` is sent.
    pub started: Arc<AtomicBool>,
}

/// Cancels the body's thread when the worker future is dropped.
struct CancelOnDrop(AbortHandle);

impl Drop for CancelOnDrop {
    fn drop(&mut self) {
        self.0.abort();
    }
}

/// Spawn the body of `dispatch` on the runtime, gated by `pool`.
///
/// Aborting the returned handle cancels the body at its next `.await`; no
/// `Finished` event is sent in that case. A body stuck in blocking code
/// keeps its thread and permit until it returns.
pub fn spawn_node(
    pool: Arc<Semaphore>,
    dispatch: NodeDispatch,
    events: mpsc::UnboundedSender<NodeEvent>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let id = dispatch.id;
        let report = run_node(pool, dispatch, &events).await;
        if events.send(NodeEvent::Finished { id, report }).is_err() {
            debug!(task = %id, "job loop gone; dropping completion");
        }
    })
}

async fn run_node(
    pool: Arc<Semaphore>,
    dispatch: NodeDispatch,
    events: &mpsc::UnboundedSender<NodeEvent>,
) -> NodeReport {
    let NodeDispatch {
        id,
        task,
        ctx,
        started,
    } = dispatch;

    let Ok(permit) = pool.acquire_owned().await else {
        warn!(task = %ctx.task_name(), "task pool is shut down; not running task");
        return NodeReport::failed("task pool is shut down");
    };

    started.store(true, Ordering::SeqCst);
    let _ = events.send(NodeEvent::Started { id, at: Utc::now() });
    debug!(job = %ctx.job_name(), task = %ctx.task_name(), "task started");

    let (cancel, registration) = AbortHandle::new_pair();
    let _cancel = CancelOnDrop(cancel);
    let handle = Handle::current();

    let body = tokio::task::spawn_blocking(move || {
        let _permit = permit;
        let mut ctx = ctx;
        let outcome = handle.block_on(Abortable::new(
            AssertUnwindSafe(task.execute(&mut ctx)).catch_unwind(),
            registration,
        ));
        (task, ctx, outcome)
    });

    let (task, ctx, outcome) = match body.await {
        Ok(parts) => parts,
        Err(err) => return NodeReport::failed(format!("task worker failed: {err}")),
    };

    let result = match outcome {
        Ok(Ok(Ok(()))) => Ok(()),
        Ok(Ok(Err(err))) => Err(format!("{err:#}")),
        Ok(Err(panic)) => Err(format!("task panicked: {}", panic_message(&*panic))),
        Err(_) => Err("task cancelled".to_string()),
    };

    if let Err(reason) = result {
        debug!(task = %ctx.task_name(), %reason, "task failed");
        return NodeReport::failed(reason);
    }

    let expansion = match task.as_meta() {
        Some(meta) => match catch_unwind(AssertUnwindSafe(|| meta.task_graph())) {
            Ok(graph) => graph,
            Err(panic) => {
                return NodeReport::failed(format!(
                    "task graph generation panicked: {}",
                    panic_message(&*panic)
                ));
            }
        },
        None => None,
    };

    NodeReport {
        result: Ok(()),
        outputs: ctx.into_outputs(),
        expansion,
        finished_at: Utc::now(),
    }
}

pub(crate) fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(s) = panic.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = panic.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
