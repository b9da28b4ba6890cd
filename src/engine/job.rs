// src/engine/job.rs

//! A running task graph.
//!
//! A [`Job`] is a cheap, cloneable handle. The scheduling loop lives in
//! [`JobRunner`], which the engine drives on the job pool. The loop is the
//! only writer of node state while the job runs: workers report back
//! through [`NodeEvent`]s and the loop applies state changes, outputs and
//! MetaTask expansions before it evaluates successors.
//!
//! The job state is held in a `parking_lot::Mutex` that is never held
//! across an `.await`. Listener and store notifications, and forced lock
//! releases, are collected while the lock is held and run after it is
//! released. Listeners are called from one notifier task per job, in the
//! order the changes happened.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio::sync::{Notify, Semaphore, mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::dag::{TaskGraph, TaskId, TaskNode};
use crate::engine::guard::{self, GuardDecision};
use crate::engine::listener::{JobCompletionListener, TaskChangeListener};
use crate::engine::snapshot::{JobId, JobSnapshot, TaskSnapshot};
use crate::engine::store::JobStore;
use crate::errors::{JobGraphError, Result};
use crate::exec::runner::panic_message;
use crate::exec::{NodeDispatch, NodeEvent, NodeReport, spawn_node};
use crate::task::{LockObjectReference, TaskContext, TaskRef};
use crate::types::{JobState, JobStatus, TaskState, TaskStatus};

/// Failure reason recorded when any task ends unsuccessfully.
pub const TASK_FAILURE_REASON: &str = "One or more tasks failed.";

#[derive(Clone)]
pub struct Job {
    inner: Arc<JobShared>,
}

struct JobShared {
    id: JobId,
    name: String,
    lock_objects: Vec<LockObjectReference>,
    core: Mutex<JobCore>,
    aborted: AtomicBool,
    abort_notify: Notify,
    finished: AtomicBool,
    done: Arc<watch::Sender<bool>>,
    /// Start and End; never reported or persisted.
    sentinels: [TaskId; 2],
    notifier: Option<mpsc::UnboundedSender<Notification>>,
    completion_listeners: Mutex<Vec<Arc<dyn JobCompletionListener>>>,
    task_listeners: Mutex<Vec<Arc<dyn TaskChangeListener>>>,
    store: Option<Arc<dyn JobStore>>,
    events: mpsc::UnboundedSender<NodeEvent>,
    task_pool: Arc<Semaphore>,
}

struct JobCore {
    graph: TaskGraph,
    state: JobState,
    status: JobStatus,
    failure_reason: Option<String>,
    queued_at: Option<DateTime<Utc>>,
    started_at: Option<DateTime<Utc>>,
    completed_at: Option<DateTime<Utc>>,
    in_flight: HashMap<TaskId, InFlight>,
}

struct InFlight {
    handle: JoinHandle<()>,
    /// The body holds a task pool permit.
    started: Arc<AtomicBool>,
}

/// Notifications gathered under the lock, delivered after it is released.
#[derive(Default)]
struct Changes {
    tasks: Vec<TaskSnapshot>,
    /// Unlock tasks to force-release.
    releases: Vec<TaskRef>,
    job: bool,
}

impl Changes {
    fn task(&mut self, node: &TaskNode) {
        self.tasks.push(TaskSnapshot::from(node));
    }
}

impl JobCore {
    fn node(&self, id: TaskId) -> Result<&TaskNode> {
        self.graph
            .node(id)
            .ok_or_else(|| JobGraphError::TaskNotFound(id.to_string()))
    }

    fn node_mut(&mut self, id: TaskId) -> Result<&mut TaskNode> {
        self.graph
            .node_mut(id)
            .ok_or_else(|| JobGraphError::TaskNotFound(id.to_string()))
    }

    fn set_state(&mut self, state: JobState, changes: &mut Changes) {
        self.state = state;
        let now = Utc::now();
        match state {
            JobState::Queued => self.queued_at = Some(now),
            JobState::Running => self.started_at = Some(now),
            JobState::Completed => self.completed_at = Some(now),
            JobState::NotRunning => {}
        }
        changes.job = true;
    }

    /// Move a node straight to COMPLETED with `status`, e.g. when skipping.
    fn complete_node(
        &mut self,
        id: TaskId,
        status: TaskStatus,
        changes: &mut Changes,
    ) -> Result<()> {
        let node = self.node_mut(id)?;
        node.set_status(status, None);
        node.set_state(TaskState::Completed);
        changes.task(node);
        Ok(())
    }

    fn snapshot(
        &self,
        id: JobId,
        name: &str,
        lock_objects: &[LockObjectReference],
    ) -> JobSnapshot {
        let tasks = self
            .graph
            .topological_order()
            .into_iter()
            .filter(|id| !self.graph.is_start_or_end(*id))
            .filter_map(|id| self.graph.node(id))
            .map(TaskSnapshot::from)
            .collect();

        JobSnapshot {
            id,
            name: name.to_string(),
            state: self.state,
            status: self.status,
            failure_reason: self.failure_reason.clone(),
            queued_at: self.queued_at,
            started_at: self.started_at,
            completed_at: self.completed_at,
            lock_objects: lock_objects.to_vec(),
            tasks,
        }
    }
}

impl JobShared {
    fn snapshot(&self, core: &JobCore) -> JobSnapshot {
        core.snapshot(self.id, &self.name, &self.lock_objects)
    }
}

/// Listener work, queued to the job's notifier task.
enum Notification {
    Tasks(Vec<Arc<dyn TaskChangeListener>>, Vec<TaskSnapshot>),
    Completed(
        Vec<Arc<dyn JobCompletionListener>>,
        JobSnapshot,
        Arc<watch::Sender<bool>>,
    ),
}

fn deliver(notification: Notification) {
    match notification {
        Notification::Tasks(listeners, tasks) => {
            for task in &tasks {
                for listener in &listeners {
                    if catch_unwind(AssertUnwindSafe(|| listener.task_changed(task))).is_err() {
                        error!(task = %task.name, "task change listener panicked");
                    }
                }
            }
        }
        Notification::Completed(listeners, snapshot, done) => {
            for listener in &listeners {
                if catch_unwind(AssertUnwindSafe(|| listener.completed(&snapshot))).is_err() {
                    error!(job = %snapshot.id, "job completion listener panicked");
                }
            }
            done.send_replace(true);
        }
    }
}

/// Start the job's notifier on the current runtime. `None` outside one, in
/// which case listeners are called inline.
fn spawn_notifier() -> Option<mpsc::UnboundedSender<Notification>> {
    let handle = Handle::try_current().ok()?;
    let (tx, mut rx) = mpsc::unbounded_channel::<Notification>();
    handle.spawn(async move {
        while let Some(notification) = rx.recv().await {
            deliver(notification);
        }
    });
    Some(tx)
}

/// Run scheduler code that calls into tasks, turning a panic into an error.
fn catch_panics<T>(f: impl FnOnce() -> Result<T>) -> Result<T> {
    catch_unwind(AssertUnwindSafe(f))
        .unwrap_or_else(|panic| Err(JobGraphError::Panicked(panic_message(&*panic))))
}

impl Job {
    pub(crate) fn new(
        id: JobId,
        name: impl Into<String>,
        graph: TaskGraph,
        lock_objects: Vec<LockObjectReference>,
        task_pool: Arc<Semaphore>,
        store: Option<Arc<dyn JobStore>>,
    ) -> (Job, JobRunner) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let (done, _) = watch::channel(false);
        let sentinels = [graph.start_id(), graph.end_id()];

        let shared = JobShared {
            id,
            name: name.into(),
            lock_objects,
            core: Mutex::new(JobCore {
                graph,
                state: JobState::NotRunning,
                status: JobStatus::Passed,
                failure_reason: None,
                queued_at: None,
                started_at: None,
                completed_at: None,
                in_flight: HashMap::new(),
            }),
            aborted: AtomicBool::new(false),
            abort_notify: Notify::new(),
            finished: AtomicBool::new(false),
            done: Arc::new(done),
            sentinels,
            notifier: spawn_notifier(),
            completion_listeners: Mutex::new(Vec::new()),
            task_listeners: Mutex::new(Vec::new()),
            store,
            events: events_tx,
            task_pool,
        };

        let job = Job {
            inner: Arc::new(shared),
        };
        let runner = JobRunner {
            job: job.clone(),
            events: events_rx,
        };
        (job, runner)
    }

    pub fn id(&self) -> JobId {
        self.inner.id
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    /// Objects supplied at submission; recorded on every [`JobSnapshot`].
    pub fn lock_objects(&self) -> &[LockObjectReference] {
        &self.inner.lock_objects
    }

    pub fn state(&self) -> JobState {
        self.inner.core.lock().state
    }

    pub fn status(&self) -> JobStatus {
        self.inner.core.lock().status
    }

    pub fn failure_reason(&self) -> Option<String> {
        self.inner.core.lock().failure_reason.clone()
    }

    pub fn is_aborted(&self) -> bool {
        self.inner.aborted.load(Ordering::SeqCst)
    }

    pub fn snapshot(&self) -> JobSnapshot {
        self.inner.snapshot(&self.inner.core.lock())
    }

    /// Run `f` against the live graph.
    ///
    /// The job is locked for the duration of `f`; keep it short.
    pub fn inspect_graph<R>(&self, f: impl FnOnce(&TaskGraph) -> R) -> R {
        f(&self.inner.core.lock().graph)
    }

    pub fn contains_task(&self, task: &TaskRef) -> bool {
        self.inner.core.lock().graph.task_id(task).is_some()
    }

    /// Lock references the job's unlock tasks will release.
    pub fn current_lock_references(&self) -> HashSet<LockObjectReference> {
        let core = self.inner.core.lock();
        core.graph
            .nodes()
            .filter_map(|node| node.task().as_unlock().map(|u| u.lock_references()))
            .flatten()
            .collect()
    }

    pub fn add_completion_listener(&self, listener: Arc<dyn JobCompletionListener>) {
        self.inner.completion_listeners.lock().push(listener);
    }

    pub fn add_task_change_listener(&self, listener: Arc<dyn TaskChangeListener>) {
        self.inner.task_listeners.lock().push(listener);
    }

    /// Resolve once the job is COMPLETED and its listeners have been called.
    pub async fn wait_for_completion(&self) {
        let mut done = self.inner.done.subscribe();
        // The sender lives as long as `self`, so this cannot fail.
        let _ = done.wait_for(|finished| *finished).await;
    }

    /// Abort the job. A no-op once the job is COMPLETED.
    ///
    /// Running nodes become ABORTED, every other unfinished node SKIPPED,
    /// and unlock tasks that did not pass are released.
    pub fn abort(&self, reason: &str) {
        info!(job = %self.inner.id, name = %self.inner.name, %reason, "abort job");

        let mut changes = Changes::default();
        {
            let mut core = self.inner.core.lock();
            if core.state.is_terminal() {
                info!(job = %self.inner.id, "job already completed");
                return;
            }

            self.inner.aborted.store(true, Ordering::SeqCst);
            self.inner.abort_notify.notify_waiters();

            // A body that holds a permit is running even if its `Started`
            // event has not been applied yet.
            let started: HashSet<TaskId> = core
                .in_flight
                .drain()
                .filter_map(|(id, flight)| {
                    flight.handle.abort();
                    flight.started.load(Ordering::SeqCst).then_some(id)
                })
                .collect();

            let order = core.graph.topological_order();
            for &id in &order {
                let Some(node) = core.graph.node_mut(id) else {
                    continue;
                };
                if node.state().is_running() || started.contains(&id) {
                    node.set_status(TaskStatus::Aborted, None);
                    node.set_state(TaskState::Completed);
                    changes.task(node);
                } else if !node.state().is_terminal() {
                    node.set_status(TaskStatus::Skipped, None);
                    node.set_state(TaskState::Completed);
                    changes.task(node);
                }
            }

            self.sweep_unlock_nodes(&mut core, order, &mut changes, false);

            core.failure_reason = Some(reason.to_string());
            core.set_state(JobState::Completed, &mut changes);
            core.status = JobStatus::Aborted;
        }
        self.publish(changes);
    }

    /// Resolves once the job has been aborted.
    pub(crate) async fn aborted(&self) {
        loop {
            let notified = self.inner.abort_notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();
            if self.is_aborted() {
                return;
            }
            notified.await;
        }
    }

    pub(crate) fn mark_queued(&self) {
        let mut changes = Changes::default();
        let snapshot = {
            let mut core = self.inner.core.lock();
            core.set_state(JobState::Queued, &mut changes);
            self.inner.snapshot(&core)
        };
        if let Some(store) = &self.inner.store {
            if let Err(err) = store.job_created(&snapshot) {
                error!(job = %self.inner.id, error = %err, "failed to persist job");
            }
        }
    }

    /// Complete the job and release waiters. Idempotent.
    pub(crate) fn finish(&self) {
        if self.inner.finished.swap(true, Ordering::SeqCst) {
            return;
        }

        let mut changes = Changes::default();
        let snapshot = {
            let mut core = self.inner.core.lock();
            if !core.state.is_terminal() {
                core.set_state(JobState::Completed, &mut changes);
            }
            core.in_flight.clear();
            self.inner.snapshot(&core)
        };
        changes.job = false;
        self.publish(changes);
        self.persist_job(&snapshot);

        info!(
            job = %self.inner.id,
            name = %self.inner.name,
            status = %snapshot.status,
            "job completed"
        );

        let listeners = self.inner.completion_listeners.lock().clone();
        self.notify(Notification::Completed(
            listeners,
            snapshot,
            self.inner.done.clone(),
        ));
    }

    fn step(&self, core: &mut JobCore, event: NodeEvent, changes: &mut Changes) -> Result<bool> {
        // An abort may have landed between receiving the event and taking
        // the lock.
        if self.is_aborted() {
            return Ok(true);
        }

        match event {
            NodeEvent::Started { id, at } => {
                let node = core.node_mut(id)?;
                if node.set_state_at(TaskState::Running, at) {
                    changes.task(node);
                }
                Ok(false)
            }
            NodeEvent::Finished { id, report } => {
                core.in_flight.remove(&id);
                self.apply_report(core, id, report, changes)?;
                self.process_completion(core, id, changes)
            }
            NodeEvent::Settled { id } => self.process_completion(core, id, changes),
        }
    }

    fn apply_report(
        &self,
        core: &mut JobCore,
        id: TaskId,
        report: NodeReport,
        changes: &mut Changes,
    ) -> Result<()> {
        let NodeReport {
            result,
            outputs,
            expansion,
            finished_at,
        } = report;

        let mut failure = result.err();
        if failure.is_none() {
            if let Some(expansion) = expansion {
                if let Err(err) = self.merge_expansion(core, id, &expansion, changes) {
                    failure = Some(err.to_string());
                }
            }
        }

        let node = core.node_mut(id)?;
        match failure {
            Some(reason) => {
                warn!(job = %self.inner.id, task = %node.name(), %reason, "task failed");
                node.set_status(TaskStatus::Failed, Some(reason));
            }
            None => node.record_outputs(outputs),
        }
        node.set_state_at(TaskState::Completed, finished_at);
        changes.task(node);
        Ok(())
    }

    /// Splice a MetaTask's graph in right after its node.
    fn merge_expansion(
        &self,
        core: &mut JobCore,
        meta_id: TaskId,
        expansion: &TaskGraph,
        changes: &mut Changes,
    ) -> Result<()> {
        if expansion.is_empty() {
            return Ok(());
        }

        let meta_task = core.node(meta_id)?.task().clone();
        let imported = core.graph.insert_task_graph_after(expansion, &meta_task)?;

        for &child in &imported {
            if let Some(node) = core.graph.node_mut(child) {
                node.set_producer(meta_id);
            }
        }
        let meta = core.node_mut(meta_id)?;
        for &child in &imported {
            meta.add_child(child);
        }

        info!(
            job = %self.inner.id,
            task = %meta_task.safe_name(),
            added = imported.len(),
            "merged meta task graph"
        );

        if let Some(store) = &self.inner.store {
            let snapshot = self.inner.snapshot(&core);
            if let Err(err) = store.graph_updated(&snapshot) {
                error!(
                    job = %self.inner.id,
                    error = %err,
                    "failed to persist meta task generated task graph; releasing locks"
                );
                self.sweep_unlock_nodes(core, imported, changes, true);
                return Err(JobGraphError::Persistence(format!("{err:#}")));
            }
        }

        Ok(())
    }

    /// Mark unlock nodes that have not passed as PASSED/COMPLETED and queue
    /// their release, which [`publish`](Self::publish) runs once the job is
    /// unlocked. With `settle`, their successors are queued for evaluation
    /// too.
    fn sweep_unlock_nodes(
        &self,
        core: &mut JobCore,
        ids: impl IntoIterator<Item = TaskId>,
        changes: &mut Changes,
        settle: bool,
    ) {
        for id in ids {
            let Some(node) = core.graph.node_mut(id) else {
                continue;
            };
            if node.state().is_terminal() && node.status().is_successful() {
                continue;
            }
            if node.task().as_unlock().is_none() {
                continue;
            }

            changes.releases.push(node.task().clone());
            node.set_status(TaskStatus::Passed, None);
            node.set_state(TaskState::Completed);
            changes.task(node);

            if settle {
                let _ = self.inner.events.send(NodeEvent::Settled { id });
            }
        }
    }

    /// React to a node reaching COMPLETED. Returns `true` once End is done.
    fn process_completion(
        &self,
        core: &mut JobCore,
        id: TaskId,
        changes: &mut Changes,
    ) -> Result<bool> {
        let status = core.node(id)?.status();
        if !status.is_successful() && core.status == JobStatus::Passed {
            core.status = JobStatus::Failed;
            core.failure_reason = Some(TASK_FAILURE_REASON.to_string());
            changes.job = true;
        }

        let successors = core.graph.successors(id);
        if successors.is_empty() {
            return Ok(true);
        }

        for successor in successors {
            match guard::evaluate(&core.graph, successor) {
                GuardDecision::Ignore => {}
                GuardDecision::Wait => {
                    let node = core.node_mut(successor)?;
                    if node.set_state(TaskState::Pending) {
                        changes.task(node);
                    }
                }
                GuardDecision::Dispatch => self.dispatch(core, successor, changes)?,
                GuardDecision::Skip => {
                    core.complete_node(successor, TaskStatus::Skipped, changes)?;
                    debug!(job = %self.inner.id, task = %successor, "task skipped by guard");
                    let _ = self.inner.events.send(NodeEvent::Settled { id: successor });
                }
            }
        }

        Ok(false)
    }

    /// Queue a node on the task pool with its inputs resolved.
    fn dispatch(&self, core: &mut JobCore, id: TaskId, changes: &mut Changes) -> Result<()> {
        let node = core.node_mut(id)?;
        node.set_state(TaskState::Queued);
        changes.task(node);
        let task = node.task().clone();
        let task_name = node.name();

        let ports = task.ports();
        let inputs = ports
            .inputs()
            .iter()
            .filter_map(|name| {
                core.graph
                    .search_predecessor_outputs(id, name)
                    .map(|value| (name.to_string(), value))
            })
            .collect();

        let ctx = TaskContext::new(
            self.inner.name.clone(),
            task_name,
            inputs,
            ports.outputs().to_vec(),
        );
        let started = Arc::new(AtomicBool::new(false));
        let handle = spawn_node(
            self.inner.task_pool.clone(),
            NodeDispatch {
                id,
                task,
                ctx,
                started: started.clone(),
            },
            self.inner.events.clone(),
        );
        core.in_flight.insert(id, InFlight { handle, started });
        Ok(())
    }

    fn persist_job(&self, snapshot: &JobSnapshot) {
        if let Some(store) = &self.inner.store {
            if let Err(err) = store.job_updated(snapshot) {
                error!(job = %self.inner.id, error = %err, "failed to update job record");
            }
        }
    }

    fn release(&self, task: &TaskRef) {
        let Some(unlock) = task.as_unlock() else {
            return;
        };
        debug!(job = %self.inner.id, task = %task.safe_name(), "releasing locks");
        if catch_unwind(AssertUnwindSafe(|| unlock.release())).is_err() {
            error!(job = %self.inner.id, task = %task.safe_name(), "lock release panicked");
        }
    }

    fn notify(&self, notification: Notification) {
        match &self.inner.notifier {
            Some(notifier) => {
                if let Err(unsent) = notifier.send(notification) {
                    deliver(unsent.0);
                }
            }
            None => deliver(notification),
        }
    }

    /// Must be called without the job lock held.
    fn publish(&self, changes: Changes) {
        let Changes {
            mut tasks,
            releases,
            job,
        } = changes;

        for task in &releases {
            self.release(task);
        }
        if job {
            self.persist_job(&self.snapshot());
        }

        let [start, end] = self.inner.sentinels;
        tasks.retain(|task| task.id != start && task.id != end);
        if tasks.is_empty() {
            return;
        }

        if let Some(store) = &self.inner.store {
            for task in &tasks {
                if let Err(err) = store.task_updated(self.inner.id, task) {
                    error!(job = %self.inner.id, task = %task.name, error = %err, "failed to update task record");
                }
            }
        }

        let listeners = self.inner.task_listeners.lock().clone();
        if !listeners.is_empty() {
            self.notify(Notification::Tasks(listeners, tasks));
        }
    }
}

impl fmt::Debug for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Job")
            .field("id", &self.inner.id)
            .field("name", &self.inner.name)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for Job {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Job [id={}, name={}]", self.inner.id, self.inner.name)
    }
}

/// Owns the completion queue of one job and drives it to the End node.
pub struct JobRunner {
    job: Job,
    events: mpsc::UnboundedReceiver<NodeEvent>,
}

impl JobRunner {
    pub fn job(&self) -> &Job {
        &self.job
    }

    /// Run the scheduling loop until End completes or the job is aborted.
    ///
    /// Leaves the job COMPLETED; waking waiters is the caller's
    /// responsibility via the engine.
    pub(crate) async fn run(mut self) {
        let job = self.job.clone();
        if job.is_aborted() {
            return;
        }

        let mut changes = Changes::default();
        let started = {
            let mut core = job.inner.core.lock();
            core.set_state(JobState::Running, &mut changes);
            let start = core.graph.start_id();
            catch_panics(|| job.dispatch(&mut core, start, &mut changes))
        };
        job.publish(changes);
        info!(job = %job.inner.id, name = %job.inner.name, "job started");

        if let Err(err) = started {
            job.abort(&format!("Fatal error during job execution ({err})"));
            return;
        }

        loop {
            let event = tokio::select! {
                _ = job.aborted() => None,
                event = self.events.recv() => event,
            };

            if job.is_aborted() {
                warn!(job = %job.inner.id, "job was cancelled");
                break;
            }
            let Some(event) = event else {
                break;
            };

            let mut changes = Changes::default();
            let result = {
                let mut core = job.inner.core.lock();
                catch_panics(|| job.step(&mut core, event, &mut changes))
            };
            job.publish(changes);

            match result {
                Ok(true) => break,
                Ok(false) => {}
                Err(err) => {
                    error!(job = %job.inner.id, error = %err, "fatal error during job execution");
                    job.abort(&format!("Fatal error during job execution ({err})"));
                    break;
                }
            }
        }

        let mut changes = Changes::default();
        {
            let mut core = job.inner.core.lock();
            if !core.state.is_terminal() {
                core.set_state(JobState::Completed, &mut changes);
            }
        }
        job.publish(changes);
    }
}
