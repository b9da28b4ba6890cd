// src/engine/job_engine.rs

//! Process-level coordinator for jobs.
//!
//! The engine owns two independent bounded pools: one for job scheduling
//! loops and one for task bodies. A job holds its job slot until it
//! completes, so if both shared one pool a full set of jobs could starve
//! their own tasks.

use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures::future::join_all;
use parking_lot::Mutex;
use tokio::sync::Semaphore;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::dag::TaskGraph;
use crate::engine::job::{Job, JobRunner};
use crate::engine::listener::{JobCompletionListener, ListenerId, TaskChangeListener};
use crate::engine::snapshot::JobId;
use crate::engine::store::JobStore;
use crate::errors::{JobGraphError, Result};
use crate::task::{LockObjectReference, TaskRef};

pub const SHUTDOWN_ABORT_REASON: &str = "Job aborted due to server shutdown.";
pub const DEADLOCK_ABORT_REASON: &str = "Job aborted due to a potential deadlock.";

/// Optional extras for [`JobEngine::submit`].
#[derive(Clone, Default)]
pub struct SubmitOptions {
    lock_objects: Vec<LockObjectReference>,
    completion_listener: Option<Arc<dyn JobCompletionListener>>,
    task_listener: Option<Arc<dyn TaskChangeListener>>,
    store: Option<Arc<dyn JobStore>>,
}

impl SubmitOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lock_objects(mut self, objects: impl IntoIterator<Item = LockObjectReference>) -> Self {
        self.lock_objects.extend(objects);
        self
    }

    pub fn on_completion(mut self, listener: Arc<dyn JobCompletionListener>) -> Self {
        self.completion_listener = Some(listener);
        self
    }

    pub fn on_task_change(mut self, listener: Arc<dyn TaskChangeListener>) -> Self {
        self.task_listener = Some(listener);
        self
    }

    pub fn store(mut self, store: Arc<dyn JobStore>) -> Self {
        self.store = Some(store);
        self
    }
}

impl fmt::Debug for SubmitOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SubmitOptions")
            .field("lock_objects", &self.lock_objects)
            .field("completion_listener", &self.completion_listener.is_some())
            .field("task_listener", &self.task_listener.is_some())
            .field("store", &self.store.is_some())
            .finish()
    }
}

/// Cloneable handle to a job engine.
#[derive(Clone)]
pub struct JobEngine {
    inner: Arc<EngineShared>,
}

struct EngineShared {
    config: EngineConfig,
    job_pool: Arc<Semaphore>,
    task_pool: Arc<Semaphore>,
    active: Mutex<Vec<Job>>,
    handles: Mutex<Vec<JoinHandle<()>>>,
    listeners: Mutex<Vec<(ListenerId, Arc<dyn JobCompletionListener>)>>,
    next_job_id: AtomicU64,
    next_listener_id: AtomicU64,
    shutdown: AtomicBool,
}

impl JobEngine {
    pub fn new(config: EngineConfig) -> Self {
        info!(
            job_pool_size = config.job_pool_size,
            task_pool_size = config.task_pool_size,
            "job engine started"
        );
        let shared = EngineShared {
            job_pool: Arc::new(Semaphore::new(config.job_pool_size)),
            task_pool: Arc::new(Semaphore::new(config.task_pool_size)),
            config,
            active: Mutex::new(Vec::new()),
            handles: Mutex::new(Vec::new()),
            listeners: Mutex::new(Vec::new()),
            next_job_id: AtomicU64::new(1),
            next_listener_id: AtomicU64::new(1),
            shutdown: AtomicBool::new(false),
        };
        Self {
            inner: Arc::new(shared),
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    /// Queue `graph` for execution as a new job.
    ///
    /// Must be called from within a tokio runtime. When the job pool is
    /// already full, a job whose unlock tasks target a lock also targeted
    /// by an active job is aborted and rejected with
    /// [`JobGraphError::Deadlock`]: it could wait forever for a slot held by
    /// a job that waits on its lock.
    pub fn submit(
        &self,
        name: impl Into<String>,
        graph: TaskGraph,
        options: SubmitOptions,
    ) -> Result<Job> {
        if self.is_shutdown() {
            return Err(JobGraphError::EngineShutdown);
        }

        let id = JobId(self.inner.next_job_id.fetch_add(1, Ordering::SeqCst));
        let SubmitOptions {
            lock_objects,
            completion_listener,
            task_listener,
            store,
        } = options;

        let (job, runner) = Job::new(
            id,
            name,
            graph,
            lock_objects,
            self.inner.task_pool.clone(),
            store,
        );
        if let Some(listener) = completion_listener {
            job.add_completion_listener(listener);
        }
        for (_, listener) in self.inner.listeners.lock().iter() {
            job.add_completion_listener(listener.clone());
        }
        if let Some(listener) = task_listener {
            job.add_task_change_listener(listener);
        }

        job.mark_queued();
        info!(job = %id, name = %job.name(), "job submitted");

        {
            let mut active = self.inner.active.lock();
            if self.inner.job_pool.available_permits() == 0 && would_deadlock(&job, &active) {
                drop(active);
                warn!(job = %id, name = %job.name(), "job would deadlock; aborting");
                job.abort(DEADLOCK_ABORT_REASON);
                job.finish();
                return Err(JobGraphError::Deadlock(job.name().to_string()));
            }
            active.push(job.clone());
        }

        let handle = tokio::spawn(drive(self.inner.clone(), job.clone(), runner));
        let mut handles = self.inner.handles.lock();
        handles.retain(|h| !h.is_finished());
        handles.push(handle);

        Ok(job)
    }

    /// Abort an active job. Returns `false` if no active job has this id.
    pub fn abort_job(&self, id: JobId, reason: &str) -> bool {
        let job = self
            .inner
            .active
            .lock()
            .iter()
            .find(|job| job.id() == id)
            .cloned();

        match job {
            Some(job) => {
                if !job.state().is_terminal() {
                    job.abort(reason);
                }
                true
            }
            None => false,
        }
    }

    /// The active job whose graph contains `task`.
    pub fn job_by_task(&self, task: &TaskRef) -> Option<Job> {
        let active = self.inner.active.lock().clone();
        active.into_iter().find(|job| job.contains_task(task))
    }

    pub fn active_jobs(&self) -> Vec<Job> {
        self.inner.active.lock().clone()
    }

    pub fn active_job_count(&self) -> usize {
        self.inner.active.lock().len()
    }

    /// `true` while at least one job holds a job pool slot.
    pub fn is_active(&self) -> bool {
        self.running_job_count() > 0
    }

    fn running_job_count(&self) -> usize {
        self.inner
            .config
            .job_pool_size
            .saturating_sub(self.inner.job_pool.available_permits())
    }

    fn running_task_count(&self) -> usize {
        self.inner
            .config
            .task_pool_size
            .saturating_sub(self.inner.task_pool.available_permits())
    }

    pub fn is_shutdown(&self) -> bool {
        self.inner.shutdown.load(Ordering::SeqCst)
    }

    /// Register a listener added to every job submitted from now on.
    pub fn add_job_completion_listener(&self, listener: Arc<dyn JobCompletionListener>) -> ListenerId {
        let id = ListenerId(self.inner.next_listener_id.fetch_add(1, Ordering::SeqCst));
        self.inner.listeners.lock().push((id, listener));
        id
    }

    /// Jobs already submitted keep the listener.
    pub fn remove_job_completion_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.inner.listeners.lock();
        let before = listeners.len();
        listeners.retain(|(lid, _)| *lid != id);
        listeners.len() != before
    }

    pub fn log_status(&self) {
        debug!(
            running = self.running_job_count(),
            size = self.inner.config.job_pool_size,
            active = self.active_job_count(),
            shutdown = self.is_shutdown(),
            "[job monitor]"
        );
        debug!(
            running = self.running_task_count(),
            size = self.inner.config.task_pool_size,
            shutdown = self.is_shutdown(),
            "[task monitor]"
        );
    }

    /// Abort every active job, close both pools and wait (bounded by the
    /// configured timeout) for the job loops to exit.
    pub async fn shutdown(&self) {
        info!("job engine shutdown requested");
        self.inner.shutdown.store(true, Ordering::SeqCst);

        let jobs = self.active_jobs();
        for job in jobs {
            job.abort(SHUTDOWN_ABORT_REASON);
        }

        self.inner.job_pool.close();
        self.inner.task_pool.close();
        self.log_status();

        let handles = std::mem::take(&mut *self.inner.handles.lock());
        let timeout = self.inner.config.shutdown_timeout();
        if tokio::time::timeout(timeout, join_all(handles)).await.is_err() {
            warn!(
                timeout_secs = timeout.as_secs(),
                "couldn't wait any longer for job(s) completion; shutting down job engine"
            );
        }
    }
}

impl fmt::Debug for JobEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JobEngine")
            .field("config", &self.inner.config)
            .field("active", &self.active_job_count())
            .field("shutdown", &self.is_shutdown())
            .finish()
    }
}

fn would_deadlock(job: &Job, active: &[Job]) -> bool {
    let wanted = job.current_lock_references();
    if wanted.is_empty() {
        return false;
    }
    let held: HashSet<LockObjectReference> = active
        .iter()
        .flat_map(|other| other.current_lock_references())
        .collect();
    wanted.iter().any(|reference| held.contains(reference))
}

/// Run one job on the job pool and complete it.
async fn drive(shared: Arc<EngineShared>, job: Job, runner: JobRunner) {
    let permit = tokio::select! {
        permit = shared.job_pool.clone().acquire_owned() => permit.ok(),
        _ = job.aborted() => None,
    };

    match permit {
        Some(_permit) => runner.run().await,
        None if !job.is_aborted() => {
            // The pool closed before this job got a slot.
            job.abort(SHUTDOWN_ABORT_REASON);
        }
        None => debug!(job = %job.id(), "job aborted before it started"),
    }

    shared.active.lock().retain(|other| other.id() != job.id());
    job.finish();
}
