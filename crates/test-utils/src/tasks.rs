//! Instrumented [`Task`] implementations for engine tests.
//!
//! Every task writes its name into a shared [`ExecutionLog`] when its body
//! runs, so tests can assert on what ran and in which order.

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use anyhow::anyhow;
use futures::future::BoxFuture;
use parking_lot::Mutex;
use tokio::sync::Notify;

use jobgraph::dag::TaskGraph;
use jobgraph::task::{
    DataKey, LockObjectReference, MetaTask, Task, TaskContext, TaskPorts, TaskRef, UnlockTask,
};

/// Wrap `task` both as a concrete `Arc` (for assertions) and a [`TaskRef`]
/// (for graph building). Both point at the same allocation.
pub fn task_ref<T: Task>(task: T) -> (Arc<T>, TaskRef) {
    let task = Arc::new(task);
    let handle = TaskRef::from_arc(task.clone());
    (task, handle)
}

/// Ordered record of task bodies that ran.
#[derive(Debug, Clone, Default)]
pub struct ExecutionLog(Arc<Mutex<Vec<String>>>);

impl ExecutionLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, name: &str) {
        self.0.lock().push(name.to_string());
    }

    pub fn entries(&self) -> Vec<String> {
        self.0.lock().clone()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.0.lock().iter().any(|entry| entry == name)
    }

    pub fn position(&self, name: &str) -> Option<usize> {
        self.0.lock().iter().position(|entry| entry == name)
    }

    pub fn count(&self, name: &str) -> usize {
        self.0.lock().iter().filter(|entry| *entry == name).count()
    }
}

/// Succeeds after an optional delay, optionally reading and writing
/// string values.
pub struct RecordingTask {
    name: String,
    log: ExecutionLog,
    delay: Option<Duration>,
    consumes: Vec<DataKey<String>>,
    produces: Vec<(DataKey<String>, String)>,
    seen: Mutex<HashMap<&'static str, Option<String>>>,
    running: AtomicUsize,
    max_running: AtomicUsize,
}

impl RecordingTask {
    pub fn new(name: &str, log: &ExecutionLog) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            delay: None,
            consumes: Vec::new(),
            produces: Vec::new(),
            seen: Mutex::new(HashMap::new()),
            running: AtomicUsize::new(0),
            max_running: AtomicUsize::new(0),
        }
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn consumes(mut self, key: DataKey<String>) -> Self {
        self.consumes.push(key);
        self
    }

    pub fn produces(mut self, key: DataKey<String>, value: &str) -> Self {
        self.produces.push((key, value.to_string()));
        self
    }

    /// Value the body saw for `key`; `None` if the body never ran.
    pub fn seen_input(&self, key: DataKey<String>) -> Option<Option<String>> {
        self.seen.lock().get(key.name()).cloned()
    }

    /// Most bodies of this task observed running at the same time.
    pub fn max_concurrency(&self) -> usize {
        self.max_running.load(Ordering::SeqCst)
    }
}

impl Task for RecordingTask {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn execute<'a>(&'a self, ctx: &'a mut TaskContext) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
            self.max_running.fetch_max(now, Ordering::SeqCst);
            self.log.record(&self.name);

            for key in &self.consumes {
                self.seen.lock().insert(key.name(), ctx.input(*key));
            }
            if let Some(delay) = self.delay {
                tokio::time::sleep(delay).await;
            }
            for (key, value) in &self.produces {
                ctx.set_output(*key, value.clone());
            }

            self.running.fetch_sub(1, Ordering::SeqCst);
            Ok(())
        })
    }

    fn ports(&self) -> TaskPorts {
        let mut ports = TaskPorts::new();
        for key in &self.consumes {
            ports = ports.input(*key);
        }
        for (key, _) in &self.produces {
            ports = ports.output(*key);
        }
        ports
    }
}

/// Always fails with `message`.
pub struct FailingTask {
    name: String,
    log: ExecutionLog,
    message: String,
    produces: Vec<(DataKey<String>, String)>,
}

impl FailingTask {
    pub fn new(name: &str, log: &ExecutionLog) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            message: format!("{name} failed on purpose"),
            produces: Vec::new(),
        }
    }

    pub fn with_message(mut self, message: &str) -> Self {
        self.message = message.to_string();
        self
    }

    /// Written before failing; must never reach downstream tasks.
    pub fn produces(mut self, key: DataKey<String>, value: &str) -> Self {
        self.produces.push((key, value.to_string()));
        self
    }
}

impl Task for FailingTask {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn execute<'a>(&'a self, ctx: &'a mut TaskContext) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.log.record(&self.name);
            for (key, value) in &self.produces {
                ctx.set_output(*key, value.clone());
            }
            Err(anyhow!("{}", self.message))
        })
    }

    fn ports(&self) -> TaskPorts {
        self.produces
            .iter()
            .fold(TaskPorts::new(), |ports, (key, _)| ports.output(*key))
    }
}

/// Panics inside its body.
pub struct PanickingTask {
    name: String,
    log: ExecutionLog,
}

impl PanickingTask {
    pub fn new(name: &str, log: &ExecutionLog) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
        }
    }
}

impl Task for PanickingTask {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn execute<'a>(&'a self, _ctx: &'a mut TaskContext) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.log.record(&self.name);
            explode(&self.name)
        })
    }
}

fn explode(name: &str) -> anyhow::Result<()> {
    panic!("{name} exploded")
}

/// MetaTask that hands out a prepared graph on its first expansion.
pub struct ExpandingMetaTask {
    name: String,
    log: ExecutionLog,
    graph: Mutex<Option<TaskGraph>>,
    fail: bool,
}

impl ExpandingMetaTask {
    pub fn new(name: &str, log: &ExecutionLog, graph: TaskGraph) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            graph: Mutex::new(Some(graph)),
            fail: false,
        }
    }

    /// Fail the body; the graph must then never be spliced in.
    pub fn failing(mut self) -> Self {
        self.fail = true;
        self
    }
}

impl Task for ExpandingMetaTask {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn execute<'a>(&'a self, _ctx: &'a mut TaskContext) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.log.record(&self.name);
            if self.fail {
                return Err(anyhow!("{} could not plan its work", self.name));
            }
            Ok(())
        })
    }

    fn as_meta(&self) -> Option<&dyn MetaTask> {
        Some(self)
    }
}

impl MetaTask for ExpandingMetaTask {
    fn task_graph(&self) -> Option<TaskGraph> {
        self.graph.lock().take()
    }
}

/// Unlock task that counts executions and forced releases.
pub struct RecordingUnlockTask {
    name: String,
    log: ExecutionLog,
    references: Vec<LockObjectReference>,
    released: AtomicUsize,
}

impl RecordingUnlockTask {
    pub fn new(name: &str, log: &ExecutionLog, references: Vec<LockObjectReference>) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            references,
            released: AtomicUsize::new(0),
        }
    }

    /// Times `release` was called outside of `execute`.
    pub fn forced_releases(&self) -> usize {
        self.released.load(Ordering::SeqCst)
    }
}

impl Task for RecordingUnlockTask {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn execute<'a>(&'a self, _ctx: &'a mut TaskContext) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.log.record(&self.name);
            Ok(())
        })
    }

    fn lock_objects(&self) -> Vec<LockObjectReference> {
        self.references.clone()
    }

    fn as_unlock(&self) -> Option<&dyn UnlockTask> {
        Some(self)
    }
}

impl UnlockTask for RecordingUnlockTask {
    fn lock_references(&self) -> Vec<LockObjectReference> {
        self.references.clone()
    }

    fn release(&self) {
        self.released.fetch_add(1, Ordering::SeqCst);
    }
}

/// Blocks its thread with `std::thread::sleep`, tracking how many bodies
/// are blocked at once.
pub struct BlockingTask {
    name: String,
    log: ExecutionLog,
    duration: Duration,
    gauge: Arc<ConcurrencyGauge>,
}

/// Shared counter of bodies running at the same time.
#[derive(Debug, Default)]
pub struct ConcurrencyGauge {
    running: AtomicUsize,
    peak: AtomicUsize,
}

impl ConcurrencyGauge {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }

    fn enter(&self) {
        let now = self.running.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
    }

    fn leave(&self) {
        self.running.fetch_sub(1, Ordering::SeqCst);
    }
}

impl BlockingTask {
    pub fn new(
        name: &str,
        log: &ExecutionLog,
        duration: Duration,
        gauge: &Arc<ConcurrencyGauge>,
    ) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
            duration,
            gauge: gauge.clone(),
        }
    }
}

impl Task for BlockingTask {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn execute<'a>(&'a self, _ctx: &'a mut TaskContext) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.gauge.enter();
            self.log.record(&self.name);
            std::thread::sleep(self.duration);
            self.gauge.leave();
            Ok(())
        })
    }
}

/// Panics when asked for its ports, i.e. while the job dispatches it.
pub struct BrokenPortsTask {
    name: String,
    log: ExecutionLog,
}

impl BrokenPortsTask {
    pub fn new(name: &str, log: &ExecutionLog) -> Self {
        Self {
            name: name.to_string(),
            log: log.clone(),
        }
    }
}

impl Task for BrokenPortsTask {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn execute<'a>(&'a self, _ctx: &'a mut TaskContext) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.log.record(&self.name);
            Ok(())
        })
    }

    fn ports(&self) -> TaskPorts {
        panic!("{} has no ports", self.name)
    }
}

/// Signals as soon as its body starts, then waits for a long time.
pub struct SignallingTask {
    name: String,
    started: Arc<Notify>,
}

impl SignallingTask {
    pub fn new(name: &str) -> (Self, Arc<Notify>) {
        let started = Arc::new(Notify::new());
        let task = Self {
            name: name.to_string(),
            started: started.clone(),
        };
        (task, started)
    }
}

impl Task for SignallingTask {
    fn name(&self) -> String {
        self.name.clone()
    }

    fn execute<'a>(&'a self, _ctx: &'a mut TaskContext) -> BoxFuture<'a, anyhow::Result<()>> {
        Box::pin(async move {
            self.started.notify_one();
            tokio::time::sleep(Duration::from_secs(30)).await;
            Ok(())
        })
    }
}
