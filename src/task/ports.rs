// src/task/ports.rs

//! Named inputs and outputs exchanged between tasks.
//!
//! A task declares the names it reads and writes through [`TaskPorts`]
//! using typed [`DataKey`]s. Before a task is dispatched the scheduler looks
//! each declared input up in the outputs of its predecessors (nearest first,
//! then further up the ancestor chain) and hands the matches over in a
//! [`TaskContext`]. Declared outputs written during `execute` are recorded
//! on the node once the body has succeeded.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::marker::PhantomData;
use std::sync::Arc;

use tracing::warn;

/// Type-erased value stored in a node's output map.
pub type OutputValue = Arc<dyn Any + Send + Sync>;

/// Typed name of a value passed between tasks.
pub struct DataKey<T> {
    name: &'static str,
    _marker: PhantomData<fn() -> T>,
}

impl<T> DataKey<T> {
    pub const fn new(name: &'static str) -> Self {
        Self {
            name,
            _marker: PhantomData,
        }
    }

    pub fn name(&self) -> &'static str {
        self.name
    }
}

impl<T> Clone for DataKey<T> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<T> Copy for DataKey<T> {}

impl<T> fmt::Debug for DataKey<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("DataKey").field(&self.name).finish()
    }
}

/// Declared input and output names of a task.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TaskPorts {
    inputs: Vec<&'static str>,
    outputs: Vec<&'static str>,
}

impl TaskPorts {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn input<T>(mut self, key: DataKey<T>) -> Self {
        if !self.inputs.contains(&key.name()) {
            self.inputs.push(key.name());
        }
        self
    }

    pub fn output<T>(mut self, key: DataKey<T>) -> Self {
        if !self.outputs.contains(&key.name()) {
            self.outputs.push(key.name());
        }
        self
    }

    pub fn inputs(&self) -> &[&'static str] {
        &self.inputs
    }

    pub fn outputs(&self) -> &[&'static str] {
        &self.outputs
    }
}

/// Per-execution view handed to [`Task::execute`](crate::task::Task::execute).
pub struct TaskContext {
    job_name: String,
    task_name: String,
    inputs: HashMap<String, OutputValue>,
    declared_outputs: Vec<&'static str>,
    outputs: HashMap<String, OutputValue>,
}

impl TaskContext {
    pub fn new(
        job_name: impl Into<String>,
        task_name: impl Into<String>,
        inputs: HashMap<String, OutputValue>,
        declared_outputs: Vec<&'static str>,
    ) -> Self {
        Self {
            job_name: job_name.into(),
            task_name: task_name.into(),
            inputs,
            declared_outputs,
            outputs: HashMap::new(),
        }
    }

    pub fn job_name(&self) -> &str {
        &self.job_name
    }

    pub fn task_name(&self) -> &str {
        &self.task_name
    }

    /// Resolved upstream value for `key`, if any upstream task produced one
    /// of the right type.
    pub fn input<T: Any + Send + Sync + Clone>(&self, key: DataKey<T>) -> Option<T> {
        self.inputs
            .get(key.name())
            .and_then(|value| value.downcast_ref::<T>())
            .cloned()
    }

    /// Record an output value. Names not declared in the task's ports are
    /// dropped.
    pub fn set_output<T: Any + Send + Sync>(&mut self, key: DataKey<T>, value: T) {
        if !self.declared_outputs.contains(&key.name()) {
            warn!(
                task = %self.task_name,
                output = key.name(),
                "task wrote an undeclared output; ignoring"
            );
            return;
        }
        self.outputs.insert(key.name().to_string(), Arc::new(value));
    }

    /// Consume the context, returning the outputs written by the body.
    pub fn into_outputs(self) -> HashMap<String, OutputValue> {
        self.outputs
    }
}

impl fmt::Debug for TaskContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TaskContext")
            .field("job_name", &self.job_name)
            .field("task_name", &self.task_name)
            .field("inputs", &self.inputs.keys().collect::<Vec<_>>())
            .field("outputs", &self.outputs.keys().collect::<Vec<_>>())
            .finish()
    }
}
