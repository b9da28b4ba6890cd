// src/config/workflow.rs

//! Turn a validated workflow file into a runnable [`TaskGraph`].

use std::collections::HashMap;

use crate::config::model::ConfigFile;
use crate::config::validate::task_order;
use crate::dag::TaskGraph;
use crate::errors::{JobGraphError, Result};
use crate::exec::CommandTask;
use crate::task::TaskRef;

/// Build one [`CommandTask`] per `[task.<name>]`.
///
/// Tasks without `after` hang off Start as parallel branches; the others
/// are chained after their dependencies with their configured guard.
pub fn build_task_graph(cfg: &ConfigFile) -> Result<TaskGraph> {
    let mut graph = TaskGraph::new();
    let mut refs: HashMap<String, TaskRef> = HashMap::new();

    for name in task_order(cfg.tasks())? {
        let task_cfg = cfg
            .tasks()
            .get(&name)
            .ok_or_else(|| JobGraphError::TaskNotFound(name.clone()))?;

        let mut command = CommandTask::new(name.clone(), task_cfg.cmd.clone());
        if let Some(cwd) = &task_cfg.cwd {
            command = command.with_cwd(cwd);
        }
        let task = TaskRef::new(command);

        let predecessors = task_cfg
            .after
            .iter()
            .map(|dep| {
                refs.get(dep)
                    .ok_or_else(|| JobGraphError::TaskNotFound(dep.clone()))
            })
            .collect::<Result<Vec<_>>>()?;

        graph.add_task_with_guard(task.clone(), task_cfg.effective_guard(), &predecessors)?;
        refs.insert(name, task);
    }

    Ok(graph)
}
