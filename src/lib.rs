// src/lib.rs

pub mod cli;
pub mod config;
pub mod dag;
pub mod engine;
pub mod errors;
pub mod exec;
pub mod logging;
pub mod task;
pub mod types;

use anyhow::Result;
use tracing::{debug, info, warn};

use crate::cli::CliArgs;
use crate::config::{ConfigFile, build_task_graph, load_and_validate};
use crate::dag::TaskGraph;
use crate::engine::{JobEngine, JobSnapshot, SubmitOptions};

/// High-level entry point used by `main.rs`.
///
/// Loads the workflow, runs it as a single job and prints a per-task
/// report. Returns whether the job passed. Ctrl-C shuts the engine down,
/// which aborts the job.
pub async fn run(args: CliArgs) -> Result<bool> {
    let cfg = load_and_validate(&args.config)?;
    let graph = build_task_graph(&cfg)?;

    if args.dry_run {
        print_dry_run(&cfg, &graph);
        return Ok(true);
    }

    let job_name = args.job_name.clone().unwrap_or_else(|| {
        args.config
            .file_stem()
            .map(|stem| stem.to_string_lossy().into_owned())
            .unwrap_or_else(|| "jobgraph".to_string())
    });

    let engine = JobEngine::new(*cfg.engine());
    let job = engine.submit(job_name, graph, SubmitOptions::new())?;

    tokio::select! {
        _ = job.wait_for_completion() => {}
        signal = tokio::signal::ctrl_c() => {
            match signal {
                Ok(()) => info!("Ctrl-C received; shutting down"),
                Err(err) => warn!(error = %err, "failed to listen for Ctrl-C; shutting down"),
            }
            engine.shutdown().await;
            job.wait_for_completion().await;
        }
    }

    let snapshot = job.snapshot();
    print_report(&snapshot);

    engine.shutdown().await;
    Ok(snapshot.status.is_successful())
}

fn print_report(snapshot: &JobSnapshot) {
    println!("{snapshot}");
    if let Some(reason) = &snapshot.failure_reason {
        println!("  reason: {reason}");
    }
    for task in &snapshot.tasks {
        match &task.failure_reason {
            Some(reason) => println!("  {:<24} {:<8} {reason}", task.name, task.status),
            None => println!("  {:<24} {}", task.name, task.status),
        }
    }
}

/// Simple dry-run output: engine settings, then tasks in run order.
fn print_dry_run(cfg: &ConfigFile, graph: &TaskGraph) {
    let engine = cfg.engine();
    println!("jobgraph dry-run");
    println!("  engine.job_pool_size = {}", engine.job_pool_size);
    println!("  engine.task_pool_size = {}", engine.task_pool_size);
    println!("  engine.shutdown_timeout_secs = {}", engine.shutdown_timeout_secs);
    println!();

    println!("tasks ({}):", graph.task_count());
    for id in graph.topological_order() {
        if graph.is_start_or_end(id) {
            continue;
        }
        let Some(node) = graph.node(id) else {
            continue;
        };
        let name = node.name();
        println!("  - {name}");
        if let Some(task) = cfg.tasks().get(&name) {
            println!("      cmd: {}", task.cmd);
            if !task.after.is_empty() {
                println!("      after: {:?}", task.after);
            }
        }
        println!("      guard: {}", node.guard());
    }

    debug!("dry-run complete (no execution)");
}
