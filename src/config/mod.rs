// src/config/mod.rs

//! Configuration loading and validation.
//!
//! Responsibilities:
//! - Define the TOML-backed data model (`model.rs`).
//! - Load a config file from disk and apply environment overrides (`loader.rs`).
//! - Validate pool sizes and DAG correctness (`validate.rs`).
//! - Build a [`TaskGraph`](crate::dag::TaskGraph) from the tasks (`workflow.rs`).

pub mod loader;
pub mod model;
pub mod validate;
pub mod workflow;

pub use loader::{default_config_path, load_and_validate, load_and_validate_with_env, load_from_path};
pub use model::{
    ConfigFile, EngineConfig, JOB_POOL_SIZE_ENV, RawConfigFile, TASK_POOL_SIZE_ENV, TaskConfig,
};
pub use validate::validate_engine_config;
pub use workflow::build_task_graph;
