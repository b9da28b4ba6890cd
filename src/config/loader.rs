// src/config/loader.rs

use std::env;
use std::fs;
use std::path::{Path, PathBuf};

use crate::config::model::{ConfigFile, RawConfigFile};
use crate::errors::Result;

/// Load a configuration file from a given path and return the raw `RawConfigFile`.
///
/// This only performs TOML deserialization; it does **not** perform semantic
/// validation. Use [`load_and_validate`] for that.
pub fn load_from_path(path: impl AsRef<Path>) -> Result<RawConfigFile> {
    let path = path.as_ref();
    let contents = fs::read_to_string(path)?;

    let config: RawConfigFile = toml::from_str(&contents)?;

    Ok(config)
}

/// Load a configuration file, apply environment overrides and validate.
///
/// - Reads TOML and applies `serde` defaults.
/// - Applies `JOBGRAPH_JOB_POOL_SIZE` / `JOBGRAPH_TASK_POOL_SIZE`.
/// - Checks pool sizes, unknown or self `after` references and cycles.
pub fn load_and_validate(path: impl AsRef<Path>) -> Result<ConfigFile> {
    load_and_validate_with_env(path, |var| env::var(var).ok())
}

/// [`load_and_validate`] with an explicit environment lookup.
pub fn load_and_validate_with_env(
    path: impl AsRef<Path>,
    lookup: impl Fn(&str) -> Option<String>,
) -> Result<ConfigFile> {
    let mut raw_config = load_from_path(&path)?;
    raw_config.engine = raw_config.engine.with_env_overrides(lookup)?;
    let config = ConfigFile::try_from(raw_config)?;
    Ok(config)
}

/// `Jobgraph.toml` in the current working directory.
pub fn default_config_path() -> PathBuf {
    PathBuf::from("Jobgraph.toml")
}
