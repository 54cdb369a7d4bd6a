//! CLI commands.

pub mod browse;
pub mod check;
pub mod edit;
pub mod repos;
pub mod serve;

use anyhow::{Context, Result};
use dazbuild_core::{Config, Registry, CONFIG_FILE};
use std::path::{Path, PathBuf};

/// Environment variable naming the configuration file.
pub const CONFIG_ENV: &str = "DAZBUILD_CONFIG";

/// Resolves the configuration path: flag, then `$DAZBUILD_CONFIG`, then
/// `./dazbuild.toml`.
pub fn config_path(flag: Option<&Path>) -> PathBuf {
    flag.map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(CONFIG_FILE))
}

/// Loads the configuration.
pub fn load_config(flag: Option<&Path>) -> Result<Config> {
    let path = config_path(flag);
    Config::load(&path).with_context(|| format!("failed to load {}", path.display()))
}

/// Builds a registry and opens `repo` in it.
pub fn open_registry(flag: Option<&Path>, repo: &str) -> Result<Registry> {
    let config = load_config(flag)?;
    let mut registry = Registry::new(&config);
    let report = registry.open_repository(repo)?;
    for failure in &report.parse_failures {
        eprintln!(
            "warning: {} could not be parsed and is only addressable as a whole file",
            failure.path
        );
    }
    Ok(registry)
}
