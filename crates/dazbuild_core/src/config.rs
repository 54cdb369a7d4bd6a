//! Configuration types for dazbuild.

use crate::error::{DazError, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

/// Default configuration file name.
pub const CONFIG_FILE: &str = "dazbuild.toml";

/// Top-level configuration, loaded once at process start.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
pub struct Config {
    /// Repository name to root path.
    #[serde(default)]
    pub repositories: BTreeMap<String, String>,

    /// File discovery for the structural index.
    #[serde(default)]
    pub index: IndexConfig,

    /// Validation gate commands and policy.
    #[serde(default)]
    pub gate: GateConfig,

    /// Commit recording.
    #[serde(default)]
    pub commit: CommitConfig,

    /// Search defaults.
    #[serde(default)]
    pub search: SearchConfig,

    /// Directory the file was loaded from; relative repository paths resolve
    /// against it.
    #[serde(skip)]
    base_dir: Option<PathBuf>,
}

impl Config {
    /// Load configuration from a file, or defaults if it does not exist.
    pub fn load(path: &Path) -> Result<Self> {
        let mut config = if path.exists() {
            let content = fs::read_to_string(path)
                .map_err(|e| DazError::ConfigError(format!("failed to read config: {}", e)))?;
            toml::from_str::<Config>(&content)
                .map_err(|e| DazError::ConfigError(format!("failed to parse config: {}", e)))?
        } else {
            Config::default()
        };
        config.base_dir = path.parent().map(Path::to_path_buf);
        Ok(config)
    }

    /// Save configuration to a file.
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)
            .map_err(|e| DazError::ConfigError(format!("failed to serialize config: {}", e)))?;
        fs::write(path, content)
            .map_err(|e| DazError::ConfigError(format!("failed to write config: {}", e)))?;
        Ok(())
    }

    /// Resolves repository paths, dropping entries that do not exist.
    ///
    /// `~` expands to `$HOME`; relative paths resolve against the directory
    /// of the configuration file.
    pub fn resolved_repositories(&self) -> BTreeMap<String, PathBuf> {
        let home = std::env::var_os("HOME").map(PathBuf::from);
        let mut resolved = BTreeMap::new();

        for (name, raw) in &self.repositories {
            let path = expand_path(raw, home.as_deref(), self.base_dir.as_deref());
            if path.is_dir() {
                resolved.insert(name.clone(), path);
            } else {
                warn!(repository = %name, path = %path.display(), "configured repository path does not exist, skipping");
            }
        }

        resolved
    }
}

fn expand_path(raw: &str, home: Option<&Path>, base: Option<&Path>) -> PathBuf {
    let expanded = match (raw.strip_prefix('~'), home) {
        (Some(rest), Some(home)) if rest.is_empty() || rest.starts_with('/') => {
            home.join(rest.trim_start_matches('/'))
        }
        _ => PathBuf::from(raw),
    };

    match base {
        Some(base) if expanded.is_relative() => base.join(expanded),
        _ => expanded,
    }
}

/// File discovery configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexConfig {
    /// Skip files and directories whose name starts with `.` (default: true).
    pub ignore_hidden: bool,

    /// Files larger than this are not indexed (default: 1 MiB).
    pub max_file_bytes: u64,

    /// List files with `git ls-files` when the root is a git work tree
    /// (default: true).
    pub use_git_ls_files: bool,
}

impl Default for IndexConfig {
    fn default() -> Self {
        Self {
            ignore_hidden: true,
            max_file_bytes: 1024 * 1024,
            use_git_ls_files: true,
        }
    }
}

/// An external check command.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CommandSpec {
    /// Executable name or path.
    pub program: String,

    /// Arguments passed to the program.
    #[serde(default)]
    pub args: Vec<String>,

    /// Output substrings that fail the check even on exit status 0.
    #[serde(default)]
    pub fail_patterns: Vec<String>,
}

impl CommandSpec {
    /// Creates a command spec without fail patterns.
    pub fn new(program: impl Into<String>, args: &[&str]) -> Self {
        Self {
            program: program.into(),
            args: args.iter().map(|a| a.to_string()).collect(),
            fail_patterns: Vec::new(),
        }
    }
}

/// Validation gate configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GateConfig {
    /// Wall-clock budget for one gate run, both checks (default: 300).
    pub timeout_secs: u64,

    /// Static analysis command.
    pub lint: CommandSpec,

    /// Unit test command.
    pub tests: CommandSpec,

    /// Every policy file must declare a test.
    pub require_tests_per_file: bool,

    /// Substrings that may not appear in any policy file.
    pub forbidden_patterns: Vec<String>,

    /// Extensions (without the dot) of the files the policy rules apply to
    /// (default: `["py"]`).
    pub policy_extensions: Vec<String>,
}

impl GateConfig {
    /// Returns the gate timeout as a Duration.
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for GateConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 300,
            lint: CommandSpec::new(
                "pylint",
                &["--disable=C,R", "--score=n", "--recursive=y", "."],
            ),
            // Tests live inside the modules they cover.
            tests: CommandSpec {
                fail_patterns: vec!["Ran 0 tests".into()],
                ..CommandSpec::new("python3", &["-m", "unittest", "discover", "-p", "*.py"])
            },
            require_tests_per_file: true,
            forbidden_patterns: vec!["unittest.main".into()],
            policy_extensions: vec!["py".into()],
        }
    }
}

/// Commit configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct CommitConfig {
    /// Record each commit with `git add` + `git commit` (default: false).
    pub record_with_git: bool,
}

/// Search configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Results returned when the caller gives no limit (default: 10).
    pub default_limit: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self { default_limit: 10 }
    }
}
