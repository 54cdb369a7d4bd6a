//! Version-control recording of committed change sets.

use std::collections::BTreeSet;
use std::io;
use std::path::Path;
use std::process::Command;
use tracing::{debug, warn};

/// Commit message recorded when the caller gives none.
pub const DEFAULT_COMMIT_MESSAGE: &str = "dazbuild change";

/// Records a committed change set, e.g. as a git commit.
pub trait ChangeRecorder: Send + Sync {
    /// Records `files` (relative to `root`) with `message`. Returns whether
    /// anything was recorded.
    ///
    /// # Errors
    ///
    /// Returns a description of the failure. The files are already on disk;
    /// a failure here never undoes the commit.
    fn record(&self, root: &Path, files: &BTreeSet<String>, message: &str)
        -> Result<bool, String>;
}

/// Recorder that does nothing.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopRecorder;

impl ChangeRecorder for NoopRecorder {
    fn record(&self, _root: &Path, _files: &BTreeSet<String>, _message: &str) -> Result<bool, String> {
        Ok(false)
    }
}

/// Stages the touched files and commits them with git.
#[derive(Debug, Default, Clone, Copy)]
pub struct GitRecorder;

impl GitRecorder {
    fn git(root: &Path, args: &[&str]) -> Result<(), String> {
        let output = Command::new("git")
            .args(args)
            .current_dir(root)
            .output()
            .map_err(|e: io::Error| format!("failed to run git: {}", e))?;

        if output.status.success() {
            Ok(())
        } else {
            let stderr = String::from_utf8_lossy(&output.stderr);
            let stdout = String::from_utf8_lossy(&output.stdout);
            Err(format!(
                "git {} failed: {}",
                args.first().copied().unwrap_or_default(),
                if stderr.trim().is_empty() { stdout.trim() } else { stderr.trim() }
            ))
        }
    }
}

impl ChangeRecorder for GitRecorder {
    fn record(&self, root: &Path, files: &BTreeSet<String>, message: &str) -> Result<bool, String> {
        if files.is_empty() {
            return Ok(false);
        }

        let mut add = vec!["add", "--"];
        add.extend(files.iter().map(String::as_str));
        Self::git(root, &add)?;

        let message = if message.trim().is_empty() {
            DEFAULT_COMMIT_MESSAGE
        } else {
            message
        };
        Self::git(root, &["commit", "-m", message])
            .inspect_err(|e| warn!(error = %e, "git commit failed"))?;

        debug!(files = files.len(), "Recorded change set with git");
        Ok(true)
    }
}
