//! Cross-process repository lock.
//!
//! One lock file per repository root, named after the BLAKE3 hash of the
//! canonical root path and kept under the system temp directory so the
//! repository itself is never written to outside of commits.

use crate::content_hash::ContentHash;
use crate::error::{DazError, Result};
use fs2::FileExt;
use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// RAII guard for a repository lock.
///
/// Holds an exclusive lock on the lock file. The lock is released when
/// dropped, and the lock file is removed.
#[derive(Debug)]
pub struct LockGuard {
    /// The open lock file (holds the file lock).
    /// Wrapped in Option to allow taking ownership in Drop.
    file: Option<File>,
    /// Path to the lock file (for cleanup on drop).
    path: PathBuf,
}

impl LockGuard {
    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = FileExt::unlock(&file);
            drop(file);
        }
        let _ = fs::remove_file(&self.path);
    }
}

/// Lock file path for a repository root.
pub fn lock_path(root: &Path) -> PathBuf {
    let canonical = root.canonicalize().unwrap_or_else(|_| root.to_path_buf());
    let hash = ContentHash::of(canonical.to_string_lossy().as_bytes());
    std::env::temp_dir()
        .join("dazbuild-locks")
        .join(format!("{}.lock", hash.as_hex()))
}

/// Acquires the lock for `root`.
///
/// A lock left behind by a dead process is reclaimed.
pub fn acquire(root: &Path) -> Result<LockGuard> {
    let path = lock_path(root);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    acquire_with_retry(&path, 0)
}

fn acquire_with_retry(lock_path: &Path, retry_count: u32) -> Result<LockGuard> {
    // Limit retries to prevent infinite loops
    if retry_count > 2 {
        return Err(DazError::RepositoryLocked { pid: 0 });
    }

    match OpenOptions::new()
        .write(true)
        .create_new(true)
        .open(lock_path)
    {
        Ok(file) => claim(lock_path, file),
        Err(e) if e.kind() == std::io::ErrorKind::AlreadyExists => {
            handle_existing_lock(lock_path, retry_count)
        }
        Err(e) => Err(DazError::Io(e)),
    }
}

/// Writes our pid into a lock file we just created and locks it. On failure
/// the file is removed again.
fn claim(lock_path: &Path, mut file: File) -> Result<LockGuard> {
    let locked = writeln!(file, "{}", std::process::id())
        .and_then(|_| file.flush())
        .map_err(DazError::Io)
        .and_then(|_| {
            file.try_lock_exclusive()
                .map_err(|_| DazError::RepositoryLocked { pid: 0 })
        });

    if let Err(e) = locked {
        drop(file);
        let _ = fs::remove_file(lock_path);
        return Err(e);
    }

    debug!(path = %lock_path.display(), "Acquired repository lock");
    Ok(LockGuard {
        file: Some(file),
        path: lock_path.to_path_buf(),
    })
}

fn handle_existing_lock(lock_path: &Path, retry_count: u32) -> Result<LockGuard> {
    match fs::read_to_string(lock_path) {
        Ok(content) => {
            if let Ok(pid) = content.trim().parse::<u32>() {
                if is_process_alive(pid) {
                    return Err(DazError::RepositoryLocked { pid });
                }

                warn!(pid, "Detected stale lock from dead process, cleaning up");
                if let Err(e) = fs::remove_file(lock_path) {
                    if e.kind() != std::io::ErrorKind::NotFound {
                        return Err(DazError::Io(e));
                    }
                }
                return acquire_with_retry(lock_path, retry_count + 1);
            }

            warn!("Lock file has invalid content, attempting cleanup");
            let _ = fs::remove_file(lock_path);
            acquire_with_retry(lock_path, retry_count + 1)
        }
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            acquire_with_retry(lock_path, retry_count + 1)
        }
        Err(_) => Err(DazError::RepositoryLocked { pid: 0 }),
    }
}

/// Check if a process with the given PID is still alive.
///
/// On Linux, uses /proc/{pid}/stat. On other Unix systems, `kill -0`. On
/// non-Unix systems the process is assumed alive.
#[cfg(target_os = "linux")]
fn is_process_alive(pid: u32) -> bool {
    Path::new(&format!("/proc/{}/stat", pid)).exists()
}

#[cfg(all(unix, not(target_os = "linux")))]
fn is_process_alive(pid: u32) -> bool {
    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .output()
        .map(|o| o.status.success())
        .unwrap_or(true)
}

#[cfg(not(unix))]
fn is_process_alive(_pid: u32) -> bool {
    true
}
