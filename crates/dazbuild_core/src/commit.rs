//! Commit manager: persists an accepted overlay and reindexes touched files.
//!
//! Two phases. Prepare writes every new file content to a synced temporary
//! file next to its target. Persist renames the temporaries into place; if a
//! rename fails, targets already replaced are restored to their committed
//! content. Each file is replaced atomically. Across files the rollback is
//! best-effort: a crash between two renames leaves the earlier ones applied.

use crate::content_hash::ContentHash;
use crate::error::{DazError, Result};
use crate::index::StructuralIndex;
use crate::staging::Overlay;
use std::collections::BTreeSet;
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tempfile::NamedTempFile;
use tracing::{info, warn};

/// Outcome of a successful commit.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommitReport {
    /// Files written, relative to the repository root.
    pub touched_files: BTreeSet<String>,
    /// References whose span or content changed.
    pub impacted_references: BTreeSet<String>,
}

struct PreparedFile {
    relative: String,
    path: PathBuf,
    temp_file: NamedTempFile,
    original: Option<String>,
}

struct PersistedFile {
    path: PathBuf,
    original: Option<String>,
}

/// Writes the overlay to disk and reindexes the files it touched.
///
/// On error nothing visible has changed and the index is untouched.
pub(crate) fn commit(index: &mut StructuralIndex, overlay: &Overlay) -> Result<CommitReport> {
    let root = index.root().to_path_buf();
    let mut prepared = Vec::new();

    for relative in overlay.paths() {
        let Some(tree) = overlay.get(relative) else {
            continue;
        };
        let original = index.tree(relative).map(|t| t.text.clone());
        if original.as_deref() == Some(tree.text.as_str()) {
            continue;
        }

        let path = root.join(relative);
        check_unchanged_on_disk(&path, index.file_hash(relative))?;

        let temp_file = prepare_file(&path, &tree.text).map_err(|e| commit_error(&path, e))?;
        prepared.push(PreparedFile {
            relative: relative.to_string(),
            path,
            temp_file,
            original,
        });
    }

    let touched: BTreeSet<String> = prepared.iter().map(|p| p.relative.clone()).collect();
    persist_prepared_files(prepared)?;

    let mut impacted = BTreeSet::new();
    for relative in &touched {
        match index.reindex(relative) {
            Ok(references) => impacted.extend(references),
            Err(e) => warn!(path = %relative, error = %e, "Committed file could not be reindexed"),
        }
    }

    info!(
        touched = touched.len(),
        impacted = impacted.len(),
        "Committed change set"
    );
    Ok(CommitReport {
        touched_files: touched,
        impacted_references: impacted,
    })
}

/// Refuses to overwrite a file that changed since it was indexed.
fn check_unchanged_on_disk(path: &Path, indexed: Option<ContentHash>) -> Result<()> {
    let reason = match (indexed, fs::read(path)) {
        (Some(hash), Ok(bytes)) if ContentHash::of(&bytes) == hash => return Ok(()),
        (Some(_), Ok(_)) => "file was modified on disk since it was indexed",
        (Some(_), Err(e)) if e.kind() == io::ErrorKind::NotFound => {
            "file was removed from disk since it was indexed"
        }
        (Some(_), Err(e)) => return Err(commit_error(path, e)),
        (None, Ok(_)) => "file already exists on disk",
        (None, Err(_)) => return Ok(()),
    };
    Err(DazError::CommitIOError {
        path: path.to_path_buf(),
        reason: reason.to_string(),
    })
}

/// Writes content to a synced temporary file in the target's directory.
///
/// The temporary carries the target's permissions, so the rename keeps the
/// file's mode.
fn prepare_file(path: &Path, content: &str) -> io::Result<NamedTempFile> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    fs::create_dir_all(parent)?;

    let existing = match fs::metadata(path) {
        Ok(metadata) => Some(metadata.permissions()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => None,
        Err(e) => return Err(e),
    };

    let mut temp_file = new_temp_file(parent)?;
    temp_file.write_all(content.as_bytes())?;
    if let Some(permissions) = existing {
        temp_file.as_file().set_permissions(permissions)?;
    }
    temp_file.as_file().sync_all()?;
    Ok(temp_file)
}

/// New files get the mode a plain create would give them (0666 less the
/// umask) instead of the private 0600 of a temporary file.
#[cfg(unix)]
fn new_temp_file(dir: &Path) -> io::Result<NamedTempFile> {
    use std::os::unix::fs::PermissionsExt;

    tempfile::Builder::new()
        .permissions(fs::Permissions::from_mode(0o666))
        .tempfile_in(dir)
}

#[cfg(not(unix))]
fn new_temp_file(dir: &Path) -> io::Result<NamedTempFile> {
    NamedTempFile::new_in(dir)
}

/// Renames prepared files into place, rolling back on the first failure.
fn persist_prepared_files(prepared: Vec<PreparedFile>) -> Result<()> {
    let mut persisted: Vec<PersistedFile> = Vec::with_capacity(prepared.len());

    for file in prepared {
        if let Err(err) = file.temp_file.persist(&file.path) {
            rollback(&persisted);
            return Err(commit_error(&file.path, err.error));
        }
        sync_parent(&file.path);
        persisted.push(PersistedFile {
            path: file.path,
            original: file.original,
        });
    }

    Ok(())
}

/// Restores replaced files. Best-effort: keeps going past failures.
fn rollback(persisted: &[PersistedFile]) {
    for file in persisted.iter().rev() {
        let result = match &file.original {
            Some(original) => fs::write(&file.path, original),
            None => fs::remove_file(&file.path),
        };
        if let Err(e) = result {
            warn!(path = %file.path.display(), error = %e, "Rollback failed");
        }
    }
}

/// fsync the parent directory so the rename is durable.
fn sync_parent(path: &Path) {
    #[cfg(unix)]
    {
        if let Some(parent) = path.parent() {
            if let Ok(dir_file) = File::open(parent) {
                let _ = dir_file.sync_all();
            }
        }
    }
    #[cfg(not(unix))]
    let _ = path;
}

fn commit_error(path: &Path, err: io::Error) -> DazError {
    DazError::CommitIOError {
        path: path.to_path_buf(),
        reason: err.to_string(),
    }
}
