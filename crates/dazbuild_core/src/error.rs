//! Error types for dazbuild_core operations.

use crate::types::{Diagnostic, ElementKind};
use std::path::PathBuf;
use thiserror::Error;

/// Core error type for dazbuild_core operations.
#[derive(Error, Debug)]
pub enum DazError {
    /// Repository name is not present in the configuration.
    #[error("repository not configured: {0}")]
    RepositoryNotFound(String),

    /// Repository is already open in this registry.
    #[error("repository already open: {0}")]
    RepositoryAlreadyOpen(String),

    /// Repository has not been opened.
    #[error("repository not open: {0}")]
    RepositoryNotOpen(String),

    /// Repository cannot be closed while a change session is in progress.
    #[error("repository {0} has an active change session")]
    ActiveSessionExists(String),

    /// A change session is already active for the repository.
    #[error("change session already active for repository {0}")]
    SessionConflict(String),

    /// The operation requires an active change session.
    #[error("no active change session")]
    NoActiveSession,

    /// No element matches the reference.
    #[error("reference not found: {0}")]
    ReferenceNotFound(String),

    /// An element with the reference already exists (staged or committed).
    #[error("reference already exists: {0}")]
    DuplicateReference(String),

    /// Content could not be parsed.
    #[error("parse error in {target}: {}", summarize(.diagnostics))]
    ParseError {
        /// File path or element reference that failed to parse.
        target: String,
        /// Parser diagnostics, in source order.
        diagnostics: Vec<Diagnostic>,
    },

    /// The validation gate rejected the candidate.
    #[error("validation failed: {}", summarize(.0))]
    ValidationFailed(Vec<Diagnostic>),

    /// Validation passed but the candidate could not be persisted.
    #[error("commit failed for {}: {}", .path.display(), .reason)]
    CommitIOError {
        /// File that could not be written.
        path: PathBuf,
        /// What went wrong.
        reason: String,
    },

    /// The element kind cannot be added under the parent.
    #[error("cannot add {kind} under {parent}")]
    KindMismatch {
        /// Parent reference (empty for the repository root).
        parent: String,
        /// Requested child kind.
        kind: ElementKind,
    },

    /// Reference is syntactically malformed.
    #[error("invalid reference: {0}")]
    InvalidReference(String),

    /// Another process holds the repository lock.
    #[error("repository locked by another process (PID: {pid})")]
    RepositoryLocked {
        /// Process ID holding the lock
        pid: u32,
    },

    /// Configuration error (loading, parsing, invalid values).
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// I/O error during file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl DazError {
    /// Creates a parse error for a target with a single message.
    pub(crate) fn parse(target: impl Into<String>, message: impl Into<String>) -> Self {
        Self::ParseError {
            target: target.into(),
            diagnostics: vec![Diagnostic::new("parser", message)],
        }
    }

    /// Returns the stable taxonomy name of the error, as reported to tool callers.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::RepositoryNotFound(_) => "RepositoryNotFound",
            Self::RepositoryAlreadyOpen(_) => "RepositoryAlreadyOpen",
            Self::RepositoryNotOpen(_) => "RepositoryNotOpen",
            Self::ActiveSessionExists(_) => "ActiveSessionExists",
            Self::SessionConflict(_) => "SessionConflict",
            Self::NoActiveSession => "NoActiveSession",
            Self::ReferenceNotFound(_) => "ReferenceNotFound",
            Self::DuplicateReference(_) => "DuplicateReference",
            Self::ParseError { .. } => "ParseError",
            Self::ValidationFailed(_) => "ValidationFailed",
            Self::CommitIOError { .. } => "CommitIOError",
            Self::KindMismatch { .. } => "KindMismatch",
            Self::InvalidReference(_) => "InvalidReference",
            Self::RepositoryLocked { .. } => "RepositoryLocked",
            Self::ConfigError(_) => "ConfigError",
            Self::Io(_) => "IoError",
        }
    }

    /// Returns a user-friendly recovery suggestion for the error, if available.
    pub fn recovery_suggestion(&self) -> Option<&'static str> {
        match self {
            Self::RepositoryNotFound(_) => {
                Some("Add the repository to the [repositories] table of dazbuild.toml.")
            }
            Self::RepositoryNotOpen(_) => Some("Call open_repository first."),
            Self::ActiveSessionExists(_) => {
                Some("Finish the session with end_change, or discard it with force_abort.")
            }
            Self::SessionConflict(_) => {
                Some("Complete the current session with end_change before starting another.")
            }
            Self::NoActiveSession => Some("Start a change session with start_change."),
            Self::ReferenceNotFound(_) => Some("Use outline to list valid references."),
            Self::DuplicateReference(_) => {
                Some("Use write to replace the existing element instead of add.")
            }
            Self::ParseError { .. } => {
                Some("Fix the syntax errors; nothing was staged and the session is unchanged.")
            }
            Self::ValidationFailed(_) => {
                Some("The session was discarded; start_change again and address the diagnostics.")
            }
            Self::CommitIOError { .. } => {
                Some("The session is still active; resolve the file system problem and call end_change again.")
            }
            Self::RepositoryLocked { .. } => {
                Some("Another process has this repository open; close it there first.")
            }
            _ => None,
        }
    }

    /// Returns diagnostics attached to the error, if any.
    pub fn diagnostics(&self) -> &[Diagnostic] {
        match self {
            Self::ParseError { diagnostics, .. } => diagnostics,
            Self::ValidationFailed(diagnostics) => diagnostics,
            _ => &[],
        }
    }
}

fn summarize(diagnostics: &[Diagnostic]) -> String {
    match diagnostics {
        [] => "no diagnostics".to_string(),
        [only] => only.to_string(),
        [first, rest @ ..] => format!("{} (+{} more)", first, rest.len()),
    }
}

/// Convenience Result type for dazbuild_core operations.
pub type Result<T> = std::result::Result<T, DazError>;
