//! An open repository: structural index, optional change session, lock.

use crate::commit;
use crate::config::IndexConfig;
use crate::error::{DazError, Result};
use crate::gate::ValidationGate;
use crate::index::StructuralIndex;
use crate::lock::{self, LockGuard};
use crate::parser::ParserRegistry;
use crate::recorder::{ChangeRecorder, DEFAULT_COMMIT_MESSAGE};
use crate::session::{ChangeSession, SessionSummary, TimeProvider};
use crate::staging::{self, Candidate, View};
use crate::types::{
    ElementKind, EndChangeOutcome, OutlineEntry, SessionState, ValidationResult,
};
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{info, warn};

/// One open repository.
///
/// Holds the committed read model and at most one change session. The
/// repository lock is released when the value is dropped.
#[derive(Debug)]
pub struct Repository {
    name: String,
    root: PathBuf,
    index: StructuralIndex,
    session: Option<ChangeSession>,
    _lock: LockGuard,
}

impl Repository {
    /// Locks `root` and builds its structural index.
    pub(crate) fn open(
        name: &str,
        root: &Path,
        config: &IndexConfig,
        parsers: Arc<ParserRegistry>,
    ) -> Result<Self> {
        let lock = lock::acquire(root)?;
        let index = StructuralIndex::open(root, config, parsers)?;

        info!(
            repository = name,
            files = index.file_paths().count(),
            "Opened repository"
        );
        Ok(Self {
            name: name.to_string(),
            root: root.to_path_buf(),
            index,
            session: None,
            _lock: lock,
        })
    }

    /// Repository name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Repository root path.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Committed structural index.
    pub fn index(&self) -> &StructuralIndex {
        &self.index
    }

    /// Current change session, if any.
    pub fn session(&self) -> Option<&ChangeSession> {
        self.session.as_ref()
    }

    /// Whether a session is Active or Validating.
    pub fn has_active_session(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| !s.state().is_terminal() && s.state() != SessionState::Idle)
    }

    fn view(&self) -> View<'_> {
        View::new(&self.index, self.session.as_ref().map(|s| s.overlay()))
    }

    fn active_session(&mut self) -> Result<&mut ChangeSession> {
        let session = self.session.as_mut().ok_or(DazError::NoActiveSession)?;
        session.require_active()?;
        Ok(session)
    }

    /// Outline including staged edits.
    pub fn outline(&self, reference: &str) -> Result<Vec<OutlineEntry>> {
        self.view().outline(reference)
    }

    /// Element content including staged edits.
    pub fn get(&self, reference: &str) -> Result<&str> {
        self.view().get(reference)
    }

    /// Full candidate state: committed files with staged edits applied.
    pub fn candidate(&self) -> Candidate {
        Candidate::materialize(&self.index, self.session.as_ref().map(|s| s.overlay()))
    }

    /// Status snapshot of the current session.
    pub fn session_status(&self) -> Option<SessionSummary> {
        self.session.as_ref().map(ChangeSession::summary)
    }

    pub(crate) fn start_change(
        &mut self,
        time_provider: Option<TimeProvider>,
    ) -> Result<&ChangeSession> {
        if self.has_active_session() {
            return Err(DazError::SessionConflict(self.name.clone()));
        }

        let mut session = ChangeSession::new(uuid::Uuid::new_v4().to_string(), time_provider);
        session.start()?;
        info!(repository = %self.name, session = session.session_id(), "Started change session");
        Ok(self.session.insert(session))
    }

    pub(crate) fn write(&mut self, reference: &str, content: &str) -> Result<()> {
        self.active_session()?;
        let tree = staging::stage_replace(&self.view(), reference, content)?;
        self.active_session()?.record_replace(reference, content, tree);
        Ok(())
    }

    pub(crate) fn add(
        &mut self,
        kind: ElementKind,
        parent: &str,
        name: &str,
        content: &str,
    ) -> Result<String> {
        self.active_session()?;
        let (child, tree) = staging::stage_add(&self.view(), parent, kind, name, content)?;
        self.active_session()?
            .record_add(child.clone(), parent, kind, name, content, tree);
        Ok(child)
    }

    /// Discards the active session without touching files or the index.
    pub(crate) fn force_abort(&mut self) -> Result<()> {
        let session = self.active_session()?;
        session.set_state(SessionState::Aborted)?;
        session.discard();
        info!(repository = %self.name, "Change session aborted");
        self.session = None;
        Ok(())
    }

    /// Validates the candidate and, if it passes, commits it.
    ///
    /// A rejected candidate aborts the session. A commit I/O failure leaves
    /// the session Active with its edits so the call can be retried.
    pub(crate) fn end_change(
        &mut self,
        message: Option<&str>,
        gate: &dyn ValidationGate,
        recorder: &dyn ChangeRecorder,
    ) -> Result<(EndChangeOutcome, BTreeSet<String>)> {
        let session = self.session.as_mut().ok_or(DazError::NoActiveSession)?;
        session.require_active()?;
        session.set_message(message.map(str::to_string));
        session.set_state(SessionState::Validating)?;

        let candidate = Candidate::materialize(&self.index, Some(session.overlay()));
        let result = ValidationResult::from(gate.run(&candidate));

        if !result.passed {
            session.set_state(SessionState::Aborted)?;
            session.discard();
            self.session = None;
            info!(
                repository = %self.name,
                diagnostics = result.diagnostics.len(),
                "Validation failed, change session aborted"
            );
            return Ok((
                EndChangeOutcome {
                    committed: false,
                    diagnostics: result.diagnostics,
                    touched_files: BTreeSet::new(),
                    impacted_references: BTreeSet::new(),
                    recorded: false,
                },
                BTreeSet::new(),
            ));
        }

        let report = match commit::commit(&mut self.index, session.overlay()) {
            Ok(report) => report,
            Err(e) => {
                session.set_state(SessionState::Active)?;
                warn!(repository = %self.name, error = %e, "Commit failed, session kept active");
                return Err(e);
            }
        };
        session.set_state(SessionState::Committed)?;
        let message = session.message().unwrap_or(DEFAULT_COMMIT_MESSAGE).to_string();
        self.session = None;

        let recorded = match recorder.record(&self.root, &report.touched_files, &message) {
            Ok(recorded) => recorded,
            Err(e) => {
                warn!(repository = %self.name, error = %e, "Change set was committed but not recorded");
                false
            }
        };

        info!(
            repository = %self.name,
            touched = report.touched_files.len(),
            impacted = report.impacted_references.len(),
            "Change session committed"
        );
        let impacted = report.impacted_references.clone();
        Ok((
            EndChangeOutcome {
                committed: true,
                diagnostics: result.diagnostics,
                touched_files: report.touched_files,
                impacted_references: report.impacted_references,
                recorded,
            },
            impacted,
        ))
    }
}
