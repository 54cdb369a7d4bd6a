//! Change session lifecycle.

use crate::error::{DazError, Result};
use crate::reference;
use crate::staging::Overlay;
use crate::tree::FileTree;
use crate::types::{ElementKind, SessionState, StagedEdit};
use serde::Serialize;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// Clock returning Unix seconds; injected in tests.
pub type TimeProvider = Arc<dyn Fn() -> i64 + Send + Sync>;

/// Transactional buffer of staged edits for one repository.
///
/// A session starts Idle, becomes Active on [`ChangeSession::start`], and
/// ends in Committed or Aborted. Edits live in an [`Overlay`] until the
/// commit manager persists them.
pub struct ChangeSession {
    /// Session identifier.
    session_id: String,

    /// Current session state.
    state: SessionState,

    /// Pending edits keyed by the reference they target or create.
    staged_edits: BTreeMap<String, StagedEdit>,

    /// Candidate trees of touched files.
    overlay: Overlay,

    /// Commit message supplied to `end_change`.
    message: Option<String>,

    /// When session was created (Unix timestamp).
    created_at: i64,

    /// Last activity timestamp.
    last_activity: i64,

    /// Time provider for testing (None = use system time).
    time_provider: Option<TimeProvider>,
}

/// Snapshot of a session for status reporting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SessionSummary {
    /// Session identifier.
    pub session_id: String,
    /// Current state.
    pub state: SessionState,
    /// Creation time (Unix timestamp).
    pub created_at: i64,
    /// Seconds since the last staged edit or state change.
    pub idle_secs: u64,
    /// Reference to edit kind (`Replace` or `Add`).
    pub staged: BTreeMap<String, String>,
}

impl ChangeSession {
    /// Creates an Idle session.
    ///
    /// The `time_provider` parameter allows injecting controlled time for testing.
    /// Pass `None` to use system time (production default).
    pub(crate) fn new(
        session_id: String,
        time_provider: Option<TimeProvider>,
    ) -> Self {
        let now = match &time_provider {
            Some(provider) => provider(),
            None => current_timestamp(),
        };

        Self {
            session_id,
            state: SessionState::Idle,
            staged_edits: BTreeMap::new(),
            overlay: Overlay::default(),
            message: None,
            created_at: now,
            last_activity: now,
            time_provider,
        }
    }

    /// Idle → Active.
    pub(crate) fn start(&mut self) -> Result<()> {
        self.set_state(SessionState::Active)
    }

    /// Transitions session state with validation.
    pub(crate) fn set_state(&mut self, new_state: SessionState) -> Result<()> {
        if !self.is_valid_transition(new_state) {
            return Err(DazError::NoActiveSession);
        }

        self.update_last_activity();
        self.state = new_state;
        Ok(())
    }

    /// Fails with `NoActiveSession` unless the session accepts edits.
    pub(crate) fn require_active(&self) -> Result<()> {
        if self.state == SessionState::Active {
            Ok(())
        } else {
            Err(DazError::NoActiveSession)
        }
    }

    /// Records a replacement. Last write wins; staged edits below `target`
    /// are folded into it.
    pub(crate) fn record_replace(&mut self, target: &str, content: &str, tree: FileTree) {
        self.staged_edits
            .retain(|r, _| !reference::is_descendant(r, target));

        match self.staged_edits.get_mut(target) {
            Some(StagedEdit::Add {
                content: staged, ..
            }) => *staged = content.to_string(),
            _ => {
                self.staged_edits.insert(
                    target.to_string(),
                    StagedEdit::Replace {
                        new_content: content.to_string(),
                    },
                );
            }
        }

        self.overlay.insert(tree);
        self.update_last_activity();
    }

    /// Records an addition under `parent`.
    pub(crate) fn record_add(
        &mut self,
        child: String,
        parent: &str,
        kind: ElementKind,
        name: &str,
        content: &str,
        tree: FileTree,
    ) {
        self.staged_edits.insert(
            child,
            StagedEdit::Add {
                parent_reference: parent.to_string(),
                kind,
                name: name.to_string(),
                content: content.to_string(),
            },
        );
        self.overlay.insert(tree);
        self.update_last_activity();
    }

    /// Drops every staged edit.
    pub(crate) fn discard(&mut self) {
        self.staged_edits.clear();
        self.overlay = Overlay::default();
    }

    pub(crate) fn overlay(&self) -> &Overlay {
        &self.overlay
    }

    pub(crate) fn set_message(&mut self, message: Option<String>) {
        self.message = message;
    }

    /// Returns the commit message, if one was given.
    pub fn message(&self) -> Option<&str> {
        self.message.as_deref()
    }

    /// Returns pending edits keyed by reference.
    pub fn staged_edits(&self) -> &BTreeMap<String, StagedEdit> {
        &self.staged_edits
    }

    /// Returns current session state.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Returns session ID.
    pub fn session_id(&self) -> &str {
        &self.session_id
    }

    /// Returns session creation time.
    pub fn created_at(&self) -> i64 {
        self.created_at
    }

    /// Returns time since last activity.
    pub fn idle_time(&self) -> Duration {
        let idle_secs = (self.now() - self.last_activity).max(0) as u64;
        Duration::from_secs(idle_secs)
    }

    /// Status snapshot.
    pub fn summary(&self) -> SessionSummary {
        SessionSummary {
            session_id: self.session_id.clone(),
            state: self.state,
            created_at: self.created_at,
            idle_secs: self.idle_time().as_secs(),
            staged: self
                .staged_edits
                .iter()
                .map(|(r, edit)| {
                    let kind = match edit {
                        StagedEdit::Replace { .. } => "Replace",
                        StagedEdit::Add { .. } => "Add",
                    };
                    (r.clone(), kind.to_string())
                })
                .collect(),
        }
    }

    fn update_last_activity(&mut self) {
        self.last_activity = self.now();
    }

    fn now(&self) -> i64 {
        match &self.time_provider {
            Some(provider) => provider(),
            None => current_timestamp(),
        }
    }

    fn is_valid_transition(&self, new_state: SessionState) -> bool {
        use SessionState::*;

        matches!(
            (self.state, new_state),
            (Idle, Active)
                | (Active, Validating)
                | (Active, Aborted)
                // A failed commit hands the session back for a retry.
                | (Validating, Active)
                | (Validating, Committed)
                | (Validating, Aborted)
        )
    }
}

/// Returns the current Unix timestamp in seconds.
fn current_timestamp() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

// Manual Debug implementation to skip time_provider field
impl std::fmt::Debug for ChangeSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChangeSession")
            .field("session_id", &self.session_id)
            .field("state", &self.state)
            .field("staged_edits", &self.staged_edits)
            .field("message", &self.message)
            .field("created_at", &self.created_at)
            .field("last_activity", &self.last_activity)
            .finish()
    }
}
