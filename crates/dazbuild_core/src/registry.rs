//! Registry of open repositories and the tool-level operations on them.
//!
//! Constructed once from a [`Config`] and passed to every tool handler. Each
//! operation takes the repository name first, normalises any reference
//! argument, and reports failures as [`DazError`] values.

use crate::config::{Config, IndexConfig};
use crate::error::{DazError, Result};
use crate::gate::{CommandGate, ValidationGate};
use crate::parser::ParserRegistry;
use crate::recorder::{ChangeRecorder, GitRecorder, NoopRecorder};
use crate::reference;
use crate::repo::Repository;
use crate::search::{LexicalSearch, SearchIndex};
use crate::session::{SessionSummary, TimeProvider};
use crate::types::{
    ElementKind, EndChangeOutcome, OutlineEntry, ParseFailure, SearchHit, ValidationResult,
};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{debug, info};

/// Workflow notes handed to agents through the `guidelines` tool.
pub const GUIDELINES: &str = "\
### dazbuild guidelines

- Call `start_change` before any `write` or `add`.
- Edit at the smallest element you can: a method rather than its class, a
  function rather than its file.
- Every Python file carries its own `unittest` test cases. Use real objects,
  not mocks.
- Never call `unittest.main()`. `end_change` discovers and runs the tests.

`end_change` runs pylint and the unit tests against the staged state. When
either fails it returns `{\"committed\": false, \"diagnostics\": [...]}` and the
change is discarded. Fix the reported problems in a new `start_change` and
try again.";

/// Summary returned by [`Registry::open_repository`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OpenReport {
    /// Repository name.
    pub name: String,
    /// Root directory.
    pub root: PathBuf,
    /// Number of indexed files.
    pub files: usize,
    /// Number of indexed elements, files included.
    pub elements: usize,
    /// Files that failed to parse and are only addressable as a whole.
    pub parse_failures: Vec<ParseFailure>,
}

/// The set of open repositories plus the collaborators they share.
pub struct Registry {
    repositories: BTreeMap<String, PathBuf>,
    index_config: IndexConfig,
    default_search_limit: usize,
    open: BTreeMap<String, Repository>,
    parsers: Arc<ParserRegistry>,
    gate: Box<dyn ValidationGate>,
    search: Box<dyn SearchIndex>,
    recorder: Box<dyn ChangeRecorder>,
    time_provider: Option<TimeProvider>,
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registry")
            .field("repositories", &self.repositories)
            .field("open", &self.open.keys().collect::<Vec<_>>())
            .finish_non_exhaustive()
    }
}

impl Registry {
    /// Builds a registry from configuration.
    ///
    /// Uses the command gate from `[gate]`, lexical search, and a git
    /// recorder when `commit.record_with_git` is set.
    pub fn new(config: &Config) -> Self {
        let parsers = Arc::new(ParserRegistry::default());
        let recorder: Box<dyn ChangeRecorder> = if config.commit.record_with_git {
            Box::new(GitRecorder)
        } else {
            Box::new(NoopRecorder)
        };

        Self {
            repositories: config.resolved_repositories(),
            index_config: config.index.clone(),
            default_search_limit: config.search.default_limit,
            open: BTreeMap::new(),
            gate: Box::new(CommandGate::new(config.gate.clone(), Arc::clone(&parsers))),
            parsers,
            search: Box::new(LexicalSearch::new()),
            recorder,
            time_provider: None,
        }
    }

    /// Replaces the validation gate.
    pub fn with_gate(mut self, gate: impl ValidationGate + 'static) -> Self {
        self.gate = Box::new(gate);
        self
    }

    /// Replaces the search collaborator.
    pub fn with_search(mut self, search: impl SearchIndex + 'static) -> Self {
        self.search = Box::new(search);
        self
    }

    /// Replaces the version-control recorder.
    pub fn with_recorder(mut self, recorder: impl ChangeRecorder + 'static) -> Self {
        self.recorder = Box::new(recorder);
        self
    }

    /// Injects the clock used for session timestamps.
    pub fn with_time_provider(mut self, provider: TimeProvider) -> Self {
        self.time_provider = Some(provider);
        self
    }

    /// Configures an additional repository.
    pub fn with_repository(mut self, name: impl Into<String>, root: impl Into<PathBuf>) -> Self {
        self.repositories.insert(name.into(), root.into());
        self
    }

    /// Configured repository names in order.
    pub fn list_repositories(&self) -> Vec<String> {
        self.repositories.keys().cloned().collect()
    }

    /// Opens a configured repository.
    pub fn open_repository(&mut self, name: &str) -> Result<OpenReport> {
        let root = self
            .repositories
            .get(name)
            .cloned()
            .ok_or_else(|| DazError::RepositoryNotFound(name.to_string()))?;
        self.open(name, &root)
    }

    /// Opens `root` under `name`, configured or not.
    pub fn open(&mut self, name: &str, root: &Path) -> Result<OpenReport> {
        if self.open.contains_key(name) {
            return Err(DazError::RepositoryAlreadyOpen(name.to_string()));
        }

        let repository = Repository::open(name, root, &self.index_config, Arc::clone(&self.parsers))?;
        let index = repository.index();
        self.search.index_repository(name, index.search_documents());

        let report = OpenReport {
            name: name.to_string(),
            root: root.to_path_buf(),
            files: index.file_paths().count(),
            elements: index.len(),
            parse_failures: index.parse_failures(),
        };
        self.open.insert(name.to_string(), repository);
        Ok(report)
    }

    /// Closes a repository and releases its index and lock.
    pub fn close_repository(&mut self, name: &str) -> Result<()> {
        let repository = self.repository(name)?;
        if repository.has_active_session() {
            return Err(DazError::ActiveSessionExists(name.to_string()));
        }

        self.open.remove(name);
        self.search.drop_repository(name);
        info!(repository = name, "Closed repository");
        Ok(())
    }

    /// An open repository.
    pub fn repository(&self, name: &str) -> Result<&Repository> {
        self.open
            .get(name)
            .ok_or_else(|| DazError::RepositoryNotOpen(name.to_string()))
    }

    fn repository_mut(&mut self, name: &str) -> Result<&mut Repository> {
        self.open
            .get_mut(name)
            .ok_or_else(|| DazError::RepositoryNotOpen(name.to_string()))
    }

    /// Names of open repositories.
    pub fn open_repositories(&self) -> Vec<String> {
        self.open.keys().cloned().collect()
    }

    /// Starts a change session. Returns its id.
    pub fn start_change(&mut self, name: &str) -> Result<String> {
        let provider = self.time_provider.clone();
        let session = self.repository_mut(name)?.start_change(provider)?;
        Ok(session.session_id().to_string())
    }

    /// Validates and, if accepted, commits the active session.
    ///
    /// A rejected change set is reported as `committed: false` with the
    /// gate's diagnostics; the session is discarded either way except on
    /// `CommitIOError`.
    pub fn end_change(&mut self, name: &str, message: Option<&str>) -> Result<EndChangeOutcome> {
        let repository = self
            .open
            .get_mut(name)
            .ok_or_else(|| DazError::RepositoryNotOpen(name.to_string()))?;
        let (outcome, impacted) =
            repository.end_change(message, self.gate.as_ref(), self.recorder.as_ref())?;

        if outcome.committed {
            let fresh = repository.index().documents_for(&impacted);
            debug!(
                repository = name,
                impacted = impacted.len(),
                fresh = fresh.len(),
                "Invalidating search documents"
            );
            self.search.invalidate(name, &impacted, fresh);
        }
        Ok(outcome)
    }

    /// Outline of `reference`; `None` or empty lists the whole repository.
    pub fn outline(&self, name: &str, reference: Option<&str>) -> Result<Vec<OutlineEntry>> {
        let reference = reference::normalize(reference.unwrap_or_default());
        self.repository(name)?.outline(&reference)
    }

    /// Source text of `reference`, staged edits included.
    pub fn get(&self, name: &str, reference: &str) -> Result<String> {
        let reference = reference::normalize(reference);
        self.repository(name)?.get(&reference).map(str::to_string)
    }

    /// Stages a replacement of `reference`.
    pub fn write(&mut self, name: &str, reference: &str, content: &str) -> Result<()> {
        let reference = reference::normalize(reference);
        self.repository_mut(name)?.write(&reference, content)
    }

    /// Stages a new element under `parent`. Returns the new reference.
    pub fn add(
        &mut self,
        name: &str,
        kind: ElementKind,
        parent: &str,
        object_name: &str,
        content: &str,
    ) -> Result<String> {
        let parent = reference::normalize(parent);
        self.repository_mut(name)?
            .add(kind, &parent, object_name.trim(), content)
    }

    /// Free-text search over committed elements.
    pub fn search(&self, name: &str, query: &str, limit: Option<usize>) -> Result<Vec<SearchHit>> {
        self.repository(name)?;
        let limit = limit.unwrap_or(self.default_search_limit);
        Ok(self.search.search(name, query, limit))
    }

    /// Discards the active session.
    pub fn force_abort(&mut self, name: &str) -> Result<()> {
        self.repository_mut(name)?.force_abort()
    }

    /// Current session, if any.
    pub fn session_status(&self, name: &str) -> Result<Option<SessionSummary>> {
        Ok(self.repository(name)?.session_status())
    }

    /// Runs the gate against the current state without committing.
    pub fn check(&self, name: &str) -> Result<ValidationResult> {
        let candidate = self.repository(name)?.candidate();
        Ok(ValidationResult::from(self.gate.run(&candidate)))
    }

    /// Workflow notes for agents.
    pub fn guidelines(&self) -> &'static str {
        GUIDELINES
    }
}
