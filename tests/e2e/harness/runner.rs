use super::assertions::Assertion;
use super::clock::MockClock;
use super::steps::{GateMode, ScenarioStep};
use super::workspace::TestWorkspace;
use super::REPO;
use anyhow::{anyhow, Context, Result};
use dazbuild_core::{
    Candidate, CheckOutcome, CommandGate, Config, DazError, Diagnostic, ElementId,
    EndChangeOutcome, GateConfig, GateReport, ParserRegistry, Registry, ValidationGate,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Scripted validation gate shared between the runner and the registry
#[derive(Clone)]
struct ScriptedGate {
    mode: Arc<Mutex<GateMode>>,
    last_candidate: Arc<Mutex<Option<BTreeMap<String, String>>>>,
}

impl ScriptedGate {
    fn new() -> Self {
        Self {
            mode: Arc::new(Mutex::new(GateMode::Pass)),
            last_candidate: Arc::new(Mutex::new(None)),
        }
    }

    fn set(&self, mode: GateMode) -> Result<()> {
        *self.mode.lock().map_err(|_| anyhow!("gate mode lock poisoned"))? = mode;
        Ok(())
    }

    fn last_candidate(&self) -> Result<Option<BTreeMap<String, String>>> {
        Ok(self
            .last_candidate
            .lock()
            .map_err(|_| anyhow!("gate candidate lock poisoned"))?
            .clone())
    }
}

impl ValidationGate for ScriptedGate {
    fn run(&self, candidate: &Candidate) -> GateReport {
        if let Ok(mut last) = self.last_candidate.lock() {
            *last = Some(candidate.files().clone());
        }
        let mode = self
            .mode
            .lock()
            .map(|m| m.clone())
            .unwrap_or(GateMode::Pass);

        match mode {
            GateMode::Pass => GateReport::passing(),
            GateMode::FailLint(message) => GateReport {
                lint: CheckOutcome::fail(vec![Diagnostic::new("lint", message)]),
                tests: CheckOutcome::pass(),
            },
            GateMode::FailTests(message) => GateReport {
                lint: CheckOutcome::pass(),
                tests: CheckOutcome::fail(vec![Diagnostic::new("tests", message)]),
            },
        }
    }
}

/// Executes scenarios against a real registry over a temporary repository
pub struct ScenarioRunner {
    workspace: TestWorkspace,
    registry: Registry,
    gate: ScriptedGate,
    command_gate: Option<GateConfig>,
    clock: MockClock,
    last_outcome: Option<EndChangeOutcome>,
    remembered_ids: HashMap<String, ElementId>,
    current_step: usize,
}

impl ScenarioRunner {
    /// Create a runner with the repository populated and open
    pub fn new(
        initial_files: &HashMap<String, Vec<u8>>,
        fixture: Option<&str>,
        command_gate: Option<GateConfig>,
    ) -> Result<Self> {
        let workspace = TestWorkspace::with_files(initial_files)?;
        if let Some(name) = fixture {
            workspace.load_fixture(name)?;
        }

        let gate = ScriptedGate::new();
        let clock = MockClock::new();
        let mut registry = build_registry(&workspace, &gate, command_gate.as_ref(), &clock);
        registry.open_repository(REPO)?;

        Ok(Self {
            workspace,
            registry,
            gate,
            command_gate,
            clock,
            last_outcome: None,
            remembered_ids: HashMap::new(),
            current_step: 0,
        })
    }

    /// Get current step number
    pub fn current_step(&self) -> usize {
        self.current_step
    }

    /// Execute all steps in sequence
    pub fn execute(&mut self, steps: &[ScenarioStep]) -> Result<()> {
        for (i, step) in steps.iter().enumerate() {
            self.current_step = i;
            self.execute_step(step)
                .with_context(|| format!("Step {}: {:?}", i, step))?;
        }
        Ok(())
    }

    /// Execute a single step
    fn execute_step(&mut self, step: &ScenarioStep) -> Result<()> {
        match step {
            ScenarioStep::Open => {
                self.registry.open_repository(REPO)?;
            }
            ScenarioStep::Close => self.registry.close_repository(REPO)?,
            ScenarioStep::StartChange => {
                self.registry.start_change(REPO)?;
            }
            ScenarioStep::Write { reference, content } => {
                self.registry.write(REPO, reference, content)?
            }
            ScenarioStep::Add {
                kind,
                parent,
                name,
                content,
            } => {
                self.registry.add(REPO, *kind, parent, name, content)?;
            }
            ScenarioStep::EndChange { message } => {
                let outcome = self.registry.end_change(REPO, message.as_deref())?;
                self.last_outcome = Some(outcome);
            }
            ScenarioStep::ForceAbort => self.registry.force_abort(REPO)?,

            ScenarioStep::SetGate(mode) => self.gate.set(mode.clone())?,
            ScenarioStep::EditOnDisk { path, content } => {
                self.workspace.write_file(path, content.as_bytes())?
            }
            ScenarioStep::RememberId { reference } => {
                let id = self.element_id(reference)?;
                self.remembered_ids.insert(reference.clone(), id);
            }
            ScenarioStep::Wait { duration } => self.clock.advance(*duration),

            ScenarioStep::Restart => self.handle_restart()?,

            ScenarioStep::ExpectError { step, kind } => self.handle_expect_error(step, kind)?,
            ScenarioStep::Assert { assertion } => self.handle_assertion(assertion)?,
        }
        Ok(())
    }

    fn handle_restart(&mut self) -> Result<()> {
        // Building the replacement first would hit the old registry's lock.
        self.registry = Registry::new(&Config::default());
        self.registry = build_registry(
            &self.workspace,
            &self.gate,
            self.command_gate.as_ref(),
            &self.clock,
        );
        self.registry.open_repository(REPO)?;
        Ok(())
    }

    fn handle_expect_error(&mut self, step: &ScenarioStep, kind: &str) -> Result<()> {
        match self.execute_step(step) {
            Ok(()) => Err(anyhow!("expected {} but the step succeeded", kind)),
            Err(e) => match e.downcast_ref::<DazError>() {
                Some(err) if err.kind() == kind => Ok(()),
                Some(err) => Err(anyhow!("expected {} but got {}: {}", kind, err.kind(), err)),
                None => Err(e.context(format!("expected {}", kind))),
            },
        }
    }

    fn element_id(&self, reference: &str) -> Result<ElementId> {
        let repository = self.registry.repository(REPO)?;
        repository
            .index()
            .element(reference)
            .map(|e| e.id)
            .ok_or_else(|| anyhow!("'{}' is not in the committed index", reference))
    }

    fn outcome(&self) -> Result<&EndChangeOutcome> {
        self.last_outcome
            .as_ref()
            .ok_or_else(|| anyhow!("end_change has not been called"))
    }

    // ===== Assertion handlers =====

    fn handle_assertion(&mut self, assertion: &Assertion) -> Result<()> {
        match assertion {
            Assertion::NoSession => {
                if let Some(status) = self.registry.session_status(REPO)? {
                    return Err(anyhow!("Expected no session, found {:?}", status.state));
                }
            }
            Assertion::SessionActive => {
                if !self.registry.repository(REPO)?.has_active_session() {
                    return Err(anyhow!("Expected an active session"));
                }
            }
            Assertion::StagedCount(expected) => {
                let staged = self
                    .registry
                    .session_status(REPO)?
                    .map_or(0, |s| s.staged.len());
                if staged != *expected {
                    return Err(anyhow!("Expected {} staged edits, found {}", expected, staged));
                }
            }
            Assertion::SessionIdleAtLeast(min) => {
                let status = self
                    .registry
                    .session_status(REPO)?
                    .ok_or_else(|| anyhow!("No session"))?;
                if Duration::from_secs(status.idle_secs) < *min {
                    return Err(anyhow!("Session idle for only {}s", status.idle_secs));
                }
            }
            Assertion::Outline {
                reference,
                expected,
            } => {
                let actual: Vec<String> = self
                    .registry
                    .outline(REPO, Some(reference.as_str()))?
                    .into_iter()
                    .map(|e| e.reference)
                    .collect();
                if &actual != expected {
                    return Err(anyhow!("Outline of '{}' was {:?}", reference, actual));
                }
            }
            Assertion::Content { reference, content } => {
                let actual = self.registry.get(REPO, reference)?;
                if &actual != content {
                    return Err(anyhow!("'{}' has content {:?}", reference, actual));
                }
            }
            Assertion::Signature {
                reference,
                signature,
            } => {
                let entries = self.registry.outline(REPO, None)?;
                let entry = entries
                    .iter()
                    .find(|e| &e.reference == reference)
                    .ok_or_else(|| anyhow!("'{}' not in outline", reference))?;
                if &entry.signature != signature {
                    return Err(anyhow!("'{}' has signature {:?}", reference, entry.signature));
                }
            }
            Assertion::Missing { reference } => match self.registry.get(REPO, reference) {
                Err(DazError::ReferenceNotFound(_)) => {}
                Ok(_) => return Err(anyhow!("'{}' unexpectedly resolves", reference)),
                Err(e) => return Err(e.into()),
            },
            Assertion::DiskEquals { path, content } => {
                let actual = self.workspace.read_file(path)?;
                if &actual != content {
                    return Err(anyhow!("{} on disk is {:?}", path, actual));
                }
            }
            Assertion::DiskContains { path, text } => {
                let actual = self.workspace.read_file(path)?;
                if !actual.contains(text.as_str()) {
                    return Err(anyhow!("{} on disk lacks {:?}: {:?}", path, text, actual));
                }
            }
            Assertion::DiskMissing { path } => {
                if self.workspace.file_exists(path) {
                    return Err(anyhow!("{} unexpectedly exists", path));
                }
            }
            Assertion::Committed(expected) => {
                let outcome = self.outcome()?;
                if outcome.committed != *expected {
                    return Err(anyhow!(
                        "Expected committed = {}, diagnostics: {:?}",
                        expected,
                        outcome.diagnostics
                    ));
                }
            }
            Assertion::DiagnosticContains(text) => {
                let outcome = self.outcome()?;
                if !outcome
                    .diagnostics
                    .iter()
                    .any(|d| d.to_string().contains(text.as_str()))
                {
                    return Err(anyhow!("No diagnostic mentions {:?}: {:?}", text, outcome.diagnostics));
                }
            }
            Assertion::Touched(paths) => {
                let touched: Vec<&String> = self.outcome()?.touched_files.iter().collect();
                if touched.len() != paths.len() || touched.iter().zip(paths).any(|(a, b)| *a != b) {
                    return Err(anyhow!("Touched files were {:?}", touched));
                }
            }
            Assertion::Impacted { reference } => {
                let outcome = self.outcome()?;
                if !outcome.impacted_references.contains(reference) {
                    return Err(anyhow!(
                        "'{}' not impacted: {:?}",
                        reference,
                        outcome.impacted_references
                    ));
                }
            }
            Assertion::IdPreserved { reference } => {
                let remembered = self
                    .remembered_ids
                    .get(reference)
                    .copied()
                    .ok_or_else(|| anyhow!("No id remembered for '{}'", reference))?;
                let current = self.element_id(reference)?;
                if current != remembered {
                    return Err(anyhow!("'{}' changed id {} -> {}", reference, remembered, current));
                }
            }
            Assertion::SearchFinds { query, reference } => {
                let hits = self.registry.search(REPO, query, Some(20))?;
                if !hits.iter().any(|h| &h.reference == reference) {
                    let found: Vec<&str> = hits.iter().map(|h| h.reference.as_str()).collect();
                    return Err(anyhow!("Search {:?} returned {:?}", query, found));
                }
            }
            Assertion::GateSaw { path, text } => {
                let files = self
                    .gate
                    .last_candidate()?
                    .ok_or_else(|| anyhow!("The gate has not run"))?;
                let content = files
                    .get(path)
                    .ok_or_else(|| anyhow!("Candidate lacks {}", path))?;
                if !content.contains(text.as_str()) {
                    return Err(anyhow!("Candidate {} lacks {:?}", path, text));
                }
            }
            Assertion::Custom(check) => check(&mut self.registry)?,
        }
        Ok(())
    }
}

fn build_registry(
    workspace: &TestWorkspace,
    gate: &ScriptedGate,
    command_gate: Option<&GateConfig>,
    clock: &MockClock,
) -> Registry {
    let registry = Registry::new(&Config::default())
        .with_repository(REPO, workspace.path())
        .with_time_provider(clock.as_provider());

    match command_gate {
        Some(config) => registry.with_gate(CommandGate::new(
            config.clone(),
            Arc::new(ParserRegistry::default()),
        )),
        None => registry.with_gate(gate.clone()),
    }
}
