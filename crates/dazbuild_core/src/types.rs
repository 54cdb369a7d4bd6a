//! Core data types for dazbuild.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::ops::Range;
use std::str::FromStr;

/// Kind of an addressable code element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ElementKind {
    /// A source file; the root of its element tree.
    File,
    /// A class definition.
    Class,
    /// A function defined at module level or nested in another function.
    Function,
    /// A function defined directly inside a class body.
    Method,
}

impl ElementKind {
    /// Returns whether an element of kind `child` may be added under `self`.
    pub fn accepts_child(self, child: ElementKind) -> bool {
        use ElementKind::*;

        matches!(
            (self, child),
            (File, Class)
                | (File, Function)
                | (Class, Method)
                | (Class, Class)
                | (Function, Function)
                | (Function, Class)
                | (Method, Function)
                | (Method, Class)
        )
    }

    /// Returns the name used on the wire and in outlines.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::File => "File",
            Self::Class => "Class",
            Self::Function => "Function",
            Self::Method => "Method",
        }
    }
}

impl fmt::Display for ElementKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ElementKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "class" => Ok(Self::Class),
            "function" => Ok(Self::Function),
            "method" => Ok(Self::Method),
            other => Err(format!("unknown element kind: {}", other)),
        }
    }
}

/// Stable identifier of a code element.
///
/// Ids are assigned when an element first appears and are never reused by
/// the index that issued them.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ElementId(pub u64);

impl fmt::Display for ElementId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Byte range of an element within its file's current text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Span {
    /// Byte offset where the span starts.
    pub start_byte: usize,
    /// Byte offset where the span ends (exclusive).
    pub end_byte: usize,
    /// Line number where the span starts (0-indexed).
    pub start_line: usize,
    /// Column (bytes) where the span starts (0-indexed).
    pub start_col: usize,
}

impl Span {
    /// Returns the byte range covered by the span.
    pub fn range(&self) -> Range<usize> {
        self.start_byte..self.end_byte
    }
}

/// Position in a file, one-based for display.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Location {
    /// File path relative to the repository root.
    pub path: String,
    /// Line number (one-based).
    pub line: u32,
    /// Column number (one-based).
    pub column: u32,
}

impl Location {
    /// Creates a location.
    pub fn new(path: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            path: path.into(),
            line,
            column,
        }
    }
}

/// One message from a parser or a validation check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Producer of the message (`parser`, `lint`, `tests`, ...).
    pub source: String,
    /// Human-readable message.
    pub message: String,
    /// Where the problem is, if known.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
}

impl Diagnostic {
    /// Creates a diagnostic without a location.
    pub fn new(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            message: message.into(),
            location: None,
        }
    }

    /// Attaches a location.
    pub fn at(mut self, location: Location) -> Self {
        self.location = Some(location);
        self
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.location {
            Some(loc) => write!(
                f,
                "[{}] {}:{}:{}: {}",
                self.source, loc.path, loc.line, loc.column, self.message
            ),
            None => write!(f, "[{}] {}", self.source, self.message),
        }
    }
}

/// Outcome of one validation check (lint or tests).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CheckOutcome {
    /// Whether the check passed.
    pub passed: bool,
    /// Messages produced by the check.
    pub diagnostics: Vec<Diagnostic>,
}

impl CheckOutcome {
    /// A passing check with no messages.
    pub fn pass() -> Self {
        Self {
            passed: true,
            diagnostics: Vec::new(),
        }
    }

    /// A failing check with the given messages.
    pub fn fail(diagnostics: Vec<Diagnostic>) -> Self {
        Self {
            passed: false,
            diagnostics,
        }
    }
}

/// Raw report from a validation gate: one outcome per check.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GateReport {
    /// Static analysis outcome.
    pub lint: CheckOutcome,
    /// Unit test outcome.
    pub tests: CheckOutcome,
}

impl GateReport {
    /// Report where both checks passed.
    pub fn passing() -> Self {
        Self {
            lint: CheckOutcome::pass(),
            tests: CheckOutcome::pass(),
        }
    }
}

/// Combined verdict of a validation gate run.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// `lint.passed && tests.passed`.
    pub passed: bool,
    /// Lint diagnostics followed by test diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}

impl From<GateReport> for ValidationResult {
    fn from(report: GateReport) -> Self {
        let passed = report.lint.passed && report.tests.passed;
        let mut diagnostics = report.lint.diagnostics;
        diagnostics.extend(report.tests.diagnostics);
        Self {
            passed,
            diagnostics,
        }
    }
}

/// One line of an outline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutlineEntry {
    /// Element reference.
    pub reference: String,
    /// Element kind.
    pub kind: ElementKind,
    /// Definition header (or the path for files).
    pub signature: String,
}

/// A pending edit held by a change session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum StagedEdit {
    /// Replace the content of an existing element.
    Replace {
        /// New element content.
        new_content: String,
    },
    /// Add a new element under a parent.
    Add {
        /// Parent reference (empty for the repository root).
        parent_reference: String,
        /// Kind of the new element.
        kind: ElementKind,
        /// Name of the new element.
        name: String,
        /// Content of the new element.
        content: String,
    },
}

/// Change session state machine states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum SessionState {
    /// Created but not started.
    Idle,
    /// Accepting writes and adds.
    Active,
    /// Inside `end_change`, waiting on the validation gate.
    Validating,
    /// Candidate accepted and persisted.
    Committed,
    /// Candidate rejected or session discarded.
    Aborted,
}

impl SessionState {
    /// Returns whether the state ends the session.
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Committed | Self::Aborted)
    }
}

/// Result of `end_change`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EndChangeOutcome {
    /// Whether the candidate was committed to disk.
    pub committed: bool,
    /// Gate diagnostics, lint first.
    pub diagnostics: Vec<Diagnostic>,
    /// Files written by the commit (empty when not committed).
    pub touched_files: BTreeSet<String>,
    /// References whose span or content changed (empty when not committed).
    pub impacted_references: BTreeSet<String>,
    /// Whether the version-control recorder stored the commit message.
    pub recorded: bool,
}

impl EndChangeOutcome {
    /// Turns a rejected change set into [`DazError::ValidationFailed`].
    ///
    /// [`DazError::ValidationFailed`]: crate::DazError::ValidationFailed
    pub fn ensure_committed(self) -> crate::Result<Self> {
        if self.committed {
            Ok(self)
        } else {
            Err(crate::DazError::ValidationFailed(self.diagnostics))
        }
    }
}

/// Document handed to the search collaborator for one element.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SearchDocument {
    /// Element reference.
    pub reference: String,
    /// Element kind.
    pub kind: ElementKind,
    /// Element source text.
    pub content: String,
}

/// One search match.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SearchHit {
    /// Element reference.
    pub reference: String,
    /// Element kind.
    pub kind: ElementKind,
    /// Relevance score (higher is better).
    pub score: f32,
    /// Leading part of the element content.
    pub snippet: String,
}

/// A file that could not be parsed while building the index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseFailure {
    /// File path relative to the repository root.
    pub path: String,
    /// Parser diagnostics.
    pub diagnostics: Vec<Diagnostic>,
}
