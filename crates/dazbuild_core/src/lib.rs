//! dazbuild core library
//!
//! Structured, transactional editing of source repositories for coding
//! agents:
//! - A structural index addressing files, classes, functions and methods by
//!   dotted reference (`pkg/mod.py.Class.method`)
//! - Change sessions that stage edits in an overlay with read-your-writes
//! - A validation gate (lint + unit tests) run against the candidate state
//! - Atomic per-file commits followed by incremental reindexing
//!
//! # Quick Start
//!
//! ```
//! use dazbuild_core::{Candidate, Config, GateReport, Registry};
//! use tempfile::TempDir;
//!
//! let tmp = TempDir::new().unwrap();
//! std::fs::write(tmp.path().join("a.py"), "def foo():\n    return 1\n").unwrap();
//!
//! let mut registry = Registry::new(&Config::default())
//!     .with_gate(|_: &Candidate| GateReport::passing())
//!     .with_repository("demo", tmp.path());
//! registry.open_repository("demo").unwrap();
//!
//! registry.start_change("demo").unwrap();
//! registry.write("demo", "a.py.foo", "def foo():\n    return 2").unwrap();
//! assert_eq!(registry.get("demo", "a.py.foo").unwrap(), "def foo():\n    return 2");
//!
//! let outcome = registry.end_change("demo", Some("Return 2")).unwrap();
//! assert!(outcome.committed);
//! ```
//!
//! # Content hashing
//!
//! Indexed files are fingerprinted with BLAKE3 so a commit can refuse to
//! overwrite a file that changed on disk behind the index's back:
//!
//! ```
//! use dazbuild_core::ContentHash;
//!
//! assert_eq!(ContentHash::of(b"x = 1\n"), ContentHash::of(b"x = 1\n"));
//! assert_ne!(ContentHash::of(b"x = 1\n"), ContentHash::of(b"x = 2\n"));
//! ```

mod commit;
mod config;
mod content_hash;
mod error;
mod gate;
mod index;
mod lock;
mod parser;
mod recorder;
pub mod reference;
mod registry;
mod repo;
mod search;
mod session;
mod staging;
mod tree;
mod types;

pub use commit::CommitReport;
pub use config::{
    CommandSpec, CommitConfig, Config, GateConfig, IndexConfig, SearchConfig, CONFIG_FILE,
};
pub use content_hash::ContentHash;
pub use error::{DazError, Result};
pub use gate::{run_check, CommandGate, ValidationGate};
pub use index::{discover_files, read_source, CodeElement, StructuralIndex};
pub use lock::{lock_path, LockGuard};
pub use parser::{
    JavaScriptParser, ParserAdapter, ParserRegistry, PlainTextParser, PythonParser, SyntaxNode,
};
pub use recorder::{ChangeRecorder, GitRecorder, NoopRecorder, DEFAULT_COMMIT_MESSAGE};
pub use registry::{OpenReport, Registry, GUIDELINES};
pub use repo::Repository;
pub use search::{LexicalSearch, SearchIndex};
pub use session::{ChangeSession, SessionSummary, TimeProvider};
pub use staging::Candidate;
pub use types::*;
