//! E2E test harness for dazbuild.
//!
//! This module contains test infrastructure with builders, variants, and
//! methods that not every scenario uses.

#![allow(dead_code)]

pub mod clock;
pub mod runner;
pub mod steps;
pub mod workspace;

// Re-export commonly used types
pub use assertions::Assertion;
pub use scenario::Scenario;
pub use steps::GateMode;

/// Name the scenario repository is registered under.
pub const REPO: &str = "demo";
