use std::time::Duration;

use super::assertions::Assertion;
use dazbuild_core::ElementKind;

/// Behaviour of the scripted validation gate
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GateMode {
    Pass,
    FailLint(String),
    FailTests(String),
}

/// All possible actions in a test scenario
#[derive(Debug)]
pub enum ScenarioStep {
    // Registry actions
    Open,
    Close,
    StartChange,
    Write {
        reference: String,
        content: String,
    },
    Add {
        kind: ElementKind,
        parent: String,
        name: String,
        content: String,
    },
    EndChange {
        message: Option<String>,
    },
    ForceAbort,

    // Environment
    SetGate(GateMode),
    EditOnDisk {
        path: String,
        content: String,
    },
    RememberId {
        reference: String,
    },
    Wait {
        duration: Duration,
    },

    // Failure simulation
    Restart,

    // Wraps a step that must fail with the named error kind
    ExpectError {
        step: Box<ScenarioStep>,
        kind: String,
    },

    // Assertions (can be interspersed)
    Assert {
        assertion: Assertion,
    },
}
