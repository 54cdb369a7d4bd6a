//! Scenarios validated by real processes instead of the scripted gate.

#![cfg(unix)]

use crate::harness::Scenario;
use dazbuild_core::{CommandSpec, ElementKind, GateConfig};
use std::process::Command;

const FOO: &str = "def foo():\n    return 1\n";

fn python_available() -> bool {
    Command::new("python3")
        .arg("--version")
        .output()
        .map(|o| o.status.success())
        .unwrap_or(false)
}

fn shell_gate(tests_script: &str) -> GateConfig {
    GateConfig {
        timeout_secs: 30,
        lint: CommandSpec::new("true", &[]),
        tests: CommandSpec::new("sh", &["-c", tests_script]),
        require_tests_per_file: false,
        ..GateConfig::default()
    }
}

#[test]
fn test_commands_run_against_the_candidate() {
    Scenario::new("commands_run_against_the_candidate")
        .with_file("a.py", FOO)
        .with_command_gate(shell_gate("grep -q 'return 2' a.py"))
        .starts_change()
        .writes("a.py.foo", "def foo():\n    return 2")
        .ends_change("Return 2")
        .assert_committed(true)
        .assert_disk("a.py", "def foo():\n    return 2\n")
        .run()
        .unwrap();
}

#[test]
fn test_failing_command_rejects_change() {
    Scenario::new("failing_command_rejects_change")
        .with_file("a.py", FOO)
        .with_command_gate(shell_gate("grep -q 'return 2' a.py"))
        .starts_change()
        .writes("a.py.foo", "def foo():\n    return 3")
        .ends_change("Return 3")
        .assert_committed(false)
        .assert_diagnostic("exited with status 1")
        .assert_no_session()
        .assert_disk("a.py", FOO)
        .run()
        .unwrap();
}

#[test]
fn test_forbidden_pattern_rejects_change() {
    Scenario::new("forbidden_pattern_rejects_change")
        .with_file("a.py", FOO)
        .with_command_gate(shell_gate("true"))
        .starts_change()
        .adds(
            ElementKind::Function,
            "a.py",
            "main",
            "def main():\n    import unittest\n    unittest.main()",
        )
        .ends_change("Add main")
        .assert_committed(false)
        .assert_diagnostic("forbidden pattern `unittest.main`")
        .assert_missing("a.py.main")
        .run()
        .unwrap();
}

#[test]
fn test_files_must_declare_tests() {
    Scenario::new("files_must_declare_tests")
        .with_file("a.py", FOO)
        .with_command_gate(GateConfig {
            require_tests_per_file: true,
            ..shell_gate("true")
        })
        .starts_change()
        .writes("a.py.foo", "def foo():\n    return 2")
        .ends_change("Return 2")
        .assert_committed(false)
        .assert_diagnostic("a.py declares no test")
        .starts_change()
        .adds(
            ElementKind::Function,
            "a.py",
            "test_foo",
            "def test_foo():\n    assert foo() == 1",
        )
        .ends_change("Test foo")
        .assert_committed(true)
        .assert_outline("a.py", &["a.py.foo", "a.py.test_foo"])
        .run()
        .unwrap();
}

#[test]
fn test_default_tests_command_runs_tests_inside_modules() {
    if !python_available() {
        return;
    }
    Scenario::new("default_tests_command_runs_tests_inside_modules")
        .from_fixture("inventory")
        .with_command_gate(GateConfig {
            timeout_secs: 120,
            lint: CommandSpec::new("true", &[]),
            require_tests_per_file: false,
            ..GateConfig::default()
        })
        .starts_change()
        .writes(
            "inventory/store.py.total",
            "def total(store):\n    return sum(store.items.values(), 0)",
        )
        .ends_change("Sum from zero")
        .assert_committed(true)
        .assert_disk_contains("inventory/store.py", "sum(store.items.values(), 0)")
        .run()
        .unwrap();
}

#[test]
fn test_candidate_includes_unindexed_files() {
    Scenario::new("candidate_includes_unindexed_files")
        .with_file("a.py", FOO)
        .with_file(".pylintrc", "[MESSAGES CONTROL]\ndisable=C\n")
        .with_file("data/fixture.bin", "\u{0}\u{1}\u{2}binary")
        .with_command_gate(GateConfig {
            lint: CommandSpec::new("sh", &["-c", "test -f .pylintrc"]),
            ..shell_gate("test -s data/fixture.bin")
        })
        .starts_change()
        .writes("a.py.foo", "def foo():\n    return 2")
        .ends_change("Return 2")
        .assert_committed(true)
        .run()
        .unwrap();
}
