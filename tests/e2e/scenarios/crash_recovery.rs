use crate::harness::Scenario;

const FOO: &str = "def foo():\n    return 1\n";

#[test]
fn test_restart_loses_uncommitted_edits() {
    Scenario::new("restart_loses_uncommitted_edits")
        .with_file("a.py", FOO)
        .starts_change()
        .writes("a.py.foo", "def foo():\n    return 2")
        .restarts()
        .assert_no_session()
        .assert_content("a.py.foo", "def foo():\n    return 1")
        .assert_disk("a.py", FOO)
        .starts_change()
        .assert_staged(0)
        .run()
        .unwrap();
}

#[test]
fn test_external_modification_keeps_session_for_retry() {
    Scenario::new("external_modification_keeps_session_for_retry")
        .with_file("a.py", FOO)
        .starts_change()
        .writes("a.py.foo", "def foo():\n    return 2")
        .edits_on_disk("a.py", "def foo():\n    return 42\n")
        .ends_change("Return 2")
        .expect_error("CommitIOError")
        .assert_session_active()
        .assert_staged(1)
        .assert_disk("a.py", "def foo():\n    return 42\n")
        .edits_on_disk("a.py", FOO)
        .ends_change("Return 2")
        .assert_committed(true)
        .assert_disk("a.py", "def foo():\n    return 2\n")
        .run()
        .unwrap();
}

#[test]
fn test_commit_preserves_element_ids() {
    Scenario::new("commit_preserves_element_ids")
        .with_file("a.py", "def foo():\n    return 1\n\n\ndef baz():\n    return 3\n")
        .with_file("b.py", "def bar():\n    return 1\n")
        .remember_id("a.py")
        .remember_id("a.py.foo")
        .remember_id("a.py.baz")
        .remember_id("b.py.bar")
        .starts_change()
        .writes("a.py.foo", "def foo():\n    value = 1\n    return value + 1")
        .ends_change("Compute foo")
        .assert_committed(true)
        .assert_impacted("a.py.foo")
        .assert_impacted("a.py.baz")
        .assert_id_preserved("a.py")
        .assert_id_preserved("a.py.foo")
        .assert_id_preserved("a.py.baz")
        .assert_id_preserved("b.py.bar")
        .run()
        .unwrap();
}
