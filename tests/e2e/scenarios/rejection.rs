use crate::harness::{Assertion, Scenario};

const FOO: &str = "def foo():\n    return 1\n";

#[test]
fn test_failing_tests_abort_the_session() {
    Scenario::new("failing_tests_abort_the_session")
        .with_file("a.py", FOO)
        .gate_fails_tests("test_foo: 2 != 1")
        .starts_change()
        .writes("a.py.foo", "def foo():\n    return 2")
        .ends_change("Return 2")
        .assert_committed(false)
        .assert_diagnostic("test_foo: 2 != 1")
        .assert_no_session()
        .assert_content("a.py.foo", "def foo():\n    return 1")
        .assert_disk("a.py", FOO)
        .writes("a.py.foo", "def foo():\n    return 3")
        .expect_error("NoActiveSession")
        .run()
        .unwrap();
}

#[test]
fn test_retry_starts_with_empty_session() {
    Scenario::new("retry_starts_with_empty_session")
        .with_file("a.py", FOO)
        .gate_fails_lint("a.py:2:0: W0101 unreachable code")
        .starts_change()
        .writes("a.py.foo", "def foo():\n    return 2")
        .ends_change_silently()
        .assert_committed(false)
        .assert_diagnostic("unreachable code")
        .gate_passes()
        .starts_change()
        .assert_staged(0)
        .writes("a.py.foo", "def foo():\n    return 2")
        .ends_change("Second attempt")
        .assert_committed(true)
        .assert_disk("a.py", "def foo():\n    return 2\n")
        .run()
        .unwrap();
}

#[test]
fn test_gate_sees_the_full_candidate() {
    Scenario::new("gate_sees_the_full_candidate")
        .with_file("a.py", FOO)
        .with_file("b.py", "def bar():\n    return 1\n")
        .gate_fails_tests("rejected for inspection")
        .starts_change()
        .writes("a.py.foo", "def foo():\n    return 2")
        .ends_change("Inspect")
        .assert(Assertion::GateSaw {
            path: "a.py".into(),
            text: "return 2".into(),
        })
        .assert(Assertion::GateSaw {
            path: "b.py".into(),
            text: "def bar():".into(),
        })
        .assert_disk("a.py", FOO)
        .run()
        .unwrap();
}
