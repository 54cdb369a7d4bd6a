use crate::harness::Scenario;
use dazbuild_core::ElementKind;

const FOO: &str = "def foo():\n    return 1\n";

#[test]
fn test_session_conflict_and_missing_session() {
    Scenario::new("session_conflict_and_missing_session")
        .with_file("a.py", FOO)
        .ends_change("nothing to end")
        .expect_error("NoActiveSession")
        .force_aborts()
        .expect_error("NoActiveSession")
        .starts_change()
        .starts_change()
        .expect_error("SessionConflict")
        .assert_session_active()
        .run()
        .unwrap();
}

#[test]
fn test_close_requires_finished_session() {
    Scenario::new("close_requires_finished_session")
        .with_file("a.py", FOO)
        .opens()
        .expect_error("RepositoryAlreadyOpen")
        .starts_change()
        .closes()
        .expect_error("ActiveSessionExists")
        .force_aborts()
        .assert_no_session()
        .closes()
        .starts_change()
        .expect_error("RepositoryNotOpen")
        .closes()
        .expect_error("RepositoryNotOpen")
        .opens()
        .assert_no_session()
        .run()
        .unwrap();
}

#[test]
fn test_parse_error_keeps_session_active() {
    Scenario::new("parse_error_keeps_session_active")
        .with_file("a.py", FOO)
        .starts_change()
        .writes("a.py.foo", "def foo(:\n    return 2")
        .expect_error("ParseError")
        .assert_session_active()
        .assert_staged(0)
        .assert_content("a.py.foo", "def foo():\n    return 1")
        .writes("a.py.foo", "def renamed():\n    return 2")
        .expect_error("ParseError")
        .writes("a.py.foo", "def foo():\n    return 2")
        .assert_staged(1)
        .run()
        .unwrap();
}

#[test]
fn test_duplicate_references_are_refused() {
    Scenario::new("duplicate_references_are_refused")
        .with_file("a.py", FOO)
        .starts_change()
        .adds(ElementKind::Function, "a.py", "foo", "def foo():\n    return 9")
        .expect_error("DuplicateReference")
        .adds(ElementKind::Function, "a.py", "bar", "def bar():\n    pass")
        .adds(ElementKind::Function, "a.py", "bar", "def bar():\n    return 0")
        .expect_error("DuplicateReference")
        .adds(ElementKind::File, "", "a.py", "X = 1\n")
        .expect_error("DuplicateReference")
        .assert_staged(1)
        .run()
        .unwrap();
}

#[test]
fn test_add_checks_parent() {
    Scenario::new("add_checks_parent")
        .with_file("a.py", FOO)
        .starts_change()
        .adds(ElementKind::Function, "a.py.missing", "bar", "def bar():\n    pass")
        .expect_error("ReferenceNotFound")
        .adds(ElementKind::Method, "a.py", "bar", "def bar(self):\n    pass")
        .expect_error("KindMismatch")
        .adds(ElementKind::Function, "a.py", "baz", "def bar():\n    pass")
        .expect_error("ParseError")
        .adds(ElementKind::Function, "a.py", "not valid", "def bar():\n    pass")
        .expect_error("InvalidReference")
        .assert_missing("a.py.bar")
        .assert_staged(0)
        .run()
        .unwrap();
}
