use crate::harness::Scenario;
use dazbuild_core::ElementKind;

const FOO: &str = "def foo():\n    return 1\n";

#[test]
fn test_outline_lists_function() {
    Scenario::new("outline_lists_function")
        .with_file("a.py", FOO)
        .assert_outline("a.py", &["a.py.foo"])
        .assert_signature("a.py.foo", "def foo()")
        .run()
        .expect("scenario should pass");
}

#[test]
fn test_write_commit_and_reopen() {
    Scenario::new("write_commit_and_reopen")
        .with_file("a.py", FOO)
        .starts_change()
        .writes("a.py.foo", "def foo():\n    return 2")
        .assert_content("a.py.foo", "def foo():\n    return 2")
        .assert_disk("a.py", FOO)
        .ends_change("Return 2")
        .assert_committed(true)
        .assert_touched(&["a.py"])
        .assert_impacted("a.py.foo")
        .assert_no_session()
        .assert_disk("a.py", "def foo():\n    return 2\n")
        .closes()
        .opens()
        .assert_content("a.py.foo", "def foo():\n    return 2")
        .run()
        .unwrap();
}

#[test]
fn test_add_function_keeps_file_order() {
    Scenario::new("add_function_keeps_file_order")
        .with_file("a.py", FOO)
        .starts_change()
        .adds(ElementKind::Function, "a.py", "bar", "def bar():\n    pass")
        .assert_outline("a.py", &["a.py.foo", "a.py.bar"])
        .ends_change("Add bar")
        .assert_committed(true)
        .assert_impacted("a.py.bar")
        .assert_outline("a.py", &["a.py.foo", "a.py.bar"])
        .assert_disk_contains("a.py", "def bar():\n    pass")
        .run()
        .unwrap();
}

#[test]
fn test_add_class_then_method() {
    Scenario::new("add_class_then_method")
        .with_file("a.py", FOO)
        .starts_change()
        .adds(ElementKind::Class, "a.py", "Greeter", "class Greeter:\n    pass")
        .adds(
            ElementKind::Method,
            "a.py.Greeter",
            "greet",
            "def greet(self, name):\n    return 'hi ' + name",
        )
        .assert_outline("a.py", &["a.py.foo", "a.py.Greeter", "a.py.Greeter.greet"])
        .assert_signature("a.py.Greeter.greet", "def greet(self, name)")
        .ends_change("Add Greeter")
        .assert_committed(true)
        .assert_disk_contains("a.py", "    def greet(self, name):\n        return 'hi ' + name")
        .run()
        .unwrap();
}

#[test]
fn test_add_file_under_directory() {
    Scenario::new("add_file_under_directory")
        .from_fixture("inventory")
        .starts_change()
        .adds(
            ElementKind::File,
            "inventory",
            "report.py",
            "def summary(store):\n    return len(store.items)\n",
        )
        .assert_outline("inventory/report.py", &["inventory/report.py.summary"])
        .assert_disk_missing("inventory/report.py")
        .ends_change("Add report module")
        .assert_committed(true)
        .assert_touched(&["inventory/report.py"])
        .assert_disk("inventory/report.py", "def summary(store):\n    return len(store.items)\n")
        .run()
        .unwrap();
}

#[test]
fn test_rewrite_method_inside_class() {
    Scenario::new("rewrite_method_inside_class")
        .from_fixture("inventory")
        .starts_change()
        .writes(
            "inventory/store.py.Store.add",
            "def add(self, name, quantity=1):\n    if quantity <= 0:\n        raise ValueError(quantity)\n    self.items[name] = self.items.get(name, 0) + quantity",
        )
        .ends_change("Reject non-positive quantities")
        .assert_committed(true)
        .assert_disk_contains(
            "inventory/store.py",
            "    def add(self, name, quantity=1):\n        if quantity <= 0:\n            raise ValueError(quantity)\n",
        )
        .assert_disk_contains("inventory/store.py", "    def remove(self, name, quantity=1):")
        .run()
        .unwrap();
}
