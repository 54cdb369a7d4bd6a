use crate::harness::Scenario;

const FOO: &str = "def foo():\n    return 1\n";

#[test]
fn test_staged_signature_is_visible() {
    Scenario::new("staged_signature_is_visible")
        .with_file("a.py", FOO)
        .starts_change()
        .writes("a.py.foo", "def foo(x):\n    return x")
        .assert_signature("a.py.foo", "def foo(x)")
        .assert_outline("a.py", &["a.py.foo"])
        .assert_disk("a.py", FOO)
        .run()
        .unwrap();
}

#[test]
fn test_last_write_wins() {
    Scenario::new("last_write_wins")
        .with_file("a.py", FOO)
        .starts_change()
        .writes("a.py.foo", "def foo():\n    return 2")
        .writes("a.py.foo", "def foo():\n    return 3")
        .assert_staged(1)
        .assert_content("a.py.foo", "def foo():\n    return 3")
        .ends_change("Return 3")
        .assert_disk("a.py", "def foo():\n    return 3\n")
        .run()
        .unwrap();
}

#[test]
fn test_force_abort_leaves_everything_untouched() {
    Scenario::new("force_abort_leaves_everything_untouched")
        .from_fixture("inventory")
        .remember_id("inventory/store.py.Store.add")
        .starts_change()
        .writes(
            "inventory/store.py.Store.add",
            "def add(self, name, quantity=1):\n    self.items[name] = quantity",
        )
        .writes("inventory/store.py.total", "def total(store):\n    return 0")
        .assert_staged(2)
        .force_aborts()
        .assert_no_session()
        .assert_content("inventory/store.py.total", "def total(store):\n    return sum(store.items.values())")
        .assert_disk_contains("inventory/store.py", "self.items[name] = self.items.get(name, 0) + quantity")
        .assert_id_preserved("inventory/store.py.Store.add")
        .run()
        .unwrap();
}

#[test]
fn test_whole_file_write_replaces_elements() {
    Scenario::new("whole_file_write_replaces_elements")
        .with_file("a.py", FOO)
        .starts_change()
        .writes("a.py", "def foo():\n    return 1\n\n\ndef baz():\n    return 2\n")
        .assert_outline("a.py", &["a.py.foo", "a.py.baz"])
        .ends_change("Add baz")
        .assert_committed(true)
        .assert_impacted("a.py.baz")
        .assert_disk("a.py", "def foo():\n    return 1\n\n\ndef baz():\n    return 2\n")
        .run()
        .unwrap();
}

#[test]
fn test_class_write_folds_method_edits() {
    Scenario::new("class_write_folds_method_edits")
        .from_fixture("inventory")
        .starts_change()
        .writes(
            "inventory/store.py.Store.remove",
            "def remove(self, name, quantity=1):\n    self.items.pop(name, None)",
        )
        .writes(
            "inventory/store.py.Store",
            "class Store:\n    \"\"\"Quantities by item name.\"\"\"\n\n    def __init__(self):\n        self.items = {}\n\n    def add(self, name, quantity=1):\n        self.items[name] = self.items.get(name, 0) + quantity",
        )
        .assert_staged(1)
        .assert_outline(
            "inventory/store.py.Store",
            &["inventory/store.py.Store.__init__", "inventory/store.py.Store.add"],
        )
        .assert_missing("inventory/store.py.Store.remove")
        .run()
        .unwrap();
}
