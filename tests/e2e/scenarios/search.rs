use crate::harness::{Assertion, Scenario, REPO};
use anyhow::anyhow;
use dazbuild_core::{ElementKind, Registry};

#[test]
fn test_search_finds_elements_by_identifier() {
    Scenario::new("search_finds_elements_by_identifier")
        .from_fixture("inventory")
        .assert_search_finds("remove item", "inventory/store.py.Store.remove")
        .assert_search_finds("total", "inventory/store.py.total")
        .run()
        .unwrap();
}

#[test]
fn test_search_follows_commits_only() {
    Scenario::new("search_follows_commits_only")
        .from_fixture("inventory")
        .starts_change()
        .adds(
            ElementKind::Function,
            "inventory/store.py",
            "restock",
            "def restock(store, name):\n    store.add(name, 10)",
        )
        .assert(Assertion::Custom(Box::new(|registry: &mut Registry| {
            let hits = registry.search(REPO, "restock", None)?;
            if hits.is_empty() {
                Ok(())
            } else {
                Err(anyhow!("staged element leaked into search: {:?}", hits))
            }
        })))
        .ends_change("Add restock")
        .assert_committed(true)
        .assert_search_finds("restock", "inventory/store.py.restock")
        .run()
        .unwrap();
}
