//! Read-only browsing commands: outline, get, search.

use anyhow::Result;
use console::style;
use std::path::Path;

pub fn outline(config: Option<&Path>, repo: &str, reference: Option<&str>) -> Result<()> {
    let registry = super::open_registry(config, repo)?;
    let entries = registry.outline(repo, reference)?;

    for entry in entries {
        println!(
            "{} {}  {}",
            style(format!("{:<8}", entry.kind.as_str())).dim(),
            style(&entry.reference).cyan(),
            entry.signature
        );
    }

    Ok(())
}

pub fn get(config: Option<&Path>, repo: &str, reference: &str) -> Result<()> {
    let registry = super::open_registry(config, repo)?;
    println!("{}", registry.get(repo, reference)?);
    Ok(())
}

pub fn search(config: Option<&Path>, repo: &str, query: &str, limit: Option<usize>) -> Result<()> {
    let registry = super::open_registry(config, repo)?;
    let hits = registry.search(repo, query, limit)?;

    if hits.is_empty() {
        println!("No matches");
        return Ok(());
    }

    for hit in hits {
        println!(
            "{:>5.2}  {:<8} {}",
            hit.score,
            hit.kind.as_str(),
            style(&hit.reference).cyan()
        );
        if let Some(first) = hit.snippet.lines().next() {
            println!("       {}", style(first).dim());
        }
    }

    Ok(())
}
