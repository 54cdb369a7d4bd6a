//! Repository listing command.

use anyhow::Result;
use console::style;
use std::path::Path;

/// List configured repositories and their resolved roots.
pub fn run(config: Option<&Path>) -> Result<()> {
    let config = super::load_config(config)?;
    let resolved = config.resolved_repositories();

    if config.repositories.is_empty() {
        println!("No repositories configured");
        return Ok(());
    }

    for (name, raw) in &config.repositories {
        match resolved.get(name) {
            Some(root) => println!("{}  {}", style(name).bold(), root.display()),
            None => println!(
                "{}  {} {}",
                style(name).bold(),
                raw,
                style("(missing)").yellow()
            ),
        }
    }

    Ok(())
}
