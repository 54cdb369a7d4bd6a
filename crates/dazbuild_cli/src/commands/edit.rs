//! One-shot edit command: start a session, replace one element, end it.

use anyhow::{Context, Result};
use chrono::DateTime;
use console::style;
use std::io::Read;
use std::path::Path;

pub fn run(
    config: Option<&Path>,
    repo: &str,
    reference: &str,
    file: &Path,
    message: Option<&str>,
) -> Result<()> {
    let content = read_content(file)?;
    let mut registry = super::open_registry(config, repo)?;

    let session_id = registry.start_change(repo)?;
    if let Some(status) = registry.session_status(repo)? {
        let started = DateTime::from_timestamp(status.created_at, 0).unwrap_or_default();
        println!(
            "Session {} started {}",
            style(&session_id).dim(),
            started.format("%Y-%m-%d %H:%M:%S UTC")
        );
    }

    if let Err(e) = registry.write(repo, reference, &content) {
        registry.force_abort(repo)?;
        return Err(e.into());
    }

    let outcome = registry.end_change(repo, message)?;
    if !outcome.committed {
        println!("{} {}", style("×").red(), style("Change rejected").red().bold());
        super::check::print_diagnostics(&outcome.diagnostics);
        return Err(anyhow::anyhow!("validation failed; nothing was written"));
    }

    println!("{} Committed {}", style("✓").green(), style(reference).cyan());
    for path in &outcome.touched_files {
        println!("  wrote {}", path);
    }
    if outcome.recorded {
        println!("  recorded with git");
    }
    Ok(())
}

fn read_content(file: &Path) -> Result<String> {
    if file == Path::new("-") {
        let mut content = String::new();
        std::io::stdin()
            .read_to_string(&mut content)
            .context("failed to read content from stdin")?;
        return Ok(content);
    }
    std::fs::read_to_string(file).with_context(|| format!("failed to read {}", file.display()))
}
