//! Validation dry-run command.

use anyhow::Result;
use console::style;
use dazbuild_core::{Diagnostic, ValidationResult};
use indicatif::{ProgressBar, ProgressStyle};
use std::path::Path;

/// Run the validation gate against the committed state.
pub fn run(config: Option<&Path>, repo: &str) -> Result<()> {
    let registry = super::open_registry(config, repo)?;

    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner().template("{spinner:.green} {msg}")?);
    spinner.set_message(format!("Running lint and tests for {}...", repo));
    spinner.enable_steady_tick(std::time::Duration::from_millis(100));

    let result = registry.check(repo)?;
    spinner.finish_and_clear();

    print_result(&result);
    if !result.passed {
        return Err(anyhow::anyhow!("validation failed for {}", repo));
    }
    Ok(())
}

/// Prints a verdict followed by its diagnostics.
pub fn print_result(result: &ValidationResult) {
    if result.passed {
        println!("{} {}", style("✓").green(), style("Validation passed").green());
    } else {
        println!("{} {}", style("×").red(), style("Validation failed").red().bold());
    }
    print_diagnostics(&result.diagnostics);
}

pub fn print_diagnostics(diagnostics: &[Diagnostic]) {
    for diagnostic in diagnostics {
        println!("  {}", diagnostic);
    }
}
