//! Execution display - confirmation, per-change results and summary

use anyhow::{Context, Result};
use colored::Colorize;
use declarative::{ChangeResult, ChangeResultSummary, ChangeStatus};

use crate::provider::file::FileChange;

/// Confirm with user
pub fn confirm_proceed() -> Result<bool> {
    use dialoguer::Confirm;

    let confirmed = Confirm::new()
        .with_prompt("Continue?")
        .default(true)
        .interact()
        .context("Failed to read confirmation")?;

    Ok(confirmed)
}

/// Print one line per result, with errors below failed ones
pub fn display_results(results: &[ChangeResult<FileChange>], dry_run: bool) {
    println!();
    for result in results {
        let symbol = match result.status() {
            ChangeStatus::Ok => "○".dimmed(),
            ChangeStatus::Changed if dry_run => "→".cyan(),
            ChangeStatus::Changed => "✓".green(),
            ChangeStatus::Failed => "✗".red(),
        };
        println!("  {} {}", symbol, result.description());
        for error in result.errors() {
            println!("      {}", error.message.red());
            if let Some(details) = &error.details {
                println!("      {}", details.dimmed());
            }
        }
    }
}

/// Print final summary
pub fn print_summary(summary: &ChangeResultSummary, dry_run: bool) {
    println!();
    if dry_run {
        println!("  {} Dry run - no changes made", "ℹ".blue());
    } else if summary.is_success() {
        println!("  {} Resources reconciled successfully!", "✓".green().bold());
    } else {
        println!("  {} Resources reconciled with errors", "⚠".yellow().bold());
    }

    let verb = |done: &'static str, planned: &'static str| if dry_run { planned } else { done };
    if summary.added > 0 {
        println!("    • {} resources {}", summary.added, verb("created", "to create"));
    }
    if summary.updated > 0 {
        println!("    • {} resources {}", summary.updated, verb("updated", "to update"));
    }
    if summary.deleted > 0 {
        println!("    • {} resources {}", summary.deleted, verb("deleted", "to delete"));
    }
    if summary.ok > 0 {
        println!("    • {} resources unchanged", summary.ok);
    }
    if summary.failed > 0 {
        println!("    • {} {} failed", summary.failed, "resources".red());
    }
}
