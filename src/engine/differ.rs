//! Plan display

use colored::{ColoredString, Colorize};
use declarative::{Change, ChangeType, ResourceList};
use std::fmt::Write;

use crate::provider::file::FileChange;

/// Symbol shown in front of a change
pub fn symbol(change_type: ChangeType) -> ColoredString {
    match change_type {
        ChangeType::Add => "+".green(),
        ChangeType::Delete => "-".red(),
        ChangeType::Update => "~".yellow(),
        ChangeType::None => "○".dimmed(),
        ChangeType::Ignore => "⊘".dimmed(),
    }
}

/// Display a plan in a user-friendly format
///
/// Unchanged resources are listed only when `show_unchanged` is set.
pub fn display_plan(changes: &ResourceList<FileChange>, show_unchanged: bool) {
    let pending = changes
        .iter()
        .filter(|c| c.operation() != ChangeType::None)
        .count();

    if pending == 0 && !show_unchanged {
        println!();
        println!("  {} No changes needed", "✓".green());
        return;
    }

    println!();
    println!("┌─ {} ─────────────────────────────────────────┐", "Plan".bold());
    println!("│");

    for change in changes {
        if change.operation() == ChangeType::None && !show_unchanged {
            continue;
        }
        let detail = match change.operation() {
            ChangeType::Add => change
                .after()
                .map(|f| format!("(new, {} bytes)", f.spec.content.len()))
                .unwrap_or_default(),
            ChangeType::Delete => "(will remove)".to_string(),
            ChangeType::Update => "(content differs)".to_string(),
            ChangeType::None => "(unchanged)".to_string(),
            ChangeType::Ignore => "(ignored)".to_string(),
        };
        println!(
            "│   {} {:<40} {}",
            symbol(change.operation()),
            change.name(),
            detail.dimmed()
        );

        if change.operation() == ChangeType::Update
            && let (Some(before), Some(after)) = (change.before(), change.after())
        {
            for line in content_diff(&before.spec.content, &after.spec.content).lines() {
                println!("│       {line}");
            }
        }
    }

    println!("│");
    println!("├─────────────────────────────────────────────────────┤");
    println!(
        "│ Summary: {} changes ({} unchanged)",
        pending.to_string().bold(),
        changes.len() - pending
    );
    println!("└─────────────────────────────────────────────────────┘");
}

/// Changed lines between two texts using the `similar` crate
pub fn content_diff(before: &str, after: &str) -> String {
    let diff = similar::TextDiff::from_lines(before, after);
    let mut out = String::new();

    for change in diff.iter_all_changes() {
        let line = change.to_string_lossy();
        let line = line.trim_end_matches('\n');
        let _ = match change.tag() {
            similar::ChangeTag::Delete => writeln!(out, "{}", format!("- {line}").red()),
            similar::ChangeTag::Insert => writeln!(out, "{}", format!("+ {line}").green()),
            similar::ChangeTag::Equal => Ok(()),
        };
    }
    out
}
