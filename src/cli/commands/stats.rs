//! Dashboard statistics command.

use crate::cli::{print_json, Cli};
use crate::error::Result;
use colored::Colorize;

/// Print store-wide counts, or issue and session counts for one project.
///
/// # Errors
///
/// Returns an error if the database cannot be opened or queried.
pub fn execute(project: Option<&str>, cli: &Cli, json: bool) -> Result<()> {
    let (storage, _) = super::open_local(cli)?;

    if let Some(path) = project {
        let issues = storage.get_issue_stats(Some(path))?;
        let sessions = storage.get_session_stats(Some(path))?;
        let counts = storage.get_project_counts(path)?;
        if json {
            return print_json(&serde_json::json!({
                "project_path": path,
                "issues": issues,
                "sessions": sessions,
                "counts": counts,
            }));
        }

        println!("{}", path.bold());
        println!(
            "  Sessions: {} ({} active, {} paused, {} completed)",
            sessions.total, sessions.active, sessions.paused, sessions.completed
        );
        println!(
            "  Issues:   {} ({} open, {} in progress, {} closed)",
            issues.total, issues.open, issues.in_progress, issues.closed
        );
        println!("  Context items: {}", counts.context_items);
        println!("  Memory items:  {}", counts.memories);
        println!("  Checkpoints:   {}", counts.checkpoints);
        return Ok(());
    }

    let stats = storage.get_dashboard_stats()?;
    if json {
        return print_json(&stats);
    }

    println!("{}", "SaveContext".bold());
    println!("  Database:      {}", storage.path().display());
    println!("  Projects:      {}", stats.projects);
    println!(
        "  Sessions:      {} ({} active, {} paused, {} completed)",
        stats.sessions.total, stats.sessions.active, stats.sessions.paused, stats.sessions.completed
    );
    println!("  Context items: {}", stats.context_items);
    println!("  Checkpoints:   {}", stats.checkpoints);
    println!("  Memory items:  {}", stats.memories);
    println!("  Plans:         {}", stats.plans);
    println!(
        "  Issues:        {} ({} open, {} in progress, {} blocked, {} closed)",
        stats.issues.total,
        stats.issues.open,
        stats.issues.in_progress,
        stats.issues.blocked,
        stats.issues.closed
    );
    Ok(())
}
