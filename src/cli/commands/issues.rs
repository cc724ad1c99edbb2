//! Issue commands. These always run against the local database.

use crate::cli::{
    format_timestamp, print_json, Cli, IssueCommands, IssueListArgs, IssueProjectCommands, LabelCommands,
};
use crate::error::{Error, Result};
use crate::model::{Issue, IssueFilter, TimeFilter};
use crate::storage::SqliteStorage;
use crate::validate::normalize_status;
use colored::Colorize;
use serde::Serialize;

#[derive(Serialize)]
struct IssueListOutput<'a> {
    issues: &'a [Issue],
    count: usize,
}

#[derive(Serialize)]
struct IssueShowOutput<'a> {
    #[serde(flatten)]
    issue: &'a Issue,
    children: &'a [Issue],
}

/// Execute an issue command.
///
/// # Errors
///
/// Returns an error if the database cannot be opened, the issue doesn't
/// exist, or the database lacks the table a mutation needs.
pub fn execute(command: &IssueCommands, cli: &Cli, json: bool) -> Result<()> {
    let (mut storage, config) = super::open_local(cli)?;
    let actor = config.actor.as_str();

    match command {
        IssueCommands::List(args) => execute_list(&storage, args, json),
        IssueCommands::Show { id } => execute_show(&storage, id, json),
        IssueCommands::Stats { project } => {
            let stats = storage.get_issue_stats(project.as_deref())?;
            if json {
                return print_json(&stats);
            }
            println!("Issues{}:", project.as_ref().map(|p| format!(" in {p}")).unwrap_or_default());
            println!("  Backlog:     {}", stats.backlog);
            println!("  Open:        {}", stats.open);
            println!("  In progress: {}", stats.in_progress);
            println!("  Blocked:     {}", stats.blocked);
            println!("  Closed:      {}", stats.closed);
            println!("  Deferred:    {}", stats.deferred);
            println!("  Total:       {}", stats.total);
            Ok(())
        }
        IssueCommands::Labels { command } => execute_labels(&mut storage, command, actor, json),
        IssueCommands::Projects { command } => execute_projects(&mut storage, command, actor, json),
    }
}

fn filter_from_args(args: &IssueListArgs) -> Result<IssueFilter> {
    Ok(IssueFilter {
        project_path: args.project.clone(),
        status: args.status.as_deref().map(normalize_status).transpose()?,
        time: TimeFilter {
            created_last_hours: args.created_hours,
            created_last_days: args.created_days,
            updated_last_hours: args.updated_hours,
            updated_last_days: args.updated_days,
        },
    })
}

fn status_label(status: &str) -> colored::ColoredString {
    match status {
        "open" => status.green(),
        "in_progress" => status.cyan(),
        "blocked" => status.red(),
        "closed" => status.dimmed(),
        _ => status.yellow(),
    }
}

fn display_id(issue: &Issue) -> &str {
    issue.short_id.as_deref().unwrap_or(&issue.id)
}

fn execute_list(storage: &SqliteStorage, args: &IssueListArgs, json: bool) -> Result<()> {
    let issues = storage.get_issues(&filter_from_args(args)?)?;

    if json {
        return print_json(&IssueListOutput {
            count: issues.len(),
            issues: &issues,
        });
    }

    if issues.is_empty() {
        println!("No issues found.");
        return Ok(());
    }

    println!("Issues ({}):\n", issues.len());
    for issue in &issues {
        println!(
            "  {} {} [{}] P{} {}",
            display_id(issue).bold(),
            issue.title,
            status_label(&issue.status),
            issue.priority,
            issue.issue_type.dimmed()
        );
        if let Some(parent) = &issue.parent {
            println!("    Parent: {} {}", parent.short_id.as_deref().unwrap_or(&parent.id), parent.title);
        }
        if !issue.labels.is_empty() {
            println!("    Labels: {}", issue.labels.join(", "));
        }
    }
    Ok(())
}

fn execute_show(storage: &SqliteStorage, id: &str, json: bool) -> Result<()> {
    let issue = storage
        .get_issue_by_id(id)?
        .ok_or_else(|| Error::IssueNotFound { id: id.to_string() })?;
    let children = storage.get_child_issues(&issue.id)?;

    if json {
        return print_json(&IssueShowOutput {
            issue: &issue,
            children: &children,
        });
    }

    println!("{} {}", display_id(&issue).bold(), issue.title.bold());
    println!("  ID:       {}", issue.id);
    println!("  Status:   {}", status_label(&issue.status));
    println!("  Type:     {}", issue.issue_type);
    println!("  Priority: {}", issue.priority);
    println!("  Project:  {}", issue.project_path);
    for path in &issue.additional_project_paths {
        println!("            {path}");
    }
    if let Some(plan) = &issue.plan_id {
        println!("  Plan:     {plan}");
    }
    if let Some(parent) = &issue.parent {
        println!(
            "  Parent:   {} {} [{}]",
            parent.short_id.as_deref().unwrap_or(&parent.id),
            parent.title,
            parent.status
        );
    }
    if !issue.labels.is_empty() {
        println!("  Labels:   {}", issue.labels.join(", "));
    }
    if let Some(description) = &issue.description {
        println!();
        println!("{description}");
    }

    let dependencies = issue.dependencies.as_deref().unwrap_or_default();
    if !dependencies.is_empty() {
        println!();
        println!("Dependencies:");
        for dep in dependencies {
            println!(
                "  {} {} {}",
                dep.dependency_type,
                dep.short_id.as_deref().unwrap_or(&dep.depends_on_id),
                dep.title.as_deref().unwrap_or("(deleted)")
            );
        }
    }

    if !children.is_empty() {
        println!();
        println!("Children:");
        for child in &children {
            println!("  {} {} [{}]", display_id(child), child.title, status_label(&child.status));
        }
    }

    println!();
    println!("Created: {}", format_timestamp(issue.created_at));
    println!("Updated: {}", format_timestamp(issue.updated_at));
    if let Some(closed) = issue.closed_at {
        println!("Closed:  {}", format_timestamp(closed));
    }
    Ok(())
}

fn execute_labels(storage: &mut SqliteStorage, command: &LabelCommands, actor: &str, json: bool) -> Result<()> {
    match command {
        LabelCommands::List { project } => {
            let labels = storage.get_all_labels(project.as_deref())?;
            if json {
                print_json(&serde_json::json!({ "labels": labels, "count": labels.len() }))
            } else if labels.is_empty() {
                println!("No labels found.");
                Ok(())
            } else {
                for label in &labels {
                    println!("{label}");
                }
                Ok(())
            }
        }
        LabelCommands::Add { id, labels } => {
            let added = storage.add_issue_labels(id, labels.as_slice(), actor)?;
            print_labels(storage, id, "added", added, json)
        }
        LabelCommands::Remove { id, labels } => {
            let removed = storage.remove_issue_labels(id, labels.as_slice(), actor)?;
            print_labels(storage, id, "removed", removed, json)
        }
        LabelCommands::Set { id, labels } => {
            let labels = storage.set_issue_labels(id, labels.as_slice(), actor)?;
            if json {
                print_json(&serde_json::json!({ "id": id, "labels": labels }))
            } else if labels.is_empty() {
                println!("Cleared labels on {id}");
                Ok(())
            } else {
                println!("Labels on {id}: {}", labels.join(", "));
                Ok(())
            }
        }
    }
}

fn print_labels(storage: &SqliteStorage, id: &str, action: &str, changed: usize, json: bool) -> Result<()> {
    let labels = storage.get_issue_labels(id)?;
    if json {
        let mut value = serde_json::json!({ "id": id, "labels": labels });
        value[action] = changed.into();
        return print_json(&value);
    }
    println!("{} {changed} label(s) on {id}", capitalize(action));
    if !labels.is_empty() {
        println!("  Labels: {}", labels.join(", "));
    }
    Ok(())
}

fn capitalize(word: &str) -> String {
    let mut chars = word.chars();
    chars
        .next()
        .map(|c| c.to_uppercase().chain(chars).collect())
        .unwrap_or_default()
}

fn execute_projects(
    storage: &mut SqliteStorage,
    command: &IssueProjectCommands,
    actor: &str,
    json: bool,
) -> Result<()> {
    match command {
        IssueProjectCommands::Add { id, path } => {
            let added = storage.add_issue_project(id, path, actor)?;
            if json {
                print_json(&serde_json::json!({ "id": id, "path": path, "added": added }))
            } else {
                if added {
                    println!("Linked {id} to {path}");
                } else {
                    println!("{id} already belongs to {path}");
                }
                Ok(())
            }
        }
        IssueProjectCommands::Remove { id, path } => {
            let removed = storage.remove_issue_project(id, path, actor)?;
            if json {
                print_json(&serde_json::json!({ "id": id, "path": path, "removed": removed }))
            } else {
                if removed > 0 {
                    println!("Unlinked {id} from {path}");
                } else {
                    println!("{id} was not linked to {path}");
                }
                Ok(())
            }
        }
    }
}
