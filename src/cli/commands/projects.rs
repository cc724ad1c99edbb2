//! Project management commands.
//!
//! - `scstore projects list` - List projects with counts
//! - `scstore projects show <id>` - Show project details
//! - `scstore projects rename <id> <name>` - Rename a project
//! - `scstore projects update <id>` - Update project settings
//! - `scstore projects delete <id>` - Delete a project row
//! - `scstore projects merge <source> <target>` - Fold one project into another

use crate::backend::{select_backend, Backend};
use crate::cli::{confirm, format_timestamp, print_json, Cli, Confirmation, ProjectCommands, ProjectUpdateArgs};
use crate::error::{Error, Result};
use crate::model::{Project, ProjectUpdate};
use colored::Colorize;
use serde::Serialize;

#[derive(Serialize)]
struct ProjectOutput {
    id: String,
    project_path: String,
    name: String,
    description: Option<String>,
    issue_prefix: Option<String>,
    next_issue_number: i32,
    created_at: String,
    updated_at: String,
}

impl From<Project> for ProjectOutput {
    fn from(p: Project) -> Self {
        Self {
            id: p.id,
            project_path: p.project_path,
            name: p.name,
            description: p.description,
            issue_prefix: p.issue_prefix,
            next_issue_number: p.next_issue_number,
            created_at: format_timestamp(p.created_at),
            updated_at: format_timestamp(p.updated_at),
        }
    }
}

#[derive(Serialize)]
struct ProjectRow {
    #[serde(flatten)]
    project: ProjectOutput,
    session_count: usize,
    issue_count: usize,
}

#[derive(Serialize)]
struct ProjectListOutput {
    backend: &'static str,
    projects: Vec<ProjectRow>,
    count: usize,
}

/// Execute a project command.
///
/// # Errors
///
/// Returns an error if the backend cannot be reached, the project doesn't
/// exist, or a confirmation is declined.
pub fn execute(command: &ProjectCommands, cli: &Cli, json: bool) -> Result<()> {
    let config = super::config(cli)?;
    let mut backend = select_backend(&config, cli.local)?;

    match command {
        ProjectCommands::List { limit } => execute_list(backend.as_ref(), *limit, json),
        ProjectCommands::Show { id } => execute_show(backend.as_ref(), id, json),
        ProjectCommands::Rename { id, name } => execute_rename(backend.as_mut(), id, name, json),
        ProjectCommands::Update(args) => execute_update(backend.as_mut(), args, json),
        ProjectCommands::Delete { id } => execute_delete(backend.as_mut(), id, cli.force, json),
        ProjectCommands::Merge { source, target } => {
            execute_merge(backend.as_mut(), source, target, cli.force, json)
        }
    }
}

fn find_project(backend: &dyn Backend, id: &str) -> Result<Project> {
    backend
        .get_project(id)?
        .ok_or_else(|| Error::ProjectNotFound { id: id.to_string() })
}

fn execute_list(backend: &dyn Backend, limit: u32, json: bool) -> Result<()> {
    let rows = backend.list_projects(limit)?;

    if json {
        let projects: Vec<ProjectRow> = rows
            .into_iter()
            .map(|r| ProjectRow {
                project: r.project.into(),
                session_count: r.session_count,
                issue_count: r.issue_count,
            })
            .collect();
        return print_json(&ProjectListOutput {
            backend: backend.name(),
            count: projects.len(),
            projects,
        });
    }

    if rows.is_empty() {
        println!("No projects found.");
        return Ok(());
    }

    println!("Projects ({}, {}):\n", rows.len(), backend.name());
    for row in &rows {
        let project = &row.project;
        println!(
            "  {} [{}] ({} sessions, {} issues)",
            project.name.bold(),
            project.issue_prefix.as_deref().unwrap_or("-"),
            row.session_count,
            row.issue_count
        );
        println!("    ID:   {}", project.id);
        println!("    Path: {}", project.project_path);
        if let Some(desc) = &project.description {
            println!("    Desc: {desc}");
        }
        println!();
    }
    Ok(())
}

fn execute_show(backend: &dyn Backend, id: &str, json: bool) -> Result<()> {
    let project = find_project(backend, id)?;
    let counts = backend.project_counts(&project)?;

    if json {
        return print_json(&serde_json::json!({
            "project": ProjectOutput::from(project),
            "counts": counts,
        }));
    }

    println!("Project: {}", project.name.bold());
    println!("  ID:           {}", project.id);
    println!("  Path:         {}", project.project_path);
    println!("  Issue prefix: {}", project.issue_prefix.as_deref().unwrap_or("-"));
    println!("  Next issue:   {}", project.next_issue_short_id());
    println!("  Description:  {}", project.description.as_deref().unwrap_or("-"));
    println!();
    println!("Statistics:");
    println!("  Sessions:      {}", counts.sessions);
    println!("  Issues:        {}", counts.issues);
    println!("  Context items: {}", counts.context_items);
    println!("  Memory items:  {}", counts.memories);
    println!("  Checkpoints:   {}", counts.checkpoints);
    println!();
    println!("Created: {}", format_timestamp(project.created_at));
    println!("Updated: {}", format_timestamp(project.updated_at));
    Ok(())
}

fn execute_rename(backend: &mut dyn Backend, id: &str, name: &str, json: bool) -> Result<()> {
    let project = find_project(backend, id)?;
    let updated = backend.rename_project(&project.id, name)?;

    if json {
        print_json(&ProjectOutput::from(updated))
    } else {
        println!("Renamed project {} -> {}", project.name, updated.name.bold());
        Ok(())
    }
}

fn execute_update(backend: &mut dyn Backend, args: &ProjectUpdateArgs, json: bool) -> Result<()> {
    let project = find_project(backend, &args.id)?;
    let update = ProjectUpdate {
        name: args.name.clone(),
        description: args.description.clone(),
        issue_prefix: args.issue_prefix.clone(),
    };
    let updated = backend.update_project(&project.id, &update)?;

    if json {
        return print_json(&ProjectOutput::from(updated));
    }

    println!("Updated project: {}", updated.name.bold());
    if args.name.is_some() {
        println!("  Name: {}", updated.name);
    }
    if args.description.is_some() {
        println!("  Description: {}", updated.description.as_deref().unwrap_or("-"));
    }
    if args.issue_prefix.is_some() {
        println!("  Issue prefix: {}", updated.issue_prefix.as_deref().unwrap_or("-"));
    }
    Ok(())
}

fn execute_delete(backend: &mut dyn Backend, id: &str, force: bool, json: bool) -> Result<()> {
    let project = find_project(backend, id)?;

    if !force {
        let counts = backend.project_counts(&project)?;
        eprintln!(
            "{} project {} ({})",
            "Deleting".red().bold(),
            project.name,
            project.project_path
        );
        eprintln!(
            "  {} sessions and {} issues will be unlinked, not deleted.",
            counts.sessions, counts.issues
        );
    }
    confirm("Delete this project?", Confirmation::Literal("DELETE"), force)?;

    let counts = backend.delete_project(&project.id)?;

    if json {
        print_json(&serde_json::json!({
            "deleted": counts.projects > 0,
            "id": project.id,
            "name": project.name,
            "counts": counts,
        }))
    } else {
        println!("Deleted project: {} ({})", project.name, project.id);
        if counts.sessions_unlinked > 0 {
            println!("  Unlinked {} sessions", counts.sessions_unlinked);
        }
        let links = counts.session_links_removed + counts.issue_links_removed;
        if links > 0 {
            println!("  Removed {links} project links");
        }
        Ok(())
    }
}

fn execute_merge(backend: &mut dyn Backend, source: &str, target: &str, force: bool, json: bool) -> Result<()> {
    let source = find_project(backend, source)?;
    let target = find_project(backend, target)?;
    if source.id == target.id {
        return Err(Error::InvalidArgument(
            "Cannot merge a project into itself".to_string(),
        ));
    }

    confirm(
        &format!(
            "Merge {} ({}) into {} ({})? {} will be deleted.",
            source.name, source.project_path, target.name, target.project_path, source.name
        ),
        Confirmation::YesNo,
        force,
    )?;

    let counts = backend.merge_projects(&source.id, &target.id)?;

    if json {
        return print_json(&serde_json::json!({
            "source": source.id,
            "target": target.id,
            "counts": counts,
        }));
    }

    println!("Merged {} into {}", source.name, target.name.bold());
    println!("  Sessions:  {}", counts.sessions);
    println!("  Issues:    {}", counts.issues);
    println!("  Plans:     {}", counts.plans);
    println!("  Memories:  {}", counts.memories);
    if counts.memories_dropped > 0 {
        println!(
            "  {} memory keys already existed in {} and were dropped",
            counts.memories_dropped, target.name
        );
    }
    Ok(())
}
