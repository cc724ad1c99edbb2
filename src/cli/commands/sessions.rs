//! Session management commands.

use crate::backend::{select_backend, Backend};
use crate::cli::{confirm, format_timestamp, print_json, Cli, Confirmation, SessionCommands, SessionPathCommands};
use crate::error::{Error, Result};
use crate::model::{Session, SessionFilter, SessionStatus};
use colored::Colorize;
use serde::Serialize;

#[derive(Serialize)]
struct SessionListOutput<'a> {
    backend: &'static str,
    sessions: &'a [Session],
    count: usize,
}

/// Execute a session command.
///
/// # Errors
///
/// Returns an error if the backend cannot be reached, the session doesn't
/// exist, or a confirmation is declined.
pub fn execute(command: &SessionCommands, cli: &Cli, json: bool) -> Result<()> {
    let config = super::config(cli)?;
    let mut backend = select_backend(&config, cli.local)?;

    match command {
        SessionCommands::List {
            project,
            status,
            search,
            limit,
        } => {
            let filter = SessionFilter {
                project_path: project.clone(),
                status: status.as_deref().map(str::parse::<SessionStatus>).transpose()?,
                search: search.clone(),
                limit: Some(*limit),
            };
            execute_list(backend.as_ref(), &filter, json)
        }
        SessionCommands::Show { id } => execute_show(backend.as_ref(), id, json),
        SessionCommands::Rename { id, name } => {
            let session = find_session(backend.as_ref(), id)?;
            backend.rename_session(&session.id, name)?;
            report(json, "renamed", &session.id, || {
                println!("Renamed session {} -> {}", session.name, name.trim().bold());
            })
        }
        SessionCommands::Archive { id } => {
            let session = find_session(backend.as_ref(), id)?;
            backend.archive_session(&session.id)?;
            report(json, "archived", &session.id, || {
                println!("Archived session: {} ({})", session.name, session.id);
            })
        }
        SessionCommands::Delete { id } => execute_delete(backend.as_mut(), id, cli.force, json),
        SessionCommands::Paths { command } => execute_paths(backend.as_mut(), command, json),
    }
}

fn find_session(backend: &dyn Backend, id: &str) -> Result<Session> {
    backend
        .get_session(id)?
        .ok_or_else(|| Error::SessionNotFound { id: id.to_string() })
}

/// Print `{ "<action>": true, "id": ... }` in JSON mode, or run `human`.
fn report(json: bool, action: &str, id: &str, human: impl FnOnce()) -> Result<()> {
    if json {
        let mut value = serde_json::json!({ "id": id });
        value[action] = serde_json::Value::Bool(true);
        print_json(&value)
    } else {
        human();
        Ok(())
    }
}

fn status_label(status: &str) -> colored::ColoredString {
    match status {
        "active" => status.green(),
        "paused" => status.yellow(),
        _ => status.dimmed(),
    }
}

fn execute_list(backend: &dyn Backend, filter: &SessionFilter, json: bool) -> Result<()> {
    let sessions = backend.list_sessions(filter)?;

    if json {
        return print_json(&SessionListOutput {
            backend: backend.name(),
            count: sessions.len(),
            sessions: &sessions,
        });
    }

    if sessions.is_empty() {
        println!("No sessions found.");
        return Ok(());
    }

    println!("Sessions ({}, {}):\n", sessions.len(), backend.name());
    for session in &sessions {
        println!("  {} [{}]", session.name.bold(), status_label(&session.status));
        println!("    ID:      {}", session.id);
        if let Some(path) = &session.project_path {
            println!("    Project: {path}");
        }
        if !session.additional_project_paths.is_empty() {
            println!("    Also:    {}", session.additional_project_paths.join(", "));
        }
        println!("    Updated: {}", format_timestamp(session.updated_at));
        println!();
    }
    Ok(())
}

fn execute_show(backend: &dyn Backend, id: &str, json: bool) -> Result<()> {
    let session = find_session(backend, id)?;

    if json {
        return print_json(&session);
    }

    println!("Session: {}", session.name.bold());
    println!("  ID:          {}", session.id);
    println!("  Status:      {}", status_label(&session.status));
    println!("  Description: {}", session.description.as_deref().unwrap_or("-"));
    println!("  Branch:      {}", session.branch.as_deref().unwrap_or("-"));
    println!("  Project:     {}", session.project_path.as_deref().unwrap_or("-"));
    for path in &session.additional_project_paths {
        println!("               {path}");
    }
    println!();
    println!("Created: {}", format_timestamp(session.created_at));
    println!("Updated: {}", format_timestamp(session.updated_at));
    if let Some(ended) = session.ended_at {
        println!("Ended:   {}", format_timestamp(ended));
    }
    Ok(())
}

fn execute_delete(backend: &mut dyn Backend, id: &str, force: bool, json: bool) -> Result<()> {
    let session = find_session(backend, id)?;
    confirm(
        &format!(
            "Delete session {} ({}) with its context items and checkpoints?",
            session.name, session.id
        ),
        Confirmation::YesNo,
        force,
    )?;

    let counts = backend.delete_session(&session.id)?;

    if json {
        print_json(&serde_json::json!({
            "deleted": counts.sessions > 0,
            "id": session.id,
            "counts": counts,
        }))
    } else {
        println!("Deleted session: {} ({})", session.name, session.id);
        println!(
            "  {} context items, {} checkpoints",
            counts.context_items, counts.checkpoints
        );
        Ok(())
    }
}

fn execute_paths(backend: &mut dyn Backend, command: &SessionPathCommands, json: bool) -> Result<()> {
    match command {
        SessionPathCommands::Add { id, path } => {
            let added = backend.add_session_path(id, path)?;
            if json {
                print_json(&serde_json::json!({ "id": id, "path": path, "added": added }))
            } else {
                if added {
                    println!("Added {path} to session {id}");
                } else {
                    println!("Session {id} already includes {path}");
                }
                Ok(())
            }
        }
        SessionPathCommands::Remove { id, path } => {
            let removal = backend.remove_session_path(id, path)?;
            if json {
                print_json(&serde_json::json!({ "id": id, "path": path, "result": removal }))
            } else {
                if removal.removed == 0 && !removal.primary_cleared {
                    println!("Session {id} was not linked to {path}");
                } else {
                    println!("Removed {path} from session {id}");
                }
                if removal.primary_cleared {
                    println!("  {}", "The session no longer has a primary project.".yellow());
                }
                Ok(())
            }
        }
        SessionPathCommands::SetPrimary { id, path } => {
            backend.set_session_primary(id, path)?;
            report(json, "updated", id, || {
                println!("Session {id} now has primary project {}", path.bold());
            })
        }
    }
}
