//! Status cache commands.
//!
//! - `scstore status [show]` - Session bound to this terminal
//! - `scstore status set <session>` - Bind this terminal to a session
//! - `scstore status clear` - Remove the binding

use crate::cli::{format_timestamp, print_json, Cli, StatusCommands};
use crate::config::status_cache::status_key;
use crate::config::{StatusCache, StatusCacheEntry};
use crate::error::{Error, Result};
use colored::Colorize;

/// Execute a status command.
///
/// # Errors
///
/// Returns `Config` when no terminal key can be resolved, `SessionNotFound`
/// when binding an unknown session, or an I/O error from the cache.
pub fn execute(command: Option<&StatusCommands>, cli: &Cli, json: bool) -> Result<()> {
    let cache = StatusCache::default_location()
        .ok_or_else(|| Error::Config("Could not determine home directory".to_string()))?;
    let key = status_key().ok_or_else(|| {
        Error::Config("No terminal detected; set SAVECONTEXT_STATUS_KEY to name this terminal".to_string())
    })?;

    match command {
        None | Some(StatusCommands::Show) => show(&cache, &key, json),
        Some(StatusCommands::Set { session }) => set(&cache, &key, session, cli, json),
        Some(StatusCommands::Clear) => {
            let cleared = cache.clear(&key)?;
            if json {
                print_json(&serde_json::json!({ "key": key, "cleared": cleared }))
            } else {
                if cleared {
                    println!("Cleared status for {key}");
                } else {
                    println!("No status cached for {key}");
                }
                Ok(())
            }
        }
    }
}

fn show(cache: &StatusCache, key: &str, json: bool) -> Result<()> {
    let entry = cache.read(key);

    if json {
        return print_json(&serde_json::json!({ "key": key, "entry": entry }));
    }

    match entry {
        Some(entry) => {
            println!("Session: {} ({})", entry.session_name.bold(), entry.session_id);
            println!("  Project: {}", entry.project_path);
            if let Some(status) = &entry.session_status {
                println!("  Status:  {status}");
            }
            if let Some(count) = entry.item_count {
                println!("  Items:   {count}");
            }
            println!("  Cached:  {}", format_timestamp(entry.timestamp));
        }
        None => println!("No session bound to this terminal ({key})."),
    }
    Ok(())
}

fn set(cache: &StatusCache, key: &str, session_id: &str, cli: &Cli, json: bool) -> Result<()> {
    let (storage, _) = super::open_local(cli)?;
    let session = storage
        .get_session(session_id)?
        .ok_or_else(|| Error::SessionNotFound {
            id: session_id.to_string(),
        })?;

    let mut entry = StatusCacheEntry::new(
        &session.id,
        &session.name,
        session.project_path.as_deref().unwrap_or_default(),
    );
    entry.session_status = Some(session.status.clone());
    cache.write(key, &entry)?;

    if json {
        print_json(&serde_json::json!({ "key": key, "entry": entry }))
    } else {
        println!("Bound {key} to session {} ({})", session.name.bold(), session.id);
        Ok(())
    }
}
