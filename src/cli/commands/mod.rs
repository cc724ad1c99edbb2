//! Command implementations.

pub mod completions;
pub mod init;
pub mod issues;
pub mod projects;
pub mod sessions;
pub mod stats;
pub mod status;

use crate::cli::Cli;
use crate::config::Config;
use crate::error::Result;
use crate::storage::SqliteStorage;

/// Resolve configuration from the global flags.
fn config(cli: &Cli) -> Result<Config> {
    Config::resolve(cli.db.as_deref(), cli.actor.as_deref())
}

/// Open the local database named by the global flags.
fn open_local(cli: &Cli) -> Result<(SqliteStorage, Config)> {
    let config = config(cli)?;
    let storage = SqliteStorage::open(&config.db_path)?;
    Ok((storage, config))
}
