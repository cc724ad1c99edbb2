//! Create the SaveContext database.

use crate::cli::{print_json, Cli};
use crate::error::{Error, Result};
use crate::storage::SqliteStorage;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::info;

#[derive(Serialize)]
struct InitOutput {
    database: PathBuf,
    reinitialized: bool,
}

/// Execute the init command.
///
/// # Errors
///
/// Returns `AlreadyInitialized` if the database exists and `--force` was not
/// given, or an error if the database cannot be created.
pub fn execute(cli: &Cli, json: bool) -> Result<()> {
    let config = super::config(cli)?;
    let output = init_database(&config.db_path, cli.force)?;

    if json {
        print_json(&output)
    } else {
        if output.reinitialized {
            println!("Reinitialized SaveContext database");
        } else {
            println!("Initialized SaveContext database");
        }
        println!("  Database: {}", output.database.display());
        Ok(())
    }
}

fn init_database(db_path: &Path, force: bool) -> Result<InitOutput> {
    let exists = db_path.exists();
    if exists && !force {
        return Err(Error::AlreadyInitialized {
            path: db_path.to_path_buf(),
        });
    }

    if exists {
        for suffix in ["", "-wal", "-shm"] {
            let mut path = db_path.as_os_str().to_os_string();
            path.push(suffix);
            let path = PathBuf::from(path);
            if path.exists() {
                fs::remove_file(&path)?;
            }
        }
        info!(path = %db_path.display(), "Removed existing database");
    }

    SqliteStorage::create(db_path)?.close()?;

    Ok(InitOutput {
        database: db_path.to_path_buf(),
        reinitialized: exists,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_init_creates_database_and_parents() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("data").join("savecontext.db");

        let output = init_database(&path, false).unwrap();
        assert!(!output.reinitialized);
        assert!(path.exists());

        let storage = SqliteStorage::open(&path).unwrap();
        assert!(storage.capabilities().projects);
    }

    #[test]
    fn test_init_refuses_existing_without_force() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("savecontext.db");
        init_database(&path, false).unwrap();

        assert!(matches!(
            init_database(&path, false),
            Err(Error::AlreadyInitialized { .. })
        ));
    }

    #[test]
    fn test_force_starts_fresh() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("savecontext.db");
        init_database(&path, false).unwrap();
        {
            let mut storage = SqliteStorage::open(&path).unwrap();
            storage.create_session("Old", None, Some("/p"), None, "tester").unwrap();
        }

        let output = init_database(&path, true).unwrap();
        assert!(output.reinitialized);

        let storage = SqliteStorage::open(&path).unwrap();
        assert!(storage.list_sessions(&Default::default()).unwrap().is_empty());
    }
}
