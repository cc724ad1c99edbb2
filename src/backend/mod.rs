//! Backends for project and session management.
//!
//! Commands that manage projects and sessions run against either the local
//! SQLite store or the SaveContext cloud API, through the same trait.
//! Issue, stats and status commands are always local.

mod local;
mod remote;

pub use local::LocalBackend;
pub use remote::RemoteBackend;

use crate::config::Config;
use crate::error::Result;
use crate::model::{
    DeleteProjectCounts, DeleteSessionCounts, MergeProjectCounts, Project, ProjectCounts,
    ProjectUpdate, ProjectWithCounts, Session, SessionFilter, SessionPathRemoval,
};
use crate::storage::SqliteStorage;
use tracing::debug;

/// Project and session operations shared by the local and cloud stores.
pub trait Backend {
    /// Short label for output, e.g. `local` or `cloud`.
    fn name(&self) -> &'static str;

    // Projects

    fn list_projects(&self, limit: u32) -> Result<Vec<ProjectWithCounts>>;

    /// Look up a project by ID, falling back to an exact path match.
    fn get_project(&self, id_or_path: &str) -> Result<Option<Project>>;

    fn project_counts(&self, project: &Project) -> Result<ProjectCounts>;

    fn rename_project(&mut self, id: &str, name: &str) -> Result<Project>;

    fn update_project(&mut self, id: &str, update: &ProjectUpdate) -> Result<Project>;

    fn delete_project(&mut self, id: &str) -> Result<DeleteProjectCounts>;

    fn merge_projects(&mut self, source_id: &str, target_id: &str) -> Result<MergeProjectCounts>;

    // Sessions

    fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<Session>>;

    fn get_session(&self, id: &str) -> Result<Option<Session>>;

    fn rename_session(&mut self, id: &str, name: &str) -> Result<()>;

    fn archive_session(&mut self, id: &str) -> Result<()>;

    fn delete_session(&mut self, id: &str) -> Result<DeleteSessionCounts>;

    /// Returns `false` when the path was already linked.
    fn add_session_path(&mut self, id: &str, path: &str) -> Result<bool>;

    fn remove_session_path(&mut self, id: &str, path: &str) -> Result<SessionPathRemoval>;

    fn set_session_primary(&mut self, id: &str, path: &str) -> Result<()>;
}

/// Pick the cloud backend when an API key is configured, unless
/// `force_local` is set.
///
/// # Errors
///
/// Returns `DatabaseNotFound` when falling back to a local database that
/// doesn't exist, or an error building the HTTP client.
pub fn select_backend(config: &Config, force_local: bool) -> Result<Box<dyn Backend>> {
    match (&config.api_key, force_local) {
        (Some(key), false) => {
            debug!(url = %config.api_url, "Using cloud backend");
            Ok(Box::new(RemoteBackend::new(&config.api_url, key)?))
        }
        _ => {
            debug!(db = %config.db_path.display(), "Using local backend");
            let storage = SqliteStorage::open(&config.db_path)?;
            Ok(Box::new(LocalBackend::new(storage, &config.actor)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use std::path::PathBuf;
    use tempfile::TempDir;

    fn config(db_path: PathBuf, api_key: Option<&str>) -> Config {
        Config {
            db_path,
            actor: "tester".to_string(),
            api_key: api_key.map(str::to_string),
            api_url: "https://api.example.test".to_string(),
        }
    }

    #[test]
    fn test_api_key_selects_cloud() {
        let dir = TempDir::new().unwrap();
        let backend = select_backend(&config(dir.path().join("none.db"), Some("sk_test")), false).unwrap();
        assert_eq!(backend.name(), "cloud");
    }

    #[test]
    fn test_force_local_overrides_key() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("store.db");
        SqliteStorage::create(&path).unwrap().close().unwrap();

        let backend = select_backend(&config(path, Some("sk_test")), true).unwrap();
        assert_eq!(backend.name(), "local");
    }

    #[test]
    fn test_local_requires_existing_database() {
        let dir = TempDir::new().unwrap();
        let result = select_backend(&config(dir.path().join("missing.db"), None), false);
        assert!(matches!(result, Err(Error::DatabaseNotFound { .. })));
    }
}
