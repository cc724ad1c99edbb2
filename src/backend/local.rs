//! Local SQLite backend.

use super::Backend;
use crate::error::Result;
use crate::model::{
    DeleteProjectCounts, DeleteSessionCounts, MergeProjectCounts, Project, ProjectCounts,
    ProjectUpdate, ProjectWithCounts, Session, SessionFilter, SessionPathRemoval,
};
use crate::storage::SqliteStorage;

/// [`Backend`] over a [`SqliteStorage`], stamping every mutation with one actor.
pub struct LocalBackend {
    storage: SqliteStorage,
    actor: String,
}

impl LocalBackend {
    #[must_use]
    pub fn new(storage: SqliteStorage, actor: &str) -> Self {
        Self {
            storage,
            actor: actor.to_string(),
        }
    }

    #[must_use]
    pub fn storage(&self) -> &SqliteStorage {
        &self.storage
    }
}

impl Backend for LocalBackend {
    fn name(&self) -> &'static str {
        "local"
    }

    fn list_projects(&self, limit: u32) -> Result<Vec<ProjectWithCounts>> {
        self.storage.list_projects_with_counts(limit)
    }

    fn get_project(&self, id_or_path: &str) -> Result<Option<Project>> {
        match self.storage.get_project(id_or_path)? {
            Some(project) => Ok(Some(project)),
            None => self.storage.get_project_by_path(id_or_path),
        }
    }

    fn project_counts(&self, project: &Project) -> Result<ProjectCounts> {
        self.storage.get_project_counts(&project.project_path)
    }

    fn rename_project(&mut self, id: &str, name: &str) -> Result<Project> {
        self.storage.rename_project(id, name, &self.actor)
    }

    fn update_project(&mut self, id: &str, update: &ProjectUpdate) -> Result<Project> {
        self.storage.update_project(id, update, &self.actor)
    }

    fn delete_project(&mut self, id: &str) -> Result<DeleteProjectCounts> {
        self.storage.delete_project(id, &self.actor)
    }

    fn merge_projects(&mut self, source_id: &str, target_id: &str) -> Result<MergeProjectCounts> {
        self.storage.merge_projects(source_id, target_id, &self.actor)
    }

    fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<Session>> {
        self.storage.list_sessions(filter)
    }

    fn get_session(&self, id: &str) -> Result<Option<Session>> {
        self.storage.get_session(id)
    }

    fn rename_session(&mut self, id: &str, name: &str) -> Result<()> {
        self.storage.rename_session(id, name, &self.actor)
    }

    fn archive_session(&mut self, id: &str) -> Result<()> {
        self.storage.archive_session(id, &self.actor)
    }

    fn delete_session(&mut self, id: &str) -> Result<DeleteSessionCounts> {
        self.storage.delete_session(id, &self.actor)
    }

    fn add_session_path(&mut self, id: &str, path: &str) -> Result<bool> {
        self.storage.add_session_project(id, path, &self.actor)
    }

    fn remove_session_path(&mut self, id: &str, path: &str) -> Result<SessionPathRemoval> {
        self.storage.remove_session_project(id, path, &self.actor)
    }

    fn set_session_primary(&mut self, id: &str, path: &str) -> Result<()> {
        self.storage.set_session_primary_project(id, path, &self.actor)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::sqlite::test_support::temp_storage;

    #[test]
    fn test_project_lookup_by_id_or_path() {
        let (_dir, mut storage) = temp_storage();
        let project = Project::new("/work/app", "App");
        storage.create_project(&project, "tester").unwrap();

        let backend = LocalBackend::new(storage, "tester");
        assert_eq!(backend.get_project(&project.id).unwrap().unwrap().name, "App");
        assert_eq!(backend.get_project("/work/app").unwrap().unwrap().id, project.id);
        assert!(backend.get_project("/elsewhere").unwrap().is_none());
    }

    #[test]
    fn test_session_operations_round_through_storage() {
        let (_dir, mut storage) = temp_storage();
        let session = storage
            .create_session("Work", None, Some("/a"), None, "tester")
            .unwrap();

        let mut backend = LocalBackend::new(storage, "tester");
        assert!(backend.add_session_path(&session.id, "/b").unwrap());
        assert!(!backend.add_session_path(&session.id, "/b").unwrap());
        backend.rename_session(&session.id, "Renamed").unwrap();
        backend.archive_session(&session.id).unwrap();

        let reloaded = backend.get_session(&session.id).unwrap().unwrap();
        assert_eq!(reloaded.name, "Renamed");
        assert_eq!(reloaded.status, "completed");
        assert_eq!(reloaded.additional_project_paths, vec!["/b".to_string()]);
    }
}
