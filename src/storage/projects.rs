//! Project storage: registry, non-cascading delete and merge.
//!
//! Everything else references a project only by `project_path`, so a
//! delete unlinks rows instead of removing them, and a merge repoints
//! paths from the source to the target.

use crate::error::{Error, Result};
use crate::model::{
    DeleteProjectCounts, MergeProjectCounts, Project, ProjectCounts, ProjectUpdate,
    ProjectWithCounts,
};
use crate::storage::capabilities::SchemaCapabilities;
use crate::storage::events::EventType;
use crate::storage::sqlite::{count, now_ms, SqliteStorage};
use rusqlite::{Connection, OptionalExtension};
use tracing::info;

const PROJECT_COLUMNS: &str =
    "id, project_path, name, description, issue_prefix, next_issue_number, created_at, updated_at";

fn map_project_row(row: &rusqlite::Row) -> rusqlite::Result<Project> {
    Ok(Project {
        id: row.get(0)?,
        project_path: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        issue_prefix: row.get(4)?,
        next_issue_number: row.get::<_, Option<i32>>(5)?.unwrap_or(1),
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
    })
}

/// Look up a project by its exact path on any connection or transaction.
pub(crate) fn fetch_project_by_path(conn: &Connection, path: &str) -> Result<Option<Project>> {
    Ok(conn
        .query_row(
            &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE project_path = ?1"),
            [path],
            map_project_row,
        )
        .optional()?)
}

fn fetch_project(conn: &Connection, id: &str) -> Result<Option<Project>> {
    Ok(conn
        .query_row(
            &format!("SELECT {PROJECT_COLUMNS} FROM projects WHERE id = ?1"),
            [id],
            map_project_row,
        )
        .optional()?)
}

fn require_project(conn: &Connection, id: &str) -> Result<Project> {
    fetch_project(conn, id)?.ok_or_else(|| Error::ProjectNotFound { id: id.to_string() })
}

fn require_projects_table(caps: &SchemaCapabilities) -> Result<()> {
    if caps.projects {
        Ok(())
    } else {
        Err(Error::SchemaUnsupported { feature: "projects" })
    }
}

/// `WHERE` fragment matching sessions on a path by primary or junction.
fn session_path_clause(caps: &SchemaCapabilities) -> &'static str {
    if caps.session_projects {
        "(project_path = ?1 OR id IN (SELECT session_id FROM session_projects WHERE project_path = ?1))"
    } else {
        "project_path = ?1"
    }
}

fn issue_path_clause(caps: &SchemaCapabilities) -> &'static str {
    if caps.issues.has_project_junction() {
        "(project_path = ?1 OR id IN (SELECT issue_id FROM issue_projects WHERE project_path = ?1))"
    } else {
        "project_path = ?1"
    }
}

/// Issues on a path by primary or junction; zero when no issue table exists.
fn count_issues(conn: &Connection, caps: &SchemaCapabilities, path: &str) -> Result<usize> {
    if !caps.issue_table {
        return Ok(0);
    }
    count_where(conn, caps.issues.table(), issue_path_clause(caps), path)
}

fn count_where(conn: &Connection, table: &str, clause: &str, path: &str) -> Result<usize> {
    let n: i64 = conn.query_row(
        &format!("SELECT COUNT(*) FROM {table} WHERE {clause}"),
        [path],
        |row| row.get(0),
    )?;
    Ok(count(n))
}

impl SqliteStorage {
    // ================
    // Project Queries
    // ================

    /// Get a project by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_project(&self, id: &str) -> Result<Option<Project>> {
        if !self.capabilities().projects {
            return Ok(None);
        }
        fetch_project(self.conn(), id)
    }

    /// Get a project by its exact path.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_project_by_path(&self, path: &str) -> Result<Option<Project>> {
        if !self.capabilities().projects {
            return Ok(None);
        }
        fetch_project_by_path(self.conn(), path)
    }

    /// List projects, most recently updated first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_projects(&self, limit: u32) -> Result<Vec<Project>> {
        if !self.capabilities().projects {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {PROJECT_COLUMNS} FROM projects ORDER BY updated_at DESC LIMIT ?1"
        ))?;
        let projects = stmt
            .query_map([limit], map_project_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(projects)
    }

    /// List projects with their session and issue counts.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub fn list_projects_with_counts(&self, limit: u32) -> Result<Vec<ProjectWithCounts>> {
        let caps = self.capabilities();
        self.list_projects(limit)?
            .into_iter()
            .map(|project| -> Result<ProjectWithCounts> {
                let path = project.project_path.clone();
                Ok(ProjectWithCounts {
                    session_count: count_where(self.conn(), "sessions", session_path_clause(&caps), &path)?,
                    issue_count: count_issues(self.conn(), &caps, &path)?,
                    project,
                })
            })
            .collect()
    }

    /// Counts of records attached to a project path.
    ///
    /// Context items and checkpoints are counted through the sessions on
    /// that path.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub fn get_project_counts(&self, path: &str) -> Result<ProjectCounts> {
        let caps = self.capabilities();
        let session_clause = session_path_clause(&caps);
        let in_sessions = format!("session_id IN (SELECT id FROM sessions WHERE {session_clause})");

        Ok(ProjectCounts {
            sessions: count_where(self.conn(), "sessions", session_clause, path)?,
            issues: count_issues(self.conn(), &caps, path)?,
            context_items: count_where(self.conn(), "context_items", &in_sessions, path)?,
            checkpoints: count_where(self.conn(), "checkpoints", &in_sessions, path)?,
            memories: if caps.project_memory {
                count_where(self.conn(), "project_memory", "project_path = ?1", path)?
            } else {
                0
            },
        })
    }

    // ==================
    // Project Mutations
    // ==================

    /// Register a project.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` if the path is already registered.
    pub fn create_project(&mut self, project: &Project, actor: &str) -> Result<()> {
        require_projects_table(&self.capabilities())?;

        self.mutate("create_project", actor, |tx, ctx| {
            if fetch_project_by_path(tx, &project.project_path)?.is_some() {
                return Err(Error::InvalidArgument(format!(
                    "A project is already registered at {}",
                    project.project_path
                )));
            }

            tx.execute(
                "INSERT INTO projects (id, project_path, name, description, issue_prefix, next_issue_number, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    project.id,
                    project.project_path,
                    project.name,
                    project.description,
                    project.issue_prefix,
                    project.next_issue_number,
                    project.created_at,
                    project.updated_at,
                ],
            )?;

            ctx.record_event("project", &project.id, EventType::ProjectCreated);
            Ok(())
        })
    }

    /// Apply a partial update. Returns the updated project.
    ///
    /// # Errors
    ///
    /// Returns `ProjectNotFound`, or `InvalidArgument` for an empty update
    /// or an empty name.
    pub fn update_project(&mut self, id: &str, update: &ProjectUpdate, actor: &str) -> Result<Project> {
        require_projects_table(&self.capabilities())?;
        if update.is_empty() {
            return Err(Error::InvalidArgument("Nothing to update".to_string()));
        }
        let name = update.name.as_deref().map(str::trim);
        if name.is_some_and(str::is_empty) {
            return Err(Error::InvalidArgument("Project name cannot be empty".to_string()));
        }
        let prefix = update.issue_prefix.as_deref().map(|p| p.trim().to_uppercase());
        let now = now_ms();

        self.mutate("update_project", actor, |tx, ctx| {
            let before = require_project(tx, id)?;

            tx.execute(
                "UPDATE projects SET
                   name = COALESCE(?1, name),
                   description = COALESCE(?2, description),
                   issue_prefix = COALESCE(?3, issue_prefix),
                   updated_at = ?4
                 WHERE id = ?5",
                rusqlite::params![name, update.description, prefix, now, id],
            )?;

            ctx.record_change(
                "project",
                id,
                EventType::ProjectUpdated,
                Some(before.name),
                name.map(ToString::to_string),
            );
            require_project(tx, id)
        })
    }

    /// Rename a project.
    ///
    /// # Errors
    ///
    /// Returns `ProjectNotFound`, or `InvalidArgument` for an empty name.
    pub fn rename_project(&mut self, id: &str, name: &str, actor: &str) -> Result<Project> {
        self.update_project(
            id,
            &ProjectUpdate {
                name: Some(name.to_string()),
                ..ProjectUpdate::default()
            },
            actor,
        )
    }

    /// Delete a project without deleting anything that references its path.
    ///
    /// Sessions on the path lose their primary path; junction rows are
    /// removed. Sessions, context items and checkpoints survive.
    ///
    /// # Errors
    ///
    /// Returns `ProjectNotFound` if the project doesn't exist.
    pub fn delete_project(&mut self, id: &str, actor: &str) -> Result<DeleteProjectCounts> {
        require_projects_table(&self.capabilities())?;

        let counts = self.mutate("delete_project", actor, |tx, ctx| {
            let project = require_project(tx, id)?;
            let path = project.project_path.as_str();
            let mut counts = DeleteProjectCounts::default();

            counts.sessions_unlinked = tx.execute(
                "UPDATE sessions SET project_path = NULL WHERE project_path = ?1",
                [path],
            )?;
            if ctx.caps.session_projects {
                counts.session_links_removed =
                    tx.execute("DELETE FROM session_projects WHERE project_path = ?1", [path])?;
            }
            if ctx.caps.issues.has_project_junction() {
                counts.issue_links_removed =
                    tx.execute("DELETE FROM issue_projects WHERE project_path = ?1", [path])?;
            }
            counts.projects = tx.execute("DELETE FROM projects WHERE id = ?1", [id])?;

            ctx.record_change(
                "project",
                id,
                EventType::ProjectDeleted,
                Some(project.project_path.clone()),
                None,
            );
            Ok(counts)
        })?;

        info!(id, ?counts, "Deleted project");
        Ok(counts)
    }

    /// Merge `source_id` into `target_id` and delete the source.
    ///
    /// Memory keys present on both sides keep the target's value.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` when both IDs are the same, or
    /// `ProjectNotFound` if either project doesn't exist.
    pub fn merge_projects(&mut self, source_id: &str, target_id: &str, actor: &str) -> Result<MergeProjectCounts> {
        require_projects_table(&self.capabilities())?;
        if source_id == target_id {
            return Err(Error::InvalidArgument(
                "Cannot merge a project into itself".to_string(),
            ));
        }
        let now = now_ms();

        let counts = self.mutate("merge_projects", actor, |tx, ctx| {
            let source = require_project(tx, source_id)?;
            let target = require_project(tx, target_id)?;
            let (src, dst) = (source.project_path.as_str(), target.project_path.as_str());
            let caps = ctx.caps;
            let mut counts = MergeProjectCounts::default();

            counts.sessions = tx.execute(
                "UPDATE sessions SET project_path = ?2 WHERE project_path = ?1",
                [src, dst],
            )?;
            counts.issues = tx.execute(
                &format!("UPDATE {} SET project_path = ?2 WHERE project_path = ?1", caps.issues.table()),
                [src, dst],
            )?;
            if caps.plans {
                counts.plans = tx.execute(
                    "UPDATE plans SET project_path = ?2 WHERE project_path = ?1",
                    [src, dst],
                )?;
            }

            if caps.project_memory {
                counts.memories_dropped = tx.execute(
                    "DELETE FROM project_memory
                     WHERE project_path = ?1
                       AND key IN (SELECT key FROM project_memory WHERE project_path = ?2)",
                    [src, dst],
                )?;
                counts.memories = tx.execute(
                    "UPDATE project_memory SET project_path = ?2 WHERE project_path = ?1",
                    [src, dst],
                )?;
            }

            if caps.session_projects {
                counts.session_links = tx.execute(
                    "UPDATE OR IGNORE session_projects SET project_path = ?2 WHERE project_path = ?1",
                    [src, dst],
                )?;
                tx.execute("DELETE FROM session_projects WHERE project_path = ?1", [src])?;
            }

            if caps.issues.has_project_junction() {
                counts.issue_links = tx.execute(
                    "UPDATE OR IGNORE issue_projects SET project_path = ?2 WHERE project_path = ?1",
                    [src, dst],
                )?;
                tx.execute("DELETE FROM issue_projects WHERE project_path = ?1", [src])?;
                // A link equal to the issue's new primary path is redundant
                tx.execute(
                    "DELETE FROM issue_projects
                     WHERE project_path = ?1
                       AND issue_id IN (SELECT id FROM issues WHERE project_path = ?1)",
                    [dst],
                )?;
            }

            tx.execute("DELETE FROM projects WHERE id = ?1", [source_id])?;
            tx.execute(
                "UPDATE projects SET updated_at = ?1 WHERE id = ?2",
                rusqlite::params![now, target_id],
            )?;

            ctx.record_change(
                "project",
                target_id,
                EventType::ProjectMerged,
                Some(source.project_path.clone()),
                Some(target.project_path.clone()),
            );
            Ok(counts)
        })?;

        info!(source = source_id, target = target_id, ?counts, "Merged projects");
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{
        ContextItemInput, IssueFilter, MemoryCategory, NewCheckpoint, NewIssue, SessionFilter,
    };
    use crate::storage::sqlite::test_support::{legacy_storage, temp_storage};

    const ACTOR: &str = "tester";

    fn project(storage: &mut SqliteStorage, path: &str, name: &str) -> Project {
        let project = Project::new(path, name);
        storage.create_project(&project, ACTOR).unwrap();
        project
    }

    #[test]
    fn test_create_and_lookup() {
        let (_dir, mut storage) = temp_storage();
        let p = project(&mut storage, "/work/app", "App");

        assert_eq!(storage.get_project(&p.id).unwrap().unwrap().name, "App");
        assert_eq!(storage.get_project_by_path("/work/app").unwrap().unwrap().id, p.id);
        assert!(storage.get_project_by_path("/work/app/").unwrap().is_none());

        let dup = Project::new("/work/app", "Again");
        assert!(matches!(
            storage.create_project(&dup, ACTOR),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_update_and_rename() {
        let (_dir, mut storage) = temp_storage();
        let p = project(&mut storage, "/p", "Old");

        let renamed = storage.rename_project(&p.id, "New", ACTOR).unwrap();
        assert_eq!(renamed.name, "New");

        let updated = storage
            .update_project(
                &p.id,
                &ProjectUpdate {
                    issue_prefix: Some("np".into()),
                    description: Some("desc".into()),
                    ..ProjectUpdate::default()
                },
                ACTOR,
            )
            .unwrap();
        assert_eq!(updated.name, "New");
        assert_eq!(updated.issue_prefix.as_deref(), Some("NP"));
        assert_eq!(updated.description.as_deref(), Some("desc"));

        assert!(storage.update_project(&p.id, &ProjectUpdate::default(), ACTOR).is_err());
        assert!(matches!(
            storage.rename_project("proj_missing", "x", ACTOR),
            Err(Error::ProjectNotFound { .. })
        ));
    }

    #[test]
    fn test_delete_project_is_non_cascading() {
        let (_dir, mut storage) = temp_storage();
        let p = project(&mut storage, "/tmp/proj", "P");
        let s = storage.create_session("S", None, Some("/tmp/proj"), None, ACTOR).unwrap();
        storage
            .save_context_item(&s.id, "k", &ContextItemInput::value("v"), ACTOR)
            .unwrap();
        let cp = storage
            .create_checkpoint(&s.id, &NewCheckpoint::named("before delete"), ACTOR)
            .unwrap();

        let counts = storage.delete_project(&p.id, ACTOR).unwrap();
        assert_eq!(counts.projects, 1);
        assert_eq!(counts.sessions_unlinked, 1);
        assert_eq!(counts.session_links_removed, 1);

        let session = storage.get_session(&s.id).unwrap().unwrap();
        assert!(session.project_path.is_none());
        assert_eq!(storage.get_context_items(&s.id, None, None, None).unwrap().len(), 1);
        assert!(storage.get_checkpoint(&cp.id).unwrap().is_some());
        assert_eq!(storage.get_checkpoint_items(&cp.id).unwrap().len(), 1);
        assert!(storage.get_project(&p.id).unwrap().is_none());
    }

    #[test]
    fn test_merge_repoints_everything() {
        let (_dir, mut storage) = temp_storage();
        let src = project(&mut storage, "/old", "Old");
        let dst = project(&mut storage, "/new", "New");

        let s = storage.create_session("s", None, Some("/old"), None, ACTOR).unwrap();
        let both = storage.create_session("both", None, Some("/new"), None, ACTOR).unwrap();
        storage.add_session_project(&both.id, "/old", ACTOR).unwrap();

        let issue = storage.create_issue(&NewIssue::new("/old", "move me"), ACTOR).unwrap();
        let linked = storage.create_issue(&NewIssue::new("/new", "linked"), ACTOR).unwrap();
        storage.add_issue_project(&linked.id, "/old", ACTOR).unwrap();

        storage.save_memory("/old", "build", "make", MemoryCategory::Command, ACTOR).unwrap();
        storage.save_memory("/old", "test", "old test", MemoryCategory::Command, ACTOR).unwrap();
        storage.save_memory("/new", "test", "new test", MemoryCategory::Command, ACTOR).unwrap();

        let counts = storage.merge_projects(&src.id, &dst.id, ACTOR).unwrap();
        assert_eq!(counts.sessions, 1);
        assert_eq!(counts.issues, 1);
        assert_eq!(counts.memories, 1);
        assert_eq!(counts.memories_dropped, 1);

        assert!(storage.get_project(&src.id).unwrap().is_none());
        assert_eq!(
            storage.get_session(&s.id).unwrap().unwrap().project_path.as_deref(),
            Some("/new")
        );
        // Junction row collapsed into the primary
        assert!(storage.get_session(&both.id).unwrap().unwrap().additional_project_paths.is_empty());
        assert_eq!(storage.get_issue_by_id(&issue.id).unwrap().unwrap().project_path, "/new");
        assert!(storage
            .get_issue_by_id(&linked.id)
            .unwrap()
            .unwrap()
            .additional_project_paths
            .is_empty());
        assert_eq!(storage.get_memory("/new", "test").unwrap().unwrap().value, "new test");
        assert!(storage.list_memory("/old", None).unwrap().is_empty());

        assert_eq!(storage.get_issues(&IssueFilter::for_project("/new")).unwrap().len(), 2);
        assert_eq!(
            storage
                .list_sessions(&SessionFilter {
                    project_path: Some("/new".into()),
                    ..SessionFilter::default()
                })
                .unwrap()
                .len(),
            2
        );
    }

    #[test]
    fn test_merge_into_self_rejected() {
        let (_dir, mut storage) = temp_storage();
        let p = project(&mut storage, "/p", "P");
        assert!(matches!(
            storage.merge_projects(&p.id, &p.id, ACTOR),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_counts() {
        let (_dir, mut storage) = temp_storage();
        project(&mut storage, "/p", "P");
        let s = storage.create_session("s", None, Some("/p"), None, ACTOR).unwrap();
        storage
            .save_context_item(&s.id, "a", &ContextItemInput::value("1"), ACTOR)
            .unwrap();
        storage.create_issue(&NewIssue::new("/p", "i"), ACTOR).unwrap();
        storage.save_memory("/p", "m", "v", MemoryCategory::Note, ACTOR).unwrap();

        let counts = storage.get_project_counts("/p").unwrap();
        assert_eq!(
            counts,
            ProjectCounts {
                sessions: 1,
                issues: 1,
                context_items: 1,
                memories: 1,
                checkpoints: 0,
            }
        );

        let listed = storage.list_projects_with_counts(10).unwrap();
        assert_eq!(listed[0].session_count, 1);
        assert_eq!(listed[0].issue_count, 1);
    }

    #[test]
    fn test_issue_count_errors_are_not_swallowed() {
        let (dir, mut storage) = temp_storage();
        project(&mut storage, "/p", "P");
        storage.create_issue(&NewIssue::new("/p", "i"), ACTOR).unwrap();

        let conn = Connection::open(dir.path().join("test.db")).unwrap();
        conn.execute_batch(
            "DROP TABLE issue_dependencies; DROP TABLE issue_labels;
             DROP TABLE issue_projects; DROP TABLE issues;",
        )
        .unwrap();

        // Capabilities still describe the old schema until refreshed
        assert!(matches!(storage.get_project_counts("/p"), Err(Error::Database(_))));
        assert!(matches!(storage.list_projects_with_counts(10), Err(Error::Database(_))));

        storage.refresh_capabilities().unwrap();
        assert_eq!(storage.get_project_counts("/p").unwrap().issues, 0);
        assert_eq!(storage.list_projects_with_counts(10).unwrap()[0].issue_count, 0);
    }

    #[test]
    fn test_legacy_has_no_projects() {
        let (_dir, mut storage) = legacy_storage();
        assert!(storage.list_projects(10).unwrap().is_empty());
        assert!(storage.get_project("proj_x").unwrap().is_none());
        assert!(matches!(
            storage.create_project(&Project::new("/p", "P"), ACTOR),
            Err(Error::SchemaUnsupported { .. })
        ));
    }
}
