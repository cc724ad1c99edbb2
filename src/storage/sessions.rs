//! Session storage: lifecycle, project paths and cascading delete.

use crate::error::{Error, Result};
use crate::model::{DeleteSessionCounts, Session, SessionFilter, SessionPathRemoval, SessionStatus};
use crate::storage::events::EventType;
use crate::storage::sqlite::{new_id, now_ms, SqliteStorage};
use rusqlite::{Connection, OptionalExtension, ToSql};
use tracing::{info, warn};

const SESSION_COLUMNS: &str = "s.id, s.name, s.description, s.branch, s.channel, s.project_path, \
     s.status, s.ended_at, s.created_at, s.updated_at";

const DEFAULT_SESSION_LIMIT: u32 = 50;

fn map_session_row(row: &rusqlite::Row) -> rusqlite::Result<Session> {
    Ok(Session {
        id: row.get(0)?,
        name: row.get(1)?,
        description: row.get(2)?,
        branch: row.get(3)?,
        channel: row.get(4)?,
        project_path: row.get(5)?,
        status: row
            .get::<_, Option<String>>(6)?
            .unwrap_or_else(|| "active".to_string()),
        ended_at: row.get(7)?,
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
        additional_project_paths: Vec::new(),
    })
}

/// Junction paths for a session, excluding `primary`.
fn additional_paths(conn: &Connection, session_id: &str, primary: Option<&str>) -> Result<Vec<String>> {
    let mut stmt = conn.prepare_cached(
        "SELECT project_path FROM session_projects WHERE session_id = ?1 ORDER BY added_at, project_path",
    )?;
    let paths = stmt
        .query_map([session_id], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(paths
        .into_iter()
        .filter(|p| Some(p.as_str()) != primary)
        .collect())
}

/// Load a session row by ID inside any connection or transaction.
fn fetch_session(conn: &Connection, id: &str) -> Result<Option<Session>> {
    Ok(conn
        .query_row(
            &format!("SELECT {SESSION_COLUMNS} FROM sessions s WHERE s.id = ?1"),
            [id],
            map_session_row,
        )
        .optional()?)
}

fn require_session(conn: &Connection, id: &str) -> Result<Session> {
    fetch_session(conn, id)?.ok_or_else(|| Error::SessionNotFound { id: id.to_string() })
}

fn link_session_path(conn: &Connection, session_id: &str, path: &str, now: i64) -> Result<bool> {
    let inserted = conn.execute(
        "INSERT OR IGNORE INTO session_projects (session_id, project_path, added_at) VALUES (?1, ?2, ?3)",
        rusqlite::params![session_id, path, now],
    )?;
    Ok(inserted > 0)
}

impl SqliteStorage {
    // ================
    // Session Queries
    // ================

    /// Get a session by ID, with its additional project paths.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_session(&self, id: &str) -> Result<Option<Session>> {
        let Some(mut session) = fetch_session(self.conn(), id)? else {
            return Ok(None);
        };
        if self.capabilities().session_projects {
            session.additional_project_paths =
                additional_paths(self.conn(), &session.id, session.project_path.as_deref())?;
        }
        Ok(Some(session))
    }

    /// List sessions, most recently updated first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_sessions(&self, filter: &SessionFilter) -> Result<Vec<Session>> {
        let caps = self.capabilities();
        let mut sql = format!("SELECT {SESSION_COLUMNS} FROM sessions s WHERE 1=1");
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(path) = &filter.project_path {
            if caps.session_projects {
                sql.push_str(
                    " AND (s.project_path = ? OR s.id IN (SELECT session_id FROM session_projects WHERE project_path = ?))",
                );
                params.push(Box::new(path.clone()));
                params.push(Box::new(path.clone()));
            } else {
                sql.push_str(" AND s.project_path = ?");
                params.push(Box::new(path.clone()));
            }
        }

        if let Some(status) = filter.status {
            sql.push_str(" AND s.status = ?");
            params.push(Box::new(status.as_str()));
        }

        if let Some(search) = &filter.search {
            sql.push_str(
                " AND (s.name LIKE ? COLLATE NOCASE OR COALESCE(s.description, '') LIKE ? COLLATE NOCASE)",
            );
            let pattern = format!("%{search}%");
            params.push(Box::new(pattern.clone()));
            params.push(Box::new(pattern));
        }

        sql.push_str(" ORDER BY s.updated_at DESC LIMIT ?");
        params.push(Box::new(filter.limit.unwrap_or(DEFAULT_SESSION_LIMIT)));

        let mut stmt = self.conn().prepare(&sql)?;
        let param_refs: Vec<&dyn ToSql> = params.iter().map(AsRef::as_ref).collect();
        let mut sessions = stmt
            .query_map(param_refs.as_slice(), map_session_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        if caps.session_projects {
            for session in &mut sessions {
                session.additional_project_paths =
                    additional_paths(self.conn(), &session.id, session.project_path.as_deref())?;
            }
        }

        Ok(sessions)
    }

    /// Every path a session touches: the primary first, then junction paths.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` if the session doesn't exist.
    pub fn get_session_paths(&self, id: &str) -> Result<Vec<String>> {
        let session = self
            .get_session(id)?
            .ok_or_else(|| Error::SessionNotFound { id: id.to_string() })?;

        let mut paths: Vec<String> = session.project_path.into_iter().collect();
        for path in session.additional_project_paths {
            if !paths.contains(&path) {
                paths.push(path);
            }
        }
        Ok(paths)
    }

    // ==================
    // Session Mutations
    // ==================

    /// Create an active session. Writes the junction row for `project_path`
    /// when the database has one.
    ///
    /// # Errors
    ///
    /// Returns an error if the insert fails.
    pub fn create_session(
        &mut self,
        name: &str,
        description: Option<&str>,
        project_path: Option<&str>,
        branch: Option<&str>,
        actor: &str,
    ) -> Result<Session> {
        let id = new_id("sess");
        let now = now_ms();

        self.mutate("create_session", actor, |tx, ctx| {
            tx.execute(
                "INSERT INTO sessions (id, name, description, branch, project_path, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, 'active', ?6, ?6)",
                rusqlite::params![id, name, description, branch, project_path, now],
            )?;

            if let (Some(path), true) = (project_path, ctx.caps.session_projects) {
                link_session_path(tx, &id, path, now)?;
            }

            ctx.record_event("session", &id, EventType::SessionCreated);
            Ok(())
        })?;

        info!(id = %id, name, "Created session");
        self.get_session(&id)?
            .ok_or(Error::SessionNotFound { id })
    }

    /// Update a session's name and/or description.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound`, or `InvalidArgument` for an empty name.
    pub fn update_session(
        &mut self,
        id: &str,
        name: Option<&str>,
        description: Option<&str>,
        actor: &str,
    ) -> Result<()> {
        if name.is_some_and(|n| n.trim().is_empty()) {
            return Err(Error::InvalidArgument("Session name cannot be empty".to_string()));
        }
        let now = now_ms();

        self.mutate("update_session", actor, |tx, ctx| {
            let before = require_session(tx, id)?;

            tx.execute(
                "UPDATE sessions
                 SET name = COALESCE(?1, name), description = COALESCE(?2, description), updated_at = ?3
                 WHERE id = ?4",
                rusqlite::params![name.map(str::trim), description, now, id],
            )?;

            ctx.record_change(
                "session",
                id,
                EventType::SessionUpdated,
                Some(before.name),
                name.map(|n| n.trim().to_string()),
            );
            Ok(())
        })
    }

    /// Rename a session.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound`, or `InvalidArgument` for an empty name.
    pub fn rename_session(&mut self, id: &str, name: &str, actor: &str) -> Result<()> {
        self.update_session(id, Some(name), None, actor)
    }

    /// Move a session to a new status. Leaving `active` stamps `ended_at`;
    /// returning to `active` clears it.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` if the session doesn't exist.
    pub fn update_session_status(&mut self, id: &str, status: SessionStatus, actor: &str) -> Result<()> {
        let now = now_ms();
        let ended_at = (status != SessionStatus::Active).then_some(now);

        self.mutate("update_session_status", actor, |tx, ctx| {
            let before = require_session(tx, id)?;

            tx.execute(
                "UPDATE sessions SET status = ?1, ended_at = ?2, updated_at = ?3 WHERE id = ?4",
                rusqlite::params![status.as_str(), ended_at, now, id],
            )?;

            let event_type = match status {
                SessionStatus::Active => EventType::SessionReactivated,
                SessionStatus::Paused => EventType::SessionPaused,
                SessionStatus::Completed => EventType::SessionCompleted,
            };
            ctx.record_change(
                "session",
                id,
                event_type,
                Some(before.status),
                Some(status.as_str().to_string()),
            );
            Ok(())
        })
    }

    /// Mark a session completed.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` if the session doesn't exist.
    pub fn archive_session(&mut self, id: &str, actor: &str) -> Result<()> {
        self.update_session_status(id, SessionStatus::Completed, actor)
    }

    /// Link an additional project path. Returns whether a row was added.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound`, or `SchemaUnsupported` without a
    /// `session_projects` table.
    pub fn add_session_project(&mut self, id: &str, path: &str, actor: &str) -> Result<bool> {
        if !self.capabilities().session_projects {
            return Err(Error::SchemaUnsupported {
                feature: "multi-project sessions",
            });
        }
        let now = now_ms();

        self.mutate("add_session_project", actor, |tx, ctx| {
            require_session(tx, id)?;

            let added = link_session_path(tx, id, path, now)?;
            if added {
                tx.execute(
                    "UPDATE sessions SET updated_at = ?1 WHERE id = ?2",
                    rusqlite::params![now, id],
                )?;
                ctx.record_change(
                    "session",
                    id,
                    EventType::SessionPathAdded,
                    None,
                    Some(path.to_string()),
                );
            }
            Ok(added)
        })
    }

    /// Unlink a project path. Removing the current primary also clears the
    /// session's primary path, which the result reports.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` if the session doesn't exist.
    pub fn remove_session_project(&mut self, id: &str, path: &str, actor: &str) -> Result<SessionPathRemoval> {
        let now = now_ms();

        let outcome = self.mutate("remove_session_project", actor, |tx, ctx| {
            let session = require_session(tx, id)?;

            let removed = if ctx.caps.session_projects {
                tx.execute(
                    "DELETE FROM session_projects WHERE session_id = ?1 AND project_path = ?2",
                    [id, path],
                )?
            } else {
                0
            };

            let primary_cleared = session.project_path.as_deref() == Some(path);
            if primary_cleared {
                tx.execute(
                    "UPDATE sessions SET project_path = NULL WHERE id = ?1",
                    [id],
                )?;
            }

            if removed > 0 || primary_cleared {
                tx.execute(
                    "UPDATE sessions SET updated_at = ?1 WHERE id = ?2",
                    rusqlite::params![now, id],
                )?;
                ctx.record_change(
                    "session",
                    id,
                    EventType::SessionPathRemoved,
                    Some(path.to_string()),
                    None,
                );
            }

            Ok(SessionPathRemoval {
                removed,
                primary_cleared,
            })
        })?;

        if outcome.primary_cleared {
            warn!(session = id, path, "Removed primary path; session now has no primary project");
        }
        Ok(outcome)
    }

    /// Make `path` the session's primary path, linking it if needed.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` if the session doesn't exist.
    pub fn set_session_primary_project(&mut self, id: &str, path: &str, actor: &str) -> Result<()> {
        let now = now_ms();

        self.mutate("set_session_primary_project", actor, |tx, ctx| {
            let session = require_session(tx, id)?;

            if ctx.caps.session_projects {
                link_session_path(tx, id, path, now)?;
            }
            tx.execute(
                "UPDATE sessions SET project_path = ?1, updated_at = ?2 WHERE id = ?3",
                rusqlite::params![path, now, id],
            )?;

            ctx.record_change(
                "session",
                id,
                EventType::SessionPrimaryChanged,
                session.project_path,
                Some(path.to_string()),
            );
            Ok(())
        })
    }

    /// Delete a session and everything scoped to it.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound` if the session doesn't exist.
    pub fn delete_session(&mut self, id: &str, actor: &str) -> Result<DeleteSessionCounts> {
        let counts = self.mutate("delete_session", actor, |tx, ctx| {
            require_session(tx, id)?;
            let mut counts = DeleteSessionCounts::default();

            if ctx.caps.checkpoint_items {
                counts.checkpoint_items = tx.execute(
                    "DELETE FROM checkpoint_items
                     WHERE checkpoint_id IN (SELECT id FROM checkpoints WHERE session_id = ?1)",
                    [id],
                )?;
            }
            counts.checkpoints = tx.execute("DELETE FROM checkpoints WHERE session_id = ?1", [id])?;
            counts.context_items =
                tx.execute("DELETE FROM context_items WHERE session_id = ?1", [id])?;

            if ctx.caps.session_projects {
                counts.session_projects =
                    tx.execute("DELETE FROM session_projects WHERE session_id = ?1", [id])?;
            }
            if ctx.caps.agent_sessions {
                counts.agent_sessions =
                    tx.execute("DELETE FROM agent_sessions WHERE session_id = ?1", [id])?;
            }

            counts.sessions = tx.execute("DELETE FROM sessions WHERE id = ?1", [id])?;

            ctx.record_event("session", id, EventType::SessionDeleted);
            Ok(counts)
        })?;

        info!(id, total = counts.total(), "Deleted session");
        Ok(counts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::sqlite::test_support::{legacy_storage, temp_storage};

    const ACTOR: &str = "tester";

    #[test]
    fn test_create_and_get_session() {
        let (_dir, mut storage) = temp_storage();
        let session = storage
            .create_session("Work", Some("desc"), Some("/p"), Some("main"), ACTOR)
            .unwrap();

        assert!(session.id.starts_with("sess_"));
        assert_eq!(session.status, "active");
        assert_eq!(session.project_path.as_deref(), Some("/p"));
        // The primary path is in the junction but not reported as additional
        assert!(session.additional_project_paths.is_empty());
        assert_eq!(storage.get_session_paths(&session.id).unwrap(), vec!["/p".to_string()]);
    }

    #[test]
    fn test_list_sessions_filters() {
        let (_dir, mut storage) = temp_storage();
        let a = storage.create_session("Alpha work", None, Some("/a"), None, ACTOR).unwrap();
        let b = storage.create_session("beta", Some("ALPHA notes"), Some("/b"), None, ACTOR).unwrap();
        storage.create_session("gamma", None, Some("/c"), None, ACTOR).unwrap();
        storage.add_session_project(&b.id, "/a", ACTOR).unwrap();

        let in_a = storage
            .list_sessions(&SessionFilter {
                project_path: Some("/a".into()),
                ..SessionFilter::default()
            })
            .unwrap();
        assert_eq!(in_a.len(), 2);

        let search = storage
            .list_sessions(&SessionFilter {
                search: Some("alpha".into()),
                ..SessionFilter::default()
            })
            .unwrap();
        assert_eq!(search.len(), 2);

        storage.archive_session(&a.id, ACTOR).unwrap();
        let completed = storage
            .list_sessions(&SessionFilter {
                status: Some(SessionStatus::Completed),
                ..SessionFilter::default()
            })
            .unwrap();
        assert_eq!(completed.len(), 1);
        assert_eq!(completed[0].id, a.id);

        let limited = storage
            .list_sessions(&SessionFilter {
                limit: Some(1),
                ..SessionFilter::default()
            })
            .unwrap();
        assert_eq!(limited.len(), 1);
    }

    #[test]
    fn test_status_transitions_manage_ended_at() {
        let (_dir, mut storage) = temp_storage();
        let s = storage.create_session("s", None, None, None, ACTOR).unwrap();

        storage.update_session_status(&s.id, SessionStatus::Paused, ACTOR).unwrap();
        let paused = storage.get_session(&s.id).unwrap().unwrap();
        assert_eq!(paused.status, "paused");
        assert!(paused.ended_at.is_some());

        storage.update_session_status(&s.id, SessionStatus::Active, ACTOR).unwrap();
        let resumed = storage.get_session(&s.id).unwrap().unwrap();
        assert!(resumed.ended_at.is_none());

        let events = storage.get_events("session", &s.id, None).unwrap();
        assert!(events.iter().any(|e| e.event_type == EventType::SessionReactivated));
    }

    #[test]
    fn test_rename_session() {
        let (_dir, mut storage) = temp_storage();
        let s = storage.create_session("old", Some("keep"), None, None, ACTOR).unwrap();

        storage.rename_session(&s.id, "  new  ", ACTOR).unwrap();
        let renamed = storage.get_session(&s.id).unwrap().unwrap();
        assert_eq!(renamed.name, "new");
        assert_eq!(renamed.description.as_deref(), Some("keep"));

        assert!(storage.rename_session(&s.id, " ", ACTOR).is_err());
        assert!(matches!(
            storage.rename_session("sess_missing", "x", ACTOR),
            Err(Error::SessionNotFound { .. })
        ));
    }

    #[test]
    fn test_add_session_project_is_idempotent() {
        let (_dir, mut storage) = temp_storage();
        let s = storage.create_session("s", None, Some("/p"), None, ACTOR).unwrap();

        assert!(storage.add_session_project(&s.id, "/q", ACTOR).unwrap());
        assert!(!storage.add_session_project(&s.id, "/q", ACTOR).unwrap());
        assert_eq!(
            storage.get_session_paths(&s.id).unwrap(),
            vec!["/p".to_string(), "/q".to_string()]
        );
    }

    #[test]
    fn test_removing_primary_path_clears_it() {
        let (_dir, mut storage) = temp_storage();
        let s = storage.create_session("s", None, Some("/p"), None, ACTOR).unwrap();
        storage.add_session_project(&s.id, "/q", ACTOR).unwrap();

        let outcome = storage.remove_session_project(&s.id, "/p", ACTOR).unwrap();
        assert_eq!(outcome.removed, 1);
        assert!(outcome.primary_cleared);

        let after = storage.get_session(&s.id).unwrap().unwrap();
        assert!(after.project_path.is_none());
        assert_eq!(after.additional_project_paths, vec!["/q".to_string()]);

        let noop = storage.remove_session_project(&s.id, "/nowhere", ACTOR).unwrap();
        assert_eq!(noop, SessionPathRemoval::default());
    }

    #[test]
    fn test_removing_other_path_keeps_primary() {
        let (_dir, mut storage) = temp_storage();
        let s = storage.create_session("s", None, Some("/p"), None, ACTOR).unwrap();
        storage.add_session_project(&s.id, "/q", ACTOR).unwrap();

        let outcome = storage.remove_session_project(&s.id, "/q", ACTOR).unwrap();
        assert_eq!(outcome.removed, 1);
        assert!(!outcome.primary_cleared);

        let after = storage.get_session(&s.id).unwrap().unwrap();
        assert_eq!(after.project_path.as_deref(), Some("/p"));
        assert!(after.additional_project_paths.is_empty());
        assert_eq!(storage.get_session_paths(&s.id).unwrap(), vec!["/p".to_string()]);
    }

    #[test]
    fn test_set_primary_links_path() {
        let (_dir, mut storage) = temp_storage();
        let s = storage.create_session("s", None, Some("/p"), None, ACTOR).unwrap();

        storage.set_session_primary_project(&s.id, "/new", ACTOR).unwrap();
        let after = storage.get_session(&s.id).unwrap().unwrap();
        assert_eq!(after.project_path.as_deref(), Some("/new"));
        assert_eq!(after.additional_project_paths, vec!["/p".to_string()]);

        let events = storage.get_events("session", &s.id, None).unwrap();
        let change = events
            .iter()
            .find(|e| e.event_type == EventType::SessionPrimaryChanged)
            .unwrap();
        assert_eq!(change.old_value.as_deref(), Some("/p"));
        assert_eq!(change.new_value.as_deref(), Some("/new"));
    }

    #[test]
    fn test_delete_session_cascades() {
        let (_dir, mut storage) = temp_storage();
        let s = storage.create_session("s", None, Some("/p"), None, ACTOR).unwrap();
        let keep = storage.create_session("keep", None, Some("/p"), None, ACTOR).unwrap();
        storage
            .save_context_item(&s.id, "k1", &crate::model::ContextItemInput::value("v1"), ACTOR)
            .unwrap();
        storage
            .save_context_item(&s.id, "k2", &crate::model::ContextItemInput::value("v2"), ACTOR)
            .unwrap();
        storage
            .create_checkpoint(&s.id, &crate::model::NewCheckpoint::named("cp"), ACTOR)
            .unwrap();

        let counts = storage.delete_session(&s.id, ACTOR).unwrap();
        assert_eq!(counts.sessions, 1);
        assert_eq!(counts.context_items, 2);
        assert_eq!(counts.checkpoints, 1);
        assert_eq!(counts.checkpoint_items, 2);
        assert_eq!(counts.session_projects, 1);

        assert!(storage.get_session(&s.id).unwrap().is_none());
        assert!(storage.get_session(&keep.id).unwrap().is_some());
        assert!(matches!(
            storage.delete_session(&s.id, ACTOR),
            Err(Error::SessionNotFound { .. })
        ));
    }

    #[test]
    fn test_legacy_sessions_without_junction() {
        let (_dir, mut storage) = legacy_storage();
        let s = storage.create_session("legacy", None, Some("/p"), None, ACTOR).unwrap();

        assert!(matches!(
            storage.add_session_project(&s.id, "/q", ACTOR),
            Err(Error::SchemaUnsupported { .. })
        ));

        let outcome = storage.remove_session_project(&s.id, "/p", ACTOR).unwrap();
        assert_eq!(outcome.removed, 0);
        assert!(outcome.primary_cleared);

        let counts = storage.delete_session(&s.id, ACTOR).unwrap();
        assert_eq!(counts.sessions, 1);
    }
}
