//! Schema capability probing.
//!
//! Databases in the wild come from several generations of SaveContext:
//! the first shipped a `tasks` table, later ones an `issues` table with
//! optional dependency, label, and junction tables. Instead of requiring a
//! migration, the store probes once per connection and passes the result
//! to every query builder.

use rusqlite::{Connection, OptionalExtension, Result};
use serde::Serialize;

/// Which generation of issue storage the database carries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum IssueSchema {
    /// `tasks` table, 5-state status, no relations.
    LegacyTasks,
    /// `issues` table plus whichever optional relation tables exist.
    Issues {
        has_dependencies: bool,
        has_project_junction: bool,
        has_labels: bool,
    },
}

impl IssueSchema {
    #[must_use]
    pub const fn is_legacy(&self) -> bool {
        matches!(self, Self::LegacyTasks)
    }

    #[must_use]
    pub const fn has_dependencies(&self) -> bool {
        matches!(self, Self::Issues { has_dependencies: true, .. })
    }

    #[must_use]
    pub const fn has_project_junction(&self) -> bool {
        matches!(self, Self::Issues { has_project_junction: true, .. })
    }

    #[must_use]
    pub const fn has_labels(&self) -> bool {
        matches!(self, Self::Issues { has_labels: true, .. })
    }

    /// Name of the table holding issue rows.
    #[must_use]
    pub const fn table(&self) -> &'static str {
        match self {
            Self::LegacyTasks => "tasks",
            Self::Issues { .. } => "issues",
        }
    }
}

/// Optional tables detected on a connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SchemaCapabilities {
    pub issues: IssueSchema,
    /// False when neither `issues` nor `tasks` exists.
    pub issue_table: bool,
    pub projects: bool,
    pub session_projects: bool,
    pub agent_sessions: bool,
    pub checkpoint_items: bool,
    pub plans: bool,
    pub project_memory: bool,
    pub events: bool,
}

impl SchemaCapabilities {
    /// Probe `sqlite_master` for every optional table.
    ///
    /// When neither `issues` nor `tasks` exists the probe still reports the
    /// current shape, so issue queries fail with the raw "no such table"
    /// error rather than silently returning nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if `sqlite_master` cannot be read.
    pub fn probe(conn: &Connection) -> Result<Self> {
        let mut issue_table = true;
        let issues = if table_exists(conn, "issues")? {
            IssueSchema::Issues {
                has_dependencies: table_exists(conn, "issue_dependencies")?,
                has_project_junction: table_exists(conn, "issue_projects")?,
                has_labels: table_exists(conn, "issue_labels")?,
            }
        } else if table_exists(conn, "tasks")? {
            IssueSchema::LegacyTasks
        } else {
            issue_table = false;
            IssueSchema::Issues {
                has_dependencies: false,
                has_project_junction: false,
                has_labels: false,
            }
        };

        Ok(Self {
            issues,
            issue_table,
            projects: table_exists(conn, "projects")?,
            session_projects: table_exists(conn, "session_projects")?,
            agent_sessions: table_exists(conn, "agent_sessions")?,
            checkpoint_items: table_exists(conn, "checkpoint_items")?,
            plans: table_exists(conn, "plans")?,
            project_memory: table_exists(conn, "project_memory")?,
            events: table_exists(conn, "events")?,
        })
    }
}

/// Check whether a table exists.
///
/// # Errors
///
/// Returns an error if `sqlite_master` cannot be read.
pub fn table_exists(conn: &Connection, name: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "SELECT 1 FROM sqlite_master WHERE type = 'table' AND name = ?1",
            [name],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::{apply_legacy_schema, apply_schema};

    #[test]
    fn test_probe_current_schema() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();

        let caps = SchemaCapabilities::probe(&conn).unwrap();
        assert_eq!(
            caps.issues,
            IssueSchema::Issues {
                has_dependencies: true,
                has_project_junction: true,
                has_labels: true,
            }
        );
        assert!(caps.issue_table);
        assert!(caps.session_projects);
        assert!(caps.plans);
        assert!(caps.events);
    }

    #[test]
    fn test_probe_legacy_schema() {
        let conn = Connection::open_in_memory().unwrap();
        apply_legacy_schema(&conn).unwrap();

        let caps = SchemaCapabilities::probe(&conn).unwrap();
        assert_eq!(caps.issues, IssueSchema::LegacyTasks);
        assert_eq!(caps.issues.table(), "tasks");
        assert!(!caps.issues.has_labels());
        assert!(!caps.session_projects);
        assert!(!caps.projects);
        assert!(caps.project_memory);
    }

    #[test]
    fn test_probe_partial_issue_schema() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();
        conn.execute_batch("DROP TABLE issue_labels; DROP TABLE issue_projects;")
            .unwrap();

        let caps = SchemaCapabilities::probe(&conn).unwrap();
        assert!(caps.issues.has_dependencies());
        assert!(!caps.issues.has_labels());
        assert!(!caps.issues.has_project_junction());
    }

    #[test]
    fn test_probe_empty_database_defaults_to_issues() {
        let conn = Connection::open_in_memory().unwrap();
        let caps = SchemaCapabilities::probe(&conn).unwrap();
        assert_eq!(caps.issues.table(), "issues");
        assert!(!caps.issue_table);
        assert!(!caps.issues.has_dependencies());
    }

    #[test]
    fn test_table_exists() {
        let conn = Connection::open_in_memory().unwrap();
        assert!(!table_exists(&conn, "sessions").unwrap());
        conn.execute("CREATE TABLE sessions (id TEXT)", []).unwrap();
        assert!(table_exists(&conn, "sessions").unwrap());
    }
}
