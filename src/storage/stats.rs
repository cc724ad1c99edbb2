//! Aggregate counts for issues, sessions and the dashboard.
//!
//! Every call re-queries; nothing is cached.

use crate::error::Result;
use crate::storage::sqlite::{count, SqliteStorage};
use rusqlite::{Connection, ToSql};
use serde::Serialize;

/// Issue counts per status bucket. `total` is always the bucket sum.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IssueStats {
    pub backlog: usize,
    pub open: usize,
    pub in_progress: usize,
    pub blocked: usize,
    pub closed: usize,
    pub deferred: usize,
    pub total: usize,
}

/// [`IssueStats`] with the legacy task bucket names.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TaskStats {
    pub todo: usize,
    pub in_progress: usize,
    pub blocked: usize,
    pub done: usize,
    pub deferred: usize,
    pub backlog: usize,
    pub total: usize,
}

impl From<IssueStats> for TaskStats {
    fn from(s: IssueStats) -> Self {
        Self {
            todo: s.open,
            in_progress: s.in_progress,
            blocked: s.blocked,
            done: s.closed,
            deferred: s.deferred,
            backlog: s.backlog,
            total: s.total,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SessionStats {
    pub active: usize,
    pub paused: usize,
    pub completed: usize,
    pub total: usize,
}

/// Store-wide counts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct DashboardStats {
    pub projects: usize,
    pub sessions: SessionStats,
    pub context_items: usize,
    pub checkpoints: usize,
    pub memories: usize,
    pub plans: usize,
    pub issues: IssueStats,
}

fn count_table(conn: &Connection, table: &str) -> Result<usize> {
    let n: i64 = conn.query_row(&format!("SELECT COUNT(*) FROM {table}"), [], |row| row.get(0))?;
    Ok(count(n))
}

/// Project filter matching the primary path, or junction membership when
/// the junction table exists.
fn project_clause(has_junction: bool, junction: &str, id_col: &str) -> String {
    if has_junction {
        format!(
            " WHERE (project_path = ?1 OR id IN (SELECT {id_col} FROM {junction} WHERE project_path = ?1))"
        )
    } else {
        " WHERE project_path = ?1".to_string()
    }
}

impl SqliteStorage {
    /// Issue counts per status, optionally for one project.
    ///
    /// Legacy status names fold into their current buckets.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_issue_stats(&self, project_path: Option<&str>) -> Result<IssueStats> {
        let caps = self.capabilities();
        let table = caps.issues.table();

        let mut sql = format!(
            "SELECT
               COALESCE(SUM(CASE WHEN status = 'backlog' THEN 1 ELSE 0 END), 0),
               COALESCE(SUM(CASE WHEN status IN ('open', 'todo', 'pending') THEN 1 ELSE 0 END), 0),
               COALESCE(SUM(CASE WHEN status = 'in_progress' THEN 1 ELSE 0 END), 0),
               COALESCE(SUM(CASE WHEN status = 'blocked' THEN 1 ELSE 0 END), 0),
               COALESCE(SUM(CASE WHEN status IN ('closed', 'done') THEN 1 ELSE 0 END), 0),
               COALESCE(SUM(CASE WHEN status = 'deferred' THEN 1 ELSE 0 END), 0)
             FROM {table}"
        );
        let mut params: Vec<&dyn ToSql> = Vec::new();
        if let Some(path) = &project_path {
            sql.push_str(&project_clause(
                caps.issues.has_project_junction(),
                "issue_projects",
                "issue_id",
            ));
            params.push(path);
        }

        let buckets: [i64; 6] = self.conn().query_row(&sql, params.as_slice(), |row| {
            Ok([row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?, row.get(4)?, row.get(5)?])
        })?;
        let [backlog, open, in_progress, blocked, closed, deferred] = buckets.map(count);

        Ok(IssueStats {
            backlog,
            open,
            in_progress,
            blocked,
            closed,
            deferred,
            total: backlog + open + in_progress + blocked + closed + deferred,
        })
    }

    /// Issue stats under the legacy bucket names.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_task_stats(&self, project_path: Option<&str>) -> Result<TaskStats> {
        self.get_issue_stats(project_path).map(TaskStats::from)
    }

    /// Session counts per status, optionally for one project.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_session_stats(&self, project_path: Option<&str>) -> Result<SessionStats> {
        let caps = self.capabilities();
        let mut sql = "SELECT
               COALESCE(SUM(CASE WHEN status = 'active' THEN 1 ELSE 0 END), 0),
               COALESCE(SUM(CASE WHEN status = 'paused' THEN 1 ELSE 0 END), 0),
               COALESCE(SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END), 0),
               COUNT(*)
             FROM sessions"
            .to_string();
        let mut params: Vec<&dyn ToSql> = Vec::new();
        if let Some(path) = &project_path {
            sql.push_str(&project_clause(caps.session_projects, "session_projects", "session_id"));
            params.push(path);
        }

        let [active, paused, completed, total] = self
            .conn()
            .query_row(&sql, params.as_slice(), |row| {
                Ok([row.get::<_, i64>(0)?, row.get(1)?, row.get(2)?, row.get(3)?])
            })?
            .map(count);

        Ok(SessionStats {
            active,
            paused,
            completed,
            total,
        })
    }

    /// Counts across the whole store. Missing optional tables count as zero.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub fn get_dashboard_stats(&self) -> Result<DashboardStats> {
        let caps = self.capabilities();
        let conn = self.conn();

        let optional = |present: bool, table: &str| -> Result<usize> {
            if present { count_table(conn, table) } else { Ok(0) }
        };

        Ok(DashboardStats {
            projects: optional(caps.projects, "projects")?,
            sessions: self.get_session_stats(None)?,
            context_items: count_table(conn, "context_items")?,
            checkpoints: count_table(conn, "checkpoints")?,
            memories: optional(caps.project_memory, "project_memory")?,
            plans: optional(caps.plans, "plans")?,
            issues: self.get_issue_stats(None)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{NewIssue, SessionStatus};
    use crate::storage::sqlite::test_support::{legacy_storage, temp_storage};

    const ACTOR: &str = "tester";

    #[test]
    fn test_empty_stats_are_zero_filled() {
        let (_dir, storage) = temp_storage();
        assert_eq!(storage.get_issue_stats(None).unwrap(), IssueStats::default());
        assert_eq!(storage.get_session_stats(Some("/nowhere")).unwrap(), SessionStats::default());
    }

    #[test]
    fn test_issue_stats_buckets_sum_to_total() {
        let (_dir, mut storage) = temp_storage();
        for status in ["open", "open", "in_progress", "closed", "deferred", "backlog", "blocked"] {
            storage
                .create_issue(&NewIssue::new("/p", status).with_status(status), ACTOR)
                .unwrap();
        }
        let other = storage.create_issue(&NewIssue::new("/q", "elsewhere"), ACTOR).unwrap();
        storage.add_issue_project(&other.id, "/p", ACTOR).unwrap();

        let stats = storage.get_issue_stats(Some("/p")).unwrap();
        assert_eq!(stats.open, 3);
        assert_eq!(stats.closed, 1);
        assert_eq!(stats.total, 8);
        assert_eq!(
            stats.total,
            stats.backlog + stats.open + stats.in_progress + stats.blocked + stats.closed + stats.deferred
        );

        let all = storage.get_issue_stats(None).unwrap();
        assert_eq!(all.total, 8);
    }

    #[test]
    fn test_legacy_statuses_fold() {
        let (_dir, mut storage) = legacy_storage();
        storage
            .mutate("seed", ACTOR, |tx, _| {
                tx.execute_batch(
                    "INSERT INTO tasks (id, project_path, title, status, created_at, updated_at) VALUES
                       ('a', '/p', 'a', 'todo', 0, 0),
                       ('b', '/p', 'b', 'pending', 0, 0),
                       ('c', '/p', 'c', 'done', 0, 0),
                       ('d', '/p', 'd', 'in_progress', 0, 0),
                       ('e', '/p', 'e', 'blocked', 0, 0);",
                )?;
                Ok(())
            })
            .unwrap();

        let tasks = storage.get_task_stats(Some("/p")).unwrap();
        assert_eq!(tasks.todo, 2);
        assert_eq!(tasks.done, 1);
        assert_eq!(tasks.in_progress, 1);
        assert_eq!(tasks.blocked, 1);
        assert_eq!(tasks.total, 5);
    }

    #[test]
    fn test_session_and_dashboard_stats() {
        let (_dir, mut storage) = temp_storage();
        let a = storage.create_session("a", None, Some("/p"), None, ACTOR).unwrap();
        storage.create_session("b", None, Some("/p"), None, ACTOR).unwrap();
        storage.update_session_status(&a.id, SessionStatus::Paused, ACTOR).unwrap();

        let sessions = storage.get_session_stats(Some("/p")).unwrap();
        assert_eq!(sessions.active, 1);
        assert_eq!(sessions.paused, 1);
        assert_eq!(sessions.total, 2);

        let dashboard = storage.get_dashboard_stats().unwrap();
        assert_eq!(dashboard.sessions.total, 2);
        assert_eq!(dashboard.projects, 0);
        assert_eq!(dashboard.issues.total, 0);
    }

    #[test]
    fn test_dashboard_on_legacy_database() {
        let (_dir, storage) = legacy_storage();
        let dashboard = storage.get_dashboard_stats().unwrap();
        assert_eq!(dashboard.plans, 0);
        assert_eq!(dashboard.projects, 0);
    }
}
