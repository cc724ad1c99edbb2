//! Schema-adaptive issue queries and mutations.
//!
//! Every query is shaped by the [`IssueSchema`] probed at open:
//! - legacy `tasks` rows are read through a projection that normalizes
//!   them into [`Issue`];
//! - with `issue_dependencies`, the base query self-joins to resolve the
//!   single parent;
//! - with `issue_projects`, the project filter also matches additional paths;
//! - additional paths and labels are attached by a post-query fan-out.

use crate::error::{Error, Result};
use crate::model::{
    DeleteIssueCounts, DependencyType, Issue, IssueDependency, IssueFilter, IssueRef, NewIssue,
};
use crate::storage::capabilities::{IssueSchema, SchemaCapabilities};
use crate::storage::events::EventType;
use crate::storage::projects::fetch_project_by_path;
use crate::storage::sqlite::{new_id, now_ms, placeholders, SqliteStorage};
use crate::validate::{
    clean_labels, legacy_status_aliases, legacy_status_sql, normalize_priority, normalize_status,
    normalize_type, to_legacy_status,
};
use rusqlite::{Connection, OptionalExtension, ToSql};
use tracing::{debug, info};

const ISSUE_COLUMNS: &str = "i.id, i.short_id, i.project_path, i.plan_id, i.title, i.description, i.details, \
     i.status, i.priority, i.issue_type, i.created_by_agent, i.assigned_to_agent, \
     i.created_at, i.updated_at, i.closed_at, i.deferred_at";

const PARENT_COLUMNS: &str = "p.id, p.short_id, p.title, p.status";
const NO_PARENT_COLUMNS: &str = "NULL, NULL, NULL, NULL";

/// Build the `SELECT ... FROM` clause for the probed schema, aliased as `i`.
fn base_select(schema: IssueSchema) -> String {
    match schema {
        IssueSchema::LegacyTasks => format!(
            "SELECT i.id, NULL, i.project_path, NULL, i.title, i.description, NULL, \
             {}, i.priority, 'task', NULL, NULL, \
             i.created_at, i.updated_at, i.completed_at, NULL, {NO_PARENT_COLUMNS}
             FROM tasks i",
            legacy_status_sql("i.status")
        ),
        IssueSchema::Issues {
            has_dependencies: true,
            ..
        } => format!(
            "SELECT {ISSUE_COLUMNS}, {PARENT_COLUMNS}
             FROM issues i
             LEFT JOIN issue_dependencies pd
               ON pd.issue_id = i.id AND pd.dependency_type = 'parent-child'
             LEFT JOIN issues p ON p.id = pd.depends_on_id"
        ),
        IssueSchema::Issues { .. } => {
            format!("SELECT {ISSUE_COLUMNS}, {NO_PARENT_COLUMNS} FROM issues i")
        }
    }
}

fn map_issue_row(row: &rusqlite::Row) -> rusqlite::Result<Issue> {
    let parent_id: Option<String> = row.get(16)?;
    let parent = match parent_id {
        Some(id) => Some(IssueRef {
            id,
            short_id: row.get(17)?,
            title: row.get::<_, Option<String>>(18)?.unwrap_or_default(),
            status: row.get::<_, Option<String>>(19)?.unwrap_or_default(),
        }),
        None => None,
    };

    Ok(Issue {
        id: row.get(0)?,
        short_id: row.get(1)?,
        project_path: row.get(2)?,
        plan_id: row.get(3)?,
        title: row.get(4)?,
        description: row.get(5)?,
        details: row.get(6)?,
        status: row.get::<_, Option<String>>(7)?.unwrap_or_else(|| "open".to_string()),
        priority: row.get::<_, Option<i32>>(8)?.unwrap_or(2),
        issue_type: row.get::<_, Option<String>>(9)?.unwrap_or_else(|| "task".to_string()),
        created_by_agent: row.get(10)?,
        assigned_to_agent: row.get(11)?,
        created_at: row.get(12)?,
        updated_at: row.get(13)?,
        closed_at: row.get(14)?,
        deferred_at: row.get(15)?,
        parent,
        additional_project_paths: Vec::new(),
        labels: Vec::new(),
        dependencies: None,
    })
}

/// Attach additional project paths and labels when those tables exist.
fn enrich(conn: &Connection, schema: IssueSchema, issues: &mut [Issue]) -> Result<()> {
    if schema.has_project_junction() {
        let mut stmt = conn.prepare_cached(
            "SELECT project_path FROM issue_projects
             WHERE issue_id = ?1 AND project_path != ?2
             ORDER BY added_at, project_path",
        )?;
        for issue in issues.iter_mut() {
            issue.additional_project_paths = stmt
                .query_map(rusqlite::params![issue.id, issue.project_path], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
        }
    }

    if schema.has_labels() {
        let mut stmt =
            conn.prepare_cached("SELECT label FROM issue_labels WHERE issue_id = ?1 ORDER BY label")?;
        for issue in issues.iter_mut() {
            issue.labels = stmt
                .query_map([&issue.id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
        }
    }

    Ok(())
}

/// Load every outgoing dependency row for an issue.
fn load_dependencies(conn: &Connection, issue_id: &str) -> Result<Vec<IssueDependency>> {
    let mut stmt = conn.prepare_cached(
        "SELECT d.id, d.depends_on_id, d.dependency_type, d.created_at, t.title, t.short_id, t.status
         FROM issue_dependencies d
         LEFT JOIN issues t ON t.id = d.depends_on_id
         WHERE d.issue_id = ?1
         ORDER BY d.created_at, d.id",
    )?;

    let rows = stmt.query_map([issue_id], |row| {
        Ok(IssueDependency {
            id: row.get(0)?,
            depends_on_id: row.get(1)?,
            dependency_type: row.get(2)?,
            created_at: row.get(3)?,
            title: row.get(4)?,
            short_id: row.get(5)?,
            status: row.get(6)?,
        })
    })?;

    rows.collect::<std::result::Result<Vec<_>, _>>()
        .map_err(Error::from)
}

/// Match a full ID first, then a short ID. Short IDs are only unique per
/// project, so a short ID shared across projects is `AmbiguousId`.
fn find_issue_id(conn: &Connection, schema: IssueSchema, id: &str) -> Result<Option<String>> {
    let exact: Option<String> = conn
        .query_row(
            &format!("SELECT id FROM {} WHERE id = ?1", schema.table()),
            [id],
            |row| row.get(0),
        )
        .optional()?;
    if exact.is_some() || schema.is_legacy() {
        return Ok(exact);
    }

    let mut stmt = conn.prepare_cached("SELECT id FROM issues WHERE short_id = ?1 ORDER BY id")?;
    let mut matches = stmt
        .query_map([id], |row| row.get::<_, String>(0))?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    match matches.len() {
        0 => Ok(None),
        1 => Ok(matches.pop()),
        _ => Err(Error::AmbiguousId {
            id: id.to_string(),
            matches,
        }),
    }
}

/// Fetch one fully enriched issue by full ID or short ID.
pub(crate) fn fetch_issue(conn: &Connection, schema: IssueSchema, id: &str) -> Result<Option<Issue>> {
    let Some(full_id) = find_issue_id(conn, schema, id)? else {
        return Ok(None);
    };
    let sql = format!("{} WHERE i.id = ?1", base_select(schema));

    let Some(issue) = conn.query_row(&sql, [&full_id], map_issue_row).optional()? else {
        return Ok(None);
    };

    let mut issues = [issue];
    enrich(conn, schema, &mut issues)?;
    let [mut issue] = issues;

    issue.dependencies = Some(if schema.has_dependencies() {
        load_dependencies(conn, &issue.id)?
    } else {
        Vec::new()
    });

    Ok(Some(issue))
}

/// Resolve a full ID or short ID to the stored full ID.
fn resolve_issue_id(conn: &Connection, schema: IssueSchema, id: &str) -> Result<String> {
    find_issue_id(conn, schema, id)?.ok_or_else(|| Error::IssueNotFound { id: id.to_string() })
}

fn touch_issue(conn: &Connection, schema: IssueSchema, id: &str, now: i64) -> Result<()> {
    conn.execute(
        &format!("UPDATE {} SET updated_at = ?1 WHERE id = ?2", schema.table()),
        rusqlite::params![now, id],
    )?;
    Ok(())
}

fn current_parent(conn: &Connection, child_id: &str) -> Result<Option<String>> {
    Ok(conn
        .query_row(
            "SELECT depends_on_id FROM issue_dependencies
             WHERE issue_id = ?1 AND dependency_type = 'parent-child'",
            [child_id],
            |row| row.get(0),
        )
        .optional()?)
}

/// True if `candidate` is `start` or one of its parent-child ancestors.
fn is_ancestor_or_self(conn: &Connection, start: &str, candidate: &str) -> Result<bool> {
    let found: Option<i64> = conn
        .query_row(
            "WITH RECURSIVE ancestors(id) AS (
                SELECT ?1
                UNION
                SELECT d.depends_on_id FROM issue_dependencies d
                JOIN ancestors a ON d.issue_id = a.id
                WHERE d.dependency_type = 'parent-child'
             )
             SELECT 1 FROM ancestors WHERE id = ?2 LIMIT 1",
            [start, candidate],
            |row| row.get(0),
        )
        .optional()?;
    Ok(found.is_some())
}

/// Insert a dependency row after enforcing the relation rules.
///
/// Returns `false` if the identical row already exists.
fn insert_dependency(
    conn: &Connection,
    issue_id: &str,
    depends_on_id: &str,
    dependency_type: DependencyType,
    now: i64,
) -> Result<bool> {
    if issue_id == depends_on_id {
        return Err(Error::InvalidArgument(format!(
            "Issue {issue_id} cannot depend on itself"
        )));
    }

    let existing: Option<DependencyType> = conn
        .query_row(
            "SELECT dependency_type FROM issue_dependencies WHERE issue_id = ?1 AND depends_on_id = ?2",
            [issue_id, depends_on_id],
            |row| row.get(0),
        )
        .optional()?;

    match existing {
        Some(t) if t == dependency_type => return Ok(false),
        Some(t) => {
            return Err(Error::InvalidArgument(format!(
                "Issue {issue_id} already has a '{t}' dependency on {depends_on_id}; remove it first"
            )));
        }
        None => {}
    }

    if dependency_type == DependencyType::ParentChild {
        if let Some(existing_parent) = current_parent(conn, issue_id)? {
            return Err(Error::ParentAlreadySet {
                issue_id: issue_id.to_string(),
                existing_parent,
            });
        }
        if is_ancestor_or_self(conn, depends_on_id, issue_id)? {
            return Err(Error::CycleDetected {
                issue_id: issue_id.to_string(),
                depends_on_id: depends_on_id.to_string(),
            });
        }
    }

    conn.execute(
        "INSERT INTO issue_dependencies (id, issue_id, depends_on_id, dependency_type, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        rusqlite::params![new_id("dep"), issue_id, depends_on_id, dependency_type, now],
    )?;

    Ok(true)
}

fn require_dependencies(caps: &SchemaCapabilities) -> Result<()> {
    if caps.issues.has_dependencies() {
        Ok(())
    } else {
        Err(Error::SchemaUnsupported {
            feature: "issue dependencies",
        })
    }
}

fn require_labels(caps: &SchemaCapabilities) -> Result<()> {
    if caps.issues.has_labels() {
        Ok(())
    } else {
        Err(Error::SchemaUnsupported {
            feature: "issue labels",
        })
    }
}

fn require_project_junction(caps: &SchemaCapabilities) -> Result<()> {
    if caps.issues.has_project_junction() {
        Ok(())
    } else {
        Err(Error::SchemaUnsupported {
            feature: "multi-project issues",
        })
    }
}

fn read_labels(conn: &Connection, issue_id: &str) -> Result<Vec<String>> {
    let mut stmt = conn.prepare_cached("SELECT label FROM issue_labels WHERE issue_id = ?1 ORDER BY label")?;
    let labels = stmt
        .query_map([issue_id], |row| row.get(0))?
        .collect::<std::result::Result<Vec<String>, _>>()?;
    Ok(labels)
}

impl SqliteStorage {
    // ================
    // Issue Queries
    // ================

    /// List issues matching the filter, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails, including the raw "no such
    /// table" error when the database has neither `issues` nor `tasks`.
    pub fn get_issues(&self, filter: &IssueFilter) -> Result<Vec<Issue>> {
        let schema = self.capabilities().issues;
        let mut sql = base_select(schema);
        sql.push_str(" WHERE 1=1");
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();

        if let Some(path) = &filter.project_path {
            if schema.has_project_junction() {
                sql.push_str(
                    " AND (i.project_path = ? OR i.id IN (SELECT issue_id FROM issue_projects WHERE project_path = ?))",
                );
                params.push(Box::new(path.clone()));
                params.push(Box::new(path.clone()));
            } else {
                sql.push_str(" AND i.project_path = ?");
                params.push(Box::new(path.clone()));
            }
        }

        if let Some(status) = &filter.status {
            if schema.is_legacy() {
                let aliases = legacy_status_aliases(status);
                sql.push_str(&format!(" AND i.status IN ({})", placeholders(aliases.len())));
                for alias in aliases {
                    params.push(Box::new(alias.to_string()));
                }
            } else {
                sql.push_str(" AND i.status = ?");
                params.push(Box::new(status.clone()));
            }
        }

        let thresholds = filter.time.thresholds(now_ms());
        if let Some(since) = thresholds.created_since {
            sql.push_str(" AND i.created_at >= ?");
            params.push(Box::new(since));
        }
        if let Some(since) = thresholds.updated_since {
            sql.push_str(" AND i.updated_at >= ?");
            params.push(Box::new(since));
        }

        sql.push_str(" ORDER BY i.created_at DESC");

        let mut stmt = self.conn().prepare(&sql)?;
        let param_refs: Vec<&dyn ToSql> = params.iter().map(AsRef::as_ref).collect();
        let mut issues = stmt
            .query_map(param_refs.as_slice(), map_issue_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        enrich(self.conn(), schema, &mut issues)?;
        debug!(count = issues.len(), ?schema, "Loaded issues");
        Ok(issues)
    }

    /// Get one issue by full ID or short ID, with its outgoing dependencies.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_issue_by_id(&self, id: &str) -> Result<Option<Issue>> {
        fetch_issue(self.conn(), self.capabilities().issues, id)
    }

    /// Labels of an issue, sorted. Empty when the database has no label table.
    ///
    /// # Errors
    ///
    /// Returns `IssueNotFound` if the issue doesn't exist.
    pub fn get_issue_labels(&self, id: &str) -> Result<Vec<String>> {
        let schema = self.capabilities().issues;
        let full_id = resolve_issue_id(self.conn(), schema, id)?;
        if !schema.has_labels() {
            return Ok(Vec::new());
        }
        read_labels(self.conn(), &full_id)
    }

    /// Direct children of an issue through `parent-child` rows.
    ///
    /// # Errors
    ///
    /// Returns `IssueNotFound` if the parent doesn't exist.
    pub fn get_child_issues(&self, parent_id: &str) -> Result<Vec<Issue>> {
        let schema = self.capabilities().issues;
        let full_parent_id = resolve_issue_id(self.conn(), schema, parent_id)?;
        if !schema.has_dependencies() {
            return Ok(Vec::new());
        }

        let sql = format!(
            "{} WHERE i.id IN (
                SELECT issue_id FROM issue_dependencies
                WHERE depends_on_id = ?1 AND dependency_type = 'parent-child'
             )
             ORDER BY i.created_at DESC",
            base_select(schema)
        );
        let mut stmt = self.conn().prepare(&sql)?;
        let mut children = stmt
            .query_map([&full_parent_id], map_issue_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        enrich(self.conn(), schema, &mut children)?;
        Ok(children)
    }

    /// Distinct labels in use, optionally limited to one project.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_all_labels(&self, project_path: Option<&str>) -> Result<Vec<String>> {
        let schema = self.capabilities().issues;
        if !schema.has_labels() {
            return Ok(Vec::new());
        }

        let labels = if let Some(path) = project_path {
            let project_clause = if schema.has_project_junction() {
                "(i.project_path = ?1 OR i.id IN (SELECT issue_id FROM issue_projects WHERE project_path = ?1))"
            } else {
                "i.project_path = ?1"
            };
            let sql = format!(
                "SELECT DISTINCT l.label FROM issue_labels l
                 JOIN issues i ON i.id = l.issue_id
                 WHERE {project_clause}
                 ORDER BY l.label"
            );
            let mut stmt = self.conn().prepare(&sql)?;
            stmt.query_map([path], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?
        } else {
            let mut stmt = self
                .conn()
                .prepare("SELECT DISTINCT label FROM issue_labels ORDER BY label")?;
            stmt.query_map([], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?
        };

        Ok(labels)
    }

    /// Legacy name for [`Self::get_issues`].
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_tasks(&self, filter: &IssueFilter) -> Result<Vec<Issue>> {
        self.get_issues(filter)
    }

    /// Legacy name for [`Self::get_issue_by_id`].
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_task_by_id(&self, id: &str) -> Result<Option<Issue>> {
        self.get_issue_by_id(id)
    }

    // ================
    // Issue Mutations
    // ================

    /// Create an issue, allocating a short ID when the project is registered.
    ///
    /// On a legacy database the row goes into `tasks` with legacy status
    /// names; plans and parents need the current schema.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for bad status/type/priority or an empty
    /// title, `SchemaUnsupported` for a parent or plan on a legacy database,
    /// and `IssueNotFound` if the parent doesn't exist.
    pub fn create_issue(&mut self, new: &NewIssue, actor: &str) -> Result<Issue> {
        let title = new.title.trim();
        if title.is_empty() {
            return Err(Error::InvalidArgument("Issue title cannot be empty".to_string()));
        }

        let status = new
            .status
            .as_deref()
            .map(normalize_status)
            .transpose()?
            .unwrap_or_else(|| "open".to_string());
        let issue_type = new
            .issue_type
            .as_deref()
            .map(normalize_type)
            .transpose()?
            .unwrap_or_else(|| "task".to_string());
        let priority = new
            .priority
            .as_deref()
            .map(normalize_priority)
            .transpose()?
            .unwrap_or(2);

        let schema = self.capabilities().issues;
        if schema.is_legacy() && new.plan_id.is_some() {
            return Err(Error::SchemaUnsupported { feature: "issue plans" });
        }
        if new.parent_id.is_some() {
            require_dependencies(&self.capabilities())?;
        }

        let now = now_ms();
        let closed_at = (status == "closed").then_some(now);
        let deferred_at = (status == "deferred").then_some(now);

        let id = self.mutate("create_issue", actor, |tx, ctx| {
            let id = if schema.is_legacy() {
                let id = new_id("task");
                tx.execute(
                    "INSERT INTO tasks (id, project_path, title, description, status, priority, created_at, updated_at, completed_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?7, ?8)",
                    rusqlite::params![
                        id,
                        new.project_path,
                        title,
                        new.description,
                        to_legacy_status(&status),
                        priority,
                        now,
                        closed_at
                    ],
                )?;
                id
            } else {
                let id = new_id("issue");
                let short_id = allocate_short_id(tx, &ctx.caps, &new.project_path, now)?;

                tx.execute(
                    "INSERT INTO issues (id, short_id, project_path, plan_id, title, description, details, status, priority, issue_type, created_by_agent, created_at, updated_at, closed_at, deferred_at)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?12, ?13, ?14)",
                    rusqlite::params![
                        id,
                        short_id,
                        new.project_path,
                        new.plan_id,
                        title,
                        new.description,
                        new.details,
                        status,
                        priority,
                        issue_type,
                        ctx.actor,
                        now,
                        closed_at,
                        deferred_at
                    ],
                )?;

                if let Some(parent) = &new.parent_id {
                    let parent_id = resolve_issue_id(tx, schema, parent)?;
                    insert_dependency(tx, &id, &parent_id, DependencyType::ParentChild, now)?;
                }
                id
            };

            ctx.record_event("issue", &id, EventType::IssueCreated);
            Ok(id)
        })?;

        info!(id = %id, project = %new.project_path, "Created issue");
        self.get_issue_by_id(&id)?
            .ok_or(Error::IssueNotFound { id })
    }

    /// Set an issue's status, maintaining `closed_at` and `deferred_at`.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an unknown status or `IssueNotFound`.
    pub fn update_issue_status(&mut self, id: &str, status: &str, actor: &str) -> Result<()> {
        let status = normalize_status(status)?;
        let schema = self.capabilities().issues;
        let now = now_ms();

        self.mutate("update_issue_status", actor, |tx, ctx| {
            let full_id = resolve_issue_id(tx, schema, id)?;
            let closed_at = (status == "closed").then_some(now);

            if schema.is_legacy() {
                tx.execute(
                    "UPDATE tasks SET status = ?1, completed_at = ?2, updated_at = ?3 WHERE id = ?4",
                    rusqlite::params![to_legacy_status(&status), closed_at, now, full_id],
                )?;
            } else {
                let deferred_at = (status == "deferred").then_some(now);
                tx.execute(
                    "UPDATE issues SET status = ?1, closed_at = ?2, deferred_at = ?3, updated_at = ?4 WHERE id = ?5",
                    rusqlite::params![status, closed_at, deferred_at, now, full_id],
                )?;
            }

            let event_type = if status == "closed" {
                EventType::IssueClosed
            } else {
                EventType::IssueUpdated
            };
            ctx.record_change("issue", &full_id, event_type, None, Some(status.clone()));
            Ok(())
        })
    }

    /// Delete an issue with its dependency, label and project-link rows.
    ///
    /// # Errors
    ///
    /// Returns `IssueNotFound` if the issue doesn't exist.
    pub fn delete_issue(&mut self, id: &str, actor: &str) -> Result<DeleteIssueCounts> {
        let schema = self.capabilities().issues;

        let counts = self.mutate("delete_issue", actor, |tx, ctx| {
            let full_id = resolve_issue_id(tx, schema, id)?;
            let mut counts = DeleteIssueCounts::default();

            if schema.has_dependencies() {
                counts.dependencies = tx.execute(
                    "DELETE FROM issue_dependencies WHERE issue_id = ?1 OR depends_on_id = ?1",
                    [&full_id],
                )?;
            }
            if schema.has_labels() {
                counts.labels =
                    tx.execute("DELETE FROM issue_labels WHERE issue_id = ?1", [&full_id])?;
            }
            if schema.has_project_junction() {
                counts.project_links =
                    tx.execute("DELETE FROM issue_projects WHERE issue_id = ?1", [&full_id])?;
            }

            counts.issues = tx.execute(
                &format!("DELETE FROM {} WHERE id = ?1", schema.table()),
                [&full_id],
            )?;

            ctx.record_event("issue", &full_id, EventType::IssueDeleted);
            Ok(counts)
        })?;

        info!(id, ?counts, "Deleted issue");
        Ok(counts)
    }

    // ======================
    // Issue Dependencies
    // ======================

    /// Add a dependency from `issue_id` to `depends_on_id`.
    ///
    /// Returns `false` when the identical row already exists.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a self-dependency, `ParentAlreadySet`
    /// for a second parent, `CycleDetected` for a parent-child cycle, and
    /// `SchemaUnsupported` without a dependency table.
    pub fn add_issue_dependency(
        &mut self,
        issue_id: &str,
        depends_on_id: &str,
        dependency_type: DependencyType,
        actor: &str,
    ) -> Result<bool> {
        require_dependencies(&self.capabilities())?;
        let schema = self.capabilities().issues;
        let now = now_ms();

        self.mutate("add_issue_dependency", actor, |tx, ctx| {
            let from = resolve_issue_id(tx, schema, issue_id)?;
            let to = resolve_issue_id(tx, schema, depends_on_id)?;

            let added = insert_dependency(tx, &from, &to, dependency_type, now)?;
            if added {
                touch_issue(tx, schema, &from, now)?;
                ctx.record_change(
                    "issue",
                    &from,
                    EventType::IssueDependencyAdded,
                    None,
                    Some(format!("{dependency_type}:{to}")),
                );
            }
            Ok(added)
        })
    }

    /// Replace an issue's parent, or clear it with `None`.
    ///
    /// Returns the previous parent ID.
    ///
    /// # Errors
    ///
    /// Returns `CycleDetected` if the new parent is a descendant, or
    /// `IssueNotFound` if either issue doesn't exist.
    pub fn set_issue_parent(
        &mut self,
        id: &str,
        parent_id: Option<&str>,
        actor: &str,
    ) -> Result<Option<String>> {
        require_dependencies(&self.capabilities())?;
        let schema = self.capabilities().issues;
        let now = now_ms();

        self.mutate("set_issue_parent", actor, |tx, ctx| {
            let child = resolve_issue_id(tx, schema, id)?;
            let previous = current_parent(tx, &child)?;

            tx.execute(
                "DELETE FROM issue_dependencies WHERE issue_id = ?1 AND dependency_type = 'parent-child'",
                [&child],
            )?;

            let new_parent = match parent_id {
                Some(p) => {
                    let parent = resolve_issue_id(tx, schema, p)?;
                    insert_dependency(tx, &child, &parent, DependencyType::ParentChild, now)?;
                    Some(parent)
                }
                None => None,
            };

            touch_issue(tx, schema, &child, now)?;
            ctx.record_change(
                "issue",
                &child,
                EventType::IssueUpdated,
                previous.clone(),
                new_parent,
            );
            Ok(previous)
        })
    }

    /// Remove the dependency row between two issues. Returns rows removed.
    ///
    /// # Errors
    ///
    /// Returns `IssueNotFound` if either issue doesn't exist.
    pub fn remove_issue_dependency(
        &mut self,
        issue_id: &str,
        depends_on_id: &str,
        actor: &str,
    ) -> Result<usize> {
        require_dependencies(&self.capabilities())?;
        let schema = self.capabilities().issues;
        let now = now_ms();

        self.mutate("remove_issue_dependency", actor, |tx, ctx| {
            let from = resolve_issue_id(tx, schema, issue_id)?;
            let to = resolve_issue_id(tx, schema, depends_on_id)?;

            let removed = tx.execute(
                "DELETE FROM issue_dependencies WHERE issue_id = ?1 AND depends_on_id = ?2",
                [&from, &to],
            )?;

            if removed > 0 {
                touch_issue(tx, schema, &from, now)?;
                ctx.record_change("issue", &from, EventType::IssueDependencyRemoved, Some(to), None);
            }
            Ok(removed)
        })
    }

    /// Record `id` as a duplicate of `duplicate_of_id` and close it.
    ///
    /// # Errors
    ///
    /// Returns `IssueNotFound` if either issue doesn't exist.
    pub fn mark_issue_duplicate(&mut self, id: &str, duplicate_of_id: &str, actor: &str) -> Result<()> {
        require_dependencies(&self.capabilities())?;
        let schema = self.capabilities().issues;
        let now = now_ms();

        self.mutate("mark_issue_duplicate", actor, |tx, ctx| {
            let dup = resolve_issue_id(tx, schema, id)?;
            let original = resolve_issue_id(tx, schema, duplicate_of_id)?;

            insert_dependency(tx, &dup, &original, DependencyType::DuplicateOf, now)?;
            tx.execute(
                "UPDATE issues SET status = 'closed', closed_at = ?1, updated_at = ?1 WHERE id = ?2",
                rusqlite::params![now, dup],
            )?;

            ctx.record_change(
                "issue",
                &dup,
                EventType::IssueClosed,
                None,
                Some(format!("duplicate-of:{original}")),
            );
            Ok(())
        })
    }

    // ======================
    // Issue Labels
    // ======================

    /// Add labels. Returns how many were new.
    ///
    /// # Errors
    ///
    /// Returns `IssueNotFound` or `SchemaUnsupported` without a label table.
    pub fn add_issue_labels<S: AsRef<str>>(&mut self, id: &str, labels: &[S], actor: &str) -> Result<usize> {
        require_labels(&self.capabilities())?;
        let schema = self.capabilities().issues;
        let labels = clean_labels(labels);
        let now = now_ms();

        self.mutate("add_issue_labels", actor, |tx, ctx| {
            let full_id = resolve_issue_id(tx, schema, id)?;

            let mut added = 0;
            for label in &labels {
                added += tx.execute(
                    "INSERT OR IGNORE INTO issue_labels (id, issue_id, label) VALUES (?1, ?2, ?3)",
                    rusqlite::params![new_id("label"), full_id, label],
                )?;
            }

            touch_issue(tx, schema, &full_id, now)?;
            ctx.record_change(
                "issue",
                &full_id,
                EventType::IssueLabelsChanged,
                None,
                Some(labels.join(",")),
            );
            Ok(added)
        })
    }

    /// Remove labels by exact (trimmed) text. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Returns `IssueNotFound` or `SchemaUnsupported` without a label table.
    pub fn remove_issue_labels<S: AsRef<str>>(&mut self, id: &str, labels: &[S], actor: &str) -> Result<usize> {
        require_labels(&self.capabilities())?;
        let schema = self.capabilities().issues;
        let labels = clean_labels(labels);
        let now = now_ms();

        self.mutate("remove_issue_labels", actor, |tx, ctx| {
            let full_id = resolve_issue_id(tx, schema, id)?;

            let mut removed = 0;
            for label in &labels {
                removed += tx.execute(
                    "DELETE FROM issue_labels WHERE issue_id = ?1 AND label = ?2",
                    rusqlite::params![full_id, label],
                )?;
            }

            touch_issue(tx, schema, &full_id, now)?;
            ctx.record_change(
                "issue",
                &full_id,
                EventType::IssueLabelsChanged,
                Some(labels.join(",")),
                None,
            );
            Ok(removed)
        })
    }

    /// Replace all labels. Returns the final label set, sorted.
    ///
    /// # Errors
    ///
    /// Returns `IssueNotFound` or `SchemaUnsupported` without a label table.
    pub fn set_issue_labels<S: AsRef<str>>(&mut self, id: &str, labels: &[S], actor: &str) -> Result<Vec<String>> {
        require_labels(&self.capabilities())?;
        let schema = self.capabilities().issues;
        let labels = clean_labels(labels);
        let now = now_ms();

        self.mutate("set_issue_labels", actor, |tx, ctx| {
            let full_id = resolve_issue_id(tx, schema, id)?;
            let before = read_labels(tx, &full_id)?;

            tx.execute("DELETE FROM issue_labels WHERE issue_id = ?1", [&full_id])?;
            for label in &labels {
                tx.execute(
                    "INSERT INTO issue_labels (id, issue_id, label) VALUES (?1, ?2, ?3)",
                    rusqlite::params![new_id("label"), full_id, label],
                )?;
            }

            touch_issue(tx, schema, &full_id, now)?;
            let after = read_labels(tx, &full_id)?;
            ctx.record_change(
                "issue",
                &full_id,
                EventType::IssueLabelsChanged,
                Some(before.join(",")),
                Some(after.join(",")),
            );
            Ok(after)
        })
    }

    // ======================
    // Issue Project Links
    // ======================

    /// Link an additional project path. No-op for the primary path.
    ///
    /// Returns whether a row was added.
    ///
    /// # Errors
    ///
    /// Returns `IssueNotFound` or `SchemaUnsupported` without a junction table.
    pub fn add_issue_project(&mut self, id: &str, project_path: &str, actor: &str) -> Result<bool> {
        require_project_junction(&self.capabilities())?;
        let schema = self.capabilities().issues;
        let now = now_ms();

        self.mutate("add_issue_project", actor, |tx, ctx| {
            let (full_id, primary): (String, String) = tx
                .query_row(
                    "SELECT id, project_path FROM issues WHERE id = ?1 OR short_id = ?1 LIMIT 1",
                    [id],
                    |row| Ok((row.get(0)?, row.get(1)?)),
                )
                .optional()?
                .ok_or_else(|| Error::IssueNotFound { id: id.to_string() })?;

            if primary == project_path {
                return Ok(false);
            }

            let exists = tx
                .prepare("SELECT 1 FROM issue_projects WHERE issue_id = ?1 AND project_path = ?2")?
                .exists(rusqlite::params![full_id, project_path])?;
            if exists {
                return Ok(false);
            }

            tx.execute(
                "INSERT INTO issue_projects (issue_id, project_path, added_at) VALUES (?1, ?2, ?3)",
                rusqlite::params![full_id, project_path, now],
            )?;
            touch_issue(tx, schema, &full_id, now)?;
            ctx.record_change(
                "issue",
                &full_id,
                EventType::IssueProjectAdded,
                None,
                Some(project_path.to_string()),
            );
            Ok(true)
        })
    }

    /// Unlink an additional project path. Never touches the primary path.
    ///
    /// # Errors
    ///
    /// Returns `IssueNotFound` or `SchemaUnsupported` without a junction table.
    pub fn remove_issue_project(&mut self, id: &str, project_path: &str, actor: &str) -> Result<usize> {
        require_project_junction(&self.capabilities())?;
        let schema = self.capabilities().issues;
        let now = now_ms();

        self.mutate("remove_issue_project", actor, |tx, ctx| {
            let full_id = resolve_issue_id(tx, schema, id)?;

            let removed = tx.execute(
                "DELETE FROM issue_projects WHERE issue_id = ?1 AND project_path = ?2",
                rusqlite::params![full_id, project_path],
            )?;

            if removed > 0 {
                touch_issue(tx, schema, &full_id, now)?;
                ctx.record_change(
                    "issue",
                    &full_id,
                    EventType::IssueProjectRemoved,
                    Some(project_path.to_string()),
                    None,
                );
            }
            Ok(removed)
        })
    }
}

/// Take the next short ID from the project registered at `project_path`.
fn allocate_short_id(
    conn: &Connection,
    caps: &SchemaCapabilities,
    project_path: &str,
    now: i64,
) -> Result<Option<String>> {
    if !caps.projects {
        return Ok(None);
    }
    let Some(project) = fetch_project_by_path(conn, project_path)? else {
        return Ok(None);
    };

    conn.execute(
        "UPDATE projects SET next_issue_number = next_issue_number + 1, updated_at = ?1 WHERE id = ?2",
        rusqlite::params![now, project.id],
    )?;
    Ok(Some(project.next_issue_short_id()))
}
