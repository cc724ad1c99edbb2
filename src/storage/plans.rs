//! Plan storage with read-time epic and issue rollups.

use crate::error::{Error, Result};
use crate::model::{Plan, PlanIssue, PlanStatus, PlanSummary};
use crate::storage::capabilities::IssueSchema;
use crate::storage::events::EventType;
use crate::storage::sqlite::{now_ms, SqliteStorage};
use rusqlite::{Connection, OptionalExtension, ToSql};
use tracing::info;

const PLAN_COLUMNS: &str =
    "id, project_path, title, content, status, success_criteria, created_at, updated_at, completed_at";

fn map_plan_row(row: &rusqlite::Row) -> rusqlite::Result<Plan> {
    let status: Option<String> = row.get(4)?;
    Ok(Plan {
        id: row.get(0)?,
        project_path: row.get(1)?,
        title: row.get(2)?,
        content: row.get(3)?,
        status: status.as_deref().map(PlanStatus::from_stored).unwrap_or_default(),
        success_criteria: row.get(5)?,
        created_at: row.get(6)?,
        updated_at: row.get(7)?,
        completed_at: row.get(8)?,
    })
}

/// Issues pointing at a plan. Legacy task tables carry no plan link.
fn plan_issues(conn: &Connection, schema: IssueSchema, plan_id: &str) -> Result<Vec<PlanIssue>> {
    if schema.is_legacy() {
        return Ok(Vec::new());
    }
    let mut stmt = conn.prepare_cached(
        "SELECT id, short_id, title, status, issue_type FROM issues
         WHERE plan_id = ?1
         ORDER BY created_at",
    )?;
    let issues = stmt
        .query_map([plan_id], |row| {
            Ok(PlanIssue {
                id: row.get(0)?,
                short_id: row.get(1)?,
                title: row.get(2)?,
                status: row.get::<_, Option<String>>(3)?.unwrap_or_else(|| "open".to_string()),
                issue_type: row.get::<_, Option<String>>(4)?.unwrap_or_else(|| "task".to_string()),
            })
        })?
        .collect::<std::result::Result<Vec<_>, _>>()?;
    Ok(issues)
}

impl SqliteStorage {
    /// Insert a plan.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty title, or `SchemaUnsupported`
    /// without a `plans` table.
    pub fn create_plan(&mut self, plan: &Plan, actor: &str) -> Result<()> {
        if !self.capabilities().plans {
            return Err(Error::SchemaUnsupported { feature: "plans" });
        }
        if plan.title.trim().is_empty() {
            return Err(Error::InvalidArgument("Plan title cannot be empty".to_string()));
        }

        self.mutate("create_plan", actor, |tx, ctx| {
            tx.execute(
                "INSERT INTO plans (id, project_path, title, content, status, success_criteria, created_at, updated_at, completed_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    plan.id,
                    plan.project_path,
                    plan.title.trim(),
                    plan.content,
                    plan.status.as_str(),
                    plan.success_criteria,
                    plan.created_at,
                    plan.updated_at,
                    plan.completed_at,
                ],
            )?;
            ctx.record_event("plan", &plan.id, EventType::PlanCreated);
            Ok(())
        })?;

        info!(id = %plan.id, project = %plan.project_path, "Created plan");
        Ok(())
    }

    /// Change a plan's status. Completing stamps `completed_at`; any other
    /// status clears it.
    ///
    /// # Errors
    ///
    /// Returns `PlanNotFound`, or `SchemaUnsupported` without a `plans` table.
    pub fn update_plan_status(&mut self, id: &str, status: PlanStatus, actor: &str) -> Result<()> {
        if !self.capabilities().plans {
            return Err(Error::SchemaUnsupported { feature: "plans" });
        }
        let now = now_ms();
        let completed_at = (status == PlanStatus::Completed).then_some(now);

        self.mutate("update_plan_status", actor, |tx, ctx| {
            let before: Option<String> = tx
                .query_row("SELECT status FROM plans WHERE id = ?1", [id], |row| row.get(0))
                .optional()?
                .ok_or_else(|| Error::PlanNotFound { id: id.to_string() })?;

            tx.execute(
                "UPDATE plans SET status = ?1, completed_at = ?2, updated_at = ?3 WHERE id = ?4",
                rusqlite::params![status.as_str(), completed_at, now, id],
            )?;

            ctx.record_change(
                "plan",
                id,
                EventType::PlanUpdated,
                before,
                Some(status.as_str().to_string()),
            );
            Ok(())
        })
    }

    /// Get a plan with its computed rollups.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub fn get_plan(&self, id: &str) -> Result<Option<PlanSummary>> {
        if !self.capabilities().plans {
            return Ok(None);
        }
        let plan = self
            .conn()
            .query_row(
                &format!("SELECT {PLAN_COLUMNS} FROM plans WHERE id = ?1"),
                [id],
                map_plan_row,
            )
            .optional()?;

        match plan {
            Some(plan) => {
                let issues = plan_issues(self.conn(), self.capabilities().issues, &plan.id)?;
                Ok(Some(PlanSummary::from_parts(plan, issues)))
            }
            None => Ok(None),
        }
    }

    /// List plans, newest first, each with its rollups.
    ///
    /// # Errors
    ///
    /// Returns an error if a query fails.
    pub fn list_plans(&self, project_path: Option<&str>, status: Option<PlanStatus>) -> Result<Vec<PlanSummary>> {
        if !self.capabilities().plans {
            return Ok(Vec::new());
        }

        let mut sql = format!("SELECT {PLAN_COLUMNS} FROM plans WHERE 1=1");
        let mut params: Vec<Box<dyn ToSql>> = Vec::new();
        if let Some(path) = project_path {
            sql.push_str(" AND project_path = ?");
            params.push(Box::new(path.to_string()));
        }
        if let Some(status) = status {
            sql.push_str(" AND status = ?");
            params.push(Box::new(status.as_str()));
        }
        sql.push_str(" ORDER BY created_at DESC");

        let mut stmt = self.conn().prepare(&sql)?;
        let param_refs: Vec<&dyn ToSql> = params.iter().map(AsRef::as_ref).collect();
        let plans = stmt
            .query_map(param_refs.as_slice(), map_plan_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        let schema = self.capabilities().issues;
        plans
            .into_iter()
            .map(|plan| -> Result<PlanSummary> {
                let issues = plan_issues(self.conn(), schema, &plan.id)?;
                Ok(PlanSummary::from_parts(plan, issues))
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::NewIssue;
    use crate::storage::sqlite::test_support::{legacy_storage, temp_storage};

    const ACTOR: &str = "tester";

    #[test]
    fn test_plan_rollups_are_computed() {
        let (_dir, mut storage) = temp_storage();
        let plan = Plan::new("/p", "Auth rewrite")
            .with_content("# PRD")
            .with_success_criteria("Sessions survive restarts");
        storage.create_plan(&plan, ACTOR).unwrap();

        let epic = storage
            .create_issue(&NewIssue::new("/p", "Epic").with_type("epic").with_plan(&plan.id), ACTOR)
            .unwrap();
        storage
            .create_issue(&NewIssue::new("/p", "Task A").with_plan(&plan.id), ACTOR)
            .unwrap();
        storage
            .create_issue(
                &NewIssue::new("/p", "Task B").with_plan(&plan.id).with_status("closed"),
                ACTOR,
            )
            .unwrap();
        storage.create_issue(&NewIssue::new("/p", "Unrelated"), ACTOR).unwrap();

        let summary = storage.get_plan(&plan.id).unwrap().unwrap();
        assert_eq!(summary.plan.success_criteria.as_deref(), Some("Sessions survive restarts"));
        assert_eq!(summary.epic_count, 1);
        assert_eq!(summary.epics_completed, 0);
        assert_eq!(summary.linked_issue_count, 2);
        assert_eq!(summary.linked_issues_completed, 1);

        storage.update_issue_status(&epic.id, "closed", ACTOR).unwrap();
        let summary = storage.get_plan(&plan.id).unwrap().unwrap();
        assert_eq!(summary.epics_completed, 1);
    }

    #[test]
    fn test_plan_status_and_listing() {
        let (_dir, mut storage) = temp_storage();
        let a = Plan::new("/p", "A");
        let b = Plan::new("/q", "B");
        storage.create_plan(&a, ACTOR).unwrap();
        storage.create_plan(&b, ACTOR).unwrap();

        storage.update_plan_status(&a.id, PlanStatus::Completed, ACTOR).unwrap();
        let done = storage.get_plan(&a.id).unwrap().unwrap();
        assert_eq!(done.plan.status, PlanStatus::Completed);
        assert!(done.plan.completed_at.is_some());

        storage.update_plan_status(&a.id, PlanStatus::Active, ACTOR).unwrap();
        assert!(storage.get_plan(&a.id).unwrap().unwrap().plan.completed_at.is_none());

        assert_eq!(storage.list_plans(None, None).unwrap().len(), 2);
        assert_eq!(storage.list_plans(Some("/q"), None).unwrap().len(), 1);
        assert_eq!(storage.list_plans(None, Some(PlanStatus::Active)).unwrap().len(), 1);

        assert!(matches!(
            storage.update_plan_status("plan_missing", PlanStatus::Active, ACTOR),
            Err(Error::PlanNotFound { .. })
        ));
    }

    #[test]
    fn test_no_plans_table_reads_empty() {
        let (_dir, mut storage) = legacy_storage();
        assert!(storage.list_plans(None, None).unwrap().is_empty());
        assert!(storage.get_plan("plan_x").unwrap().is_none());
        assert!(matches!(
            storage.create_plan(&Plan::new("/p", "P"), ACTOR),
            Err(Error::SchemaUnsupported { .. })
        ));
    }
}
