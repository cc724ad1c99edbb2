//! Plan model for SaveContext.
//!
//! Plans hold PRD/spec markdown for a project. Epics and issues point at a
//! plan through `issues.plan_id`; the rollups in [`PlanSummary`] are
//! computed at read time and never stored.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::Error;

/// Plan status values.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlanStatus {
    #[default]
    Draft,
    Active,
    Completed,
}

impl PlanStatus {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Active => "active",
            Self::Completed => "completed",
        }
    }

    /// Lenient parse for stored values; anything unknown reads as draft.
    #[must_use]
    pub fn from_stored(s: &str) -> Self {
        s.parse().unwrap_or_default()
    }
}

impl FromStr for PlanStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "draft" => Ok(Self::Draft),
            "active" => Ok(Self::Active),
            "completed" | "complete" | "done" => Ok(Self::Completed),
            _ => Err(Error::InvalidArgument(format!(
                "Unknown plan status '{s}'. Valid: draft, active, completed"
            ))),
        }
    }
}

/// A plan in SaveContext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Plan {
    pub id: String,

    /// Project path for queries
    pub project_path: String,

    pub title: String,

    /// Plan content (markdown PRD/spec)
    pub content: Option<String>,

    pub status: PlanStatus,

    /// Success criteria for completion
    pub success_criteria: Option<String>,

    pub created_at: i64,
    pub updated_at: i64,
    pub completed_at: Option<i64>,
}

impl Plan {
    /// Create a new plan with default values.
    #[must_use]
    pub fn new(project_path: &str, title: &str) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        let id = format!("plan_{}", &uuid::Uuid::new_v4().to_string()[..12]);

        Self {
            id,
            project_path: project_path.to_string(),
            title: title.to_string(),
            content: None,
            status: PlanStatus::Draft,
            success_criteria: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    /// Set the plan content.
    #[must_use]
    pub fn with_content(mut self, content: &str) -> Self {
        self.content = Some(content.to_string());
        self
    }

    /// Set the plan status.
    #[must_use]
    pub fn with_status(mut self, status: PlanStatus) -> Self {
        self.status = status;
        self
    }

    /// Set the success criteria.
    #[must_use]
    pub fn with_success_criteria(mut self, criteria: &str) -> Self {
        self.success_criteria = Some(criteria.to_string());
        self
    }
}

/// An issue linked to a plan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlanIssue {
    pub id: String,
    pub short_id: Option<String>,
    pub title: String,
    pub status: String,
    pub issue_type: String,
}

impl PlanIssue {
    #[must_use]
    pub fn is_completed(&self) -> bool {
        self.status == "closed"
    }
}

/// A plan plus its computed epic and issue rollups.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PlanSummary {
    #[serde(flatten)]
    pub plan: Plan,
    pub epics: Vec<PlanIssue>,
    pub linked_issues: Vec<PlanIssue>,
    pub epic_count: usize,
    pub epics_completed: usize,
    pub linked_issue_count: usize,
    pub linked_issues_completed: usize,
}

impl PlanSummary {
    /// Split linked issues into epics and the rest, and count completions.
    #[must_use]
    pub fn from_parts(plan: Plan, issues: Vec<PlanIssue>) -> Self {
        let (epics, linked_issues): (Vec<_>, Vec<_>) =
            issues.into_iter().partition(|i| i.issue_type == "epic");

        Self {
            plan,
            epic_count: epics.len(),
            epics_completed: epics.iter().filter(|i| i.is_completed()).count(),
            linked_issue_count: linked_issues.len(),
            linked_issues_completed: linked_issues.iter().filter(|i| i.is_completed()).count(),
            epics,
            linked_issues,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn plan_issue(issue_type: &str, status: &str) -> PlanIssue {
        PlanIssue {
            id: format!("issue_{issue_type}_{status}"),
            short_id: None,
            title: "t".into(),
            status: status.into(),
            issue_type: issue_type.into(),
        }
    }

    #[test]
    fn test_new_plan() {
        let plan = Plan::new("/home/user/myproject", "Authentication System");

        assert!(plan.id.starts_with("plan_"));
        assert_eq!(plan.title, "Authentication System");
        assert_eq!(plan.status, PlanStatus::Draft);
    }

    #[test]
    fn test_plan_status_parsing() {
        assert_eq!("draft".parse::<PlanStatus>().unwrap(), PlanStatus::Draft);
        assert_eq!("ACTIVE".parse::<PlanStatus>().unwrap(), PlanStatus::Active);
        assert!("unknown".parse::<PlanStatus>().is_err());
        assert_eq!(PlanStatus::from_stored("unknown"), PlanStatus::Draft);
    }

    #[test]
    fn test_summary_partitions_epics() {
        let summary = PlanSummary::from_parts(
            Plan::new("/p", "P"),
            vec![
                plan_issue("epic", "closed"),
                plan_issue("epic", "open"),
                plan_issue("task", "closed"),
                plan_issue("bug", "in_progress"),
                plan_issue("feature", "open"),
            ],
        );

        assert_eq!(summary.epic_count, 2);
        assert_eq!(summary.epics_completed, 1);
        assert_eq!(summary.linked_issue_count, 3);
        assert_eq!(summary.linked_issues_completed, 1);
    }
}
