//! Issue model for SaveContext.
//!
//! Issues are units of work scoped to one primary project path plus any
//! number of additional paths. Parent/child, duplicate and blocking
//! relationships are rows in `issue_dependencies`, never columns.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Relation type stored in `issue_dependencies.dependency_type`.
///
/// For `ParentChild` the child is `issue_id` and the parent is `depends_on_id`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum DependencyType {
    Blocks,
    Related,
    ParentChild,
    DiscoveredFrom,
    DuplicateOf,
}

impl DependencyType {
    pub const ALL: [Self; 5] = [
        Self::Blocks,
        Self::Related,
        Self::ParentChild,
        Self::DiscoveredFrom,
        Self::DuplicateOf,
    ];

    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Blocks => "blocks",
            Self::Related => "related",
            Self::ParentChild => "parent-child",
            Self::DiscoveredFrom => "discovered-from",
            Self::DuplicateOf => "duplicate-of",
        }
    }
}

impl fmt::Display for DependencyType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DependencyType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase().replace('_', "-");
        Self::ALL
            .into_iter()
            .find(|t| t.as_str() == lower)
            .ok_or_else(|| {
                Error::InvalidArgument(format!(
                    "Unknown dependency type '{s}'. Valid: blocks, related, parent-child, discovered-from, duplicate-of"
                ))
            })
    }
}

impl rusqlite::types::FromSql for DependencyType {
    fn column_result(value: rusqlite::types::ValueRef<'_>) -> rusqlite::types::FromSqlResult<Self> {
        let s = value.as_str()?;
        s.parse()
            .map_err(|e: Error| rusqlite::types::FromSqlError::Other(Box::new(e)))
    }
}

impl rusqlite::types::ToSql for DependencyType {
    fn to_sql(&self) -> rusqlite::Result<rusqlite::types::ToSqlOutput<'_>> {
        Ok(self.as_str().into())
    }
}

/// A lightweight reference to another issue (parent, plan member).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueRef {
    pub id: String,
    pub short_id: Option<String>,
    pub title: String,
    pub status: String,
}

/// One outgoing dependency row, enriched with the target's display fields.
///
/// The target fields are `None` when the row points at a deleted issue.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IssueDependency {
    pub id: String,
    pub depends_on_id: String,
    pub dependency_type: DependencyType,
    pub created_at: i64,
    pub title: Option<String>,
    pub short_id: Option<String>,
    pub status: Option<String>,
}

/// An issue as read through the schema-adaptive query layer.
///
/// Rows from a legacy `tasks` table are normalized into this shape:
/// `issue_type` is `task`, statuses use the current vocabulary and
/// `closed_at` carries the old `completed_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Issue {
    pub id: String,
    pub short_id: Option<String>,
    pub project_path: String,
    pub plan_id: Option<String>,
    pub title: String,
    pub description: Option<String>,
    pub details: Option<String>,
    pub status: String,
    pub priority: i32,
    pub issue_type: String,
    pub created_by_agent: Option<String>,
    pub assigned_to_agent: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
    pub closed_at: Option<i64>,
    pub deferred_at: Option<i64>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<IssueRef>,

    #[serde(default)]
    pub additional_project_paths: Vec<String>,

    #[serde(default)]
    pub labels: Vec<String>,

    /// Only populated by single-issue lookups.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dependencies: Option<Vec<IssueDependency>>,
}

/// Input for creating an issue.
#[derive(Debug, Clone, Default)]
pub struct NewIssue {
    pub project_path: String,
    pub title: String,
    pub description: Option<String>,
    pub details: Option<String>,
    pub status: Option<String>,
    pub issue_type: Option<String>,
    pub priority: Option<String>,
    pub plan_id: Option<String>,
    pub parent_id: Option<String>,
}

impl NewIssue {
    #[must_use]
    pub fn new(project_path: &str, title: &str) -> Self {
        Self {
            project_path: project_path.to_string(),
            title: title.to_string(),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_description(mut self, description: &str) -> Self {
        self.description = Some(description.to_string());
        self
    }

    #[must_use]
    pub fn with_status(mut self, status: &str) -> Self {
        self.status = Some(status.to_string());
        self
    }

    #[must_use]
    pub fn with_type(mut self, issue_type: &str) -> Self {
        self.issue_type = Some(issue_type.to_string());
        self
    }

    /// Accepts `0`-`4`, `P0`-`P4`, or a name like `high`.
    #[must_use]
    pub fn with_priority(mut self, priority: &str) -> Self {
        self.priority = Some(priority.to_string());
        self
    }

    #[must_use]
    pub fn with_plan(mut self, plan_id: &str) -> Self {
        self.plan_id = Some(plan_id.to_string());
        self
    }

    #[must_use]
    pub fn with_parent(mut self, parent_id: &str) -> Self {
        self.parent_id = Some(parent_id.to_string());
        self
    }
}

/// Rows removed by an issue delete, per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteIssueCounts {
    pub dependencies: usize,
    pub labels: usize,
    pub project_links: usize,
    pub issues: usize,
}

/// Relative time windows for issue listing.
///
/// For each field, hours take precedence over days when both are set.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeFilter {
    pub created_last_hours: Option<u32>,
    pub created_last_days: Option<u32>,
    pub updated_last_hours: Option<u32>,
    pub updated_last_days: Option<u32>,
}

/// Absolute millisecond cutoffs derived from a [`TimeFilter`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TimeThresholds {
    pub created_since: Option<i64>,
    pub updated_since: Option<i64>,
}

const HOUR_MS: i64 = 60 * 60 * 1000;
const DAY_MS: i64 = 24 * HOUR_MS;

impl TimeFilter {
    /// Convert the relative windows into absolute cutoffs measured back from `now_ms`.
    #[must_use]
    pub fn thresholds(&self, now_ms: i64) -> TimeThresholds {
        let cutoff = |hours: Option<u32>, days: Option<u32>| {
            hours
                .map(|h| now_ms - i64::from(h) * HOUR_MS)
                .or_else(|| days.map(|d| now_ms - i64::from(d) * DAY_MS))
        };

        TimeThresholds {
            created_since: cutoff(self.created_last_hours, self.created_last_days),
            updated_since: cutoff(self.updated_last_hours, self.updated_last_days),
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        *self == Self::default()
    }
}

/// Filters for [`crate::storage::SqliteStorage::get_issues`].
#[derive(Debug, Clone, Default)]
pub struct IssueFilter {
    /// Matches the primary path or any additional path.
    pub project_path: Option<String>,
    /// Exact status in the current vocabulary.
    pub status: Option<String>,
    pub time: TimeFilter,
}

impl IssueFilter {
    #[must_use]
    pub fn for_project(project_path: &str) -> Self {
        Self {
            project_path: Some(project_path.to_string()),
            ..Self::default()
        }
    }
}
