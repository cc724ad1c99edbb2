//! Project model for SaveContext.
//!
//! Projects name a directory and carry the issue short-ID counter.
//! Sessions, issues, plans and memory reference a project only through
//! its `project_path`, matched as an exact string.

use serde::{Deserialize, Serialize};

/// A project in SaveContext.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Project {
    /// Unique identifier
    pub id: String,

    /// Absolute path to the project directory
    pub project_path: String,

    /// Display name for the project
    pub name: String,

    /// Optional description
    pub description: Option<String>,

    /// Prefix for issue short IDs (e.g., "SC" creates SC-1, SC-2)
    pub issue_prefix: Option<String>,

    /// Next issue number to assign
    #[serde(default = "default_one")]
    pub next_issue_number: i32,

    /// Creation timestamp (Unix milliseconds)
    pub created_at: i64,

    /// Last update timestamp (Unix milliseconds)
    pub updated_at: i64,
}

fn default_one() -> i32 {
    1
}

impl Project {
    /// Create a new project with default values.
    #[must_use]
    pub fn new(project_path: &str, name: &str) -> Self {
        let now = chrono::Utc::now().timestamp_millis();
        let id = format!("proj_{}", &uuid::Uuid::new_v4().to_string()[..12]);

        // Default issue prefix from the first 4 alphanumerics of the name
        let issue_prefix = name
            .chars()
            .filter(|c| c.is_alphanumeric())
            .take(4)
            .collect::<String>()
            .to_uppercase();

        Self {
            id,
            project_path: project_path.to_string(),
            name: name.to_string(),
            description: None,
            issue_prefix: (!issue_prefix.is_empty()).then_some(issue_prefix),
            next_issue_number: 1,
            created_at: now,
            updated_at: now,
        }
    }

    /// Create a project named after the last path component.
    #[must_use]
    pub fn from_path(project_path: &str) -> Self {
        let name = std::path::Path::new(project_path)
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("Unknown Project");
        Self::new(project_path, name)
    }

    /// Generate the next issue short ID.
    #[must_use]
    pub fn next_issue_short_id(&self) -> String {
        let prefix = self.issue_prefix.as_deref().unwrap_or("SC");
        format!("{}-{}", prefix, self.next_issue_number)
    }
}

/// Partial update for a project. `None` fields are left unchanged.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProjectUpdate {
    pub name: Option<String>,
    pub description: Option<String>,
    pub issue_prefix: Option<String>,
}

impl ProjectUpdate {
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none() && self.issue_prefix.is_none()
    }
}

/// A project plus the counts shown in listings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProjectWithCounts {
    #[serde(flatten)]
    pub project: Project,
    pub session_count: usize,
    pub issue_count: usize,
}

/// Counts of records for a project path.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectCounts {
    pub sessions: usize,
    pub issues: usize,
    pub context_items: usize,
    pub memories: usize,
    pub checkpoints: usize,
}

impl ProjectCounts {
    /// Returns total number of records.
    #[must_use]
    pub fn total(&self) -> usize {
        self.sessions + self.issues + self.context_items + self.memories + self.checkpoints
    }
}

/// What a project delete touched. Nothing here is a deleted session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteProjectCounts {
    /// Sessions whose primary path was set to NULL.
    pub sessions_unlinked: usize,
    pub session_links_removed: usize,
    pub issue_links_removed: usize,
    pub projects: usize,
}

/// Rows repointed by a project merge.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MergeProjectCounts {
    pub sessions: usize,
    pub issues: usize,
    pub plans: usize,
    pub memories: usize,
    /// Source memory rows dropped because the target already had the key.
    pub memories_dropped: usize,
    pub session_links: usize,
    pub issue_links: usize,
}
