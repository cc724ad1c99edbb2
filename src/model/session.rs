//! Session model for SaveContext.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Session lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SessionStatus {
    Active,
    Paused,
    Completed,
}

impl SessionStatus {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Completed => "completed",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "active" | "resume" | "resumed" => Ok(Self::Active),
            "paused" | "pause" => Ok(Self::Paused),
            "completed" | "complete" | "ended" | "archived" => Ok(Self::Completed),
            _ => Err(Error::InvalidArgument(format!(
                "Unknown session status '{s}'. Valid: active, paused, completed"
            ))),
        }
    }
}

/// A session record.
///
/// `additional_project_paths` holds junction paths other than the primary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Session {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub branch: Option<String>,
    pub channel: Option<String>,
    pub project_path: Option<String>,
    pub status: String,
    pub ended_at: Option<i64>,
    pub created_at: i64,
    pub updated_at: i64,
    #[serde(default)]
    pub additional_project_paths: Vec<String>,
}

/// Filters for session listing.
#[derive(Debug, Clone, Default)]
pub struct SessionFilter {
    /// Matches the primary path or any junction path.
    pub project_path: Option<String>,
    pub status: Option<SessionStatus>,
    /// Case-insensitive substring of name or description.
    pub search: Option<String>,
    pub limit: Option<u32>,
}

/// Outcome of removing a path from a session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPathRemoval {
    /// Junction rows deleted.
    pub removed: usize,
    /// Whether the removed path was the primary and the primary is now unset.
    pub primary_cleared: bool,
}

/// Rows removed by a session delete, per table.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeleteSessionCounts {
    pub checkpoint_items: usize,
    pub checkpoints: usize,
    pub context_items: usize,
    pub session_projects: usize,
    pub agent_sessions: usize,
    pub sessions: usize,
}

impl DeleteSessionCounts {
    #[must_use]
    pub fn total(&self) -> usize {
        self.checkpoint_items
            + self.checkpoints
            + self.context_items
            + self.session_projects
            + self.agent_sessions
            + self.sessions
    }
}
