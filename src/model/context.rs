//! Context items, checkpoints and project memory.

use serde::{Deserialize, Serialize};
use std::str::FromStr;

use crate::error::Error;

/// Maximum size of a context item value, in bytes.
pub const MAX_VALUE_BYTES: usize = 100_000;

/// Context item category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemCategory {
    Reminder,
    Decision,
    Progress,
    Note,
}

impl ItemCategory {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Reminder => "reminder",
            Self::Decision => "decision",
            Self::Progress => "progress",
            Self::Note => "note",
        }
    }
}

impl FromStr for ItemCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "reminder" => Ok(Self::Reminder),
            "decision" => Ok(Self::Decision),
            "progress" => Ok(Self::Progress),
            "note" => Ok(Self::Note),
            _ => Err(Error::InvalidArgument(format!(
                "Unknown category '{s}'. Valid: reminder, decision, progress, note"
            ))),
        }
    }
}

/// Context item priority.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ItemPriority {
    High,
    Normal,
    Low,
}

impl ItemPriority {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::High => "high",
            Self::Normal => "normal",
            Self::Low => "low",
        }
    }
}

impl FromStr for ItemPriority {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "high" => Ok(Self::High),
            "normal" => Ok(Self::Normal),
            "low" => Ok(Self::Low),
            _ => Err(Error::InvalidArgument(format!(
                "Unknown item priority '{s}'. Valid: high, normal, low"
            ))),
        }
    }
}

/// Project memory category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryCategory {
    Command,
    Config,
    Note,
}

impl MemoryCategory {
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Command => "command",
            Self::Config => "config",
            Self::Note => "note",
        }
    }
}

impl FromStr for MemoryCategory {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "command" => Ok(Self::Command),
            "config" => Ok(Self::Config),
            "note" => Ok(Self::Note),
            _ => Err(Error::InvalidArgument(format!(
                "Unknown memory category '{s}'. Valid: command, config, note"
            ))),
        }
    }
}

/// A context item record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ContextItem {
    pub id: String,
    pub session_id: String,
    pub key: String,
    pub value: String,
    pub category: String,
    pub priority: String,
    pub channel: Option<String>,
    pub size: i64,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Fields accepted when saving or updating a context item.
#[derive(Debug, Clone, Default)]
pub struct ContextItemInput {
    pub value: Option<String>,
    pub category: Option<ItemCategory>,
    pub priority: Option<ItemPriority>,
    pub channel: Option<String>,
}

impl ContextItemInput {
    #[must_use]
    pub fn value(value: &str) -> Self {
        Self {
            value: Some(value.to_string()),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn with_category(mut self, category: ItemCategory) -> Self {
        self.category = Some(category);
        self
    }

    #[must_use]
    pub fn with_priority(mut self, priority: ItemPriority) -> Self {
        self.priority = Some(priority);
        self
    }
}

/// Reject values over [`MAX_VALUE_BYTES`].
///
/// # Errors
///
/// Returns `InvalidArgument` if the value is too large.
pub fn check_value_size(value: &str) -> crate::Result<()> {
    if value.len() > MAX_VALUE_BYTES {
        return Err(Error::InvalidArgument(format!(
            "Context value is {} bytes; the limit is {MAX_VALUE_BYTES}",
            value.len()
        )));
    }
    Ok(())
}

/// A checkpoint record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub session_id: String,
    pub name: String,
    pub description: Option<String>,
    pub git_status: Option<String>,
    pub git_branch: Option<String>,
    pub created_at: i64,
    pub item_count: i64,
}

/// Input for creating a checkpoint.
#[derive(Debug, Clone, Default)]
pub struct NewCheckpoint {
    pub name: String,
    pub description: Option<String>,
    pub git_branch: Option<String>,
    pub git_status: Option<String>,
    /// Restrict the snapshot to these keys. `None` links every item.
    pub keys: Option<Vec<String>>,
}

impl NewCheckpoint {
    #[must_use]
    pub fn named(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }
}

/// A memory record (project-level persistent storage).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: String,
    pub project_path: String,
    pub key: String,
    pub value: String,
    pub category: String,
    pub created_at: i64,
    pub updated_at: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_category_and_priority_parsing() {
        assert_eq!("Decision".parse::<ItemCategory>().unwrap(), ItemCategory::Decision);
        assert!("todo".parse::<ItemCategory>().is_err());
        assert_eq!("low".parse::<ItemPriority>().unwrap(), ItemPriority::Low);
        assert!("urgent".parse::<ItemPriority>().is_err());
        assert_eq!("config".parse::<MemoryCategory>().unwrap(), MemoryCategory::Config);
    }

    #[test]
    fn test_value_size_limit() {
        assert!(check_value_size(&"x".repeat(MAX_VALUE_BYTES)).is_ok());
        assert!(check_value_size(&"x".repeat(MAX_VALUE_BYTES + 1)).is_err());
    }
}
