//! Audit event storage and retrieval.
//!
//! Events record every logical mutation. They are written inside the
//! mutation's transaction, and only when the database has an `events` table.

use rusqlite::{Connection, Result};

/// Event types for audit logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventType {
    // Session events
    SessionCreated,
    SessionUpdated,
    SessionPaused,
    SessionCompleted,
    SessionReactivated,
    SessionDeleted,
    SessionPathAdded,
    SessionPathRemoved,
    SessionPrimaryChanged,

    // Context item events
    ItemSaved,
    ItemDeleted,

    // Issue events
    IssueCreated,
    IssueUpdated,
    IssueClosed,
    IssueDeleted,
    IssueLabelsChanged,
    IssueDependencyAdded,
    IssueDependencyRemoved,
    IssueProjectAdded,
    IssueProjectRemoved,

    // Checkpoint events
    CheckpointCreated,
    CheckpointDeleted,

    // Plan events
    PlanCreated,
    PlanUpdated,

    // Memory events
    MemorySaved,
    MemoryDeleted,

    // Project events
    ProjectCreated,
    ProjectUpdated,
    ProjectDeleted,
    ProjectMerged,
}

const ALL_EVENT_TYPES: &[EventType] = &[
    EventType::SessionCreated,
    EventType::SessionUpdated,
    EventType::SessionPaused,
    EventType::SessionCompleted,
    EventType::SessionReactivated,
    EventType::SessionDeleted,
    EventType::SessionPathAdded,
    EventType::SessionPathRemoved,
    EventType::SessionPrimaryChanged,
    EventType::ItemSaved,
    EventType::ItemDeleted,
    EventType::IssueCreated,
    EventType::IssueUpdated,
    EventType::IssueClosed,
    EventType::IssueDeleted,
    EventType::IssueLabelsChanged,
    EventType::IssueDependencyAdded,
    EventType::IssueDependencyRemoved,
    EventType::IssueProjectAdded,
    EventType::IssueProjectRemoved,
    EventType::CheckpointCreated,
    EventType::CheckpointDeleted,
    EventType::PlanCreated,
    EventType::PlanUpdated,
    EventType::MemorySaved,
    EventType::MemoryDeleted,
    EventType::ProjectCreated,
    EventType::ProjectUpdated,
    EventType::ProjectDeleted,
    EventType::ProjectMerged,
];

impl EventType {
    /// Get the string representation for storage.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::SessionCreated => "session_created",
            Self::SessionUpdated => "session_updated",
            Self::SessionPaused => "session_paused",
            Self::SessionCompleted => "session_completed",
            Self::SessionReactivated => "session_reactivated",
            Self::SessionDeleted => "session_deleted",
            Self::SessionPathAdded => "session_path_added",
            Self::SessionPathRemoved => "session_path_removed",
            Self::SessionPrimaryChanged => "session_primary_changed",
            Self::ItemSaved => "item_saved",
            Self::ItemDeleted => "item_deleted",
            Self::IssueCreated => "issue_created",
            Self::IssueUpdated => "issue_updated",
            Self::IssueClosed => "issue_closed",
            Self::IssueDeleted => "issue_deleted",
            Self::IssueLabelsChanged => "issue_labels_changed",
            Self::IssueDependencyAdded => "issue_dependency_added",
            Self::IssueDependencyRemoved => "issue_dependency_removed",
            Self::IssueProjectAdded => "issue_project_added",
            Self::IssueProjectRemoved => "issue_project_removed",
            Self::CheckpointCreated => "checkpoint_created",
            Self::CheckpointDeleted => "checkpoint_deleted",
            Self::PlanCreated => "plan_created",
            Self::PlanUpdated => "plan_updated",
            Self::MemorySaved => "memory_saved",
            Self::MemoryDeleted => "memory_deleted",
            Self::ProjectCreated => "project_created",
            Self::ProjectUpdated => "project_updated",
            Self::ProjectDeleted => "project_deleted",
            Self::ProjectMerged => "project_merged",
        }
    }

    /// Parse a stored event type. Unknown strings yield `None`.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        ALL_EVENT_TYPES.iter().copied().find(|t| t.as_str() == s)
    }
}

/// An audit event record.
#[derive(Debug, Clone)]
pub struct Event {
    pub id: i64,
    pub entity_type: String,
    pub entity_id: String,
    pub event_type: EventType,
    pub actor: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub created_at: i64,
}

impl Event {
    /// Create a new event (id will be assigned by database).
    #[must_use]
    pub fn new(entity_type: &str, entity_id: &str, event_type: EventType, actor: &str) -> Self {
        Self {
            id: 0,
            entity_type: entity_type.to_string(),
            entity_id: entity_id.to_string(),
            event_type,
            actor: actor.to_string(),
            old_value: None,
            new_value: None,
            created_at: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Add old/new values for field change tracking.
    #[must_use]
    pub fn with_values(mut self, old: Option<String>, new: Option<String>) -> Self {
        self.old_value = old;
        self.new_value = new;
        self
    }
}

/// Insert an event into the database.
///
/// # Errors
///
/// Returns an error if the insert fails.
pub fn insert_event(conn: &Connection, event: &Event) -> Result<i64> {
    conn.execute(
        "INSERT INTO events (entity_type, entity_id, event_type, actor, old_value, new_value, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        rusqlite::params![
            event.entity_type,
            event.entity_id,
            event.event_type.as_str(),
            event.actor,
            event.old_value,
            event.new_value,
            event.created_at,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

/// Get events for an entity, newest first.
///
/// Rows with an unrecognized event type are skipped.
///
/// # Errors
///
/// Returns an error if the query fails.
pub fn get_events(
    conn: &Connection,
    entity_type: &str,
    entity_id: &str,
    limit: Option<u32>,
) -> Result<Vec<Event>> {
    let limit = limit.unwrap_or(100);
    let mut stmt = conn.prepare(
        "SELECT id, entity_type, entity_id, event_type, actor, old_value, new_value, created_at
         FROM events
         WHERE entity_type = ?1 AND entity_id = ?2
         ORDER BY created_at DESC, id DESC
         LIMIT ?3",
    )?;

    let rows = stmt.query_map(rusqlite::params![entity_type, entity_id, limit], |row| {
        let kind: String = row.get(3)?;
        // Event types written by newer versions are skipped
        let Some(event_type) = EventType::parse(&kind) else {
            return Ok(None);
        };
        Ok(Some(Event {
            id: row.get(0)?,
            entity_type: row.get(1)?,
            entity_id: row.get(2)?,
            event_type,
            actor: row.get(4)?,
            old_value: row.get(5)?,
            new_value: row.get(6)?,
            created_at: row.get(7)?,
        }))
    })?;

    let mut events = Vec::new();
    for row in rows {
        if let Some(event) = row? {
            events.push(event);
        }
    }
    Ok(events)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::schema::apply_schema;

    #[test]
    fn test_event_insert_and_get() {
        let conn = Connection::open_in_memory().unwrap();
        apply_schema(&conn).unwrap();

        let event = Event::new("session", "sess_123", EventType::SessionPrimaryChanged, "tester")
            .with_values(Some("/old".into()), None);

        let id = insert_event(&conn, &event).unwrap();
        assert!(id > 0);

        let events = get_events(&conn, "session", "sess_123", Some(10)).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].actor, "tester");
        assert_eq!(events[0].event_type, EventType::SessionPrimaryChanged);
        assert_eq!(events[0].old_value.as_deref(), Some("/old"));
        assert!(events[0].new_value.is_none());
    }

    #[test]
    fn test_event_type_parse_round_trips_every_variant() {
        for t in ALL_EVENT_TYPES {
            assert_eq!(EventType::parse(t.as_str()), Some(*t));
        }
        assert_eq!(EventType::parse("embedding_stored"), None);
    }
}
