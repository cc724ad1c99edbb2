//! Context items, checkpoints and project memory.

use crate::error::{Error, Result};
use crate::model::context::check_value_size;
use crate::model::{
    Checkpoint, ContextItem, ContextItemInput, ItemCategory, ItemPriority, Memory, MemoryCategory,
    NewCheckpoint,
};
use crate::storage::events::EventType;
use crate::storage::sqlite::{new_id, now_ms, SqliteStorage};
use rusqlite::{Connection, OptionalExtension, ToSql};
use tracing::{debug, info};

const ITEM_COLUMNS: &str = "c.id, c.session_id, c.key, c.value, c.category, c.priority, c.channel, c.size, c.created_at, c.updated_at";

const CHECKPOINT_COLUMNS: &str =
    "id, session_id, name, description, git_status, git_branch, created_at, item_count";

const MEMORY_COLUMNS: &str = "id, project_path, key, value, category, created_at, updated_at";

fn map_item_row(row: &rusqlite::Row) -> rusqlite::Result<ContextItem> {
    Ok(ContextItem {
        id: row.get(0)?,
        session_id: row.get(1)?,
        key: row.get(2)?,
        value: row.get(3)?,
        category: row.get::<_, Option<String>>(4)?.unwrap_or_else(|| "note".to_string()),
        priority: row.get::<_, Option<String>>(5)?.unwrap_or_else(|| "normal".to_string()),
        channel: row.get(6)?,
        size: row.get::<_, Option<i64>>(7)?.unwrap_or(0),
        created_at: row.get(8)?,
        updated_at: row.get(9)?,
    })
}

fn map_checkpoint_row(row: &rusqlite::Row) -> rusqlite::Result<Checkpoint> {
    Ok(Checkpoint {
        id: row.get(0)?,
        session_id: row.get(1)?,
        name: row.get(2)?,
        description: row.get(3)?,
        git_status: row.get(4)?,
        git_branch: row.get(5)?,
        created_at: row.get(6)?,
        item_count: row.get::<_, Option<i64>>(7)?.unwrap_or(0),
    })
}

fn map_memory_row(row: &rusqlite::Row) -> rusqlite::Result<Memory> {
    Ok(Memory {
        id: row.get(0)?,
        project_path: row.get(1)?,
        key: row.get(2)?,
        value: row.get(3)?,
        category: row.get::<_, Option<String>>(4)?.unwrap_or_else(|| "command".to_string()),
        created_at: row.get(5)?,
        updated_at: row.get(6)?,
    })
}

fn require_session_exists(conn: &Connection, session_id: &str) -> Result<()> {
    let exists = conn
        .prepare_cached("SELECT 1 FROM sessions WHERE id = ?1")?
        .exists([session_id])?;
    if exists {
        Ok(())
    } else {
        Err(Error::SessionNotFound {
            id: session_id.to_string(),
        })
    }
}

fn require_key(key: &str) -> Result<&str> {
    let key = key.trim();
    if key.is_empty() {
        return Err(Error::InvalidArgument("Key cannot be empty".to_string()));
    }
    Ok(key)
}

impl SqliteStorage {
    // ================
    // Context Items
    // ================

    /// Save a context item, replacing any existing item with the same key.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for a missing or oversized value,
    /// or `SessionNotFound`.
    pub fn save_context_item(
        &mut self,
        session_id: &str,
        key: &str,
        input: &ContextItemInput,
        actor: &str,
    ) -> Result<ContextItem> {
        let key = require_key(key)?;
        let value = input
            .value
            .as_deref()
            .ok_or_else(|| Error::InvalidArgument("A value is required".to_string()))?;
        check_value_size(value)?;

        let category = input.category.unwrap_or(ItemCategory::Note);
        let priority = input.priority.unwrap_or(ItemPriority::Normal);
        let channel = input.channel.as_deref().unwrap_or("general");
        let size = i64::try_from(value.len()).unwrap_or(i64::MAX);
        let now = now_ms();

        self.mutate("save_context_item", actor, |tx, ctx| {
            require_session_exists(tx, session_id)?;

            tx.execute(
                "INSERT INTO context_items (id, session_id, key, value, category, priority, channel, size, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?9)
                 ON CONFLICT(session_id, key) DO UPDATE SET
                   value = excluded.value,
                   category = excluded.category,
                   priority = excluded.priority,
                   channel = excluded.channel,
                   size = excluded.size,
                   updated_at = excluded.updated_at",
                rusqlite::params![
                    new_id("item"),
                    session_id,
                    key,
                    value,
                    category.as_str(),
                    priority.as_str(),
                    channel,
                    size,
                    now
                ],
            )?;

            ctx.record_change("context_item", key, EventType::ItemSaved, None, Some(session_id.to_string()));
            Ok(())
        })?;

        debug!(session = session_id, key, size, "Saved context item");
        self.conn()
            .query_row(
                &format!("SELECT {ITEM_COLUMNS} FROM context_items c WHERE c.session_id = ?1 AND c.key = ?2"),
                [session_id, key],
                map_item_row,
            )
            .map_err(Error::from)
    }

    /// Context items for a session, most recently updated first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_context_items(
        &self,
        session_id: &str,
        category: Option<ItemCategory>,
        priority: Option<ItemPriority>,
        limit: Option<u32>,
    ) -> Result<Vec<ContextItem>> {
        let mut sql = format!("SELECT {ITEM_COLUMNS} FROM context_items c WHERE c.session_id = ?");
        let mut params: Vec<Box<dyn ToSql>> = vec![Box::new(session_id.to_string())];

        if let Some(category) = category {
            sql.push_str(" AND c.category = ?");
            params.push(Box::new(category.as_str()));
        }
        if let Some(priority) = priority {
            sql.push_str(" AND c.priority = ?");
            params.push(Box::new(priority.as_str()));
        }

        sql.push_str(" ORDER BY c.updated_at DESC, c.key");
        if let Some(limit) = limit {
            sql.push_str(" LIMIT ?");
            params.push(Box::new(limit));
        }

        let mut stmt = self.conn().prepare(&sql)?;
        let param_refs: Vec<&dyn ToSql> = params.iter().map(AsRef::as_ref).collect();
        let items = stmt
            .query_map(param_refs.as_slice(), map_item_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(items)
    }

    /// Update fields of an existing item. Returns rows changed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an oversized value.
    pub fn update_context_item(
        &mut self,
        session_id: &str,
        key: &str,
        input: &ContextItemInput,
        actor: &str,
    ) -> Result<usize> {
        let key = require_key(key)?;
        if let Some(value) = &input.value {
            check_value_size(value)?;
        }
        let size = input
            .value
            .as_ref()
            .map(|v| i64::try_from(v.len()).unwrap_or(i64::MAX));
        let now = now_ms();

        self.mutate("update_context_item", actor, |tx, ctx| {
            let changed = tx.execute(
                "UPDATE context_items SET
                   value = COALESCE(?1, value),
                   size = COALESCE(?2, size),
                   category = COALESCE(?3, category),
                   priority = COALESCE(?4, priority),
                   channel = COALESCE(?5, channel),
                   updated_at = ?6
                 WHERE session_id = ?7 AND key = ?8",
                rusqlite::params![
                    input.value,
                    size,
                    input.category.map(|c| c.as_str()),
                    input.priority.map(|p| p.as_str()),
                    input.channel,
                    now,
                    session_id,
                    key
                ],
            )?;

            if changed > 0 {
                ctx.record_change("context_item", key, EventType::ItemSaved, None, Some(session_id.to_string()));
            }
            Ok(changed)
        })
    }

    /// Delete an item and any checkpoint references to it. Returns items removed.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty key, or an error if the delete fails.
    pub fn delete_context_item(&mut self, session_id: &str, key: &str, actor: &str) -> Result<usize> {
        let key = require_key(key)?;
        self.mutate("delete_context_item", actor, |tx, ctx| {
            let item_id: Option<String> = tx
                .query_row(
                    "SELECT id FROM context_items WHERE session_id = ?1 AND key = ?2",
                    [session_id, key],
                    |row| row.get(0),
                )
                .optional()?;
            let Some(item_id) = item_id else {
                return Ok(0);
            };

            if ctx.caps.checkpoint_items {
                tx.execute(
                    "DELETE FROM checkpoint_items WHERE context_item_id = ?1",
                    [&item_id],
                )?;
            }
            let removed = tx.execute("DELETE FROM context_items WHERE id = ?1", [&item_id])?;

            ctx.record_change("context_item", key, EventType::ItemDeleted, Some(session_id.to_string()), None);
            Ok(removed)
        })
    }

    // ================
    // Checkpoints
    // ================

    /// Snapshot a session's items, or the subset named in `new.keys`.
    ///
    /// # Errors
    ///
    /// Returns `SessionNotFound`, `InvalidArgument` for unknown keys or an
    /// empty name, and `SchemaUnsupported` without `checkpoint_items`.
    pub fn create_checkpoint(&mut self, session_id: &str, new: &NewCheckpoint, actor: &str) -> Result<Checkpoint> {
        if !self.capabilities().checkpoint_items {
            return Err(Error::SchemaUnsupported {
                feature: "checkpoint items",
            });
        }
        let name = new.name.trim();
        if name.is_empty() {
            return Err(Error::InvalidArgument("Checkpoint name cannot be empty".to_string()));
        }

        let id = new_id("ckpt");
        let now = now_ms();

        self.mutate("create_checkpoint", actor, |tx, ctx| {
            require_session_exists(tx, session_id)?;

            let item_ids: Vec<String> = match &new.keys {
                None => {
                    let mut stmt = tx.prepare("SELECT id FROM context_items WHERE session_id = ?1")?;
                    stmt.query_map([session_id], |row| row.get(0))?
                        .collect::<std::result::Result<Vec<_>, _>>()?
                }
                Some(keys) => {
                    let mut ids: Vec<String> = Vec::with_capacity(keys.len());
                    let mut missing = Vec::new();
                    for key in keys {
                        let key = key.trim();
                        let found: Option<String> = tx
                            .query_row(
                                "SELECT id FROM context_items WHERE session_id = ?1 AND key = ?2",
                                [session_id, key],
                                |row| row.get(0),
                            )
                            .optional()?;
                        match found {
                            Some(item_id) if ids.contains(&item_id) => {}
                            Some(item_id) => ids.push(item_id),
                            None => missing.push(key),
                        }
                    }
                    if !missing.is_empty() {
                        return Err(Error::InvalidArgument(format!(
                            "No context items with keys: {}",
                            missing.join(", ")
                        )));
                    }
                    ids
                }
            };

            tx.execute(
                "INSERT INTO checkpoints (id, session_id, name, description, git_status, git_branch, item_count, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                rusqlite::params![
                    id,
                    session_id,
                    name,
                    new.description,
                    new.git_status,
                    new.git_branch,
                    i64::try_from(item_ids.len()).unwrap_or(i64::MAX),
                    now
                ],
            )?;

            for item_id in &item_ids {
                tx.execute(
                    "INSERT OR IGNORE INTO checkpoint_items (id, checkpoint_id, context_item_id) VALUES (?1, ?2, ?3)",
                    rusqlite::params![new_id("cpitem"), id, item_id],
                )?;
            }

            ctx.record_event("checkpoint", &id, EventType::CheckpointCreated);
            Ok(())
        })?;

        info!(id = %id, session = session_id, "Created checkpoint");
        self.get_checkpoint(&id)?
            .ok_or(Error::CheckpointNotFound { id })
    }

    /// List checkpoints, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_checkpoints(&self, session_id: Option<&str>, limit: Option<u32>) -> Result<Vec<Checkpoint>> {
        let limit = limit.unwrap_or(20);
        let checkpoints = if let Some(session_id) = session_id {
            let mut stmt = self.conn().prepare(&format!(
                "SELECT {CHECKPOINT_COLUMNS} FROM checkpoints WHERE session_id = ?1 ORDER BY created_at DESC LIMIT ?2"
            ))?;
            stmt.query_map(rusqlite::params![session_id, limit], map_checkpoint_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?
        } else {
            let mut stmt = self.conn().prepare(&format!(
                "SELECT {CHECKPOINT_COLUMNS} FROM checkpoints ORDER BY created_at DESC LIMIT ?1"
            ))?;
            stmt.query_map([limit], map_checkpoint_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?
        };
        Ok(checkpoints)
    }

    /// Get a checkpoint by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_checkpoint(&self, id: &str) -> Result<Option<Checkpoint>> {
        Ok(self
            .conn()
            .query_row(
                &format!("SELECT {CHECKPOINT_COLUMNS} FROM checkpoints WHERE id = ?1"),
                [id],
                map_checkpoint_row,
            )
            .optional()?)
    }

    /// Context items linked to a checkpoint. Empty without `checkpoint_items`.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_checkpoint_items(&self, checkpoint_id: &str) -> Result<Vec<ContextItem>> {
        if !self.capabilities().checkpoint_items {
            return Ok(Vec::new());
        }
        let mut stmt = self.conn().prepare(&format!(
            "SELECT {ITEM_COLUMNS} FROM context_items c
             JOIN checkpoint_items ci ON ci.context_item_id = c.id
             WHERE ci.checkpoint_id = ?1
             ORDER BY c.key"
        ))?;
        let items = stmt
            .query_map([checkpoint_id], map_item_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(items)
    }

    /// Delete a checkpoint and its join rows. Returns checkpoints removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn delete_checkpoint(&mut self, id: &str, actor: &str) -> Result<usize> {
        self.mutate("delete_checkpoint", actor, |tx, ctx| {
            if ctx.caps.checkpoint_items {
                tx.execute("DELETE FROM checkpoint_items WHERE checkpoint_id = ?1", [id])?;
            }
            let removed = tx.execute("DELETE FROM checkpoints WHERE id = ?1", [id])?;
            if removed > 0 {
                ctx.record_event("checkpoint", id, EventType::CheckpointDeleted);
            }
            Ok(removed)
        })
    }

    // ================
    // Project Memory
    // ================

    /// Save a memory entry, replacing any existing value for the key.
    ///
    /// # Errors
    ///
    /// Returns `InvalidArgument` for an empty key or oversized value, and
    /// `SchemaUnsupported` without a `project_memory` table.
    pub fn save_memory(
        &mut self,
        project_path: &str,
        key: &str,
        value: &str,
        category: MemoryCategory,
        actor: &str,
    ) -> Result<Memory> {
        if !self.capabilities().project_memory {
            return Err(Error::SchemaUnsupported {
                feature: "project memory",
            });
        }
        let key = require_key(key)?;
        check_value_size(value)?;
        let now = now_ms();

        self.mutate("save_memory", actor, |tx, ctx| {
            tx.execute(
                "INSERT INTO project_memory (id, project_path, key, value, category, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?6)
                 ON CONFLICT(project_path, key) DO UPDATE SET
                   value = excluded.value,
                   category = excluded.category,
                   updated_at = excluded.updated_at",
                rusqlite::params![new_id("mem"), project_path, key, value, category.as_str(), now],
            )?;
            ctx.record_change("memory", key, EventType::MemorySaved, None, Some(project_path.to_string()));
            Ok(())
        })?;

        self.get_memory(project_path, key)?.ok_or_else(|| {
            Error::Other(format!("Memory '{key}' missing after save"))
        })
    }

    /// Get one memory entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_memory(&self, project_path: &str, key: &str) -> Result<Option<Memory>> {
        if !self.capabilities().project_memory {
            return Ok(None);
        }
        Ok(self
            .conn()
            .query_row(
                &format!("SELECT {MEMORY_COLUMNS} FROM project_memory WHERE project_path = ?1 AND key = ?2"),
                [project_path, key],
                map_memory_row,
            )
            .optional()?)
    }

    /// Memory entries for a project, sorted by key.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn list_memory(&self, project_path: &str, category: Option<MemoryCategory>) -> Result<Vec<Memory>> {
        if !self.capabilities().project_memory {
            return Ok(Vec::new());
        }
        let mut sql = format!("SELECT {MEMORY_COLUMNS} FROM project_memory WHERE project_path = ?");
        let mut params: Vec<Box<dyn ToSql>> = vec![Box::new(project_path.to_string())];
        if let Some(category) = category {
            sql.push_str(" AND category = ?");
            params.push(Box::new(category.as_str()));
        }
        sql.push_str(" ORDER BY key");

        let mut stmt = self.conn().prepare(&sql)?;
        let param_refs: Vec<&dyn ToSql> = params.iter().map(AsRef::as_ref).collect();
        let memories = stmt
            .query_map(param_refs.as_slice(), map_memory_row)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(memories)
    }

    /// Delete a memory entry. Returns rows removed.
    ///
    /// # Errors
    ///
    /// Returns an error if the delete fails.
    pub fn delete_memory(&mut self, project_path: &str, key: &str, actor: &str) -> Result<usize> {
        if !self.capabilities().project_memory {
            return Ok(0);
        }
        self.mutate("delete_memory", actor, |tx, ctx| {
            let removed = tx.execute(
                "DELETE FROM project_memory WHERE project_path = ?1 AND key = ?2",
                [project_path, key],
            )?;
            if removed > 0 {
                ctx.record_change("memory", key, EventType::MemoryDeleted, Some(project_path.to_string()), None);
            }
            Ok(removed)
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::MAX_VALUE_BYTES;
    use crate::storage::sqlite::test_support::{legacy_storage, temp_storage};

    const ACTOR: &str = "tester";

    fn session(storage: &mut SqliteStorage) -> String {
        storage.create_session("s", None, Some("/p"), None, ACTOR).unwrap().id
    }

    #[test]
    fn test_save_upserts_by_key() {
        let (_dir, mut storage) = temp_storage();
        let sid = session(&mut storage);

        let first = storage
            .save_context_item(&sid, "auth", &ContextItemInput::value("jwt"), ACTOR)
            .unwrap();
        let second = storage
            .save_context_item(
                &sid,
                "auth",
                &ContextItemInput::value("sessions").with_category(ItemCategory::Decision),
                ACTOR,
            )
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(second.value, "sessions");
        assert_eq!(second.category, "decision");
        assert_eq!(second.size, 8);
        assert_eq!(storage.get_context_items(&sid, None, None, None).unwrap().len(), 1);
    }

    #[test]
    fn test_save_validates() {
        let (_dir, mut storage) = temp_storage();
        let sid = session(&mut storage);

        let big = "x".repeat(MAX_VALUE_BYTES + 1);
        assert!(matches!(
            storage.save_context_item(&sid, "big", &ContextItemInput::value(&big), ACTOR),
            Err(Error::InvalidArgument(_))
        ));
        assert!(matches!(
            storage.save_context_item("sess_missing", "k", &ContextItemInput::value("v"), ACTOR),
            Err(Error::SessionNotFound { .. })
        ));
        assert!(storage
            .save_context_item(&sid, "  ", &ContextItemInput::value("v"), ACTOR)
            .is_err());
    }

    #[test]
    fn test_filter_update_and_delete_items() {
        let (_dir, mut storage) = temp_storage();
        let sid = session(&mut storage);
        storage
            .save_context_item(
                &sid,
                "a",
                &ContextItemInput::value("1").with_priority(ItemPriority::High),
                ACTOR,
            )
            .unwrap();
        storage
            .save_context_item(&sid, "b", &ContextItemInput::value("2"), ACTOR)
            .unwrap();

        let high = storage
            .get_context_items(&sid, None, Some(ItemPriority::High), None)
            .unwrap();
        assert_eq!(high.len(), 1);
        assert_eq!(high[0].key, "a");

        let changed = storage
            .update_context_item(&sid, "b", &ContextItemInput::value("22"), ACTOR)
            .unwrap();
        assert_eq!(changed, 1);
        assert_eq!(
            storage
                .update_context_item(&sid, "nope", &ContextItemInput::value("x"), ACTOR)
                .unwrap(),
            0
        );

        assert_eq!(storage.delete_context_item(&sid, "a", ACTOR).unwrap(), 1);
        assert_eq!(storage.delete_context_item(&sid, "a", ACTOR).unwrap(), 0);
        let rest = storage.get_context_items(&sid, None, None, Some(10)).unwrap();
        assert_eq!(rest.len(), 1);
        assert_eq!(rest[0].value, "22");
    }

    #[test]
    fn test_checkpoint_subset_and_delete() {
        let (_dir, mut storage) = temp_storage();
        let sid = session(&mut storage);
        for key in ["a", "b", "c"] {
            storage
                .save_context_item(&sid, key, &ContextItemInput::value(key), ACTOR)
                .unwrap();
        }

        let all = storage
            .create_checkpoint(&sid, &NewCheckpoint::named("all"), ACTOR)
            .unwrap();
        assert_eq!(all.item_count, 3);

        let mut subset = NewCheckpoint::named("subset");
        subset.keys = Some(vec!["a".into(), "c".into()]);
        let partial = storage.create_checkpoint(&sid, &subset, ACTOR).unwrap();
        let keys: Vec<String> = storage
            .get_checkpoint_items(&partial.id)
            .unwrap()
            .into_iter()
            .map(|i| i.key)
            .collect();
        assert_eq!(keys, vec!["a", "c"]);

        let mut bad = NewCheckpoint::named("bad");
        bad.keys = Some(vec!["zzz".into()]);
        assert!(matches!(
            storage.create_checkpoint(&sid, &bad, ACTOR),
            Err(Error::InvalidArgument(_))
        ));

        assert_eq!(storage.list_checkpoints(Some(&sid), None).unwrap().len(), 2);
        assert_eq!(storage.delete_checkpoint(&all.id, ACTOR).unwrap(), 1);
        assert!(storage.get_checkpoint(&all.id).unwrap().is_none());
        assert!(storage.get_checkpoint_items(&all.id).unwrap().is_empty());
    }

    #[test]
    fn test_keys_are_trimmed_on_update_and_delete() {
        let (_dir, mut storage) = temp_storage();
        let sid = session(&mut storage);
        storage
            .save_context_item(&sid, " k ", &ContextItemInput::value("1"), ACTOR)
            .unwrap();

        let changed = storage
            .update_context_item(&sid, " k ", &ContextItemInput::value("2"), ACTOR)
            .unwrap();
        assert_eq!(changed, 1);
        let items = storage.get_context_items(&sid, None, None, None).unwrap();
        assert_eq!(items[0].key, "k");
        assert_eq!(items[0].value, "2");

        assert_eq!(storage.delete_context_item(&sid, " k ", ACTOR).unwrap(), 1);
        assert!(matches!(
            storage.delete_context_item(&sid, "  ", ACTOR),
            Err(Error::InvalidArgument(_))
        ));
    }

    #[test]
    fn test_checkpoint_repeated_keys_count_once() {
        let (_dir, mut storage) = temp_storage();
        let sid = session(&mut storage);
        storage
            .save_context_item(&sid, "k", &ContextItemInput::value("v"), ACTOR)
            .unwrap();

        let mut new = NewCheckpoint::named("dupes");
        new.keys = Some(vec!["k".into(), "k".into(), " k".into()]);
        let cp = storage.create_checkpoint(&sid, &new, ACTOR).unwrap();

        assert_eq!(cp.item_count, 1);
        assert_eq!(storage.get_checkpoint_items(&cp.id).unwrap().len(), 1);
    }

    #[test]
    fn test_deleting_item_drops_checkpoint_refs() {
        let (_dir, mut storage) = temp_storage();
        let sid = session(&mut storage);
        storage
            .save_context_item(&sid, "a", &ContextItemInput::value("1"), ACTOR)
            .unwrap();
        let cp = storage
            .create_checkpoint(&sid, &NewCheckpoint::named("cp"), ACTOR)
            .unwrap();

        storage.delete_context_item(&sid, "a", ACTOR).unwrap();
        assert!(storage.get_checkpoint_items(&cp.id).unwrap().is_empty());
    }

    #[test]
    fn test_memory_upsert_and_filter() {
        let (_dir, mut storage) = temp_storage();
        storage
            .save_memory("/p", "test", "cargo test", MemoryCategory::Command, ACTOR)
            .unwrap();
        let updated = storage
            .save_memory("/p", "test", "cargo nextest run", MemoryCategory::Command, ACTOR)
            .unwrap();
        storage
            .save_memory("/p", "db", "postgres", MemoryCategory::Config, ACTOR)
            .unwrap();

        assert_eq!(updated.value, "cargo nextest run");
        assert_eq!(storage.list_memory("/p", None).unwrap().len(), 2);
        assert_eq!(
            storage.list_memory("/p", Some(MemoryCategory::Config)).unwrap()[0].key,
            "db"
        );
        assert_eq!(storage.delete_memory("/p", "db", ACTOR).unwrap(), 1);
        assert!(storage.get_memory("/p", "db").unwrap().is_none());
    }

    #[test]
    fn test_legacy_context_works() {
        let (_dir, mut storage) = legacy_storage();
        let sid = session(&mut storage);
        storage
            .save_context_item(&sid, "k", &ContextItemInput::value("v"), ACTOR)
            .unwrap();
        let cp = storage
            .create_checkpoint(&sid, &NewCheckpoint::named("cp"), ACTOR)
            .unwrap();
        assert_eq!(cp.item_count, 1);
    }
}
