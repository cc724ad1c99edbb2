//! SQLite storage implementation.
//!
//! `SqliteStorage` owns two long-lived connections to one database file:
//! a read-write connection for mutations and a read-only connection for
//! queries. Both use WAL so readers never wait on a writer's transaction.
//!
//! Every logical mutation goes through [`SqliteStorage::mutate`], which
//! wraps all of its statements in one IMMEDIATE transaction and writes the
//! audit events recorded in the [`MutationContext`].

use crate::error::{Error, Result};
use crate::storage::capabilities::SchemaCapabilities;
use crate::storage::events::{get_events, insert_event, Event, EventType};
use crate::storage::schema::apply_schema;
use rusqlite::{Connection, OpenFlags, Transaction};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{debug, info};

/// Busy timeout applied to both connections.
const BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// SQLite-based store with separate reader and writer connections.
#[derive(Debug)]
pub struct SqliteStorage {
    writer: Connection,
    reader: Connection,
    caps: SchemaCapabilities,
    path: PathBuf,
}

/// Context for a mutation operation, tracking side effects.
///
/// Passed to mutation closures so they can record audit events. Events are
/// written at the end of the transaction, and only if the database has an
/// `events` table.
pub struct MutationContext {
    /// Name of the operation being performed.
    pub op_name: String,
    /// Actor performing the operation (agent ID, user, etc.).
    pub actor: String,
    /// Schema capabilities of the connection running this mutation.
    pub caps: SchemaCapabilities,
    /// Events to write at the end of the transaction.
    pub events: Vec<Event>,
}

impl MutationContext {
    /// Create a new mutation context.
    #[must_use]
    pub fn new(op_name: &str, actor: &str, caps: SchemaCapabilities) -> Self {
        Self {
            op_name: op_name.to_string(),
            actor: actor.to_string(),
            caps,
            events: Vec::new(),
        }
    }

    /// Record an event for this operation.
    pub fn record_event(&mut self, entity_type: &str, entity_id: &str, event_type: EventType) {
        self.events
            .push(Event::new(entity_type, entity_id, event_type, &self.actor));
    }

    /// Record an event with old/new values for field tracking.
    pub fn record_change(
        &mut self,
        entity_type: &str,
        entity_id: &str,
        event_type: EventType,
        old_value: Option<String>,
        new_value: Option<String>,
    ) {
        self.events.push(
            Event::new(entity_type, entity_id, event_type, &self.actor)
                .with_values(old_value, new_value),
        );
    }
}

impl SqliteStorage {
    /// Open an existing database.
    ///
    /// Opens the read-write connection first (WAL, 5 second busy timeout),
    /// then a read-only connection, and probes schema capabilities once.
    ///
    /// # Errors
    ///
    /// Returns `DatabaseNotFound` if the file does not exist, or a database
    /// error if either connection cannot be established.
    pub fn open(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(Error::DatabaseNotFound {
                path: path.to_path_buf(),
            });
        }

        let writer = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        writer.busy_timeout(BUSY_TIMEOUT)?;
        writer.pragma_update(None, "journal_mode", "WAL")?;

        let reader = Connection::open_with_flags(
            path,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )?;
        reader.busy_timeout(BUSY_TIMEOUT)?;

        let caps = SchemaCapabilities::probe(&writer)?;
        debug!(path = %path.display(), ?caps, "Opened database");

        Ok(Self {
            writer,
            reader,
            caps,
            path: path.to_path_buf(),
        })
    }

    /// Create a new database with the current schema, then open it.
    ///
    /// The parent directory is created if needed. Applying the schema to an
    /// existing file is harmless: every statement is `IF NOT EXISTS`.
    ///
    /// # Errors
    ///
    /// Returns an error if the directory or database cannot be created.
    pub fn create(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        {
            let conn = Connection::open(path)?;
            apply_schema(&conn)?;
        }
        info!(path = %path.display(), "Created database");

        Self::open(path)
    }

    /// Close both connections, reporting the first close error.
    ///
    /// # Errors
    ///
    /// Returns a database error if either handle fails to close.
    pub fn close(self) -> Result<()> {
        let reader_result = self.reader.close().map_err(|(_, e)| Error::from(e));
        let writer_result = self.writer.close().map_err(|(_, e)| Error::from(e));
        reader_result.and(writer_result)
    }

    /// Path of the database file.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Schema capabilities probed at open.
    #[must_use]
    pub const fn capabilities(&self) -> SchemaCapabilities {
        self.caps
    }

    /// Re-probe schema capabilities, e.g. after an out-of-band migration.
    ///
    /// # Errors
    ///
    /// Returns an error if `sqlite_master` cannot be read.
    pub fn refresh_capabilities(&mut self) -> Result<SchemaCapabilities> {
        self.caps = SchemaCapabilities::probe(&self.writer)?;
        debug!(caps = ?self.caps, "Refreshed schema capabilities");
        Ok(self.caps)
    }

    /// The read-only connection used for queries.
    #[must_use]
    pub fn conn(&self) -> &Connection {
        &self.reader
    }

    /// Execute a mutation inside one IMMEDIATE transaction.
    ///
    /// 1. Begins the transaction (takes the write lock up front)
    /// 2. Runs the closure
    /// 3. Writes recorded audit events, if the `events` table exists
    /// 4. Commits
    ///
    /// Any error drops the transaction, which rolls back every statement.
    ///
    /// # Errors
    ///
    /// Returns the closure's error or any database error.
    pub fn mutate<F, R>(&mut self, op: &str, actor: &str, f: F) -> Result<R>
    where
        F: FnOnce(&Transaction, &mut MutationContext) -> Result<R>,
    {
        let tx = self
            .writer
            .transaction_with_behavior(rusqlite::TransactionBehavior::Immediate)?;

        let mut ctx = MutationContext::new(op, actor, self.caps);

        let result = f(&tx, &mut ctx)?;

        if self.caps.events {
            for event in &ctx.events {
                insert_event(&tx, event)?;
            }
        }

        tx.commit()?;
        debug!(op, actor, events = ctx.events.len(), "Mutation committed");

        Ok(result)
    }

    /// Audit events for one entity, newest first. Empty without an `events` table.
    ///
    /// # Errors
    ///
    /// Returns an error if the query fails.
    pub fn get_events(&self, entity_type: &str, entity_id: &str, limit: Option<u32>) -> Result<Vec<Event>> {
        if !self.caps.events {
            return Ok(Vec::new());
        }
        Ok(get_events(&self.reader, entity_type, entity_id, limit)?)
    }
}

/// Generate a prefixed random ID like `issue_1a2b3c4d5e6f`.
pub(crate) fn new_id(prefix: &str) -> String {
    format!("{prefix}_{}", &uuid::Uuid::new_v4().simple().to_string()[..12])
}

/// Current time in Unix milliseconds.
pub(crate) fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Convert a `COUNT(*)` result to `usize`.
pub(crate) fn count(n: i64) -> usize {
    usize::try_from(n).unwrap_or(0)
}

/// Build a `?, ?, ?` placeholder list.
pub(crate) fn placeholders(n: usize) -> String {
    vec!["?"; n].join(", ")
}

#[cfg(test)]
pub(crate) mod test_support {
    use super::*;
    use tempfile::TempDir;

    /// A store on a fresh current-schema database inside a temp dir.
    pub fn temp_storage() -> (TempDir, SqliteStorage) {
        let dir = TempDir::new().unwrap();
        let storage = SqliteStorage::create(&dir.path().join("test.db")).unwrap();
        (dir, storage)
    }

    /// A store on a legacy `tasks` database inside a temp dir.
    pub fn legacy_storage() -> (TempDir, SqliteStorage) {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("legacy.db");
        {
            let conn = Connection::open(&path).unwrap();
            crate::storage::schema::apply_legacy_schema(&conn).unwrap();
        }
        let storage = SqliteStorage::open(&path).unwrap();
        (dir, storage)
    }
}

#[cfg(test)]
mod tests {
    use super::test_support::temp_storage;
    use super::*;
    use crate::storage::capabilities::IssueSchema;

    #[test]
    fn test_open_missing_file_fails() {
        let dir = tempfile::TempDir::new().unwrap();
        let err = SqliteStorage::open(&dir.path().join("missing.db")).unwrap_err();
        assert!(matches!(err, Error::DatabaseNotFound { .. }));
        assert!(!dir.path().join("missing.db").exists());
    }

    #[test]
    fn test_create_then_open_probes_capabilities() {
        let (_dir, storage) = temp_storage();
        let caps = storage.capabilities();
        assert!(matches!(caps.issues, IssueSchema::Issues { has_labels: true, .. }));
        assert!(caps.session_projects);
        storage.close().unwrap();
    }

    #[test]
    fn test_create_makes_parent_directories() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("nested").join("deeper").join("sc.db");
        let storage = SqliteStorage::create(&path).unwrap();
        assert!(path.exists());
        assert_eq!(storage.path(), path.as_path());
    }

    #[test]
    fn test_reader_is_read_only() {
        let (_dir, storage) = temp_storage();
        let result = storage.conn().execute(
            "INSERT INTO projects (id, project_path, name, created_at, updated_at) VALUES ('p', '/p', 'p', 0, 0)",
            [],
        );
        assert!(result.is_err());
    }

    #[test]
    fn test_mutate_rolls_back_on_error() {
        let (_dir, mut storage) = temp_storage();

        let result: Result<()> = storage.mutate("failing_op", "tester", |tx, _ctx| {
            tx.execute(
                "INSERT INTO projects (id, project_path, name, created_at, updated_at) VALUES ('p1', '/p1', 'p1', 0, 0)",
                [],
            )?;
            Err(Error::Other("boom".into()))
        });
        assert!(result.is_err());

        let n: i64 = storage
            .conn()
            .query_row("SELECT COUNT(*) FROM projects", [], |r| r.get(0))
            .unwrap();
        assert_eq!(n, 0);
    }

    #[test]
    fn test_mutate_writes_events() {
        let (_dir, mut storage) = temp_storage();

        storage
            .mutate("touch", "tester", |_tx, ctx| {
                ctx.record_event("project", "proj_x", EventType::ProjectUpdated);
                Ok(())
            })
            .unwrap();

        let events = storage.get_events("project", "proj_x", None).unwrap();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].actor, "tester");
    }

    #[test]
    fn test_refresh_capabilities_sees_new_tables() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("bare.db");
        {
            let conn = Connection::open(&path).unwrap();
            conn.execute_batch("CREATE TABLE sessions (id TEXT PRIMARY KEY);").unwrap();
        }
        let mut storage = SqliteStorage::open(&path).unwrap();
        assert!(!storage.capabilities().plans);

        storage
            .mutate("migrate", "tester", |tx, _| {
                tx.execute_batch("CREATE TABLE plans (id TEXT PRIMARY KEY);")?;
                Ok(())
            })
            .unwrap();
        assert!(!storage.capabilities().plans);
        assert!(storage.refresh_capabilities().unwrap().plans);
    }

    #[test]
    fn test_new_id_shape() {
        let id = new_id("issue");
        assert!(id.starts_with("issue_"));
        assert_eq!(id.len(), "issue_".len() + 12);
    }
}
