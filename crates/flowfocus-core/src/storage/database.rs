//! SQLite-based storage.
//!
//! Provides persistent storage for:
//! - Completed sessions (the record-session sink)
//! - Key-value store holding the timer snapshot

use std::path::Path;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

use super::{data_dir, KvStore, SessionSink};
use crate::error::StorageError;
use crate::events::CompletedSession;
use crate::timer::SessionType;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionRow {
    pub id: i64,
    pub session_type: SessionType,
    pub duration_secs: u64,
    pub completed_at: DateTime<Utc>,
}

/// SQLite database for session history and the snapshot record.
///
/// The connection sits behind a mutex so one handle can serve as both the
/// engine's snapshot backend and its session sink.
pub struct Database {
    conn: Mutex<Connection>,
}

impl Database {
    /// Open the database at `<data_dir>/flowfocus.db`.
    ///
    /// Creates the database file and schema if they don't exist.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open() -> Result<Self, StorageError> {
        Self::open_at(&data_dir()?.join("flowfocus.db"))
    }

    /// Open (or create) a database file at an explicit path.
    ///
    /// # Errors
    /// Returns an error if the database cannot be opened or migrated.
    pub fn open_at(path: &Path) -> Result<Self, StorageError> {
        let conn = Connection::open(path).map_err(|source| StorageError::OpenFailed {
            path: path.to_path_buf(),
            source,
        })?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    /// Open an in-memory database.
    ///
    /// # Errors
    /// Returns an error if the schema cannot be created.
    pub fn open_memory() -> Result<Self, StorageError> {
        let conn = Connection::open_in_memory()?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn with_conn<T>(
        &self,
        f: impl FnOnce(&Connection) -> Result<T, rusqlite::Error>,
    ) -> Result<T, StorageError> {
        let conn = self
            .conn
            .lock()
            .map_err(|e| StorageError::QueryFailed(format!("connection mutex poisoned: {e}")))?;
        f(&conn).map_err(StorageError::from)
    }

    fn migrate(&self) -> Result<(), StorageError> {
        self.with_conn(|conn| {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS sessions (
                    id            INTEGER PRIMARY KEY AUTOINCREMENT,
                    session_type  TEXT NOT NULL,
                    duration_secs INTEGER NOT NULL,
                    completed_at  TEXT NOT NULL
                );

                CREATE TABLE IF NOT EXISTS kv (
                    key   TEXT PRIMARY KEY,
                    value TEXT NOT NULL
                );

                CREATE INDEX IF NOT EXISTS idx_sessions_completed_at ON sessions(completed_at);",
            )
        })
    }

    /// Record a completed session.
    ///
    /// # Errors
    /// Returns an error if the insert fails.
    pub fn record_session(&self, session: &CompletedSession) -> Result<i64, StorageError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO sessions (session_type, duration_secs, completed_at)
                 VALUES (?1, ?2, ?3)",
                params![
                    session.session_type.as_str(),
                    session.duration_seconds,
                    session.completed_at.to_rfc3339(),
                ],
            )?;
            Ok(conn.last_insert_rowid())
        })
    }

    /// Most recent sessions first. Rows with unreadable columns are skipped.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn recent_sessions(&self, limit: usize) -> Result<Vec<SessionRow>, StorageError> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, session_type, duration_secs, completed_at
                 FROM sessions
                 ORDER BY completed_at DESC, id DESC
                 LIMIT ?1",
            )?;
            let rows = stmt.query_map(params![limit], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, u64>(2)?,
                    row.get::<_, String>(3)?,
                ))
            })?;

            let mut out = Vec::new();
            for row in rows {
                let (id, kind, duration_secs, completed_at) = row?;
                let Ok(session_type) = SessionType::parse(&kind) else {
                    continue;
                };
                let Ok(completed_at) = DateTime::parse_from_rfc3339(&completed_at) else {
                    continue;
                };
                out.push(SessionRow {
                    id,
                    session_type,
                    duration_secs,
                    completed_at: completed_at.with_timezone(&Utc),
                });
            }
            Ok(out)
        })
    }

    /// Get a value from the kv store.
    ///
    /// # Errors
    /// Returns an error if the query fails.
    pub fn kv_get(&self, key: &str) -> Result<Option<String>, StorageError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare("SELECT value FROM kv WHERE key = ?1")?;
            let result = stmt.query_row(params![key], |row| row.get::<_, String>(0));
            match result {
                Ok(v) => Ok(Some(v)),
                Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
                Err(e) => Err(e),
            }
        })
    }

    /// Set a value in the kv store.
    ///
    /// # Errors
    /// Returns an error if the write fails.
    pub fn kv_set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT OR REPLACE INTO kv (key, value) VALUES (?1, ?2)",
                params![key, value],
            )?;
            Ok(())
        })
    }
}

impl KvStore for Database {
    fn kv_get(&self, key: &str) -> Result<Option<String>, StorageError> {
        Database::kv_get(self, key)
    }

    fn kv_set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        Database::kv_set(self, key, value)
    }
}

impl<T: KvStore + Sync> KvStore for std::sync::Arc<T> {
    fn kv_get(&self, key: &str) -> Result<Option<String>, StorageError> {
        (**self).kv_get(key)
    }

    fn kv_set(&self, key: &str, value: &str) -> Result<(), StorageError> {
        (**self).kv_set(key, value)
    }
}

impl SessionSink for Database {
    fn record(&self, session: &CompletedSession) -> Result<(), StorageError> {
        self.record_session(session).map(|_| ())
    }
}
