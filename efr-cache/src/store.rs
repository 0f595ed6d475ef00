//! Store implementations.

use crate::{schema, ResponseStore};
use anyhow::Context;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashMap;
use std::path::Path;
use std::sync::Mutex;

/// SQLite-backed store.
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) a cache database file, creating parent directories.
    pub fn open(path: impl AsRef<Path>) -> anyhow::Result<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("failed to create cache dir {}", parent.display()))?;
        }
        let conn = Connection::open(path)
            .with_context(|| format!("failed to open cache {}", path.display()))?;
        Self::with_connection(conn)
    }

    /// Create a store that lives only as long as this value.
    pub fn in_memory() -> anyhow::Result<Self> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> anyhow::Result<Self> {
        conn.execute_batch(schema::create_schema())?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> anyhow::Result<std::sync::MutexGuard<'_, Connection>> {
        self.conn
            .lock()
            .map_err(|_| anyhow::anyhow!("response cache lock poisoned"))
    }
}

impl ResponseStore for SqliteStore {
    fn get(
        &self,
        key: &str,
        now: DateTime<Utc>,
        max_age: Duration,
    ) -> anyhow::Result<Option<String>> {
        let oldest = (now - max_age).timestamp();
        let conn = self.conn()?;
        let body = conn
            .query_row(
                "SELECT body FROM responses WHERE request_key = ?1 AND stored_at >= ?2",
                params![key, oldest],
                |row| row.get(0),
            )
            .optional()?;
        Ok(body)
    }

    fn put(&self, key: &str, body: &str, now: DateTime<Utc>) -> anyhow::Result<()> {
        let conn = self.conn()?;
        conn.execute(
            "INSERT OR REPLACE INTO responses (request_key, body, stored_at)
             VALUES (?1, ?2, ?3)",
            params![key, body, now.timestamp()],
        )?;
        Ok(())
    }

    fn purge(&self, now: DateTime<Utc>, max_age: Duration) -> anyhow::Result<usize> {
        let oldest = (now - max_age).timestamp();
        let conn = self.conn()?;
        let removed = conn.execute("DELETE FROM responses WHERE stored_at < ?1", params![oldest])?;
        if removed > 0 {
            log::info!("Purged {} expired cached responses", removed);
        }
        Ok(removed)
    }
}

/// Process-local store, mainly for tests and one-off commands.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, (DateTime<Utc>, String)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.entries.lock().map(|e| e.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ResponseStore for MemoryStore {
    fn get(
        &self,
        key: &str,
        now: DateTime<Utc>,
        max_age: Duration,
    ) -> anyhow::Result<Option<String>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("response cache lock poisoned"))?;
        Ok(entries
            .get(key)
            .filter(|(stored_at, _)| *stored_at >= now - max_age)
            .map(|(_, body)| body.clone()))
    }

    fn put(&self, key: &str, body: &str, now: DateTime<Utc>) -> anyhow::Result<()> {
        self.entries
            .lock()
            .map_err(|_| anyhow::anyhow!("response cache lock poisoned"))?
            .insert(key.to_string(), (now, body.to_string()));
        Ok(())
    }

    fn purge(&self, now: DateTime<Utc>, max_age: Duration) -> anyhow::Result<usize> {
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow::anyhow!("response cache lock poisoned"))?;
        let before = entries.len();
        entries.retain(|_, (stored_at, _)| *stored_at >= now - max_age);
        Ok(before - entries.len())
    }
}
