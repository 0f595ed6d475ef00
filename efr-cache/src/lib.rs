//! Response cache for forecast API calls.
//!
//! A refresh cycle issues the same forecast request more than once when a
//! batch is re-run or when several commands run back to back. Successful
//! response bodies are kept here, keyed by a request fingerprint, and served
//! again while they are younger than the caller's expiry.
//!
//! # Stores
//!
//! - [`SqliteStore`] persists to a SQLite file (or memory) via `rusqlite`
//! - [`MemoryStore`] keeps entries in a process-local map
//!
//! # Usage
//!
//! ```rust
//! use chrono::{Duration, Utc};
//! use efr_cache::{ResponseStore, SqliteStore};
//!
//! let store = SqliteStore::in_memory().unwrap();
//! let now = Utc::now();
//! store.put("forecast?lat=45", "{}", now).unwrap();
//! let hit = store.get("forecast?lat=45", now, Duration::hours(1)).unwrap();
//! assert_eq!(hit.as_deref(), Some("{}"));
//! ```

pub mod schema;
mod store;

pub use store::{MemoryStore, SqliteStore};

use chrono::{DateTime, Duration, Utc};

/// Storage for cached response bodies.
///
/// Callers pass the current time explicitly so expiry is deterministic.
pub trait ResponseStore {
    /// Body stored under `key`, if it is at most `max_age` old at `now`.
    fn get(&self, key: &str, now: DateTime<Utc>, max_age: Duration)
        -> anyhow::Result<Option<String>>;

    /// Store `body` under `key`, replacing any older entry.
    fn put(&self, key: &str, body: &str, now: DateTime<Utc>) -> anyhow::Result<()>;

    /// Drop every entry older than `max_age` at `now`; returns how many went.
    fn purge(&self, now: DateTime<Utc>, max_age: Duration) -> anyhow::Result<usize>;
}
