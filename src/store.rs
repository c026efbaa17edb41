// This Source Code Form is subject to the terms of the Mozilla Public
// License, v. 2.0. If a copy of the MPL was not distributed with this
// file, You can obtain one at https://mozilla.org/MPL/2.0/.

use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension, params};

use crate::error::StoreError;
use crate::feed::FeedRecord;

/// Persistent map from feed URL to its [`FeedRecord`]
///
/// Implementations must tolerate concurrent calls for different keys from
/// several tasks at once.
pub trait FeedStore: Send + Sync {
    fn get(&self, feed_url: &str) -> Result<Option<FeedRecord>, StoreError>;

    /// Insert or fully replace the record stored under `record.feed_url`
    fn put(&self, record: &FeedRecord) -> Result<(), StoreError>;

    /// Remove a record. Fails with [`StoreError::NotFound`] if absent.
    fn delete(&self, feed_url: &str) -> Result<(), StoreError>;

    /// All records in ascending key order
    fn list(&self) -> Result<Vec<FeedRecord>, StoreError>;
}

/// Run a store call on the blocking thread pool
///
/// Store implementations do synchronous I/O; async callers go through this so
/// a slow database never stalls other tasks on the runtime.
pub async fn run_blocking<S, T, F>(store: &Arc<S>, call: F) -> Result<T, StoreError>
where
    S: FeedStore + ?Sized + 'static,
    T: Send + 'static,
    F: FnOnce(&S) -> Result<T, StoreError> + Send + 'static,
{
    let store = Arc::clone(store);
    tokio::task::spawn_blocking(move || call(store.as_ref()))
        .await
        .map_err(StoreError::Blocking)?
}

const SCHEMA: &str = "CREATE TABLE IF NOT EXISTS feeds (
    key   TEXT PRIMARY KEY NOT NULL,
    value TEXT NOT NULL
)";

/// SQLite-backed key-value store holding one JSON value per feed
pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// Open (or create) the database file at `path`
    pub fn open(path: &Path) -> Result<Self, StoreError> {
        Self::with_connection(Connection::open(path)?)
    }

    pub fn open_in_memory() -> Result<Self, StoreError> {
        Self::with_connection(Connection::open_in_memory()?)
    }

    fn with_connection(conn: Connection) -> Result<Self, StoreError> {
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, StoreError> {
        self.conn.lock().map_err(|_| StoreError::LockPoisoned)
    }
}

impl FeedStore for SqliteStore {
    fn get(&self, feed_url: &str) -> Result<Option<FeedRecord>, StoreError> {
        let value: Option<String> = self
            .conn()?
            .query_row(
                "SELECT value FROM feeds WHERE key = ?1",
                params![feed_url],
                |row| row.get(0),
            )
            .optional()?;

        match value {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    fn put(&self, record: &FeedRecord) -> Result<(), StoreError> {
        let json = serde_json::to_string(record)?;
        self.conn()?.execute(
            "INSERT INTO feeds (key, value) VALUES (?1, ?2)
             ON CONFLICT(key) DO UPDATE SET value = excluded.value",
            params![record.feed_url, json],
        )?;
        tracing::debug!(feed_url = %record.feed_url, "stored feed record");
        Ok(())
    }

    fn delete(&self, feed_url: &str) -> Result<(), StoreError> {
        let removed = self
            .conn()?
            .execute("DELETE FROM feeds WHERE key = ?1", params![feed_url])?;

        if removed == 0 {
            return Err(StoreError::NotFound {
                key: feed_url.to_string(),
            });
        }
        Ok(())
    }

    fn list(&self) -> Result<Vec<FeedRecord>, StoreError> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT key, value FROM feeds ORDER BY key ASC")?;
        let rows = stmt.query_map([], |row| {
            Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
        })?;

        let mut records = Vec::new();
        for row in rows {
            let (key, json) = row?;
            match serde_json::from_str::<FeedRecord>(&json) {
                Ok(record) => records.push(record),
                Err(e) => {
                    tracing::warn!(key = %key, error = %e, "skipping undecodable feed record")
                }
            }
        }
        Ok(records)
    }
}
