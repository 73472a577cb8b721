//! SQLite catalog cache
//!
//! This module provides a SQLite-based implementation of the CatalogStore trait.

use crate::crawler::CatalogPayload;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{CatalogStore, PutOutcome, StorageError, StorageResult};
use crate::storage::{decide_put, CachedCatalogEntry};
use chrono::{DateTime, TimeZone, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// SQLite storage backend
///
/// A single connection guarded by a mutex; every write runs in its own
/// transaction so readers only ever see whole entries.
pub struct SqliteCatalogStore {
    conn: Mutex<Connection>,
}

impl SqliteCatalogStore {
    /// Opens or creates the cache database at `path`
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteCatalogStore)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;
        tracing::debug!("Opened catalog database at {}", path.display());

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn to_micros(at: DateTime<Utc>) -> i64 {
    at.timestamp_micros()
}

fn from_micros(micros: i64) -> StorageResult<DateTime<Utc>> {
    let secs = micros.div_euclid(1_000_000);
    let nanos = (micros.rem_euclid(1_000_000) * 1_000) as u32;
    Utc.timestamp_opt(secs, nanos)
        .single()
        .ok_or_else(|| StorageError::Database(format!("Invalid timestamp: {}", micros)))
}

fn row_to_entry(
    node_id: String,
    payload: String,
    last_updated: i64,
    expired: bool,
) -> StorageResult<CachedCatalogEntry> {
    Ok(CachedCatalogEntry {
        node_id,
        payload: serde_json::from_str(&payload)?,
        last_updated: from_micros(last_updated)?,
        expired,
    })
}

impl CatalogStore for SqliteCatalogStore {
    // ===== Writes =====

    fn put(
        &self,
        node_id: &str,
        payload: CatalogPayload,
        fetched_at: DateTime<Utc>,
    ) -> StorageResult<PutOutcome> {
        // Stored precision is microseconds, compare at that precision
        let fetched_at = from_micros(to_micros(fetched_at))?;

        let mut conn = self.lock();
        let tx = conn.transaction()?;

        let existing: Option<(String, i64, bool)> = tx
            .query_row(
                "SELECT payload, last_updated, expired FROM catalog_entries WHERE node_id = ?1",
                params![node_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
            )
            .optional()?;

        let existing = match existing {
            Some((text, micros, expired)) => Some((
                serde_json::from_str::<CatalogPayload>(&text)?,
                from_micros(micros)?,
                expired,
            )),
            None => None,
        };

        let outcome = decide_put(
            existing
                .as_ref()
                .map(|(current, last_updated, expired)| (current, *last_updated, *expired)),
            &payload,
            fetched_at,
        );

        if outcome.is_written() {
            tx.execute(
                "INSERT INTO catalog_entries (node_id, payload, last_updated, expired)
                 VALUES (?1, ?2, ?3, 0)
                 ON CONFLICT(node_id) DO UPDATE SET
                    payload = excluded.payload,
                    last_updated = excluded.last_updated,
                    expired = 0",
                params![node_id, serde_json::to_string(&payload)?, to_micros(fetched_at)],
            )?;
        }

        tx.commit()?;
        Ok(outcome)
    }

    fn remove(&self, node_id: &str) -> StorageResult<bool> {
        let removed = self.lock().execute(
            "DELETE FROM catalog_entries WHERE node_id = ?1",
            params![node_id],
        )?;
        Ok(removed > 0)
    }

    // ===== Reads =====

    fn get(&self, node_id: &str) -> StorageResult<Option<CachedCatalogEntry>> {
        let row: Option<(String, String, i64, bool)> = self
            .lock()
            .query_row(
                "SELECT node_id, payload, last_updated, expired
                 FROM catalog_entries WHERE node_id = ?1",
                params![node_id],
                |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)),
            )
            .optional()?;

        row.map(|(id, payload, micros, expired)| row_to_entry(id, payload, micros, expired))
            .transpose()
    }

    fn snapshot(&self) -> StorageResult<Vec<CachedCatalogEntry>> {
        let rows: Vec<(String, String, i64, bool)> = {
            let conn = self.lock();
            let mut stmt = conn.prepare(
                "SELECT node_id, payload, last_updated, expired
                 FROM catalog_entries ORDER BY node_id",
            )?;
            let rows = stmt
                .query_map([], |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?)))?
                .collect::<Result<Vec<_>, _>>()?;
            rows
        };

        rows.into_iter()
            .map(|(id, payload, micros, expired)| row_to_entry(id, payload, micros, expired))
            .collect()
    }

    fn node_ids(&self) -> StorageResult<Vec<String>> {
        let conn = self.lock();
        let mut stmt = conn.prepare("SELECT node_id FROM catalog_entries ORDER BY node_id")?;
        let ids = stmt
            .query_map([], |row| row.get(0))?
            .collect::<Result<Vec<String>, _>>()?;
        Ok(ids)
    }

    fn len(&self) -> StorageResult<usize> {
        let count: i64 =
            self.lock()
                .query_row("SELECT COUNT(*) FROM catalog_entries", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    // ===== Staleness =====

    fn expire_all(&self) -> StorageResult<usize> {
        Ok(self
            .lock()
            .execute("UPDATE catalog_entries SET expired = 1", [])?)
    }

    fn delete_expired(&self) -> StorageResult<usize> {
        Ok(self
            .lock()
            .execute("DELETE FROM catalog_entries WHERE expired = 1", [])?)
    }
}
