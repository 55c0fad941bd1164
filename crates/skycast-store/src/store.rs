//! SQLite-backed key/value store.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension};
use time::OffsetDateTime;
use tracing::{debug, info};

use skycast_types::CacheKey;

use crate::KeyValueStore;
use crate::error::{Error, Result};
use crate::schema;

/// SQLite-based store for cached forecast payloads.
///
/// The connection sits behind a mutex, so a `Store` can be shared between
/// threads and every operation on a key is linearizable.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    /// Open or create a database at the given path.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        if let Some(parent) = path.parent()
            && !parent.as_os_str().is_empty()
            && !parent.exists()
        {
            std::fs::create_dir_all(parent).map_err(|e| Error::CreateDirectory {
                path: parent.to_path_buf(),
                source: e,
            })?;
        }

        info!("Opening forecast cache at {}", path.display());
        let conn = Connection::open(path)?;

        conn.execute_batch(
            "PRAGMA journal_mode = WAL;
             PRAGMA synchronous = NORMAL;",
        )?;

        schema::initialize(&conn)?;

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Open the default database location.
    pub fn open_default() -> Result<Self> {
        Self::open(crate::default_db_path())
    }

    /// Open an in-memory database (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        schema::initialize(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>> {
        self.conn.lock().map_err(|_| Error::LockPoisoned)
    }

    /// Number of stored entries.
    pub fn len(&self) -> Result<u64> {
        let count: i64 =
            self.conn()?
                .query_row("SELECT COUNT(*) FROM cache_entries", [], |row| row.get(0))?;
        Ok(u64::try_from(count).unwrap_or(0))
    }

    /// Whether the store holds no entries.
    pub fn is_empty(&self) -> Result<bool> {
        Ok(self.len()? == 0)
    }

    /// All stored keys, sorted.
    pub fn keys(&self) -> Result<Vec<String>> {
        let conn = self.conn()?;
        let mut stmt = conn.prepare("SELECT key FROM cache_entries ORDER BY key")?;
        let keys = stmt
            .query_map([], |row| row.get(0))?
            .collect::<std::result::Result<Vec<String>, _>>()?;
        Ok(keys)
    }

    /// Stored keys that parse as forecast cache keys.
    ///
    /// Rows written under foreign keys are skipped.
    pub fn cache_keys(&self) -> Result<Vec<CacheKey>> {
        Ok(self
            .keys()?
            .iter()
            .filter_map(|k| k.parse().ok())
            .collect())
    }

    /// Unix timestamp of the last write to `key`.
    pub fn updated_at(&self, key: &str) -> Result<Option<i64>> {
        let updated = self
            .conn()?
            .query_row(
                "SELECT updated_at FROM cache_entries WHERE key = ?1",
                [key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(updated)
    }

    /// Delete every entry. Returns the number of rows removed.
    pub fn clear(&self) -> Result<usize> {
        let removed = self.conn()?.execute("DELETE FROM cache_entries", [])?;
        info!("Cleared {} cache entries", removed);
        Ok(removed)
    }
}

impl KeyValueStore for Store {
    fn get(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let payload = self
            .conn()?
            .query_row(
                "SELECT payload FROM cache_entries WHERE key = ?1",
                [key],
                |row| row.get(0),
            )
            .optional()?;
        Ok(payload)
    }

    fn set(&self, key: &str, value: &[u8]) -> Result<()> {
        let now = OffsetDateTime::now_utc().unix_timestamp();
        self.conn()?.execute(
            "INSERT INTO cache_entries (key, payload, updated_at) VALUES (?1, ?2, ?3)
             ON CONFLICT(key) DO UPDATE SET
                payload = excluded.payload,
                updated_at = excluded.updated_at",
            rusqlite::params![key, value, now],
        )?;
        debug!("Stored {} bytes under {}", value.len(), key);
        Ok(())
    }

    fn remove(&self, key: &str) -> Result<()> {
        let removed = self
            .conn()?
            .execute("DELETE FROM cache_entries WHERE key = ?1", [key])?;
        if removed > 0 {
            debug!("Removed {}", key);
        }
        Ok(())
    }
}
