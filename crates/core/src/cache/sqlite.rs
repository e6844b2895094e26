//! SQLite-backed result cache implementation.

use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard, RwLock};

use rusqlite::{params, Connection};

use super::{CacheError, CacheRecord, CacheStats, ResultCache};
use crate::discovery::CachedLookup;

/// SQLite-backed result cache.
///
/// Writes go through the connection mutex. `contains` reads an in-memory
/// hash index so concurrent lookups never wait on the database.
pub struct SqliteCache {
    conn: Mutex<Connection>,
    index: RwLock<HashSet<String>>,
}

fn db_err(e: rusqlite::Error) -> CacheError {
    CacheError::Database(e.to_string())
}

fn key(hash: &str) -> String {
    hash.trim().to_uppercase()
}

impl SqliteCache {
    /// Open the cache database, creating the file and table if needed.
    pub fn new(path: &Path) -> Result<Self, CacheError> {
        let conn = Connection::open(path).map_err(db_err)?;
        Self::from_connection(conn)
    }

    /// Create an in-memory cache (useful for testing).
    pub fn in_memory() -> Result<Self, CacheError> {
        let conn = Connection::open_in_memory().map_err(db_err)?;
        Self::from_connection(conn)
    }

    fn from_connection(conn: Connection) -> Result<Self, CacheError> {
        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS cached_results (
                hash TEXT PRIMARY KEY,
                record TEXT NOT NULL,
                cached_at TEXT NOT NULL
            );

            CREATE INDEX IF NOT EXISTS idx_cached_results_cached_at ON cached_results(cached_at);
            "#,
        )
        .map_err(db_err)?;

        let hashes = {
            let mut stmt = conn
                .prepare("SELECT hash FROM cached_results")
                .map_err(db_err)?;
            let rows = stmt.query_map([], |row| row.get::<_, String>(0)).map_err(db_err)?;
            rows.collect::<Result<HashSet<_>, _>>().map_err(db_err)?
        };

        Ok(Self {
            conn: Mutex::new(conn),
            index: RwLock::new(hashes),
        })
    }

    fn conn(&self) -> Result<MutexGuard<'_, Connection>, CacheError> {
        self.conn
            .lock()
            .map_err(|_| CacheError::Internal("cache connection lock poisoned".to_string()))
    }

    fn with_index<T>(&self, f: impl FnOnce(&mut HashSet<String>) -> T) -> Result<T, CacheError> {
        let mut index = self
            .index
            .write()
            .map_err(|_| CacheError::Internal("cache index lock poisoned".to_string()))?;
        Ok(f(&mut index))
    }

    fn decode(json: &str) -> Result<CacheRecord, CacheError> {
        serde_json::from_str(json).map_err(|e| CacheError::Internal(format!("corrupt record: {}", e)))
    }
}

impl ResultCache for SqliteCache {
    fn save(&self, record: &CacheRecord) -> Result<(), CacheError> {
        let hash = key(&record.hash);
        if hash.is_empty() {
            return Err(CacheError::InvalidRecord("hash is empty".to_string()));
        }
        let json = serde_json::to_string(record)
            .map_err(|e| CacheError::InvalidRecord(e.to_string()))?;

        let conn = self.conn()?;
        conn.execute(
            "INSERT INTO cached_results (hash, record, cached_at) VALUES (?, ?, ?)
             ON CONFLICT(hash) DO UPDATE SET record = excluded.record, cached_at = excluded.cached_at",
            params![&hash, &json, record.cached_at.to_rfc3339()],
        )
        .map_err(db_err)?;

        self.with_index(|index| {
            index.insert(hash);
        })
    }

    fn get(&self, hash: &str) -> Result<CacheRecord, CacheError> {
        let hash = key(hash);
        let conn = self.conn()?;
        let json: String = conn
            .query_row(
                "SELECT record FROM cached_results WHERE hash = ?",
                params![&hash],
                |row| row.get(0),
            )
            .map_err(|e| match e {
                rusqlite::Error::QueryReturnedNoRows => CacheError::NotFound(hash.clone()),
                _ => db_err(e),
            })?;
        Self::decode(&json)
    }

    fn list(&self) -> Result<Vec<CacheRecord>, CacheError> {
        let conn = self.conn()?;
        let mut stmt = conn
            .prepare("SELECT record FROM cached_results ORDER BY cached_at DESC")
            .map_err(db_err)?;
        let rows = stmt
            .query_map([], |row| row.get::<_, String>(0))
            .map_err(db_err)?;

        let mut records = Vec::new();
        for row in rows {
            records.push(Self::decode(&row.map_err(db_err)?)?);
        }
        Ok(records)
    }

    fn contains(&self, hash: &str) -> Result<bool, CacheError> {
        let index = self
            .index
            .read()
            .map_err(|_| CacheError::Internal("cache index lock poisoned".to_string()))?;
        Ok(index.contains(&key(hash)))
    }

    fn remove(&self, hash: &str) -> Result<(), CacheError> {
        let hash = key(hash);
        let conn = self.conn()?;
        let removed = conn
            .execute("DELETE FROM cached_results WHERE hash = ?", params![&hash])
            .map_err(db_err)?;
        if removed == 0 {
            return Err(CacheError::NotFound(hash));
        }
        self.with_index(|index| {
            index.remove(&hash);
        })
    }

    fn clear(&self) -> Result<u64, CacheError> {
        let conn = self.conn()?;
        let removed = conn
            .execute("DELETE FROM cached_results", [])
            .map_err(db_err)?;
        self.with_index(|index| index.clear())?;
        Ok(removed as u64)
    }

    fn stats(&self) -> Result<CacheStats, CacheError> {
        let records = self.list()?;

        let providers: HashSet<&str> = records
            .iter()
            .flat_map(|r| r.provider.split(','))
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .collect();
        let dates = records.iter().map(|r| r.cached_at);

        Ok(CacheStats {
            total_records: records.len() as u64,
            unique_providers: providers.len() as u32,
            oldest_entry: dates.clone().min(),
            newest_entry: dates.max(),
        })
    }
}

impl CachedLookup for SqliteCache {
    fn is_cached(&self, hash: &str) -> bool {
        self.contains(hash).unwrap_or(false)
    }
}
