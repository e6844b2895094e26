//! Result cache - resources the user has already chosen to open.
//!
//! One JSON record per content hash. Search results whose hash is in the
//! cache are flagged as already cached.

mod sqlite;
mod types;

pub use sqlite::SqliteCache;
pub use types::*;

/// Trait for result cache storage.
pub trait ResultCache: Send + Sync {
    /// Insert or replace the record for `record.hash`.
    fn save(&self, record: &CacheRecord) -> Result<(), CacheError>;

    /// Get the record for a hash (case-insensitive).
    fn get(&self, hash: &str) -> Result<CacheRecord, CacheError>;

    /// All records, most recently cached first.
    fn list(&self) -> Result<Vec<CacheRecord>, CacheError>;

    /// Whether a record exists for the hash.
    fn contains(&self, hash: &str) -> Result<bool, CacheError>;

    /// Remove the record for a hash.
    fn remove(&self, hash: &str) -> Result<(), CacheError>;

    /// Remove every record. Returns how many were removed.
    fn clear(&self) -> Result<u64, CacheError>;

    /// Cache statistics.
    fn stats(&self) -> Result<CacheStats, CacheError>;
}
