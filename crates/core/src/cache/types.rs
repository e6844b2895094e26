//! Types for the result cache.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::discovery::ReconciledResult;

/// One cached resource.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CacheRecord {
    /// Query the result was found with.
    #[serde(default)]
    pub original_query: String,
    /// Comma-joined providers.
    #[serde(default)]
    pub provider: String,
    pub name: String,
    #[serde(default)]
    pub size: String,
    #[serde(default)]
    pub seeds: u64,
    /// Quality label, e.g. `1080p` or `SD`.
    #[serde(default)]
    pub quality: String,
    pub magnet: String,
    pub hash: String,
    #[serde(default = "Utc::now")]
    pub cached_at: DateTime<Utc>,
}

impl CacheRecord {
    /// Record for a search result found with `query`.
    pub fn from_result(query: &str, result: &ReconciledResult) -> Self {
        Self {
            original_query: query.to_string(),
            provider: result.provider.clone(),
            name: result.name.clone(),
            size: result.size.clone(),
            seeds: result.seeds,
            quality: result.quality_label.clone(),
            magnet: result.magnet.clone(),
            hash: result.hash.clone(),
            cached_at: Utc::now(),
        }
    }
}

/// Cache statistics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheStats {
    /// Total cached records.
    pub total_records: u64,
    /// Number of distinct providers across records.
    pub unique_providers: u32,
    /// Oldest entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub oldest_entry: Option<DateTime<Utc>>,
    /// Most recent entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub newest_entry: Option<DateTime<Utc>>,
}

/// Errors that can occur in cache operations.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Database error: {0}")]
    Database(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid record: {0}")]
    InvalidRecord(String),

    #[error("Internal error: {0}")]
    Internal(String),
}
