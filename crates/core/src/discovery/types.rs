//! Types for the discovery pipeline.

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::magnet::MagnetError;

/// Label used for offers that match no quality tag.
pub const UNKNOWN_QUALITY: &str = "SD";

/// A search across providers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchRequest {
    /// Free-text query, or a magnet URI to open directly.
    pub query: String,
    /// Providers to search. All known providers when omitted.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub providers: Option<Vec<String>>,
}

impl SearchRequest {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            providers: None,
        }
    }

    pub fn with_providers<I, S>(mut self, providers: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.providers = Some(providers.into_iter().map(Into::into).collect());
        self
    }
}

/// An offer after seed and quality normalization.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NormalizedOffer {
    pub provider: String,
    pub name: String,
    pub magnet: String,
    pub size: String,
    pub seeds: u64,
    /// 1-based index into the quality tags, 0 when none matched.
    pub quality: u32,
    pub quality_label: String,
    /// Hex info hash, empty when the magnet carries none.
    pub hash: String,
}

/// One row of search output: every offer sharing a content hash.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReconciledResult {
    /// Sorted, comma-joined providers listing this content.
    pub provider: String,
    pub name: String,
    pub magnet: String,
    pub size: String,
    pub seeds: u64,
    pub quality: u32,
    pub quality_label: String,
    pub hash: String,
    /// Whether the result cache already holds this hash.
    #[serde(default)]
    pub cached: bool,
}

impl From<NormalizedOffer> for ReconciledResult {
    fn from(offer: NormalizedOffer) -> Self {
        Self {
            provider: offer.provider,
            name: offer.name,
            magnet: offer.magnet,
            size: offer.size,
            seeds: offer.seeds,
            quality: offer.quality,
            quality_label: offer.quality_label,
            hash: offer.hash,
            cached: false,
        }
    }
}

/// Results of a search plus everything that went wrong along the way.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SearchOutcome {
    /// Ranked results.
    pub results: Vec<ReconciledResult>,
    /// Providers that failed (provider -> error message).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub provider_errors: HashMap<String, String>,
    /// Hash groups that could not be merged (hash -> error message).
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub group_errors: HashMap<String, String>,
    /// How long the search took in milliseconds.
    pub duration_ms: u64,
}

impl SearchOutcome {
    /// No results, whether or not anything failed.
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// Output of the reconciler.
#[derive(Debug, Clone, Default)]
pub struct Reconciled {
    pub results: Vec<ReconciledResult>,
    pub group_errors: HashMap<String, String>,
}

/// Errors that can occur during discovery.
#[derive(Debug, Error)]
pub enum DiscoveryError {
    #[error("Search query is empty")]
    EmptyQuery,

    #[error("Invalid magnet query: {0}")]
    InvalidMagnet(#[from] MagnetError),

    #[error("Invalid seed count '{value}' for '{name}'")]
    InvalidSeeds { name: String, value: String },

    #[error("Failed to merge group {hash}: {source}")]
    MergeFailed {
        hash: String,
        #[source]
        source: MagnetError,
    },
}

/// Answers whether a content hash is already in the local result cache.
pub trait CachedLookup: Send + Sync {
    fn is_cached(&self, hash: &str) -> bool;
}
