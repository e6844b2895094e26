//! Types for the extraction capability.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::retry::RetryAfter;

/// One raw result from one provider.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Offer {
    /// Title as listed by the provider.
    pub name: String,
    /// Magnet URI. Empty when `link` must be followed first.
    #[serde(default)]
    pub magnet: String,
    /// Human-readable size.
    #[serde(default)]
    pub size: String,
    /// Seed count as listed, possibly with thousands separators.
    #[serde(default)]
    pub seeds: String,
    /// Second-stage page that resolves to a magnet.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub link: Option<String>,
    /// Site the offer came from when the provider aggregates several sites.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,
}

impl Offer {
    /// Create an offer carrying a direct magnet.
    pub fn new(
        name: impl Into<String>,
        magnet: impl Into<String>,
        size: impl Into<String>,
        seeds: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            magnet: magnet.into(),
            size: size.into(),
            seeds: seeds.into(),
            link: None,
            source: None,
        }
    }

    /// Set a follow-link.
    pub fn with_link(mut self, link: impl Into<String>) -> Self {
        self.link = Some(link.into());
        self
    }

    /// Set the originating site.
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    /// Whether the magnet must be resolved from the follow-link first.
    pub fn needs_follow(&self) -> bool {
        self.magnet.is_empty() && self.link.as_deref().is_some_and(|l| !l.is_empty())
    }
}

/// Errors that can occur while extracting offers.
#[derive(Debug, Clone, Error)]
pub enum ExtractError {
    #[error("Provider not supported: {0}")]
    UnsupportedProvider(String),

    #[error("Request to {url} timed out")]
    Timeout { url: String },

    #[error("Connection to {url} failed: {reason}")]
    ConnectionFailed { url: String, reason: String },

    #[error("Too many requests to {url}")]
    RateLimited {
        url: String,
        retry_after: Option<Duration>,
    },

    #[error("Unexpected status {status} from {url}")]
    UnexpectedStatus { url: String, status: u16 },

    #[error("Malformed response from {url}: {reason}")]
    MalformedResponse { url: String, reason: String },

    #[error("Provider {0} does not support follow-links")]
    FollowUnsupported(String),

    #[error("No magnet found behind {0}")]
    NoMagnet(String),
}

impl RetryAfter for ExtractError {
    fn retry_after(&self) -> Option<Duration> {
        match self {
            ExtractError::RateLimited { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

/// A source of raw offers for one or more providers.
#[async_trait]
pub trait Extractor: Send + Sync {
    /// Extractor name for logging.
    fn name(&self) -> &str;

    /// Provider ids this extractor serves.
    fn providers(&self) -> Vec<String>;

    /// Whether this extractor serves `provider`.
    fn accepts(&self, provider: &str) -> bool {
        self.providers().iter().any(|p| p == provider)
    }

    /// Search `provider` for `query`.
    async fn extract(&self, provider: &str, query: &str) -> Result<Vec<Offer>, ExtractError>;

    /// Resolve a follow-link into a magnet URI.
    async fn follow(&self, provider: &str, link: &str) -> Result<String, ExtractError> {
        let _ = link;
        Err(ExtractError::FollowUnsupported(provider.to_string()))
    }
}
