//! Mock extractor for testing.

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::extractor::{ExtractError, Extractor, Offer};

/// Mock implementation of the Extractor trait.
///
/// Provides controllable behavior for testing:
/// - Per-provider offers and failures
/// - Follow-link resolution table
/// - Recorded extract and follow calls
/// - Optional delay to exercise concurrency
///
/// # Example
///
/// ```rust,ignore
/// use reelstream_core::testing::{MockExtractor, fixtures};
///
/// let extractor = MockExtractor::new(&["alpha"]);
/// extractor.set_offers("alpha", vec![fixtures::offer("Sintel 1080p", "abc123", "12")]).await;
///
/// let offers = extractor.extract("alpha", "sintel").await?;
/// assert_eq!(offers.len(), 1);
/// assert_eq!(extractor.extract_calls().await.len(), 1);
/// ```
#[derive(Debug)]
pub struct MockExtractor {
    providers: Vec<String>,
    offers: Arc<RwLock<HashMap<String, Vec<Offer>>>>,
    errors: Arc<RwLock<HashMap<String, ExtractError>>>,
    follow_links: Arc<RwLock<HashMap<String, String>>>,
    extract_calls: Arc<RwLock<Vec<(String, String)>>>,
    follow_calls: Arc<RwLock<Vec<String>>>,
    delay: Arc<RwLock<Option<Duration>>>,
}

impl MockExtractor {
    /// Create a mock serving `providers` with no offers.
    pub fn new(providers: &[&str]) -> Self {
        Self {
            providers: providers.iter().map(|p| p.to_string()).collect(),
            offers: Arc::new(RwLock::new(HashMap::new())),
            errors: Arc::new(RwLock::new(HashMap::new())),
            follow_links: Arc::new(RwLock::new(HashMap::new())),
            extract_calls: Arc::new(RwLock::new(Vec::new())),
            follow_calls: Arc::new(RwLock::new(Vec::new())),
            delay: Arc::new(RwLock::new(None)),
        }
    }

    /// Set the offers returned for `provider`.
    pub async fn set_offers(&self, provider: &str, offers: Vec<Offer>) {
        self.offers.write().await.insert(provider.to_string(), offers);
    }

    /// Make every search of `provider` fail with `error`.
    pub async fn set_error(&self, provider: &str, error: ExtractError) {
        self.errors.write().await.insert(provider.to_string(), error);
    }

    /// Resolve `link` to `magnet` on follow.
    pub async fn set_follow(&self, link: &str, magnet: &str) {
        self.follow_links
            .write()
            .await
            .insert(link.to_string(), magnet.to_string());
    }

    /// Delay every extract call.
    pub async fn set_delay(&self, delay: Duration) {
        *self.delay.write().await = Some(delay);
    }

    /// Recorded (provider, query) pairs.
    pub async fn extract_calls(&self) -> Vec<(String, String)> {
        self.extract_calls.read().await.clone()
    }

    /// Recorded follow-links.
    pub async fn follow_calls(&self) -> Vec<String> {
        self.follow_calls.read().await.clone()
    }
}

#[async_trait]
impl Extractor for MockExtractor {
    fn name(&self) -> &str {
        "mock"
    }

    fn providers(&self) -> Vec<String> {
        self.providers.clone()
    }

    async fn extract(&self, provider: &str, query: &str) -> Result<Vec<Offer>, ExtractError> {
        self.extract_calls
            .write()
            .await
            .push((provider.to_string(), query.to_string()));

        let delay = *self.delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if !self.accepts(provider) {
            return Err(ExtractError::UnsupportedProvider(provider.to_string()));
        }
        if let Some(e) = self.errors.read().await.get(provider) {
            return Err(e.clone());
        }
        Ok(self
            .offers
            .read()
            .await
            .get(provider)
            .cloned()
            .unwrap_or_default())
    }

    async fn follow(&self, _provider: &str, link: &str) -> Result<String, ExtractError> {
        self.follow_calls.write().await.push(link.to_string());
        self.follow_links
            .read()
            .await
            .get(link)
            .cloned()
            .ok_or_else(|| ExtractError::NoMagnet(link.to_string()))
    }
}
