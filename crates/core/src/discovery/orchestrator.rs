//! Concurrent search across providers.

use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;
use std::time::Instant;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::extractor::{Extractor, Offer};
use crate::magnet::{self, clean_display_name};
use crate::metrics::{PROVIDER_FAILURES, SEARCHES, SEARCH_DURATION, SEARCH_RESULTS};

use super::normalize::{normalize_offers, quality_label, quality_tier};
use super::reconcile::collapse;
use super::{
    CachedLookup, DiscoveryError, NormalizedOffer, ReconciledResult, SearchOutcome,
    SearchRequest,
};

/// Provider reported for results opened straight from a magnet query.
pub const MAGNET_PROVIDER: &str = "magnet";

/// Offers and failures gathered by concurrently running units.
#[derive(Default)]
struct Collected {
    offers: Vec<NormalizedOffer>,
    provider_errors: HashMap<String, String>,
}

impl Collected {
    /// Several units may fail for one provider; keep every message.
    fn record_error(&mut self, provider: String, message: String) {
        self.provider_errors
            .entry(provider)
            .and_modify(|existing| {
                existing.push_str("; ");
                existing.push_str(&message);
            })
            .or_insert(message);
    }
}

/// Fans a query out to every extractor that accepts the requested providers.
pub struct DiscoveryOrchestrator {
    extractors: Vec<Arc<dyn Extractor>>,
    qualities: Arc<Vec<String>>,
    caches: Vec<Arc<dyn CachedLookup>>,
}

impl DiscoveryOrchestrator {
    /// Create an orchestrator with no extractors.
    pub fn new(qualities: Vec<String>) -> Self {
        Self {
            extractors: Vec::new(),
            qualities: Arc::new(qualities),
            caches: Vec::new(),
        }
    }

    /// Register an extractor.
    pub fn with_extractor(mut self, extractor: Arc<dyn Extractor>) -> Self {
        self.extractors.push(extractor);
        self
    }

    /// Flag results already present in `cache`. A hash counts as cached
    /// when any registered lookup has it.
    pub fn with_cache(mut self, cache: Arc<dyn CachedLookup>) -> Self {
        self.caches.push(cache);
        self
    }

    /// Sorted union of the providers of all registered extractors.
    pub fn providers(&self) -> Vec<String> {
        let all: BTreeSet<String> = self
            .extractors
            .iter()
            .flat_map(|e| e.providers())
            .collect();
        all.into_iter().collect()
    }

    pub fn qualities(&self) -> &[String] {
        &self.qualities
    }

    /// Search the requested providers, or all of them when none are given.
    ///
    /// A magnet URI query is returned as a single result without contacting
    /// any provider. Provider failures are reported in the outcome and never
    /// fail the search.
    pub async fn search(&self, request: &SearchRequest) -> Result<SearchOutcome, DiscoveryError> {
        let start = Instant::now();
        let query = request.query.trim();
        if query.is_empty() {
            return Err(DiscoveryError::EmptyQuery);
        }

        if query.starts_with("magnet:") {
            let result = self.open_magnet(query)?;
            SEARCHES.with_label_values(&["magnet"]).inc();
            return Ok(SearchOutcome {
                results: vec![result],
                duration_ms: start.elapsed().as_millis() as u64,
                ..Default::default()
            });
        }

        let selected: BTreeSet<String> = match &request.providers {
            Some(providers) => providers.iter().cloned().collect(),
            None => self.providers().into_iter().collect(),
        };

        let collected = Arc::new(Mutex::new(Collected::default()));
        let mut units = Vec::new();

        for provider in &selected {
            let accepting: Vec<_> = self
                .extractors
                .iter()
                .filter(|e| e.accepts(provider))
                .cloned()
                .collect();

            if accepting.is_empty() {
                warn!(provider = %provider, "No extractor accepts provider");
                collected
                    .lock()
                    .await
                    .record_error(provider.clone(), format!("Unknown provider: {}", provider));
                continue;
            }

            for extractor in accepting {
                let provider = provider.clone();
                let query = query.to_string();
                let qualities = Arc::clone(&self.qualities);
                let collected = Arc::clone(&collected);
                units.push((
                    provider.clone(),
                    tokio::spawn(async move {
                        run_unit(extractor, provider, query, qualities, collected).await;
                    }),
                ));
            }
        }

        debug!(units = units.len(), query = %query, "Waiting for search units");
        let (providers, handles): (Vec<_>, Vec<_>) = units.into_iter().unzip();
        let joined = futures::future::join_all(handles).await;

        let mut collected = std::mem::take(&mut *collected.lock().await);
        for (provider, result) in providers.into_iter().zip(joined) {
            if let Err(e) = result {
                warn!(provider = %provider, error = %e, "Search unit aborted");
                collected.record_error(provider, format!("Search unit aborted: {}", e));
            }
        }

        let mut reconciled = collapse(collected.offers);
        for result in &mut reconciled.results {
            result.cached = self.is_cached(&result.hash);
        }

        let elapsed = start.elapsed();
        let outcome = SearchOutcome {
            results: reconciled.results,
            provider_errors: collected.provider_errors,
            group_errors: reconciled.group_errors,
            duration_ms: elapsed.as_millis() as u64,
        };

        let label = if !outcome.provider_errors.is_empty() {
            "partial"
        } else if outcome.is_empty() {
            "empty"
        } else {
            "success"
        };
        SEARCHES.with_label_values(&[label]).inc();
        SEARCH_DURATION.observe(elapsed.as_secs_f64());
        SEARCH_RESULTS.observe(outcome.results.len() as f64);

        info!(
            query = %query,
            results = outcome.results.len(),
            failed_providers = outcome.provider_errors.len(),
            duration_ms = outcome.duration_ms,
            "Search complete"
        );

        Ok(outcome)
    }

    fn open_magnet(&self, uri: &str) -> Result<ReconciledResult, DiscoveryError> {
        let descriptor = magnet::parse(uri)?;
        let name = descriptor
            .display_name
            .as_deref()
            .map(clean_display_name)
            .filter(|n| !n.is_empty())
            .unwrap_or_else(|| format!("Torrent-{}", descriptor.info_hash));

        let quality = quality_tier(&name, &self.qualities);
        Ok(ReconciledResult {
            provider: MAGNET_PROVIDER.to_string(),
            quality_label: quality_label(quality, &self.qualities),
            quality,
            cached: self.is_cached(&descriptor.info_hash),
            name,
            magnet: uri.to_string(),
            size: String::new(),
            seeds: 0,
            hash: descriptor.info_hash,
        })
    }

    fn is_cached(&self, hash: &str) -> bool {
        !hash.is_empty() && self.caches.iter().any(|c| c.is_cached(hash))
    }
}

/// One (provider, extractor) unit: extract, follow links, normalize, collect.
async fn run_unit(
    extractor: Arc<dyn Extractor>,
    provider: String,
    query: String,
    qualities: Arc<Vec<String>>,
    collected: Arc<Mutex<Collected>>,
) {
    let offers = match extractor.extract(&provider, &query).await {
        Ok(offers) => offers,
        Err(e) => {
            warn!(provider = %provider, extractor = extractor.name(), error = %e, "Provider search failed");
            PROVIDER_FAILURES.with_label_values(&[provider.as_str()]).inc();
            collected
                .lock()
                .await
                .record_error(provider, e.to_string());
            return;
        }
    };

    let offers = resolve_links(extractor.as_ref(), &provider, offers).await;

    match normalize_offers(&provider, offers, &qualities) {
        Ok(mut normalized) => {
            debug!(provider = %provider, offers = normalized.len(), "Provider search complete");
            collected.lock().await.offers.append(&mut normalized);
        }
        Err(e) => {
            warn!(provider = %provider, error = %e, "Failed to normalize provider results");
            PROVIDER_FAILURES.with_label_values(&[provider.as_str()]).inc();
            collected
                .lock()
                .await
                .record_error(provider, e.to_string());
        }
    }
}

/// Replace follow-links and http magnet fields with resolved magnets.
/// Offers that cannot be resolved are dropped with a warning.
async fn resolve_links(extractor: &dyn Extractor, provider: &str, offers: Vec<Offer>) -> Vec<Offer> {
    let mut resolved = Vec::with_capacity(offers.len());
    for mut offer in offers {
        let link = if offer.needs_follow() {
            offer.link.clone()
        } else if offer.magnet.starts_with("http://") || offer.magnet.starts_with("https://") {
            Some(offer.magnet.clone())
        } else {
            None
        };

        if let Some(link) = link {
            match extractor.follow(provider, &link).await {
                Ok(magnet) => offer.magnet = magnet,
                Err(e) => {
                    warn!(provider = %provider, link = %link, error = %e, "Dropping offer with unresolvable link");
                    continue;
                }
            }
        }
        resolved.push(offer);
    }
    resolved
}
