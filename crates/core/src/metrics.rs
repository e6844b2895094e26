//! Prometheus metrics for core components.
//!
//! This module provides metrics for:
//! - Discovery (searches, provider failures, retries)
//! - Sessions and the stream endpoint

use once_cell::sync::Lazy;
use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts};

// =============================================================================
// Discovery Metrics
// =============================================================================

/// Searches by outcome.
pub static SEARCHES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("reelstream_searches_total", "Total searches"),
        &["outcome"], // "success", "partial", "empty", "magnet"
    )
    .unwrap()
});

/// Failed provider units by provider.
pub static PROVIDER_FAILURES: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new(
            "reelstream_provider_failures_total",
            "Provider units that failed during a search",
        ),
        &["provider"],
    )
    .unwrap()
});

/// Search duration in seconds.
pub static SEARCH_DURATION: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "reelstream_search_duration_seconds",
            "Duration of a fan-out search",
        )
        .buckets(vec![0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0, 60.0]),
    )
    .unwrap()
});

/// Reconciled results per search.
pub static SEARCH_RESULTS: Lazy<Histogram> = Lazy::new(|| {
    Histogram::with_opts(
        HistogramOpts::new(
            "reelstream_search_results",
            "Number of reconciled results per search",
        )
        .buckets(vec![0.0, 1.0, 5.0, 10.0, 25.0, 50.0, 100.0]),
    )
    .unwrap()
});

/// Retries after transient failures.
pub static RETRY_ATTEMPTS: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new(
        "reelstream_retry_attempts_total",
        "Retries after transient failures",
    )
    .unwrap()
});

// =============================================================================
// Session Metrics
// =============================================================================

pub static SESSIONS_OPENED: Lazy<IntCounter> = Lazy::new(|| {
    IntCounter::new("reelstream_sessions_opened_total", "Torrent sessions opened").unwrap()
});

/// Stream endpoint requests by response status.
pub static STREAM_REQUESTS: Lazy<IntCounterVec> = Lazy::new(|| {
    IntCounterVec::new(
        Opts::new("reelstream_stream_requests_total", "Stream endpoint requests"),
        &["status"],
    )
    .unwrap()
});

/// Get all core metrics for registration.
pub fn all_metrics() -> Vec<Box<dyn prometheus::core::Collector>> {
    vec![
        Box::new(SEARCHES.clone()),
        Box::new(PROVIDER_FAILURES.clone()),
        Box::new(SEARCH_DURATION.clone()),
        Box::new(SEARCH_RESULTS.clone()),
        Box::new(RETRY_ATTEMPTS.clone()),
        Box::new(SESSIONS_OPENED.clone()),
        Box::new(STREAM_REQUESTS.clone()),
    ]
}
