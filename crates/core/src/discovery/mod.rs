//! Search fan-out, normalization and duplicate collapsing.
//!
//! A search runs one concurrent unit per (provider, extractor) pair. Each unit
//! extracts offers, resolves follow-links and normalizes seeds and quality.
//! Once every unit has finished, offers are collapsed by content hash and
//! ranked by quality, then seeds.

mod normalize;
mod orchestrator;
mod reconcile;
mod types;

pub use normalize::{normalize_offers, parse_seeds, quality_label, quality_tier};
pub use orchestrator::{DiscoveryOrchestrator, MAGNET_PROVIDER};
pub use reconcile::collapse;
pub use types::*;
