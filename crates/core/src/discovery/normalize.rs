//! Seed and quality normalization of raw offers.

use crate::extractor::Offer;
use crate::magnet::info_hash_of;

use super::{DiscoveryError, NormalizedOffer, UNKNOWN_QUALITY};

/// Parse a seed count written with `,` or `.` thousands separators.
pub fn parse_seeds(value: &str) -> Option<u64> {
    value.trim().replace([',', '.'], "").parse().ok()
}

/// 1-based index of the first quality tag found in `name`, 0 when none is.
pub fn quality_tier(name: &str, qualities: &[String]) -> u32 {
    let name = name.to_lowercase();
    qualities
        .iter()
        .position(|q| name.contains(&q.to_lowercase()))
        .map_or(0, |i| i as u32 + 1)
}

/// Display label for a quality tier.
pub fn quality_label(tier: u32, qualities: &[String]) -> String {
    (tier as usize)
        .checked_sub(1)
        .and_then(|i| qualities.get(i))
        .cloned()
        .unwrap_or_else(|| UNKNOWN_QUALITY.to_string())
}

/// Normalize one provider's offers. Any unparsable seed count fails the batch.
pub fn normalize_offers(
    provider: &str,
    offers: Vec<Offer>,
    qualities: &[String],
) -> Result<Vec<NormalizedOffer>, DiscoveryError> {
    offers
        .into_iter()
        .map(|offer| {
            let seeds = parse_seeds(&offer.seeds).ok_or_else(|| DiscoveryError::InvalidSeeds {
                name: offer.name.clone(),
                value: offer.seeds.clone(),
            })?;
            let quality = quality_tier(&offer.name, qualities);

            Ok(NormalizedOffer {
                provider: offer
                    .source
                    .filter(|s| !s.is_empty())
                    .unwrap_or_else(|| provider.to_string()),
                hash: info_hash_of(&offer.magnet).unwrap_or_default(),
                quality_label: quality_label(quality, qualities),
                quality,
                seeds,
                name: offer.name,
                magnet: offer.magnet,
                size: offer.size,
            })
        })
        .collect()
}
