//! Collapsing of duplicate offers by content hash.

use std::collections::{BTreeSet, HashMap};

use tracing::warn;

use crate::magnet;

use super::{NormalizedOffer, Reconciled, ReconciledResult};

/// Collapse offers sharing a content hash into one result each and rank them.
///
/// Offers with zero seeds are dropped first. Offers without a hash are never
/// collapsed. A group whose magnets cannot be merged is reported in
/// `group_errors` and left out; the other groups are unaffected.
///
/// Ranking is by quality tier, then seeds, both descending.
pub fn collapse(offers: Vec<NormalizedOffer>) -> Reconciled {
    let mut groups: Vec<Vec<NormalizedOffer>> = Vec::new();
    let mut by_hash: HashMap<String, usize> = HashMap::new();

    for offer in offers.into_iter().filter(|o| o.seeds > 0) {
        if offer.hash.is_empty() {
            groups.push(vec![offer]);
            continue;
        }
        let key = offer.hash.to_uppercase();
        match by_hash.get(&key) {
            Some(&idx) => groups[idx].push(offer),
            None => {
                by_hash.insert(key, groups.len());
                groups.push(vec![offer]);
            }
        }
    }

    let mut reconciled = Reconciled::default();
    for group in groups {
        if group.len() == 1 {
            reconciled
                .results
                .extend(group.into_iter().map(ReconciledResult::from));
            continue;
        }
        let hash = group[0].hash.clone();
        match merge_group(group) {
            Ok(result) => reconciled.results.push(result),
            Err(e) => {
                warn!(hash = %hash, error = %e, "Dropping group that failed to merge");
                reconciled.group_errors.insert(hash, e.to_string());
            }
        }
    }

    reconciled
        .results
        .sort_by(|a, b| b.quality.cmp(&a.quality).then(b.seeds.cmp(&a.seeds)));
    reconciled
}

fn merge_group(group: Vec<NormalizedOffer>) -> Result<ReconciledResult, magnet::MagnetError> {
    let magnets: Vec<&str> = group
        .iter()
        .filter(|o| {
            if o.magnet.is_empty() {
                warn!(name = %o.name, provider = %o.provider, "Empty magnet in merge group");
                false
            } else {
                true
            }
        })
        .map(|o| o.magnet.as_str())
        .collect();

    let merged = magnet::merge(&magnets)?;

    let providers: BTreeSet<&str> = group.iter().map(|o| o.provider.as_str()).collect();
    let providers = providers.into_iter().collect::<Vec<_>>().join(",");

    // First offer with the highest seed count.
    let mut best = &group[0];
    for offer in &group[1..] {
        if offer.seeds > best.seeds {
            best = offer;
        }
    }

    Ok(ReconciledResult {
        provider: providers,
        name: merged.display_name.unwrap_or_else(|| best.name.clone()),
        magnet: merged.uri,
        size: best.size.clone(),
        seeds: best.seeds,
        quality: best.quality,
        quality_label: best.quality_label.clone(),
        hash: best.hash.clone(),
        cached: false,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    const H: &str = "c12fe1c06bba254a9dc9f519b335aa7c1367a88a";

    fn offer(provider: &str, name: &str, magnet: &str, seeds: u64, quality: u32) -> NormalizedOffer {
        NormalizedOffer {
            provider: provider.to_string(),
            name: name.to_string(),
            magnet: magnet.to_string(),
            size: format!("{} MB", seeds),
            seeds,
            quality,
            quality_label: if quality == 0 { "SD".into() } else { format!("q{}", quality) },
            hash: magnet::info_hash_of(magnet).unwrap_or_default(),
        }
    }

    #[test]
    fn test_duplicate_collapse() {
        let a = offer(
            "alpha",
            "X S01E01 720p",
            &format!("magnet:?xt=urn:btih:{H}&dn=X+S01E01+720p&tr=udp%3A%2F%2Fone"),
            50,
            1,
        );
        let b = offer(
            "beta",
            "X S01E01 720p REPACK",
            &format!("magnet:?xt=urn:btih:{H}&dn=X+S01E01+720p+REPACK&tr=udp%3A%2F%2Ftwo"),
            80,
            1,
        );

        let out = collapse(vec![a, b]);

        assert!(out.group_errors.is_empty());
        assert_eq!(out.results.len(), 1);
        let r = &out.results[0];
        assert_eq!(r.seeds, 80);
        assert_eq!(r.size, "80 MB");
        assert_eq!(r.provider, "alpha,beta");
        assert_eq!(r.name, "X S01E01 720p");

        let merged = magnet::parse(&r.magnet).unwrap();
        assert!(merged.trackers.contains("udp://one"));
        assert!(merged.trackers.contains("udp://two"));
    }

    #[test]
    fn test_hash_grouping_ignores_case() {
        let a = offer("a", "A", &format!("magnet:?xt=urn:btih:{H}"), 5, 0);
        let b = offer(
            "b",
            "B",
            &format!("magnet:?xt=urn:btih:{}", H.to_uppercase()),
            9,
            0,
        );
        let out = collapse(vec![a, b]);
        assert_eq!(out.results.len(), 1);
        assert_eq!(out.results[0].provider, "a,b");
    }

    #[test]
    fn test_zero_seed_offers_are_dropped() {
        let dead = offer("a", "Dead", &format!("magnet:?xt=urn:btih:{H}"), 0, 3);
        let alive = offer("b", "Alive", "magnet:?xt=urn:btih:ffff", 1, 0);

        let out = collapse(vec![dead, alive]);
        assert_eq!(out.results.len(), 1);
        assert_eq!(out.results[0].name, "Alive");
    }

    #[test]
    fn test_offers_without_hash_stay_separate() {
        let a = offer("a", "One", "", 3, 0);
        let b = offer("b", "Two", "", 4, 0);
        let out = collapse(vec![a, b]);
        assert_eq!(out.results.len(), 2);
    }

    #[test]
    fn test_empty_magnet_in_group_is_skipped() {
        let mut hashless = offer("b", "Followed", "", 100, 0);
        hashless.hash = H.to_string();
        let a = offer("a", "Direct", &format!("magnet:?xt=urn:btih:{H}&dn=Direct"), 10, 0);

        let out = collapse(vec![a, hashless]);
        assert!(out.group_errors.is_empty());
        assert_eq!(out.results.len(), 1);
        assert_eq!(out.results[0].seeds, 100);
        assert_eq!(out.results[0].provider, "a,b");
        assert!(out.results[0].magnet.contains(H));
    }

    #[test]
    fn test_merge_failure_isolated_to_group() {
        // Two distinct xt hashes, so the magnet parser rejects it.
        let mut bad = offer("a", "Bad", "magnet:?xt=urn:btih:aaaa&xt=urn:btih:bbbb", 10, 0);
        bad.hash = "aaaa".to_string();
        let twin = offer("b", "Twin", "magnet:?xt=urn:btih:aaaa", 5, 0);
        let good = offer("c", "Good", "magnet:?xt=urn:btih:cccc", 7, 0);

        let out = collapse(vec![bad, twin, good]);

        assert_eq!(out.results.len(), 1);
        assert_eq!(out.results[0].name, "Good");
        assert!(out.group_errors.contains_key("aaaa"));
    }

    #[test]
    fn test_ranking_quality_then_seeds() {
        let offers = vec![
            offer("p", "hd-few", "magnet:?xt=urn:btih:01", 5, 2),
            offer("p", "sd-many", "magnet:?xt=urn:btih:02", 500, 0),
            offer("p", "hd-many", "magnet:?xt=urn:btih:03", 50, 2),
            offer("p", "uhd", "magnet:?xt=urn:btih:04", 1, 3),
        ];

        let names: Vec<_> = collapse(offers)
            .results
            .into_iter()
            .map(|r| r.name)
            .collect();
        assert_eq!(names, vec!["uhd", "hd-many", "hd-few", "sd-many"]);
    }

    #[test]
    fn test_representative_is_first_max() {
        let a = offer("a", "A", &format!("magnet:?xt=urn:btih:{H}&dn=A"), 20, 1);
        let mut b = offer("b", "B", &format!("magnet:?xt=urn:btih:{H}&dn=B"), 20, 2);
        b.size = "other".to_string();

        let out = collapse(vec![a, b]);
        assert_eq!(out.results[0].quality, 1);
        assert_eq!(out.results[0].size, "20 MB");
    }
}
