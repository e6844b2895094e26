//! Magnet URI parser and merger.

use once_cell::sync::Lazy;
use regex_lite::Regex;
use url::Url;

use super::{MagnetDescriptor, MagnetError, BTIH_PREFIX};

static HASH_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"urn:btih:([a-fA-F0-9]+)").expect("hash pattern is valid")
});

/// Result of merging several magnet URIs that name the same content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedMagnet {
    /// The merged magnet URI.
    pub uri: String,
    /// Lexicographically smallest non-empty display name across the inputs.
    pub display_name: Option<String>,
    /// The merged descriptor.
    pub descriptor: MagnetDescriptor,
}

/// Parse a magnet URI.
pub fn parse(uri: &str) -> Result<MagnetDescriptor, MagnetError> {
    let parsed = Url::parse(uri).map_err(|e| MagnetError::MalformedUri {
        uri: uri.to_string(),
        reason: e.to_string(),
    })?;

    if parsed.scheme() != "magnet" {
        return Err(MagnetError::MalformedUri {
            uri: uri.to_string(),
            reason: format!("unexpected scheme '{}'", parsed.scheme()),
        });
    }

    let mut hash: Option<String> = None;
    let mut display_name: Option<String> = None;
    let mut descriptor = MagnetDescriptor::new(String::new());

    for (key, value) in parsed.query_pairs() {
        match key.as_ref() {
            "xt" => {
                let Some(candidate) = value.strip_prefix(BTIH_PREFIX) else {
                    continue;
                };
                if candidate.is_empty() {
                    continue;
                }
                match &hash {
                    None => hash = Some(candidate.to_string()),
                    Some(existing) if existing.eq_ignore_ascii_case(candidate) => {}
                    Some(existing) => {
                        return Err(MagnetError::ConflictingHash {
                            first: existing.clone(),
                            second: candidate.to_string(),
                        })
                    }
                }
            }
            "dn" => {
                if display_name.is_none() {
                    display_name = Some(value.into_owned());
                }
            }
            "tr" => {
                descriptor.trackers.insert(value.into_owned());
            }
            "ws" => {
                descriptor.web_seeds.insert(value.into_owned());
            }
            _ => {}
        }
    }

    descriptor.info_hash = hash.ok_or_else(|| MagnetError::MissingHash(uri.to_string()))?;
    descriptor.display_name = display_name;
    Ok(descriptor)
}

/// Merge magnet URIs that must all carry the same hash.
///
/// Trackers and web seeds are unioned. The display name is the smallest
/// non-empty `dn` so the result does not depend on input order.
pub fn merge<S: AsRef<str>>(uris: &[S]) -> Result<MergedMagnet, MagnetError> {
    let (first, rest) = uris.split_first().ok_or(MagnetError::EmptyMerge)?;

    let mut merged = parse(first.as_ref())?;
    let mut names: Vec<String> = merged.display_name.take().into_iter().collect();

    for uri in rest {
        let descriptor = parse(uri.as_ref())?;
        if !merged.same_hash(&descriptor.info_hash) {
            return Err(MagnetError::ConflictingHash {
                first: merged.info_hash,
                second: descriptor.info_hash,
            });
        }
        names.extend(descriptor.display_name);
        merged.trackers.extend(descriptor.trackers);
        merged.web_seeds.extend(descriptor.web_seeds);
    }

    let display_name = names.into_iter().filter(|n| !n.is_empty()).min();
    merged.display_name = display_name.clone();

    Ok(MergedMagnet {
        uri: merged.to_uri(),
        display_name,
        descriptor: merged,
    })
}

/// Extract the hex info hash from a `urn:btih:` parameter without a full parse.
pub fn info_hash_of(uri: &str) -> Option<String> {
    HASH_RE
        .captures(uri)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    const HASH: &str = "c12fe1c06bba254a9dc9f519b335aa7c1367a88a";

    fn set(items: &[&str]) -> BTreeSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_full_magnet() {
        let uri = format!(
            "magnet:?xt=urn:btih:{HASH}&dn=Big+Buck+Bunny&tr=udp%3A%2F%2Fa.example%3A80&tr=udp%3A%2F%2Fb.example%3A80&ws=https%3A%2F%2Fseed.example%2Fbbb"
        );
        let d = parse(&uri).unwrap();

        assert_eq!(d.info_hash, HASH);
        assert_eq!(d.display_name.as_deref(), Some("Big Buck Bunny"));
        assert_eq!(d.trackers, set(&["udp://a.example:80", "udp://b.example:80"]));
        assert_eq!(d.web_seeds, set(&["https://seed.example/bbb"]));
    }

    #[test]
    fn test_parse_keeps_first_display_name() {
        let uri = format!("magnet:?xt=urn:btih:{HASH}&dn=first&dn=second");
        assert_eq!(parse(&uri).unwrap().display_name.as_deref(), Some("first"));
    }

    #[test]
    fn test_parse_dedups_trackers() {
        let uri = format!("magnet:?xt=urn:btih:{HASH}&tr=udp%3A%2F%2Fa&tr=udp%3A%2F%2Fa");
        assert_eq!(parse(&uri).unwrap().trackers.len(), 1);
    }

    #[test]
    fn test_parse_wrong_scheme() {
        let err = parse(&format!("http://example.com/?xt=urn:btih:{HASH}")).unwrap_err();
        assert!(matches!(err, MagnetError::MalformedUri { .. }));
    }

    #[test]
    fn test_parse_not_a_uri() {
        let err = parse("not a uri at all").unwrap_err();
        assert!(matches!(err, MagnetError::MalformedUri { .. }));
    }

    #[test]
    fn test_parse_missing_hash() {
        let err = parse("magnet:?dn=nothing").unwrap_err();
        assert!(matches!(err, MagnetError::MissingHash(_)));
    }

    #[test]
    fn test_parse_ignores_non_btih_xt() {
        let err = parse("magnet:?xt=urn:sha1:abcdef").unwrap_err();
        assert!(matches!(err, MagnetError::MissingHash(_)));
    }

    #[test]
    fn test_parse_conflicting_hashes() {
        let err = parse("magnet:?xt=urn:btih:aaaa&xt=urn:btih:bbbb").unwrap_err();
        assert_eq!(
            err,
            MagnetError::ConflictingHash {
                first: "aaaa".to_string(),
                second: "bbbb".to_string(),
            }
        );
    }

    #[test]
    fn test_parse_repeated_hash_differing_only_in_case() {
        let d = parse("magnet:?xt=urn:btih:ABCD&xt=urn:btih:abcd").unwrap();
        assert_eq!(d.info_hash, "ABCD");
    }

    #[test]
    fn test_reserialized_magnet_keeps_hash_and_endpoints() {
        let uri = format!(
            "magnet:?tr=udp%3A%2F%2Fb&xt=urn:btih:{HASH}&ws=http%3A%2F%2Fw&tr=udp%3A%2F%2Fa"
        );
        let d = parse(&uri).unwrap();
        let again = parse(&d.to_uri()).unwrap();

        assert_eq!(again.info_hash, d.info_hash);
        assert_eq!(again.trackers, d.trackers);
        assert_eq!(again.web_seeds, d.web_seeds);
    }

    #[test]
    fn test_merge_empty_fails() {
        let empty: Vec<String> = vec![];
        assert_eq!(merge(&empty).unwrap_err(), MagnetError::EmptyMerge);
    }

    #[test]
    fn test_merge_unions_trackers() {
        let a = format!("magnet:?xt=urn:btih:{HASH}&dn=A&tr=udp%3A%2F%2Fa&tr=udp%3A%2F%2Fshared");
        let b = format!("magnet:?xt=urn:btih:{HASH}&dn=B&tr=udp%3A%2F%2Fb&tr=udp%3A%2F%2Fshared");

        let merged = merge(&[a, b]).unwrap();

        assert_eq!(
            merged.descriptor.trackers,
            set(&["udp://a", "udp://b", "udp://shared"])
        );
        let reparsed = parse(&merged.uri).unwrap();
        assert_eq!(reparsed.trackers, merged.descriptor.trackers);
        assert_eq!(reparsed.info_hash, HASH);
    }

    #[test]
    fn test_merge_picks_smallest_display_name() {
        let a = format!("magnet:?xt=urn:btih:{HASH}&dn=Zeta");
        let b = format!("magnet:?xt=urn:btih:{HASH}&dn=Alpha");
        let c = format!("magnet:?xt=urn:btih:{HASH}");

        let merged = merge(&[a, b, c]).unwrap();
        assert_eq!(merged.display_name.as_deref(), Some("Alpha"));
        assert!(merged.uri.contains("dn=Alpha"));
    }

    #[test]
    fn test_merge_without_names_omits_dn() {
        let a = format!("magnet:?xt=urn:btih:{HASH}");
        let merged = merge(&[a]).unwrap();
        assert_eq!(merged.display_name, None);
        assert!(!merged.uri.contains("dn="));
    }

    #[test]
    fn test_merge_copies_is_idempotent() {
        let a = format!("magnet:?xt=urn:btih:{HASH}&dn=Same&tr=udp%3A%2F%2Fa&ws=http%3A%2F%2Fw");
        let once = merge(&[a.clone()]).unwrap();
        let thrice = merge(&[a.clone(), a.clone(), a]).unwrap();
        assert_eq!(once, thrice);
    }

    #[test]
    fn test_merge_conflict_reports_both_hashes() {
        let a = "magnet:?xt=urn:btih:aaaa&dn=A";
        let b = "magnet:?xt=urn:btih:bbbb&dn=B";

        let err = merge(&[a, b]).unwrap_err();
        assert_eq!(
            err,
            MagnetError::ConflictingHash {
                first: "aaaa".to_string(),
                second: "bbbb".to_string(),
            }
        );
    }

    #[test]
    fn test_merge_propagates_parse_failure() {
        let a = format!("magnet:?xt=urn:btih:{HASH}");
        let err = merge(&[a.as_str(), "magnet:?dn=broken"]).unwrap_err();
        assert!(matches!(err, MagnetError::MissingHash(_)));
    }

    #[test]
    fn test_info_hash_of() {
        assert_eq!(
            info_hash_of(&format!("magnet:?xt=urn:btih:{HASH}&dn=x")),
            Some(HASH.to_string())
        );
        assert_eq!(info_hash_of("magnet:?dn=x"), None);
    }
}
