//! Types for magnet descriptors.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use url::form_urlencoded;

/// Prefix of the `xt` value carrying a BitTorrent info hash.
pub const BTIH_PREFIX: &str = "urn:btih:";

/// A parsed magnet URI.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MagnetDescriptor {
    /// Info hash as written in the first `xt` parameter (without the `urn:btih:` prefix).
    pub info_hash: String,
    /// First `dn` parameter, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    /// Unique `tr` values.
    #[serde(default)]
    pub trackers: BTreeSet<String>,
    /// Unique `ws` values.
    #[serde(default)]
    pub web_seeds: BTreeSet<String>,
}

impl MagnetDescriptor {
    /// Create a descriptor with only a hash.
    pub fn new(info_hash: impl Into<String>) -> Self {
        Self {
            info_hash: info_hash.into(),
            display_name: None,
            trackers: BTreeSet::new(),
            web_seeds: BTreeSet::new(),
        }
    }

    /// Set the display name.
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }

    /// Add a tracker.
    pub fn with_tracker(mut self, tracker: impl Into<String>) -> Self {
        self.trackers.insert(tracker.into());
        self
    }

    /// Add a web seed.
    pub fn with_web_seed(mut self, web_seed: impl Into<String>) -> Self {
        self.web_seeds.insert(web_seed.into());
        self
    }

    /// Whether two hashes name the same content (hex is case-insensitive).
    pub fn same_hash(&self, other: &str) -> bool {
        self.info_hash.eq_ignore_ascii_case(other)
    }

    /// Serialize back to a magnet URI.
    ///
    /// The output carries exactly one `xt`, the `dn` when present and non-empty,
    /// then every tracker and web seed as repeated parameters.
    pub fn to_uri(&self) -> String {
        let mut uri = format!("magnet:?xt={}{}", BTIH_PREFIX, self.info_hash);

        let mut params = form_urlencoded::Serializer::new(String::new());
        if let Some(name) = self.display_name.as_deref().filter(|n| !n.is_empty()) {
            params.append_pair("dn", name);
        }
        for tracker in &self.trackers {
            params.append_pair("tr", tracker);
        }
        for web_seed in &self.web_seeds {
            params.append_pair("ws", web_seed);
        }

        let encoded = params.finish();
        if !encoded.is_empty() {
            uri.push('&');
            uri.push_str(&encoded);
        }
        uri
    }
}

/// Errors from parsing or merging magnet URIs.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum MagnetError {
    #[error("Malformed magnet URI '{uri}': {reason}")]
    MalformedUri { uri: String, reason: String },

    #[error("No hash (xt) found in '{0}'")]
    MissingHash(String),

    #[error("Different hashes found: {first} and {second}")]
    ConflictingHash { first: String, second: String },

    #[error("No magnet links to merge")]
    EmptyMerge,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_uri_hash_only() {
        let d = MagnetDescriptor::new("abc123");
        assert_eq!(d.to_uri(), "magnet:?xt=urn:btih:abc123");
    }

    #[test]
    fn test_to_uri_skips_empty_display_name() {
        let d = MagnetDescriptor::new("abc123").with_display_name("");
        assert_eq!(d.to_uri(), "magnet:?xt=urn:btih:abc123");
    }

    #[test]
    fn test_to_uri_encodes_parameters() {
        let d = MagnetDescriptor::new("abc123")
            .with_display_name("Some Show S01E01")
            .with_tracker("udp://tracker.example:1337/announce");
        assert_eq!(
            d.to_uri(),
            "magnet:?xt=urn:btih:abc123&dn=Some+Show+S01E01&tr=udp%3A%2F%2Ftracker.example%3A1337%2Fannounce"
        );
    }

    #[test]
    fn test_same_hash_ignores_case() {
        let d = MagnetDescriptor::new("ABCDEF");
        assert!(d.same_hash("abcdef"));
        assert!(!d.same_hash("abcdee"));
    }
}
