//! Testing utilities and mock implementations.
//!
//! Mocks stand in for the network-facing seams so discovery, sessions and the
//! control API can be exercised without providers or peers.
//!
//! # Example
//!
//! ```rust,ignore
//! use reelstream_core::testing::{fixtures, MockEngine, MockExtractor};
//!
//! let extractor = MockExtractor::new(&["alpha"]);
//! extractor.set_offers("alpha", vec![fixtures::offer("Sintel 1080p", fixtures::HASH_A, "12")]).await;
//!
//! let engine = MockEngine::new();
//! let torrent = engine.add_torrent("magnet:?xt=urn:btih:abc", fixtures::mock_torrent()).await;
//! torrent.set_completed(1, fixtures::MOVIE_SIZE / 10).await;
//! ```

mod mock_engine;
mod mock_extractor;

pub use mock_engine::{MockEngine, MockTorrent};
pub use mock_extractor::MockExtractor;

/// Test fixtures and helper functions.
pub mod fixtures {
    use super::MockTorrent;
    use crate::extractor::Offer;
    use crate::session::{PieceRange, TorrentFile};

    pub const HASH_A: &str = "c12fe1c06bba254a9dc9f519b335aa7c1367a88a";
    pub const HASH_B: &str = "08ada5a7a6183aae1e09d831df6748d566095a10";

    pub const PIECE_LENGTH: u64 = 16 * 1024;

    /// Size of the main file of [`mock_torrent`]: 100 pieces.
    pub const MOVIE_SIZE: u64 = 100 * PIECE_LENGTH;

    /// Magnet URI with a display name and the given trackers.
    pub fn magnet(hash: &str, name: &str, trackers: &[&str]) -> String {
        let mut uri = format!(
            "magnet:?xt=urn:btih:{}&dn={}",
            hash,
            urlencoding::encode(name)
        );
        for tracker in trackers {
            uri.push_str("&tr=");
            uri.push_str(&urlencoding::encode(tracker));
        }
        uri
    }

    /// Offer carrying a magnet for `hash`.
    pub fn offer(name: &str, hash: &str, seeds: &str) -> Offer {
        Offer::new(name, magnet(hash, name, &["udp://tracker.example:1337"]), "1.2 GB", seeds)
    }

    pub fn torrent_file(index: usize, path: &str, size: u64, first: u32, last: u32) -> TorrentFile {
        TorrentFile {
            index,
            path: path.to_string(),
            size,
            pieces: PieceRange::new(first, last),
        }
    }

    /// Torrent with a sample clip, the movie (file 1) and subtitles.
    pub fn mock_torrent() -> MockTorrent {
        MockTorrent::new(HASH_A, "Sintel")
            .with_file("Sintel/sample.mkv", PIECE_LENGTH, PieceRange::new(0, 0))
            .with_file("Sintel/Sintel.2010.1080p.mkv", MOVIE_SIZE, PieceRange::new(1, 100))
            .with_file("Sintel/Sintel.srt", 4_000, PieceRange::new(101, 101))
    }
}
