//! Torrent engine seam.
//!
//! The engine does the peer-wire work. A session only needs file and piece
//! primitives from it.

use std::sync::Arc;

use async_trait::async_trait;
use bytes::Bytes;

use crate::config::SessionConfig;
use crate::stream::FileReader;

use super::{EngineError, PieceRange, TorrentFile, Transfer};

/// Opens torrents.
#[async_trait]
pub trait TorrentEngine: Send + Sync {
    /// Engine name for logging.
    fn name(&self) -> &str;

    /// Open a magnet URI, an http(s) URL of a torrent file or a local torrent
    /// file path. Resolves once metadata is available. Nothing is downloaded
    /// until pieces are requested.
    async fn open(
        &self,
        resource: &str,
        config: &SessionConfig,
    ) -> Result<Arc<dyn EngineTorrent>, EngineError>;
}

/// One opened torrent with metadata.
#[async_trait]
pub trait EngineTorrent: Send + Sync {
    /// Hex info hash.
    fn info_hash(&self) -> String;

    fn name(&self) -> String;

    /// Every file in the torrent, in torrent order.
    fn files(&self) -> Vec<TorrentFile>;

    /// Bencoded metainfo, when the engine keeps it.
    fn metainfo(&self) -> Option<Bytes>;

    /// Request exactly the pieces in `range`.
    async fn download_pieces(&self, range: PieceRange) -> Result<(), EngineError>;

    /// Fetch the pieces in `range` before anything else.
    async fn prioritize(&self, range: PieceRange) -> Result<(), EngineError>;

    /// Cancel every outstanding piece request and stop uploading.
    async fn pause(&self) -> Result<(), EngineError>;

    /// Allow transfers again. Piece requests must be reissued.
    async fn resume(&self) -> Result<(), EngineError>;

    /// Counters for one file.
    async fn transfer(&self, file: usize) -> Result<Transfer, EngineError>;

    /// Seekable reader over one file. Reads past the downloaded range wait
    /// for the data.
    async fn reader(&self, file: usize) -> Result<FileReader, EngineError>;

    /// Release the torrent. Downloaded data stays on disk.
    async fn close(&self) -> Result<(), EngineError>;
}
