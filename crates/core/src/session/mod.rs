//! Torrent sessions: metadata, file selection, progressive download and
//! statistics sampling on top of a pluggable engine.

mod engine;
mod librqbit;
mod metainfo;
mod sampler;
mod torrent;
mod types;

pub use engine::{EngineTorrent, TorrentEngine};
pub use librqbit::{LibrqbitEngine, LibrqbitTorrent};
pub use metainfo::{MetainfoCache, MetainfoStore};
pub use sampler::{per_second, spawn_sampler};
pub use torrent::{
    download_window, filter_media_files, playback_ready, TorrentFileSource, TorrentSession,
};
pub use types::*;
