//! Types for torrent sessions.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Lifecycle of a torrent session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    /// Resolving the resource and waiting for metadata.
    Opening,
    /// Metadata known; no piece priorities set yet.
    Ready,
    /// Downloading the active file progressively.
    Playing,
    /// No piece requests and no upload.
    Paused,
    /// Engine handle released.
    Closed,
}

impl std::fmt::Display for SessionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            SessionState::Opening => "opening",
            SessionState::Ready => "ready",
            SessionState::Playing => "playing",
            SessionState::Paused => "paused",
            SessionState::Closed => "closed",
        };
        f.write_str(s)
    }
}

/// Inclusive range of piece indices.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PieceRange {
    pub first: u32,
    pub last: u32,
}

impl PieceRange {
    pub fn new(first: u32, last: u32) -> Self {
        Self { first, last }
    }

    /// Number of pieces in the range.
    pub fn count(&self) -> u32 {
        self.last.saturating_sub(self.first) + 1
    }

    pub fn contains(&self, piece: u32) -> bool {
        piece >= self.first && piece <= self.last
    }
}

/// A file inside a torrent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TorrentFile {
    /// Position in the torrent's file list.
    pub index: usize,
    /// Path relative to the torrent root.
    pub path: String,
    pub size: u64,
    pub pieces: PieceRange,
}

impl TorrentFile {
    /// Last path component.
    pub fn file_name(&self) -> &str {
        self.path
            .rsplit(['/', '\\'])
            .next()
            .unwrap_or(self.path.as_str())
    }
}

/// Engine counters for one file at one instant.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Transfer {
    /// Bytes of the file verified on disk.
    pub completed: u64,
    /// Bytes uploaded for the whole torrent.
    pub uploaded: u64,
    pub seeders: u32,
    /// Completion of each piece of the file, first piece first.
    pub pieces: Vec<bool>,
}

/// One statistics sample of a session.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Stats {
    pub state: Option<SessionState>,
    /// Active file index.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file: Option<usize>,
    /// Bytes of the active file completed.
    pub completed: u64,
    /// Size of the active file.
    pub size: u64,
    /// Bytes uploaded in total.
    pub uploaded: u64,
    /// Bytes completed since the previous sample.
    pub downloaded_delta: u64,
    /// Bytes uploaded since the previous sample.
    pub uploaded_delta: u64,
    /// Download rate in bytes per second.
    pub download_rate: u64,
    /// Upload rate in bytes per second.
    pub upload_rate: u64,
    pub seeders: u32,
    /// The active file is fully downloaded.
    pub complete: bool,
    /// Enough of the file is present to start playback.
    pub playback_ready: bool,
    /// Per-piece completion of the active file.
    pub pieces: Vec<bool>,
}

/// Errors reported by a torrent engine.
#[derive(Debug, Clone, Error)]
pub enum EngineError {
    #[error("Invalid resource '{resource}': {reason}")]
    InvalidResource { resource: String, reason: String },

    #[error("Timed out waiting for metadata of '{0}'")]
    MetadataTimeout(String),

    #[error("File index {0} not found")]
    FileNotFound(usize),

    #[error("I/O error: {0}")]
    Io(String),

    #[error("Engine error: {0}")]
    Engine(String),
}

/// Errors from session operations.
#[derive(Debug, Error)]
pub enum SessionError {
    #[error(transparent)]
    Engine(#[from] EngineError),

    #[error("Cannot {action} while the session is {state}")]
    InvalidTransition {
        state: SessionState,
        action: &'static str,
    },

    #[error("File index {0} not found")]
    FileNotFound(usize),

    #[error("No file selected")]
    NoFileSelected,
}
