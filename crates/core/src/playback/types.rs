use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::session::{SessionError, SessionState, Stats, TorrentFile};
use crate::stream::StreamError;

/// Reported as the stream location until the readiness predicate holds.
pub const NOT_READY: &str = "Not ready for playback";

/// An opened session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionInfo {
    pub hash: String,
    pub name: String,
    pub state: SessionState,
    /// Playable files.
    pub files: Vec<TorrentFile>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub active_file: Option<usize>,
}

/// A statistics snapshot plus where to play from.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PlaybackStats {
    #[serde(flatten)]
    pub stats: Stats,
    /// Stream URL, or [`NOT_READY`].
    pub stream: String,
}

impl PlaybackStats {
    pub fn is_ready(&self) -> bool {
        self.stream != NOT_READY
    }
}

#[derive(Debug, Error)]
pub enum PlaybackError {
    #[error("No active session")]
    NoSession,

    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Stream(#[from] StreamError),

    #[error("Playback not ready after {0:?}")]
    ReadyTimeout(Duration),

    #[error("Session closed before its metadata arrived")]
    Cancelled,
}
