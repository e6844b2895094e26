//! A torrent session: one engine handle, one target file.

use std::io;
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::metrics::SESSIONS_OPENED;
use crate::stream::{FileReader, MediaSource};

use super::{
    EngineTorrent, PieceRange, SessionError, SessionState, Stats, TorrentEngine, TorrentFile,
};

/// Files smaller than this share of the largest candidate are extras.
const MIN_SHARE_PERCENT: u64 = 30;

/// Whether enough of a file is present to start playback.
///
/// Ready once the completed share, doubled, passes the download-ahead
/// percentage.
pub fn playback_ready(completed: u64, size: u64, download_ahead_percent: u32) -> bool {
    if size == 0 {
        return false;
    }
    (completed as f64 / size as f64) * 200.0 > download_ahead_percent as f64
}

/// The leading pieces of `file` fetched first.
///
/// `ceil(count * percent / 100)` pieces from the file's first piece, at
/// least one and never past its last piece.
pub fn download_window(file: PieceRange, percent: u32) -> PieceRange {
    let count = file.count() as u64;
    let ahead = (count * percent as u64).div_ceil(100).max(1);
    let last = (file.first as u64 + ahead - 1).min(file.last as u64) as u32;
    PieceRange::new(file.first, last)
}

/// Media files worth playing: accepted extension, and larger than 30% of the
/// largest such file. Sorted by path.
pub fn filter_media_files(files: &[TorrentFile], extensions: &[String]) -> Vec<TorrentFile> {
    let extensions: Vec<String> = extensions.iter().map(|e| e.to_lowercase()).collect();
    let mut media: Vec<TorrentFile> = files
        .iter()
        .filter(|f| {
            let path = f.path.to_lowercase();
            extensions.iter().any(|e| path.ends_with(e.as_str()))
        })
        .cloned()
        .collect();

    let largest = media.iter().map(|f| f.size).max().unwrap_or(0);
    media.retain(|f| f.size * 100 > largest * MIN_SHARE_PERCENT);
    media.sort_by(|a, b| a.path.cmp(&b.path));
    media
}

/// One active transfer.
///
/// Only the sampler calls [`TorrentSession::sample`], so the last-sample
/// counters have a single writer.
pub struct TorrentSession {
    torrent: Arc<dyn EngineTorrent>,
    config: SessionConfig,
    state: SessionState,
    active: Option<TorrentFile>,
    last_completed: Option<u64>,
    last_uploaded: Option<u64>,
}

impl TorrentSession {
    /// Open `resource` and wait for its metadata.
    pub async fn open(
        engine: &dyn TorrentEngine,
        resource: &str,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        debug!(engine = engine.name(), resource = %resource, "Opening torrent");
        let torrent = engine.open(resource, &config).await?;

        info!(
            hash = %torrent.info_hash(),
            name = %torrent.name(),
            files = torrent.files().len(),
            "Torrent metadata received"
        );
        SESSIONS_OPENED.inc();

        Ok(Self::from_torrent(torrent, config))
    }

    /// Wrap an already opened torrent.
    pub fn from_torrent(torrent: Arc<dyn EngineTorrent>, config: SessionConfig) -> Self {
        Self {
            torrent,
            config,
            state: SessionState::Ready,
            active: None,
            last_completed: None,
            last_uploaded: None,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn info_hash(&self) -> String {
        self.torrent.info_hash()
    }

    pub fn name(&self) -> String {
        self.torrent.name()
    }

    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    /// The file being played, if any.
    pub fn active_file(&self) -> Option<&TorrentFile> {
        self.active.as_ref()
    }

    /// Playable files.
    pub fn media_files(&self) -> Vec<TorrentFile> {
        filter_media_files(&self.torrent.files(), &self.config.media_extensions)
    }

    /// Target `index` and start progressive download of it.
    ///
    /// Only the file's pieces are requested; the download-ahead window at
    /// its head is prioritized.
    pub async fn select_file(&mut self, index: usize) -> Result<&TorrentFile, SessionError> {
        if matches!(self.state, SessionState::Opening | SessionState::Closed) {
            return Err(self.invalid("play"));
        }
        let file = self
            .torrent
            .files()
            .into_iter()
            .find(|f| f.index == index)
            .ok_or(SessionError::FileNotFound(index))?;

        if self.state == SessionState::Paused {
            self.torrent.resume().await?;
        }

        let switched = self.active.as_ref().map(|a| a.index) != Some(index);
        self.active = Some(file);
        self.state = SessionState::Ready;
        if switched {
            self.last_completed = None;
            self.last_uploaded = None;
        }

        self.schedule().await?;
        self.state = SessionState::Playing;
        Ok(self.active.as_ref().ok_or(SessionError::NoFileSelected)?)
    }

    async fn schedule(&self) -> Result<(), SessionError> {
        let file = self.active.as_ref().ok_or(SessionError::NoFileSelected)?;
        let window = download_window(file.pieces, self.config.effective_download_ahead());

        self.torrent.download_pieces(file.pieces).await?;
        self.torrent.prioritize(window).await?;

        debug!(
            file = %file.path,
            first_piece = file.pieces.first,
            last_piece = file.pieces.last,
            window_last = window.last,
            "Scheduled pieces"
        );
        Ok(())
    }

    /// Stop all piece requests and uploads.
    pub async fn pause(&mut self) -> Result<(), SessionError> {
        if !matches!(self.state, SessionState::Ready | SessionState::Playing) {
            return Err(self.invalid("pause"));
        }
        self.torrent.pause().await?;
        self.state = SessionState::Paused;
        info!(hash = %self.torrent.info_hash(), "Session paused");
        Ok(())
    }

    /// Restart the active file's download.
    pub async fn resume(&mut self) -> Result<(), SessionError> {
        if self.state != SessionState::Paused {
            return Err(self.invalid("resume"));
        }
        self.torrent.resume().await?;
        if self.active.is_some() {
            self.schedule().await?;
            self.state = SessionState::Playing;
        } else {
            self.state = SessionState::Ready;
        }
        info!(hash = %self.torrent.info_hash(), "Session resumed");
        Ok(())
    }

    /// Release the engine handle. Closing twice is a no-op.
    pub async fn close(&mut self) -> Result<(), SessionError> {
        if self.state == SessionState::Closed {
            return Ok(());
        }
        self.state = SessionState::Closed;
        self.torrent.close().await?;
        info!(hash = %self.torrent.info_hash(), "Session closed");
        Ok(())
    }

    /// Sample transfer statistics for the active file.
    ///
    /// Never fails: without an active file, or when the engine cannot
    /// report, the sample is zero-valued. A complete file pauses the session
    /// unless it is configured to keep seeding.
    pub async fn sample(&mut self) -> Stats {
        let mut stats = Stats {
            state: Some(self.state),
            ..Default::default()
        };
        let Some(file) = self.active.clone() else {
            return stats;
        };
        if self.state == SessionState::Closed {
            return stats;
        }

        let transfer = match self.torrent.transfer(file.index).await {
            Ok(t) => t,
            Err(e) => {
                warn!(hash = %self.torrent.info_hash(), error = %e, "Failed to read transfer stats");
                stats.file = Some(file.index);
                stats.size = file.size;
                return stats;
            }
        };

        let downloaded_delta = transfer
            .completed
            .saturating_sub(self.last_completed.unwrap_or(transfer.completed));
        let uploaded_delta = transfer
            .uploaded
            .saturating_sub(self.last_uploaded.unwrap_or(transfer.uploaded));
        self.last_completed = Some(transfer.completed);
        self.last_uploaded = Some(transfer.uploaded);

        let complete = file.size > 0 && transfer.completed >= file.size;
        if complete && !self.config.seed_after_complete && self.state != SessionState::Paused {
            info!(file = %file.path, "Download complete, pausing");
            match self.torrent.pause().await {
                Ok(()) => self.state = SessionState::Paused,
                Err(e) => warn!(error = %e, "Failed to pause completed session"),
            }
        }

        stats.state = Some(self.state);
        stats.file = Some(file.index);
        stats.completed = transfer.completed;
        stats.size = file.size;
        stats.uploaded = transfer.uploaded;
        stats.complete = complete;
        stats.playback_ready = playback_ready(
            transfer.completed,
            file.size,
            self.config.effective_download_ahead(),
        );
        stats.pieces = transfer.pieces;

        if self.state != SessionState::Paused {
            stats.downloaded_delta = downloaded_delta;
            stats.uploaded_delta = uploaded_delta;
            stats.download_rate = downloaded_delta;
            stats.upload_rate = uploaded_delta;
            stats.seeders = transfer.seeders;
        }

        stats
    }

    /// Byte source over the active file for the stream server.
    pub fn media_source(&self) -> Result<TorrentFileSource, SessionError> {
        let file = self.active.as_ref().ok_or(SessionError::NoFileSelected)?;
        Ok(TorrentFileSource {
            torrent: Arc::clone(&self.torrent),
            index: file.index,
            size: file.size,
        })
    }

    fn invalid(&self, action: &'static str) -> SessionError {
        SessionError::InvalidTransition {
            state: self.state,
            action,
        }
    }
}

/// Readers over one torrent file.
pub struct TorrentFileSource {
    torrent: Arc<dyn EngineTorrent>,
    index: usize,
    size: u64,
}

#[async_trait]
impl MediaSource for TorrentFileSource {
    fn size(&self) -> u64 {
        self.size
    }

    async fn open(&self) -> io::Result<FileReader> {
        self.torrent
            .reader(self.index)
            .await
            .map_err(|e| io::Error::new(io::ErrorKind::Other, e.to_string()))
    }
}
