//! Owns the active session and its background activities.
//!
//! Every session gets one shutdown broadcast. The sampler, the readiness
//! waiter and the stream endpoint all stop when it fires. The controller lock
//! is never held while the engine waits for metadata.

use std::net::{IpAddr, SocketAddr};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{SessionConfig, StreamConfig};
use crate::magnet;
use crate::session::{
    spawn_sampler, SessionError, SessionState, Stats, TorrentEngine, TorrentFile,
    TorrentFileSource, TorrentSession,
};
use crate::stream::StreamServer;

use super::{PlaybackError, PlaybackStats, SessionInfo, NOT_READY};

struct ActiveSession {
    session: Arc<Mutex<TorrentSession>>,
    shutdown_tx: broadcast::Sender<()>,
    stats_rx: watch::Receiver<Stats>,
    sampler: JoinHandle<()>,
    server: Option<StreamServer>,
    waiter: Option<JoinHandle<()>>,
    /// Stream URL once the active file is ready.
    ready_tx: watch::Sender<Option<String>>,
}

impl ActiveSession {
    async fn stop_stream(&mut self) {
        if let Some(waiter) = self.waiter.take() {
            waiter.abort();
        }
        if let Some(mut server) = self.server.take() {
            server.shutdown().await;
        }
        self.ready_tx.send_replace(None);
    }
}

enum Slot {
    Empty,
    /// Waiting for metadata. A send on `cancel_tx` abandons the open.
    Opening {
        id: u64,
        resource: String,
        cancel_tx: broadcast::Sender<()>,
    },
    Active(ActiveSession),
}

impl Slot {
    fn active(&self, action: &'static str) -> Result<&ActiveSession, PlaybackError> {
        match self {
            Slot::Active(active) => Ok(active),
            Slot::Opening { .. } => Err(still_opening(action)),
            Slot::Empty => Err(PlaybackError::NoSession),
        }
    }

    fn active_mut(&mut self, action: &'static str) -> Result<&mut ActiveSession, PlaybackError> {
        match self {
            Slot::Active(active) => Ok(active),
            Slot::Opening { .. } => Err(still_opening(action)),
            Slot::Empty => Err(PlaybackError::NoSession),
        }
    }

    fn is_opening(&self, open_id: u64) -> bool {
        matches!(self, Slot::Opening { id, .. } if *id == open_id)
    }
}

fn still_opening(action: &'static str) -> PlaybackError {
    PlaybackError::Session(SessionError::InvalidTransition {
        state: SessionState::Opening,
        action,
    })
}

/// Runs at most one session at a time.
pub struct PlaybackController {
    engine: Arc<dyn TorrentEngine>,
    session_config: SessionConfig,
    stream_config: StreamConfig,
    slot: Mutex<Slot>,
    next_open: AtomicU64,
}

impl PlaybackController {
    pub fn new(
        engine: Arc<dyn TorrentEngine>,
        session_config: SessionConfig,
        stream_config: StreamConfig,
    ) -> Self {
        Self {
            engine,
            session_config,
            stream_config,
            slot: Mutex::new(Slot::Empty),
            next_open: AtomicU64::new(0),
        }
    }

    /// Open `resource`, closing any previous session first.
    ///
    /// The session reports [`SessionState::Opening`] until metadata arrives.
    /// Closing or opening something else meanwhile abandons this open with
    /// [`PlaybackError::Cancelled`].
    pub async fn open(&self, resource: &str) -> Result<SessionInfo, PlaybackError> {
        let id = self.next_open.fetch_add(1, Ordering::Relaxed);
        let (cancel_tx, mut cancel_rx) = broadcast::channel(1);
        let previous = std::mem::replace(
            &mut *self.slot.lock().await,
            Slot::Opening {
                id,
                resource: resource.to_string(),
                cancel_tx,
            },
        );
        if !matches!(previous, Slot::Empty) {
            info!("Closing previous session");
        }
        Self::release(previous).await;

        let opened = tokio::select! {
            opened = TorrentSession::open(
                self.engine.as_ref(),
                resource,
                self.session_config.clone(),
            ) => opened,
            _ = cancel_rx.recv() => {
                info!(resource = %resource, "Session open cancelled");
                return Err(PlaybackError::Cancelled);
            }
        };

        let mut slot = self.slot.lock().await;
        if !slot.is_opening(id) {
            drop(slot);
            if let Ok(mut session) = opened {
                if let Err(e) = session.close().await {
                    warn!(error = %e, "Failed to close abandoned session");
                }
            }
            info!(resource = %resource, "Session open cancelled");
            return Err(PlaybackError::Cancelled);
        }

        let session = match opened {
            Ok(session) => session,
            Err(e) => {
                *slot = Slot::Empty;
                return Err(e.into());
            }
        };
        let info = session_info(&session);

        let session = Arc::new(Mutex::new(session));
        let (shutdown_tx, _) = broadcast::channel(1);
        let interval = Duration::from_secs(self.session_config.stats_interval_secs.max(1));
        let (stats_rx, sampler) =
            spawn_sampler(Arc::clone(&session), interval, shutdown_tx.subscribe());
        let (ready_tx, _) = watch::channel(None);

        *slot = Slot::Active(ActiveSession {
            session,
            shutdown_tx,
            stats_rx,
            sampler,
            server: None,
            waiter: None,
            ready_tx,
        });

        info!(hash = %info.hash, name = %info.name, files = info.files.len(), "Session opened");
        Ok(info)
    }

    /// Describe the active session.
    pub async fn info(&self) -> Result<SessionInfo, PlaybackError> {
        let slot = self.slot.lock().await;
        if let Slot::Opening { resource, .. } = &*slot {
            return Ok(opening_info(resource));
        }
        let session = slot.active("describe")?.session.lock().await;
        Ok(session_info(&session))
    }

    /// Start progressive download of `file_index` and serve it.
    ///
    /// Returns the stream URL. It is reported by [`Self::stats`] once
    /// enough of the file is present.
    pub async fn play(&self, file_index: usize) -> Result<String, PlaybackError> {
        let mut slot = self.slot.lock().await;
        let active = slot.active_mut("play")?;

        let (file, source) = {
            let mut session = active.session.lock().await;
            let file = session.select_file(file_index).await?.clone();
            (file, session.media_source()?)
        };

        let url = self.start_stream(active, &file, source).await?;
        info!(file = %file.path, url = %url, "Playback started");
        Ok(url)
    }

    /// Pause the transfer and take the stream endpoint down.
    pub async fn pause(&self) -> Result<(), PlaybackError> {
        let mut slot = self.slot.lock().await;
        let active = slot.active_mut("pause")?;
        active.session.lock().await.pause().await?;
        active.stop_stream().await;
        debug!("Stream endpoint released on pause");
        Ok(())
    }

    /// Resume the transfer. A session that was playing gets its stream
    /// endpoint back.
    pub async fn resume(&self) -> Result<(), PlaybackError> {
        let mut slot = self.slot.lock().await;
        let active = slot.active_mut("resume")?;

        let restart = {
            let mut session = active.session.lock().await;
            session.resume().await?;
            let playing = session.state() == SessionState::Playing;
            let file = session.active_file().cloned();
            match file {
                Some(file) if playing => Some((file, session.media_source()?)),
                _ => None,
            }
        };

        if let Some((file, source)) = restart {
            let url = self.start_stream(active, &file, source).await?;
            info!(file = %file.path, url = %url, "Playback resumed");
        }
        Ok(())
    }

    /// Latest sample with the current state and stream location.
    pub async fn stats(&self) -> Result<PlaybackStats, PlaybackError> {
        let slot = self.slot.lock().await;
        if let Slot::Opening { .. } = &*slot {
            return Ok(PlaybackStats {
                stats: Stats {
                    state: Some(SessionState::Opening),
                    ..Default::default()
                },
                stream: NOT_READY.to_string(),
            });
        }
        let active = slot.active("sample")?;

        let mut stats = active.stats_rx.borrow().clone();
        let state = active.session.lock().await.state();
        stats.state = Some(state);
        if state == SessionState::Paused {
            stats.download_rate = 0;
            stats.upload_rate = 0;
            stats.seeders = 0;
        }

        let stream = active
            .ready_tx
            .borrow()
            .clone()
            .unwrap_or_else(|| NOT_READY.to_string());
        Ok(PlaybackStats { stats, stream })
    }

    /// Wait until the active file is ready, returning its stream URL.
    pub async fn wait_ready(&self, timeout: Duration) -> Result<String, PlaybackError> {
        let mut ready_rx = {
            let slot = self.slot.lock().await;
            slot.active("stream")?.ready_tx.subscribe()
        };

        let waited = tokio::time::timeout(timeout, ready_rx.wait_for(|url| url.is_some())).await;
        match waited {
            Ok(Ok(url)) => url.clone().ok_or(PlaybackError::NoSession),
            Ok(Err(_)) => Err(PlaybackError::NoSession),
            Err(_) => Err(PlaybackError::ReadyTimeout(timeout)),
        }
    }

    /// Close the active session, or abandon one still opening. Closing
    /// without a session is a no-op.
    pub async fn close(&self) -> Result<(), PlaybackError> {
        let previous = std::mem::replace(&mut *self.slot.lock().await, Slot::Empty);
        Self::release(previous).await;
        Ok(())
    }

    pub async fn has_session(&self) -> bool {
        !matches!(*self.slot.lock().await, Slot::Empty)
    }

    /// (Re)bind the stream endpoint for `file` and restart the readiness waiter.
    async fn start_stream(
        &self,
        active: &mut ActiveSession,
        file: &TorrentFile,
        source: TorrentFileSource,
    ) -> Result<String, PlaybackError> {
        active.stop_stream().await;

        let addr = SocketAddr::new(IpAddr::from([0, 0, 0, 0]), self.stream_config.port);
        let grace = Duration::from_secs(self.stream_config.grace_period_secs);
        let media_name = file.file_name().to_string();
        let server = StreamServer::start(addr, &media_name, Arc::new(source), grace).await?;

        let url = format!(
            "http://{}:{}/{}",
            self.stream_config.public_host,
            server.local_addr().port(),
            urlencoding::encode(&media_name)
        );
        active.server = Some(server);
        active.waiter = Some(spawn_readiness_waiter(
            file.index,
            url.clone(),
            active.stats_rx.clone(),
            active.ready_tx.clone(),
            Duration::from_millis(self.session_config.readiness_poll_ms.max(1)),
            active.shutdown_tx.subscribe(),
        ));
        Ok(url)
    }

    async fn release(slot: Slot) {
        match slot {
            Slot::Empty => {}
            Slot::Opening { cancel_tx, .. } => {
                let _ = cancel_tx.send(());
            }
            Slot::Active(active) => Self::shutdown(active).await,
        }
    }

    async fn shutdown(mut active: ActiveSession) {
        let _ = active.shutdown_tx.send(());
        active.stop_stream().await;

        if let Err(e) = active.session.lock().await.close().await {
            warn!(error = %e, "Failed to close session cleanly");
        }
        if let Err(e) = active.sampler.await {
            warn!(error = %e, "Stats sampler ended abnormally");
        }
        debug!("Session resources released");
    }
}

fn session_info(session: &TorrentSession) -> SessionInfo {
    SessionInfo {
        hash: session.info_hash(),
        name: session.name(),
        state: session.state(),
        files: session.media_files(),
        active_file: session.active_file().map(|f| f.index),
    }
}

/// What is known before metadata arrives: the magnet's hash and name, if any.
fn opening_info(resource: &str) -> SessionInfo {
    let (hash, name) = match magnet::parse(resource) {
        Ok(descriptor) => {
            let name = descriptor
                .display_name
                .clone()
                .unwrap_or_else(|| descriptor.info_hash.clone());
            (descriptor.info_hash, name)
        }
        Err(_) => (String::new(), resource.to_string()),
    };
    SessionInfo {
        hash,
        name,
        state: SessionState::Opening,
        files: Vec::new(),
        active_file: None,
    }
}

/// Publish `url` once a sample for `file_index` reports playback readiness.
fn spawn_readiness_waiter(
    file_index: usize,
    url: String,
    stats_rx: watch::Receiver<Stats>,
    ready_tx: watch::Sender<Option<String>>,
    poll: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    debug!("Readiness waiter received shutdown signal");
                    break;
                }
                _ = tokio::time::sleep(poll) => {
                    let ready = {
                        let stats = stats_rx.borrow();
                        stats.file == Some(file_index) && stats.playback_ready
                    };
                    if ready {
                        info!(url = %url, "Ready for playback");
                        ready_tx.send_replace(Some(url));
                        break;
                    }
                }
            }
        }
    })
}
