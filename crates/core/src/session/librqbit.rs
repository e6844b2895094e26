//! librqbit-backed torrent engine.

use std::collections::HashSet;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use librqbit::{
    AddTorrent, AddTorrentOptions, AddTorrentResponse, ManagedTorrent, Session,
    SessionOptions, SessionPersistenceConfig,
};
use tokio::io::AsyncSeekExt;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use crate::config::{EngineConfig, SessionConfig};
use crate::stream::{FileReader, MediaReader};

use super::{EngineError, EngineTorrent, PieceRange, TorrentEngine, TorrentFile, Transfer};

/// Upper bound on metadata resolution. DHT lookups for rare torrents may
/// never finish.
const METADATA_TIMEOUT: Duration = Duration::from_secs(60);

/// Embedded librqbit session.
pub struct LibrqbitEngine {
    session: Arc<Session>,
}

impl LibrqbitEngine {
    pub async fn new(engine: &EngineConfig, config: &SessionConfig) -> Result<Self, EngineError> {
        create_dir(&engine.download_path)?;

        let mut opts = SessionOptions::default();
        opts.disable_dht = !engine.enable_dht;
        // Port 0 disables incoming connections.
        if config.listen_port != 0 {
            opts.listen_port_range = Some(config.listen_port..config.listen_port.saturating_add(1));
        }

        if let Some(ref persistence_path) = engine.persistence_path {
            create_dir(persistence_path)?;
            opts.persistence = Some(SessionPersistenceConfig::Json {
                folder: Some(persistence_path.clone()),
            });
        }

        if !config.tcp {
            warn!("Disabling TCP is not supported by librqbit");
        }
        if config.upload_rate > 0 {
            warn!(limit = config.upload_rate, "Upload rate limits not supported by librqbit");
        }
        if !config.seed {
            warn!("librqbit always uploads to connected peers; seed=false only affects completion");
        }
        debug!(
            max_connections = config.max_connections,
            "Connection limit left to librqbit defaults"
        );

        info!(
            download_path = %engine.download_path.display(),
            dht_enabled = engine.enable_dht,
            listen_port = config.listen_port,
            "Initializing librqbit session"
        );

        let session = Session::new_with_opts(engine.download_path.clone(), opts)
            .await
            .map_err(|e| EngineError::Engine(format!("Failed to initialize librqbit session: {}", e)))?;

        Ok(Self { session })
    }
}

fn create_dir(path: &Path) -> Result<(), EngineError> {
    if !path.exists() {
        std::fs::create_dir_all(path).map_err(|e| {
            EngineError::Io(format!("Failed to create {}: {}", path.display(), e))
        })?;
    }
    Ok(())
}

fn is_remote(resource: &str) -> bool {
    resource.starts_with("magnet:")
        || resource.starts_with("http://")
        || resource.starts_with("https://")
}

#[async_trait]
impl TorrentEngine for LibrqbitEngine {
    fn name(&self) -> &str {
        "librqbit"
    }

    async fn open(
        &self,
        resource: &str,
        _config: &SessionConfig,
    ) -> Result<Arc<dyn EngineTorrent>, EngineError> {
        let invalid = |reason: String| EngineError::InvalidResource {
            resource: resource.to_string(),
            reason,
        };

        let add = if is_remote(resource) {
            AddTorrent::from_url(resource)
        } else {
            AddTorrent::from_local_filename(resource).map_err(|e| invalid(e.to_string()))?
        };

        // Added paused so nothing downloads before a file is selected.
        let opts = AddTorrentOptions {
            paused: true,
            overwrite: true,
            ..Default::default()
        };

        let response = tokio::time::timeout(METADATA_TIMEOUT, self.session.add_torrent(add, Some(opts)))
            .await
            .map_err(|_| EngineError::MetadataTimeout(resource.to_string()))?
            .map_err(|e| invalid(e.to_string()))?;

        let handle = match response {
            AddTorrentResponse::Added(_, handle) => handle,
            AddTorrentResponse::AlreadyManaged(_, handle) => {
                warn!(hash = %handle.info_hash().as_string(), "Torrent already managed");
                handle
            }
            AddTorrentResponse::ListOnly(_) => {
                return Err(EngineError::Engine(
                    "Torrent was added in list-only mode".to_string(),
                ))
            }
        };

        let torrent = LibrqbitTorrent::new(Arc::clone(&self.session), handle)?;
        Ok(Arc::new(torrent))
    }
}

/// One torrent inside the librqbit session.
pub struct LibrqbitTorrent {
    session: Arc<Session>,
    handle: Arc<ManagedTorrent>,
    files: Vec<TorrentFile>,
    piece_length: u64,
    torrent_bytes: Bytes,
    /// Stream held open at the head of the selected window so librqbit
    /// fetches those pieces first.
    head_stream: Mutex<Option<FileReader>>,
}

impl LibrqbitTorrent {
    fn new(session: Arc<Session>, handle: Arc<ManagedTorrent>) -> Result<Self, EngineError> {
        let (files, piece_length, torrent_bytes) = handle
            .with_metadata(|m| {
                let files = m
                    .file_infos
                    .iter()
                    .enumerate()
                    .map(|(index, f)| TorrentFile {
                        index,
                        path: f.relative_filename.to_string_lossy().replace('\\', "/"),
                        size: f.len,
                        pieces: PieceRange::new(
                            f.piece_range.start,
                            f.piece_range.end.saturating_sub(1).max(f.piece_range.start),
                        ),
                    })
                    .collect::<Vec<_>>();
                (
                    files,
                    m.lengths.default_piece_length() as u64,
                    m.torrent_bytes.clone(),
                )
            })
            .map_err(|e| EngineError::Engine(format!("Metadata unavailable: {}", e)))?;

        Ok(Self {
            session,
            handle,
            files,
            piece_length,
            torrent_bytes,
            head_stream: Mutex::new(None),
        })
    }

    fn file(&self, index: usize) -> Result<&TorrentFile, EngineError> {
        self.files
            .get(index)
            .ok_or(EngineError::FileNotFound(index))
    }

    fn stream(&self, index: usize) -> Result<impl MediaReader + 'static, EngineError> {
        self.handle
            .clone()
            .stream(index)
            .map_err(|e| EngineError::Engine(format!("Failed to open stream: {}", e)))
    }

    fn engine_error(action: &str) -> impl Fn(anyhow::Error) -> EngineError + '_ {
        move |e| EngineError::Engine(format!("Failed to {}: {}", action, e))
    }
}

#[async_trait]
impl EngineTorrent for LibrqbitTorrent {
    fn info_hash(&self) -> String {
        self.handle.info_hash().as_string()
    }

    fn name(&self) -> String {
        self.handle
            .name()
            .map(|s| s.to_string())
            .unwrap_or_else(|| format!("torrent-{}", &self.info_hash()[..8]))
    }

    fn files(&self) -> Vec<TorrentFile> {
        self.files.clone()
    }

    fn metainfo(&self) -> Option<Bytes> {
        (!self.torrent_bytes.is_empty()).then(|| self.torrent_bytes.clone())
    }

    async fn download_pieces(&self, range: PieceRange) -> Result<(), EngineError> {
        // librqbit selects by file; take every file lying inside the range.
        let only: HashSet<usize> = self
            .files
            .iter()
            .filter(|f| range.contains(f.pieces.first) && range.contains(f.pieces.last))
            .map(|f| f.index)
            .collect();
        if only.is_empty() {
            return Err(EngineError::Engine(format!(
                "No file covers pieces {}..={}",
                range.first, range.last
            )));
        }

        self.session
            .update_only_files(&self.handle, &only)
            .await
            .map_err(Self::engine_error("select files"))?;

        if self.handle.is_paused() {
            self.session
                .unpause(&self.handle)
                .await
                .map_err(Self::engine_error("start torrent"))?;
        }
        debug!(hash = %self.info_hash(), files = ?only, "Updated file selection");
        Ok(())
    }

    async fn prioritize(&self, range: PieceRange) -> Result<(), EngineError> {
        let file = self
            .files
            .iter()
            .find(|f| f.pieces.contains(range.first))
            .ok_or_else(|| EngineError::Engine(format!("No file holds piece {}", range.first)))?;

        let mut stream = self.stream(file.index)?;
        let offset = (range.first - file.pieces.first) as u64 * self.piece_length;
        stream
            .seek(std::io::SeekFrom::Start(offset.min(file.size)))
            .await
            .map_err(|e| EngineError::Io(e.to_string()))?;

        *self.head_stream.lock().await = Some(Box::new(stream));
        Ok(())
    }

    async fn pause(&self) -> Result<(), EngineError> {
        self.head_stream.lock().await.take();
        if self.handle.is_paused() {
            return Ok(());
        }
        self.session
            .pause(&self.handle)
            .await
            .map_err(Self::engine_error("pause torrent"))
    }

    async fn resume(&self) -> Result<(), EngineError> {
        if !self.handle.is_paused() {
            return Ok(());
        }
        self.session
            .unpause(&self.handle)
            .await
            .map_err(Self::engine_error("resume torrent"))
    }

    async fn transfer(&self, file: usize) -> Result<Transfer, EngineError> {
        let info = self.file(file)?;
        let stats = self.handle.stats();

        let completed = stats.file_progress.get(file).copied().unwrap_or(0);
        let seeders = stats
            .live
            .as_ref()
            .map(|live| live.snapshot.peer_stats.live as u32)
            .unwrap_or(0);

        // librqbit does not expose per-piece state; assume in-order completion.
        let done = if self.piece_length > 0 {
            completed / self.piece_length
        } else {
            0
        };
        let pieces = (0..info.pieces.count() as u64)
            .map(|i| i < done || (completed >= info.size && info.size > 0))
            .collect();

        Ok(Transfer {
            completed,
            uploaded: stats.uploaded_bytes,
            seeders,
            pieces,
        })
    }

    async fn reader(&self, file: usize) -> Result<FileReader, EngineError> {
        self.file(file)?;
        Ok(Box::new(self.stream(file)?))
    }

    async fn close(&self) -> Result<(), EngineError> {
        self.head_stream.lock().await.take();
        self.session
            .delete(self.handle.id().into(), false)
            .await
            .map_err(Self::engine_error("remove torrent"))?;
        debug!(hash = %self.info_hash(), "Torrent removed from session");
        Ok(())
    }
}
