//! Mock torrent engine for testing.

use async_trait::async_trait;
use bytes::Bytes;
use std::collections::{HashMap, HashSet};
use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;

use crate::config::SessionConfig;
use crate::session::{
    EngineError, EngineTorrent, PieceRange, TorrentEngine, TorrentFile, Transfer,
};
use crate::stream::FileReader;

/// Mock implementation of the TorrentEngine trait.
///
/// Torrents are registered per resource string. Opening anything else fails
/// with [`EngineError::InvalidResource`].
///
/// # Example
///
/// ```rust,ignore
/// let engine = MockEngine::new();
/// let torrent = engine.add_torrent("magnet:?xt=urn:btih:abc", fixtures::mock_torrent()).await;
///
/// let session = TorrentSession::open(&engine, "magnet:?xt=urn:btih:abc", config).await?;
/// torrent.set_completed(1, 4096).await;
/// ```
#[derive(Debug, Default)]
pub struct MockEngine {
    torrents: Arc<RwLock<HashMap<String, Arc<MockTorrent>>>>,
    open_calls: Arc<RwLock<Vec<String>>>,
    open_delay: Arc<RwLock<Option<Duration>>>,
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `torrent` for `resource`.
    pub async fn add_torrent(&self, resource: &str, torrent: MockTorrent) -> Arc<MockTorrent> {
        let torrent = Arc::new(torrent);
        self.torrents
            .write()
            .await
            .insert(resource.to_string(), Arc::clone(&torrent));
        torrent
    }

    /// Delay metadata resolution.
    pub async fn set_open_delay(&self, delay: Duration) {
        *self.open_delay.write().await = Some(delay);
    }

    /// Resources passed to `open`, in order.
    pub async fn open_calls(&self) -> Vec<String> {
        self.open_calls.read().await.clone()
    }
}

#[async_trait]
impl TorrentEngine for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn open(
        &self,
        resource: &str,
        _config: &SessionConfig,
    ) -> Result<Arc<dyn EngineTorrent>, EngineError> {
        self.open_calls.write().await.push(resource.to_string());

        let delay = *self.open_delay.read().await;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let torrent = self.torrents.read().await.get(resource).cloned();
        match torrent {
            Some(t) => {
                t.closed.store(false);
                Ok(t as Arc<dyn EngineTorrent>)
            }
            None => Err(EngineError::InvalidResource {
                resource: resource.to_string(),
                reason: "unknown resource".to_string(),
            }),
        }
    }
}

#[derive(Debug, Default)]
struct Flag(std::sync::atomic::AtomicBool);

impl Flag {
    fn load(&self) -> bool {
        self.0.load(std::sync::atomic::Ordering::SeqCst)
    }

    fn store(&self, value: bool) {
        self.0.store(value, std::sync::atomic::Ordering::SeqCst)
    }
}

#[derive(Debug, Default)]
struct TransferState {
    completed: HashMap<usize, u64>,
    uploaded: u64,
    seeders: u32,
    pieces: HashSet<u32>,
    error: Option<EngineError>,
}

/// A torrent served by [`MockEngine`].
///
/// File content is generated: byte `i` of a file is `i % 251`.
#[derive(Debug)]
pub struct MockTorrent {
    info_hash: String,
    name: String,
    files: Vec<TorrentFile>,
    metainfo: Option<Bytes>,
    transfer: RwLock<TransferState>,
    requested: RwLock<Vec<PieceRange>>,
    prioritized: RwLock<Vec<PieceRange>>,
    pauses: RwLock<u32>,
    resumes: RwLock<u32>,
    closed: Flag,
}

impl MockTorrent {
    pub fn new(info_hash: &str, name: &str) -> Self {
        Self {
            info_hash: info_hash.to_string(),
            name: name.to_string(),
            files: Vec::new(),
            metainfo: None,
            transfer: RwLock::new(TransferState::default()),
            requested: RwLock::new(Vec::new()),
            prioritized: RwLock::new(Vec::new()),
            pauses: RwLock::new(0),
            resumes: RwLock::new(0),
            closed: Flag::default(),
        }
    }

    /// Append a file; its index is its position.
    pub fn with_file(mut self, path: &str, size: u64, pieces: PieceRange) -> Self {
        let index = self.files.len();
        self.files.push(TorrentFile {
            index,
            path: path.to_string(),
            size,
            pieces,
        });
        self
    }

    /// Report `bytes` as the torrent's metainfo.
    pub fn with_metainfo(mut self, bytes: &[u8]) -> Self {
        self.metainfo = Some(Bytes::copy_from_slice(bytes));
        self
    }

    /// Generated content of a file.
    pub fn content(size: u64) -> Vec<u8> {
        (0..size).map(|i| (i % 251) as u8).collect()
    }

    pub async fn set_completed(&self, file: usize, bytes: u64) {
        self.transfer.write().await.completed.insert(file, bytes);
    }

    pub async fn set_uploaded(&self, bytes: u64) {
        self.transfer.write().await.uploaded = bytes;
    }

    pub async fn set_seeders(&self, seeders: u32) {
        self.transfer.write().await.seeders = seeders;
    }

    /// Mark an absolute piece index as verified.
    pub async fn set_piece_complete(&self, piece: u32, done: bool) {
        let mut state = self.transfer.write().await;
        if done {
            state.pieces.insert(piece);
        } else {
            state.pieces.remove(&piece);
        }
    }

    /// Make `transfer` fail until cleared.
    pub async fn set_transfer_error(&self, error: Option<EngineError>) {
        self.transfer.write().await.error = error;
    }

    /// Ranges passed to `download_pieces`, in order.
    pub async fn requested(&self) -> Vec<PieceRange> {
        self.requested.read().await.clone()
    }

    /// Ranges passed to `prioritize`, in order.
    pub async fn prioritized(&self) -> Vec<PieceRange> {
        self.prioritized.read().await.clone()
    }

    pub async fn pause_count(&self) -> u32 {
        *self.pauses.read().await
    }

    pub async fn resume_count(&self) -> u32 {
        *self.resumes.read().await
    }

    pub async fn is_closed(&self) -> bool {
        self.closed.load()
    }

    fn file(&self, index: usize) -> Result<&TorrentFile, EngineError> {
        self.files
            .iter()
            .find(|f| f.index == index)
            .ok_or(EngineError::FileNotFound(index))
    }
}

#[async_trait]
impl EngineTorrent for MockTorrent {
    fn info_hash(&self) -> String {
        self.info_hash.clone()
    }

    fn name(&self) -> String {
        self.name.clone()
    }

    fn files(&self) -> Vec<TorrentFile> {
        self.files.clone()
    }

    fn metainfo(&self) -> Option<Bytes> {
        self.metainfo.clone()
    }

    async fn download_pieces(&self, range: PieceRange) -> Result<(), EngineError> {
        self.requested.write().await.push(range);
        Ok(())
    }

    async fn prioritize(&self, range: PieceRange) -> Result<(), EngineError> {
        self.prioritized.write().await.push(range);
        Ok(())
    }

    async fn pause(&self) -> Result<(), EngineError> {
        *self.pauses.write().await += 1;
        Ok(())
    }

    async fn resume(&self) -> Result<(), EngineError> {
        *self.resumes.write().await += 1;
        Ok(())
    }

    async fn transfer(&self, file: usize) -> Result<Transfer, EngineError> {
        let file = self.file(file)?;
        let state = self.transfer.read().await;
        if let Some(e) = &state.error {
            return Err(e.clone());
        }
        Ok(Transfer {
            completed: state.completed.get(&file.index).copied().unwrap_or(0),
            uploaded: state.uploaded,
            seeders: state.seeders,
            pieces: (file.pieces.first..=file.pieces.last)
                .map(|p| state.pieces.contains(&p))
                .collect(),
        })
    }

    async fn reader(&self, file: usize) -> Result<FileReader, EngineError> {
        let file = self.file(file)?;
        Ok(Box::new(Cursor::new(Self::content(file.size))))
    }

    async fn close(&self) -> Result<(), EngineError> {
        self.closed.store(true);
        Ok(())
    }
}
