//! Saved torrent metainfo.
//!
//! Metainfo received for a torrent is written to `<dir>/<HASH>.torrent`.
//! Opening a magnet whose hash has a saved file loads that file instead of
//! waiting on the swarm for metadata.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use crate::config::SessionConfig;
use crate::discovery::CachedLookup;
use crate::magnet;

use super::{EngineError, EngineTorrent, TorrentEngine};

/// Directory of `<HASH>.torrent` files.
#[derive(Debug, Clone)]
pub struct MetainfoStore {
    dir: PathBuf,
}

impl MetainfoStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// File name uses the upper-case hash.
    pub fn path_for(&self, hash: &str) -> PathBuf {
        self.dir.join(format!("{}.torrent", hash.to_uppercase()))
    }

    pub fn contains(&self, hash: &str) -> bool {
        !hash.is_empty() && self.path_for(hash).is_file()
    }

    /// Saved metainfo for a magnet `resource`. Other resources never match.
    pub fn lookup(&self, resource: &str) -> Option<PathBuf> {
        let descriptor = magnet::parse(resource).ok()?;
        let path = self.path_for(&descriptor.info_hash);
        path.is_file().then_some(path)
    }

    pub async fn save(&self, hash: &str, bytes: &[u8]) -> Result<PathBuf, EngineError> {
        tokio::fs::create_dir_all(&self.dir).await.map_err(|e| {
            EngineError::Io(format!("Failed to create {}: {}", self.dir.display(), e))
        })?;
        let path = self.path_for(hash);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|e| EngineError::Io(format!("Failed to write {}: {}", path.display(), e)))?;
        Ok(path)
    }
}

impl CachedLookup for MetainfoStore {
    fn is_cached(&self, hash: &str) -> bool {
        self.contains(hash)
    }
}

/// Engine wrapper that saves metainfo after every open and reuses it for
/// magnets.
pub struct MetainfoCache {
    inner: Arc<dyn TorrentEngine>,
    store: Arc<MetainfoStore>,
}

impl MetainfoCache {
    pub fn new(inner: Arc<dyn TorrentEngine>, store: Arc<MetainfoStore>) -> Self {
        Self { inner, store }
    }

    pub fn store(&self) -> &MetainfoStore {
        &self.store
    }

    async fn remember(&self, torrent: &dyn EngineTorrent) {
        let hash = torrent.info_hash();
        if self.store.contains(&hash) {
            return;
        }
        let Some(bytes) = torrent.metainfo() else {
            debug!(hash = %hash, "Engine kept no metainfo");
            return;
        };
        match self.store.save(&hash, &bytes).await {
            Ok(path) => info!(hash = %hash, path = %path.display(), "Saved torrent metainfo"),
            Err(e) => warn!(hash = %hash, error = %e, "Failed to save torrent metainfo"),
        }
    }
}

#[async_trait]
impl TorrentEngine for MetainfoCache {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn open(
        &self,
        resource: &str,
        config: &SessionConfig,
    ) -> Result<Arc<dyn EngineTorrent>, EngineError> {
        if let Some(path) = self.store.lookup(resource) {
            let local = path.to_string_lossy();
            match self.inner.open(&local, config).await {
                Ok(torrent) => {
                    info!(hash = %torrent.info_hash(), path = %local, "Opened from saved metainfo");
                    return Ok(torrent);
                }
                Err(e) => {
                    warn!(path = %local, error = %e, "Saved metainfo unusable, fetching from swarm");
                }
            }
        }

        let torrent = self.inner.open(resource, config).await?;
        self.remember(torrent.as_ref()).await;
        Ok(torrent)
    }
}
