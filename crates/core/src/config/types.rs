use serde::{Deserialize, Serialize};
use std::net::IpAddr;
use std::path::PathBuf;

/// Placeholder replaced by the search query in provider URL templates.
pub const QUERY_PLACEHOLDER: &str = "{query}";

/// Root configuration
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub stream: StreamConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub discovery: DiscoveryConfig,
    #[serde(default)]
    pub cache: CacheConfig,
    #[serde(default)]
    pub engine: EngineConfig,
}

/// Control API server configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: IpAddr,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> IpAddr {
    IpAddr::from([0, 0, 0, 0])
}

fn default_port() -> u16 {
    8090
}

/// Per-session streaming endpoint configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct StreamConfig {
    #[serde(default = "default_stream_port")]
    pub port: u16,
    /// Seconds to wait for in-flight responses on shutdown.
    #[serde(default = "default_grace_period")]
    pub grace_period_secs: u64,
    /// Host name used when building stream URLs.
    #[serde(default = "default_public_host")]
    pub public_host: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            port: default_stream_port(),
            grace_period_secs: default_grace_period(),
            public_host: default_public_host(),
        }
    }
}

fn default_stream_port() -> u16 {
    8080
}

fn default_grace_period() -> u64 {
    5
}

fn default_public_host() -> String {
    "localhost".to_string()
}

/// Transfer and playback policy for a torrent session
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct SessionConfig {
    #[serde(default = "default_listen_port")]
    pub listen_port: u16,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
    /// Upload while downloading.
    #[serde(default = "default_true")]
    pub seed: bool,
    /// Keep uploading once the target file is complete.
    #[serde(default)]
    pub seed_after_complete: bool,
    /// Prefer TCP transport.
    #[serde(default = "default_true")]
    pub tcp: bool,
    /// Share of the file's pieces fetched ahead of playback. 0 means the default.
    #[serde(default = "default_download_ahead")]
    pub download_ahead_percent: u32,
    /// Upload cap in bytes per second; 0 is unlimited.
    #[serde(default)]
    pub upload_rate: u64,
    #[serde(default = "default_media_extensions")]
    pub media_extensions: Vec<String>,
    #[serde(default = "default_stats_interval")]
    pub stats_interval_secs: u64,
    #[serde(default = "default_readiness_poll")]
    pub readiness_poll_ms: u64,
}

impl SessionConfig {
    /// Download-ahead percentage with 0 replaced by the default.
    pub fn effective_download_ahead(&self) -> u32 {
        if self.download_ahead_percent == 0 {
            default_download_ahead()
        } else {
            self.download_ahead_percent
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            listen_port: default_listen_port(),
            max_connections: default_max_connections(),
            seed: true,
            seed_after_complete: false,
            tcp: true,
            download_ahead_percent: default_download_ahead(),
            upload_rate: 0,
            media_extensions: default_media_extensions(),
            stats_interval_secs: default_stats_interval(),
            readiness_poll_ms: default_readiness_poll(),
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_listen_port() -> u16 {
    50007
}

fn default_max_connections() -> u32 {
    200
}

fn default_download_ahead() -> u32 {
    5
}

fn default_media_extensions() -> Vec<String> {
    [".mp4", ".mkv", ".avi", ".webm", ".m4v", ".mov"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_stats_interval() -> u64 {
    1
}

fn default_readiness_poll() -> u64 {
    1000
}

/// Search fan-out configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct DiscoveryConfig {
    /// Quality tags, lowest first.
    #[serde(default = "default_qualities")]
    pub qualities: Vec<String>,
    #[serde(default = "default_retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_ms: u64,
    /// Per-request timeout in seconds (default: 30)
    #[serde(default = "default_timeout")]
    pub timeout_secs: u32,
    #[serde(default)]
    pub providers: Vec<ApiProviderConfig>,
}

impl Default for DiscoveryConfig {
    fn default() -> Self {
        Self {
            qualities: default_qualities(),
            retry_attempts: default_retry_attempts(),
            retry_delay_ms: default_retry_delay(),
            timeout_secs: default_timeout(),
            providers: Vec::new(),
        }
    }
}

fn default_qualities() -> Vec<String> {
    ["720p", "1080p", "2160p"]
        .iter()
        .map(|s| s.to_string())
        .collect()
}

fn default_retry_attempts() -> u32 {
    3
}

fn default_retry_delay() -> u64 {
    1000
}

fn default_timeout() -> u32 {
    30
}

/// A structured JSON search API.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ApiProviderConfig {
    /// Provider id used in search requests.
    pub id: String,
    /// URL template containing `{query}`.
    pub url: String,
    /// Escape the query as a path segment instead of a query value.
    #[serde(default)]
    pub query_in_path: bool,
    /// JSON pointer to the result array; empty means the document root.
    #[serde(default)]
    pub results_pointer: String,
    #[serde(default)]
    pub fields: ApiFieldMap,
}

/// JSON pointers, relative to one result, for each offer field.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct ApiFieldMap {
    #[serde(default = "default_name_field")]
    pub name: String,
    #[serde(default)]
    pub magnet: Option<String>,
    #[serde(default)]
    pub hash: Option<String>,
    #[serde(default = "default_seeds_field")]
    pub seeds: String,
    /// Numeric size in bytes.
    #[serde(default)]
    pub size_bytes: Option<String>,
    /// Size already formatted for display.
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub link: Option<String>,
    #[serde(default)]
    pub source: Option<String>,
}

impl Default for ApiFieldMap {
    fn default() -> Self {
        Self {
            name: default_name_field(),
            magnet: None,
            hash: None,
            seeds: default_seeds_field(),
            size_bytes: None,
            size: None,
            link: None,
            source: None,
        }
    }
}

fn default_name_field() -> String {
    "/name".to_string()
}

fn default_seeds_field() -> String {
    "/seeders".to_string()
}

/// Result cache configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct CacheConfig {
    #[serde(default = "default_cache_path")]
    pub path: PathBuf,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            path: default_cache_path(),
        }
    }
}

fn default_cache_path() -> PathBuf {
    PathBuf::from("reelstream.db")
}

/// Torrent engine configuration
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct EngineConfig {
    /// Where downloaded files are written.
    #[serde(default = "default_download_path")]
    pub download_path: PathBuf,
    #[serde(default = "default_true")]
    pub enable_dht: bool,
    /// Session persistence directory. Persistence is off when unset.
    #[serde(default)]
    pub persistence_path: Option<PathBuf>,
    /// Where fetched metainfo is kept as `<HASH>.torrent`.
    #[serde(default = "default_torrent_path")]
    pub torrent_path: PathBuf,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            download_path: default_download_path(),
            enable_dht: true,
            persistence_path: None,
            torrent_path: default_torrent_path(),
        }
    }
}

fn default_download_path() -> PathBuf {
    PathBuf::from("./media")
}

fn default_torrent_path() -> PathBuf {
    PathBuf::from("./torrents")
}

/// Sanitized config for API responses (provider URLs may embed API keys)
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedConfig {
    pub server: ServerConfig,
    pub stream: StreamConfig,
    pub session: SessionConfig,
    pub discovery: SanitizedDiscoveryConfig,
    pub cache: CacheConfig,
    pub engine: EngineConfig,
}

#[derive(Debug, Clone, Serialize)]
pub struct SanitizedDiscoveryConfig {
    pub qualities: Vec<String>,
    pub retry_attempts: u32,
    pub retry_delay_ms: u64,
    pub timeout_secs: u32,
    pub providers: Vec<SanitizedProviderConfig>,
}

/// Provider entry with only the host of its URL template.
#[derive(Debug, Clone, Serialize)]
pub struct SanitizedProviderConfig {
    pub id: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,
}

impl From<&Config> for SanitizedConfig {
    fn from(config: &Config) -> Self {
        let d = &config.discovery;
        Self {
            server: config.server.clone(),
            stream: config.stream.clone(),
            session: config.session.clone(),
            discovery: SanitizedDiscoveryConfig {
                qualities: d.qualities.clone(),
                retry_attempts: d.retry_attempts,
                retry_delay_ms: d.retry_delay_ms,
                timeout_secs: d.timeout_secs,
                providers: d
                    .providers
                    .iter()
                    .map(|p| SanitizedProviderConfig {
                        id: p.id.clone(),
                        host: url::Url::parse(&p.url)
                            .ok()
                            .and_then(|u| u.host_str().map(str::to_string)),
                    })
                    .collect(),
            },
            cache: config.cache.clone(),
            engine: config.engine.clone(),
        }
    }
}
