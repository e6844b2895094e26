pub mod cache;
pub mod config;
pub mod discovery;
pub mod extractor;
pub mod magnet;
pub mod metrics;
pub mod playback;
pub mod retry;
pub mod session;
pub mod stream;
pub mod testing;

pub use cache::{CacheError, CacheRecord, CacheStats, ResultCache, SqliteCache};
pub use config::{
    load_config, load_config_from_str, validate_config, ApiProviderConfig, Config, ConfigError,
    SanitizedConfig, SessionConfig, StreamConfig,
};
pub use discovery::{
    CachedLookup, DiscoveryError, DiscoveryOrchestrator, ReconciledResult, SearchOutcome,
    SearchRequest,
};
pub use extractor::{ApiExtractor, ExtractError, Extractor, Offer};
pub use magnet::{MagnetDescriptor, MagnetError};
pub use playback::{PlaybackController, PlaybackError, PlaybackStats, SessionInfo};
pub use session::{
    EngineError, LibrqbitEngine, MetainfoCache, MetainfoStore, SessionError, SessionState, Stats,
    TorrentEngine, TorrentSession,
};
pub use stream::{StreamError, StreamServer};
