use std::sync::Arc;

use reelstream_core::{
    Config, DiscoveryOrchestrator, PlaybackController, ResultCache, SanitizedConfig,
};

/// Shared application state
pub struct AppState {
    config: Config,
    discovery: Arc<DiscoveryOrchestrator>,
    cache: Arc<dyn ResultCache>,
    playback: Arc<PlaybackController>,
}

impl AppState {
    pub fn new(
        config: Config,
        discovery: Arc<DiscoveryOrchestrator>,
        cache: Arc<dyn ResultCache>,
        playback: Arc<PlaybackController>,
    ) -> Self {
        Self {
            config,
            discovery,
            cache,
            playback,
        }
    }

    pub fn sanitized_config(&self) -> SanitizedConfig {
        SanitizedConfig::from(&self.config)
    }

    pub fn discovery(&self) -> &DiscoveryOrchestrator {
        &self.discovery
    }

    pub fn cache(&self) -> &dyn ResultCache {
        self.cache.as_ref()
    }

    pub fn playback(&self) -> &PlaybackController {
        &self.playback
    }
}
