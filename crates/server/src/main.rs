use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use reelstream_core::{
    load_config, validate_config, ApiExtractor, DiscoveryOrchestrator, LibrqbitEngine,
    MetainfoCache, MetainfoStore, PlaybackController, ResultCache, SqliteCache, TorrentEngine,
};
use reelstream_server::api::create_router;
use reelstream_server::state::AppState;

#[tokio::main]
async fn main() {
    if let Err(e) = run().await {
        error!("Fatal error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run() -> Result<()> {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config_path = std::env::var("REELSTREAM_CONFIG")
        .map(PathBuf::from)
        .unwrap_or_else(|_| PathBuf::from("config.toml"));

    info!("Loading configuration from {:?}", config_path);
    let config = load_config(&config_path)
        .with_context(|| format!("Failed to load config from {:?}", config_path))?;
    validate_config(&config).context("Configuration validation failed")?;

    info!(
        cache = ?config.cache.path,
        download_path = ?config.engine.download_path,
        providers = config.discovery.providers.len(),
        "Configuration loaded"
    );

    let cache = Arc::new(
        SqliteCache::new(&config.cache.path).context("Failed to open result cache")?,
    );
    info!("Result cache initialized");

    let metainfo = Arc::new(MetainfoStore::new(&config.engine.torrent_path));
    info!(path = %metainfo.dir().display(), "Torrent metainfo store initialized");

    let mut discovery = DiscoveryOrchestrator::new(config.discovery.qualities.clone())
        .with_cache(cache.clone())
        .with_cache(metainfo.clone());
    if config.discovery.providers.is_empty() {
        info!("No search providers configured, only magnet queries will resolve");
    } else {
        let extractor =
            ApiExtractor::new(&config.discovery).context("Failed to create API extractor")?;
        discovery = discovery.with_extractor(Arc::new(extractor));
    }
    let discovery = Arc::new(discovery);
    info!(providers = ?discovery.providers(), "Discovery initialized");

    let librqbit: Arc<dyn TorrentEngine> = Arc::new(
        LibrqbitEngine::new(&config.engine, &config.session)
            .await
            .context("Failed to start torrent engine")?,
    );
    let engine: Arc<dyn TorrentEngine> = Arc::new(MetainfoCache::new(librqbit, metainfo));
    info!(engine = engine.name(), "Torrent engine started");

    let playback = Arc::new(PlaybackController::new(
        engine,
        config.session.clone(),
        config.stream.clone(),
    ));

    let state = Arc::new(AppState::new(
        config.clone(),
        discovery,
        cache as Arc<dyn ResultCache>,
        Arc::clone(&playback),
    ));
    let app = create_router(state);

    let addr = SocketAddr::new(config.server.host, config.server.port);
    info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind to {}", addr))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    info!("Server shutting down...");
    if let Err(e) = playback.close().await {
        error!("Failed to close session: {}", e);
    }
    info!("Session closed");

    Ok(())
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM)
async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
