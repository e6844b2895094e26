//! Periodic statistics sampling for a session.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch, Mutex};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info};

use super::{SessionState, Stats, TorrentSession};

/// Bytes per second from a delta observed over `interval`.
pub fn per_second(delta: u64, interval: Duration) -> u64 {
    let millis = interval.as_millis() as u64;
    if millis == 0 {
        return delta;
    }
    delta.saturating_mul(1000) / millis
}

/// Time covered by a sample taken at `now`, never shorter than `interval`.
fn sample_span(last: Instant, now: Instant, interval: Duration) -> Duration {
    now.saturating_duration_since(last).max(interval)
}

/// Sample `session` every `interval` until shutdown or close.
///
/// Rates divide each delta by the time since the previous sample, so a tick
/// delayed behind the session lock does not inflate them. The latest sample
/// is published on the returned watch channel.
pub fn spawn_sampler(
    session: Arc<Mutex<TorrentSession>>,
    interval: Duration,
    mut shutdown_rx: broadcast::Receiver<()>,
) -> (watch::Receiver<Stats>, JoinHandle<()>) {
    let (tx, rx) = watch::channel(Stats::default());

    let handle = tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        let mut last = Instant::now();

        loop {
            tokio::select! {
                _ = shutdown_rx.recv() => {
                    info!("Stats sampler received shutdown signal");
                    break;
                }
                _ = ticker.tick() => {
                    let mut stats = session.lock().await.sample().await;
                    let now = Instant::now();
                    let span = sample_span(last, now, interval);
                    last = now;
                    stats.download_rate = per_second(stats.downloaded_delta, span);
                    stats.upload_rate = per_second(stats.uploaded_delta, span);

                    debug!(
                        completed = stats.completed,
                        size = stats.size,
                        download_rate = stats.download_rate,
                        seeders = stats.seeders,
                        "Session sample"
                    );

                    let closed = stats.state == Some(SessionState::Closed);
                    if tx.send(stats).is_err() || closed {
                        break;
                    }
                }
            }
        }
        debug!("Stats sampler stopped");
    });

    (rx, handle)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SessionConfig;
    use crate::testing::{fixtures, MockEngine};

    #[test]
    fn test_per_second() {
        assert_eq!(per_second(1000, Duration::from_secs(1)), 1000);
        assert_eq!(per_second(1000, Duration::from_millis(500)), 2000);
        assert_eq!(per_second(1000, Duration::from_secs(4)), 250);
        assert_eq!(per_second(7, Duration::ZERO), 7);
    }

    #[test]
    fn test_sample_span_never_below_interval() {
        let start = Instant::now();
        let interval = Duration::from_secs(1);
        assert_eq!(sample_span(start, start, interval), interval);
        assert_eq!(
            sample_span(start, start + Duration::from_millis(3500), interval),
            Duration::from_millis(3500)
        );
    }

    async fn playing_session() -> (Arc<Mutex<TorrentSession>>, Arc<crate::testing::MockTorrent>) {
        let engine = MockEngine::new();
        let torrent = engine.add_torrent("sintel", fixtures::mock_torrent()).await;
        let mut session = TorrentSession::open(&engine, "sintel", SessionConfig::default())
            .await
            .unwrap();
        session.select_file(1).await.unwrap();
        (Arc::new(Mutex::new(session)), torrent)
    }

    #[tokio::test(start_paused = true)]
    async fn test_publishes_rates() {
        let (session, torrent) = playing_session().await;
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (mut rx, handle) = spawn_sampler(session, Duration::from_secs(2), shutdown_rx);

        rx.changed().await.unwrap();
        torrent.set_completed(1, 8000).await;
        torrent.set_seeders(3).await;

        rx.changed().await.unwrap();
        let stats = rx.borrow().clone();
        assert_eq!(stats.completed, 8000);
        assert_eq!(stats.downloaded_delta, 8000);
        assert_eq!(stats.download_rate, 4000);
        assert_eq!(stats.seeders, 3);

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_sample_divides_by_elapsed_time() {
        let (session, torrent) = playing_session().await;
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (mut rx, handle) =
            spawn_sampler(Arc::clone(&session), Duration::from_secs(1), shutdown_rx);
        rx.changed().await.unwrap();

        // Hold the session so the next tick waits 3.5s for the lock.
        let guard = session.lock().await;
        torrent.set_completed(1, 7000).await;
        tokio::time::sleep(Duration::from_millis(3500)).await;
        drop(guard);

        rx.changed().await.unwrap();
        let stats = rx.borrow().clone();
        assert_eq!(stats.downloaded_delta, 7000);
        assert_eq!(stats.download_rate, 2000);

        shutdown_tx.send(()).unwrap();
        handle.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_after_close() {
        let (session, _) = playing_session().await;
        let (_shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let (mut rx, handle) =
            spawn_sampler(Arc::clone(&session), Duration::from_secs(1), shutdown_rx);

        rx.changed().await.unwrap();
        session.lock().await.close().await.unwrap();

        handle.await.unwrap();
        assert_eq!(rx.borrow().state, Some(SessionState::Closed));
    }
}
