//! Per-session HTTP endpoint serving the active file with byte ranges.

use std::io::SeekFrom;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, HeaderValue, Method, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use bytes::Bytes;
use futures::stream;
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::metrics::STREAM_REQUESTS;

use super::range::{parse_range_header, ByteRange};
use super::source::{FileReader, MediaSource};

/// Bytes read from the source per body chunk.
pub const CHUNK_SIZE: usize = 256 * 1024;

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("Failed to bind stream endpoint on {addr}: {reason}")]
    Bind { addr: SocketAddr, reason: String },

    #[error("Stream server error: {0}")]
    Server(String),
}

#[derive(Clone)]
struct StreamState {
    media_name: Arc<str>,
    source: Arc<dyn MediaSource>,
}

/// A running stream endpoint.
pub struct StreamServer {
    local_addr: SocketAddr,
    grace: Duration,
    shutdown_tx: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl StreamServer {
    /// Bind `addr` and serve `source` as `/{media_name}`.
    pub async fn start(
        addr: SocketAddr,
        media_name: &str,
        source: Arc<dyn MediaSource>,
        grace: Duration,
    ) -> Result<Self, StreamError> {
        let listener = tokio::net::TcpListener::bind(addr)
            .await
            .map_err(|e| StreamError::Bind {
                addr,
                reason: e.to_string(),
            })?;
        let local_addr = listener.local_addr().map_err(|e| StreamError::Bind {
            addr,
            reason: e.to_string(),
        })?;

        let app = router(media_name, source);
        let (shutdown_tx, shutdown_rx) = oneshot::channel::<()>();

        let handle = tokio::spawn(async move {
            let result = axum::serve(listener, app)
                .with_graceful_shutdown(async {
                    let _ = shutdown_rx.await;
                })
                .await;
            if let Err(e) = result {
                warn!(error = %e, "Stream server stopped with error");
            }
        });

        info!(addr = %local_addr, media = %media_name, "Stream endpoint listening");

        Ok(Self {
            local_addr,
            grace,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    /// Stop accepting requests and wait for in-flight ones up to the grace
    /// period. Whatever is still running afterwards is aborted.
    pub async fn shutdown(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        let Some(mut handle) = self.handle.take() else {
            return;
        };

        match tokio::time::timeout(self.grace, &mut handle).await {
            Ok(_) => debug!(addr = %self.local_addr, "Stream endpoint stopped"),
            Err(_) => {
                warn!(
                    addr = %self.local_addr,
                    grace_secs = self.grace.as_secs(),
                    "In-flight stream requests outlived the grace period, aborting"
                );
                handle.abort();
            }
        }
    }
}

impl Drop for StreamServer {
    fn drop(&mut self) {
        if let Some(handle) = self.handle.take() {
            handle.abort();
        }
    }
}

/// Router serving one file. Exposed for in-process tests.
pub fn router(media_name: &str, source: Arc<dyn MediaSource>) -> Router {
    let state = StreamState {
        media_name: Arc::from(media_name),
        source,
    };
    Router::new()
        .route("/{*path}", get(serve_media))
        .with_state(state)
}

async fn serve_media(
    State(state): State<StreamState>,
    Path(path): Path<String>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    let response = if path != *state.media_name {
        (StatusCode::NOT_FOUND, "Not found").into_response()
    } else {
        media_response(&state, &method, &headers).await
    };
    STREAM_REQUESTS
        .with_label_values(&[response.status().as_str()])
        .inc();
    response
}

async fn media_response(state: &StreamState, method: &Method, headers: &HeaderMap) -> Response {
    let size = state.source.size();
    let range = headers
        .get(header::RANGE)
        .and_then(|v| v.to_str().ok())
        .map(|v| parse_range_header(v, size))
        .unwrap_or(ByteRange::Full);

    if range == ByteRange::Unsatisfiable {
        return (
            StatusCode::RANGE_NOT_SATISFIABLE,
            [(header::CONTENT_RANGE, format!("bytes */{}", size))],
        )
            .into_response();
    }

    let (status, start) = match range {
        ByteRange::Partial { start, .. } => (StatusCode::PARTIAL_CONTENT, start),
        _ => (StatusCode::OK, 0),
    };
    let length = range.content_length(size);

    let body = if method == Method::HEAD || length == 0 {
        Body::empty()
    } else {
        let mut reader = match state.source.open().await {
            Ok(r) => r,
            Err(e) => {
                warn!(media = %state.media_name, error = %e, "Failed to open media reader");
                return (StatusCode::INTERNAL_SERVER_ERROR, "Media unavailable").into_response();
            }
        };
        if start > 0 {
            if let Err(e) = reader.seek(SeekFrom::Start(start)).await {
                warn!(media = %state.media_name, start, error = %e, "Seek failed");
                return (StatusCode::INTERNAL_SERVER_ERROR, "Media unavailable").into_response();
            }
        }
        Body::from_stream(chunks(reader, length))
    };

    let mime = mime_guess::from_path(&*state.media_name).first_or_octet_stream();
    let mut response = Response::new(body);
    *response.status_mut() = status;

    let out = response.headers_mut();
    out.insert(header::ACCEPT_RANGES, HeaderValue::from_static("bytes"));
    out.insert(header::CONTENT_LENGTH, HeaderValue::from(length));
    if let Ok(v) = HeaderValue::from_str(mime.as_ref()) {
        out.insert(header::CONTENT_TYPE, v);
    }
    if let Ok(v) = HeaderValue::from_str(&content_disposition(&state.media_name)) {
        out.insert(header::CONTENT_DISPOSITION, v);
    }
    if let ByteRange::Partial { start, end } = range {
        if let Ok(v) = HeaderValue::from_str(&format!("bytes {}-{}/{}", start, end, size)) {
            out.insert(header::CONTENT_RANGE, v);
        }
    }
    response
}

fn content_disposition(name: &str) -> String {
    let escaped = name.replace('\\', "\\\\").replace('"', "\\\"");
    format!("attachment; filename=\"{}\"", escaped)
}

/// Read `length` bytes from `reader` in [`CHUNK_SIZE`] pieces.
fn chunks(
    reader: FileReader,
    length: u64,
) -> impl futures::Stream<Item = Result<Bytes, std::io::Error>> {
    stream::unfold((reader, length), |(mut reader, remaining)| async move {
        if remaining == 0 {
            return None;
        }
        let want = remaining.min(CHUNK_SIZE as u64) as usize;
        let mut buf = vec![0u8; want];
        match reader.read(&mut buf).await {
            Ok(0) => None,
            Ok(n) => {
                buf.truncate(n);
                Some((Ok(Bytes::from(buf)), (reader, remaining - n as u64)))
            }
            Err(e) => Some((Err(e), (reader, 0))),
        }
    })
}
