//! Byte sources the stream server reads from.

use std::io;

use async_trait::async_trait;
use tokio::io::{AsyncRead, AsyncSeek};

/// Seekable async reader over one file.
pub trait MediaReader: AsyncRead + AsyncSeek + Send + Unpin {}

impl<T: AsyncRead + AsyncSeek + Send + Unpin> MediaReader for T {}

pub type FileReader = Box<dyn MediaReader>;

/// Something that can open independent readers over a file of known size.
#[async_trait]
pub trait MediaSource: Send + Sync {
    /// Declared file size in bytes.
    fn size(&self) -> u64;

    /// Open a fresh reader positioned at the start.
    async fn open(&self) -> io::Result<FileReader>;
}

/// In-memory source, used by tests and for small files.
#[derive(Debug, Clone)]
pub struct BytesSource {
    data: bytes::Bytes,
}

impl BytesSource {
    pub fn new(data: impl Into<bytes::Bytes>) -> Self {
        Self { data: data.into() }
    }
}

#[async_trait]
impl MediaSource for BytesSource {
    fn size(&self) -> u64 {
        self.data.len() as u64
    }

    async fn open(&self) -> io::Result<FileReader> {
        Ok(Box::new(io::Cursor::new(self.data.clone())))
    }
}
