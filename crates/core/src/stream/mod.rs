//! Progressive HTTP streaming of the active file.

mod range;
mod server;
mod source;

pub use range::{parse_range_header, ByteRange};
pub use server::{router, StreamError, StreamServer, CHUNK_SIZE};
pub use source::{BytesSource, FileReader, MediaReader, MediaSource};
