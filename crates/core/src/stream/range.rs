//! `Range` header handling for single byte ranges.

/// Outcome of matching a `Range` header against a file size.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ByteRange {
    /// No usable range; serve the whole file.
    Full,
    /// Inclusive byte span.
    Partial { start: u64, end: u64 },
    /// Syntactically valid but outside the file.
    Unsatisfiable,
}

impl ByteRange {
    /// Number of bytes to send for a file of `size` bytes.
    pub fn content_length(&self, size: u64) -> u64 {
        match self {
            ByteRange::Full => size,
            ByteRange::Partial { start, end } => end - start + 1,
            ByteRange::Unsatisfiable => 0,
        }
    }
}

/// Parse `bytes=a-b`, `bytes=a-` or `bytes=-n`.
///
/// Unknown units, multiple ranges and garbage fall back to the full file.
/// The end is clamped to the last byte.
pub fn parse_range_header(header: &str, size: u64) -> ByteRange {
    let Some(spec) = header.trim().strip_prefix("bytes=") else {
        return ByteRange::Full;
    };
    if spec.contains(',') {
        return ByteRange::Full;
    }
    let Some((start, end)) = spec.trim().split_once('-') else {
        return ByteRange::Full;
    };

    match (start.trim(), end.trim()) {
        ("", "") => ByteRange::Full,
        ("", suffix) => match suffix.parse::<u64>() {
            Ok(0) => ByteRange::Unsatisfiable,
            Ok(_) if size == 0 => ByteRange::Unsatisfiable,
            Ok(n) => ByteRange::Partial {
                start: size.saturating_sub(n),
                end: size - 1,
            },
            Err(_) => ByteRange::Full,
        },
        (start, end) => {
            let Ok(start) = start.parse::<u64>() else {
                return ByteRange::Full;
            };
            let end = if end.is_empty() {
                None
            } else {
                match end.parse::<u64>() {
                    Ok(e) => Some(e),
                    Err(_) => return ByteRange::Full,
                }
            };
            if start >= size {
                return ByteRange::Unsatisfiable;
            }
            match end {
                Some(e) if e < start => ByteRange::Full,
                Some(e) => ByteRange::Partial {
                    start,
                    end: e.min(size - 1),
                },
                None => ByteRange::Partial {
                    start,
                    end: size - 1,
                },
            }
        }
    }
}
