//! Human-readable names from release-style display names.

use once_cell::sync::Lazy;
use regex_lite::Regex;

static SEASON_EPISODE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(S\d{2}(E\d{2})?|Season \d+)\b").expect("season pattern is valid")
});

/// Tags cut from the name at their first occurrence, in order.
static NOISE: Lazy<Vec<Regex>> = Lazy::new(|| {
    [
        r"(?i)\b(720p|1080p|2160p|4k|8k)\b",
        r"(?i)\b(x264|x265|h264|h265)\b",
        r"(?i)\b(WEBRip|BRRip|BluRay|HDTV|WEB-DL)\b",
        r"(?i)\b(DTS|DD5\.1|AAC|Atmos|TrueHD|MP3)\b",
        r"\[\w+\]",
        r"\([^)]+\)",
        r"-.*$",
    ]
    .iter()
    .map(|p| Regex::new(p).expect("noise pattern is valid"))
    .collect()
});

/// Derive a search-friendly title from a release name.
///
/// Keeps everything up to a season/episode marker, cuts at the first
/// resolution, codec, source, audio, bracket or release-group tag, and turns
/// dots and underscores into spaces.
pub fn clean_display_name(name: &str) -> String {
    let mut name = match SEASON_EPISODE.find(name) {
        Some(m) => &name[..m.end()],
        None => name,
    };

    for re in NOISE.iter() {
        if let Some(m) = re.find(name) {
            name = &name[..m.start()];
        }
    }

    name.replace(['.', '_'], " ")
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}
