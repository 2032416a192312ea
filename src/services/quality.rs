//! Quality label extraction from release names.

use lazy_static::lazy_static;
use regex::Regex;

lazy_static! {
    static ref QUALITY_RE: Regex = Regex::new(r"(?i)\b(2160p|1080p|720p|480p|4k|uhd)\b").unwrap();
}

/// Scan text for a quality token and return the canonical label.
///
/// The first word-bounded match wins; `4k` and `uhd` canonicalize to `2160p`.
pub fn extract(text: &str) -> Option<&'static str> {
    let m = QUALITY_RE.find(text)?;
    match m.as_str().to_ascii_lowercase().as_str() {
        "2160p" | "4k" | "uhd" => Some("2160p"),
        "1080p" => Some("1080p"),
        "720p" => Some("720p"),
        "480p" => Some("480p"),
        _ => None,
    }
}
