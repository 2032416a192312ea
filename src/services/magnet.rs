//! Magnet URI parsing.
//!
//! Extracts the BitTorrent info hash (hex or base32 form) and the tracker
//! list from a `magnet:` URI.

use data_encoding::{BASE32, HEXLOWER};

/// Parsed magnet link contents.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MagnetInfo {
    /// 40-char lowercase hex info hash.
    pub info_hash: String,
    /// Tracker URLs, each prefixed with `tracker:`, first occurrence kept.
    pub sources: Vec<String>,
}

/// Parse a magnet URI.
///
/// The first `xt` parameter with a `urn:btih:` prefix provides the info hash,
/// either as 40 hex chars or as 32 base32 chars (decoded to hex). Returns
/// `None` for any other shape.
pub fn parse(uri: &str) -> Option<MagnetInfo> {
    let query = uri.strip_prefix("magnet:")?;
    let query = query.strip_prefix('?').unwrap_or(query);

    let mut info_hash = None;
    let mut sources: Vec<String> = Vec::new();

    for pair in query.split('&') {
        let (key, raw_value) = match pair.split_once('=') {
            Some(kv) => kv,
            None => continue,
        };
        let value = match urlencoding::decode(raw_value) {
            Ok(v) => v.into_owned(),
            Err(_) => continue,
        };

        match key {
            "xt" if info_hash.is_none() => {
                if let Some(remainder) = strip_btih_prefix(&value) {
                    info_hash = normalize_hash(remainder);
                }
            }
            "tr" if !value.is_empty() => {
                let tracker = if value.starts_with("tracker:") {
                    value
                } else {
                    format!("tracker:{}", value)
                };
                if !sources.contains(&tracker) {
                    sources.push(tracker);
                }
            }
            _ => {}
        }
    }

    info_hash.map(|info_hash| MagnetInfo { info_hash, sources })
}

fn strip_btih_prefix(value: &str) -> Option<&str> {
    const PREFIX: &str = "urn:btih:";
    let head = value.as_bytes().get(..PREFIX.len())?;
    if head.eq_ignore_ascii_case(PREFIX.as_bytes()) {
        Some(&value[PREFIX.len()..])
    } else {
        None
    }
}

/// Normalize a raw btih payload to 40-char lowercase hex.
fn normalize_hash(raw: &str) -> Option<String> {
    if raw.len() == 40 && raw.bytes().all(|b| b.is_ascii_hexdigit()) {
        return Some(raw.to_ascii_lowercase());
    }
    if raw.len() == 32 {
        // Base32 per RFC 4648, no padding; the alphabet is upper case.
        let bytes = BASE32.decode(raw.to_ascii_uppercase().as_bytes()).ok()?;
        if bytes.len() == 20 {
            return Some(HEXLOWER.encode(&bytes));
        }
    }
    None
}
