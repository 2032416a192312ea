//! Torrent scrapers.
//!
//! Each scraper turns a parsed request into a [`StreamResponse`] using its
//! upstream's API or HTML. All of them share the same outline: gate on
//! configuration and cancellation, search with the primary query (falling
//! back to the broader one on zero results), filter to the requested
//! episode, dedupe, rank by seeders, recover magnets from detail pages, and
//! promote the survivors to streams.

pub mod apibay;
pub mod eztv;
pub mod leetx;
pub mod torrentgalaxy;
pub mod yts;

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio_util::sync::CancellationToken;

use crate::services::display::{self, DisplayInput};
use crate::services::http::HttpClient;
use crate::services::id::ParsedRequestId;
use crate::services::magnet;
use crate::services::query::{self, Queries, QueryBuilder};

pub use apibay::ApiBayScraper;
pub use eztv::EztvScraper;
pub use leetx::LeetxScraper;
pub use torrentgalaxy::TorrentGalaxyScraper;
pub use yts::YtsScraper;

/// Kind of media being requested.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MediaType {
    Movie,
    Series,
}

impl MediaType {
    /// Parse the request path segment. Anything but `movie`/`series` is
    /// rejected.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "movie" => Some(MediaType::Movie),
            "series" => Some(MediaType::Series),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            MediaType::Movie => "movie",
            MediaType::Series => "series",
        }
    }
}

/// Optional player hints attached to a stream.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BehaviorHints {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub country_whitelist: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub not_web_ready: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub binge_group: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub proxy_headers: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_size: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
}

impl BehaviorHints {
    pub fn is_empty(&self) -> bool {
        *self == BehaviorHints::default()
    }
}

/// One playable stream. Exactly one of `info_hash` or `url` is set; when
/// `info_hash` is set the player synthesizes the magnet itself.
///
/// `seeders` is internal ranking state and never serialized.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Stream {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    #[serde(rename = "infoHash", skip_serializing_if = "Option::is_none")]
    pub info_hash: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<String>>,
    #[serde(
        rename = "behaviorHints",
        skip_serializing_if = "Option::is_none"
    )]
    pub behavior_hints: Option<BehaviorHints>,
    #[serde(skip_serializing, default)]
    pub seeders: Option<u32>,
}

impl Stream {
    /// Key used for cross-scraper deduplication.
    pub fn identity(&self) -> Option<&str> {
        self.info_hash.as_deref().or(self.url.as_deref())
    }
}

/// Stream listing returned to the player.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamResponse {
    pub streams: Vec<Stream>,
}

/// A raw result row, before magnet recovery and stream promotion.
#[derive(Debug, Clone, Default)]
pub struct TorrentCandidate {
    pub name: String,
    pub detail_url: Option<String>,
    pub magnet: Option<String>,
    pub info_hash: Option<String>,
    pub seeders: u32,
    pub leechers: u32,
    pub size_bytes: Option<u64>,
    pub size_label: Option<String>,
    /// Raw quality hint when the source reports one out of band.
    pub quality: Option<String>,
    pub season: Option<u32>,
    pub episode: Option<u32>,
}

/// Per-request dependencies handed to every scraper.
#[derive(Clone)]
pub struct ScrapeContext {
    pub media_type: MediaType,
    pub http: Arc<HttpClient>,
    pub query_builder: Arc<QueryBuilder>,
    pub cancel: CancellationToken,
}

impl ScrapeContext {
    pub async fn queries(&self, parsed: &ParsedRequestId) -> Queries {
        self.query_builder.build(parsed).await
    }
}

/// A single torrent source.
#[async_trait]
pub trait Scraper: Send + Sync {
    /// Source label shown to the user.
    fn name(&self) -> &'static str;

    /// Resolve streams for the request. Upstream failures are absorbed here;
    /// an empty response is a valid outcome.
    async fn scrape(&self, parsed: &ParsedRequestId, ctx: &ScrapeContext) -> StreamResponse;
}

/// Keep the requested episode only. Candidates without parseable episode
/// markers are dropped when an episode is requested.
pub fn filter_episode(candidates: Vec<TorrentCandidate>, parsed: &ParsedRequestId) -> Vec<TorrentCandidate> {
    candidates
        .into_iter()
        .filter(|c| match (c.season, c.episode) {
            (Some(s), Some(e)) => match (parsed.season, parsed.episode) {
                (Some(ps), Some(pe)) => s == ps && e == pe,
                _ => true,
            },
            _ => query::matches_episode(&c.name, parsed.season, parsed.episode),
        })
        .collect()
}

/// Dedupe by detail URL or magnet (name as a last resort), keeping the first
/// occurrence, then rank by seeders descending. The sort is stable.
pub fn dedupe_and_rank(candidates: Vec<TorrentCandidate>) -> Vec<TorrentCandidate> {
    let mut seen: HashSet<String> = HashSet::new();
    let mut unique: Vec<TorrentCandidate> = Vec::new();
    for candidate in candidates {
        let key = candidate
            .detail_url
            .clone()
            .or_else(|| candidate.magnet.clone())
            .unwrap_or_else(|| candidate.name.clone());
        if seen.insert(key) {
            unique.push(candidate);
        }
    }
    unique.sort_by(|a, b| b.seeders.cmp(&a.seeders));
    unique
}

/// Promote a candidate to a stream. Requires an info hash, either given
/// directly or recovered from the magnet; candidates without one are
/// discarded.
pub fn candidate_into_stream(
    candidate: TorrentCandidate,
    source: &'static str,
    parsed: &ParsedRequestId,
    queries: &Queries,
) -> Option<Stream> {
    let (info_hash, sources) = match &candidate.info_hash {
        Some(hash) if hash.len() == 40 => (hash.to_ascii_lowercase(), Vec::new()),
        _ => {
            let info = magnet::parse(candidate.magnet.as_deref()?)?;
            (info.info_hash, info.sources)
        }
    };

    let rendered = display::format(&DisplayInput {
        imdb_title: &queries.base_title,
        season: parsed.season,
        episode: parsed.episode,
        torrent_name: (!candidate.name.is_empty()).then_some(candidate.name.as_str()),
        quality: candidate.quality.as_deref(),
        source: Some(source),
        seeders: Some(candidate.seeders),
        size_bytes: candidate.size_bytes,
        size_label: candidate.size_label.as_deref(),
    });

    let hints = BehaviorHints {
        video_size: candidate.size_bytes,
        filename: (!candidate.name.is_empty()).then(|| candidate.name.clone()),
        ..Default::default()
    };

    Some(Stream {
        name: rendered.name,
        description: Some(rendered.description),
        url: None,
        info_hash: Some(info_hash),
        sources: (!sources.is_empty()).then_some(sources),
        behavior_hints: (!hints.is_empty()).then_some(hints),
        seeders: Some(candidate.seeders),
    })
}

/// Parse a human-readable size (`1.4 GB`, `700MiB`) to bytes.
///
/// Both decimal-looking and binary-looking suffixes use a factor of 1024.
pub fn parse_size(size_str: &str) -> Option<u64> {
    let clean = size_str.trim().to_uppercase();
    let parts: Vec<&str> = clean.split_whitespace().collect();
    if parts.is_empty() {
        return None;
    }

    let (num_str, unit) = if parts.len() >= 2 {
        (parts[0].to_string(), parts[1].to_string())
    } else {
        let s = parts[0];
        let pos = s.find(|c: char| c.is_alphabetic()).unwrap_or(s.len());
        (s[..pos].to_string(), s[pos..].to_string())
    };

    let num: f64 = num_str.replace(',', "").parse().ok()?;
    let multiplier: u64 = match unit.as_str() {
        "B" => 1,
        "KB" | "KIB" => 1024,
        "MB" | "MIB" => 1024 * 1024,
        "GB" | "GIB" => 1024 * 1024 * 1024,
        "TB" | "TIB" => 1024u64.pow(4),
        _ => return None,
    };

    Some((num * multiplier as f64) as u64)
}
