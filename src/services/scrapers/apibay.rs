//! ApiBay scraper (The Pirate Bay JSON API).
//!
//! Listings carry info hashes directly; a magnet is synthesized for each.
//! All configured bases and categories are queried in one settle.

use async_trait::async_trait;
use futures::future::join_all;
use serde::Deserialize;

use crate::services::http::FetchOptions;
use crate::services::id::ParsedRequestId;
use crate::services::scrapers::{
    candidate_into_stream, dedupe_and_rank, filter_episode, MediaType, ScrapeContext, Scraper,
    Stream, StreamResponse, TorrentCandidate,
};

pub const SCRAPER_KEY: &str = "apibay";

const MOVIE_CATEGORIES: [u32; 2] = [207, 201];
const SERIES_CATEGORIES: [u32; 2] = [208, 205];

/// A zero hash marks ApiBay's "no results" sentinel row.
const NULL_HASH: &str = "0000000000000000000000000000000000000000";

pub struct ApiBayScraper {
    bases: Vec<String>,
}

impl ApiBayScraper {
    pub fn new(bases: Vec<String>) -> Self {
        Self { bases }
    }

    async fn search(&self, q: &str, ctx: &ScrapeContext) -> Vec<TorrentCandidate> {
        let categories: &[u32] = match ctx.media_type {
            MediaType::Movie => &MOVIE_CATEGORIES,
            MediaType::Series => &SERIES_CATEGORIES,
        };

        let opts = FetchOptions::with_cancel(ctx.cancel.clone());
        let mut requests = Vec::new();
        for base in &self.bases {
            for category in categories {
                let url = format!("{}/q.php?q={}&cat={}", base, urlencoding::encode(q), category);
                let http = ctx.http.clone();
                let opts = opts.clone();
                requests.push(async move {
                    http.fetch_json::<Vec<ApiEntry>>(SCRAPER_KEY, &url, &opts)
                        .await
                        .unwrap_or_default()
                });
            }
        }

        join_all(requests)
            .await
            .into_iter()
            .flatten()
            .filter(|entry| !entry.info_hash.is_empty() && entry.info_hash != NULL_HASH)
            .map(ApiEntry::into_candidate)
            .collect()
    }
}

#[async_trait]
impl Scraper for ApiBayScraper {
    fn name(&self) -> &'static str {
        "TPB"
    }

    async fn scrape(&self, parsed: &ParsedRequestId, ctx: &ScrapeContext) -> StreamResponse {
        if self.bases.is_empty() || ctx.cancel.is_cancelled() {
            return StreamResponse::default();
        }

        let queries = ctx.queries(parsed).await;

        let mut candidates = self.search(&queries.query, ctx).await;
        if candidates.is_empty() {
            if let Some(fallback) = &queries.fallback_query {
                candidates = self.search(fallback, ctx).await;
            }
        }

        let candidates = filter_episode(candidates, parsed);
        let streams: Vec<Stream> = dedupe_and_rank(candidates)
            .into_iter()
            .filter_map(|c| candidate_into_stream(c, self.name(), parsed, &queries))
            .collect();

        StreamResponse { streams }
    }
}

/// ApiBay entry; numeric fields arrive as strings.
#[derive(Debug, Deserialize)]
struct ApiEntry {
    #[serde(default)]
    name: String,
    #[serde(default)]
    info_hash: String,
    #[serde(default)]
    seeders: String,
    #[serde(default)]
    leechers: String,
    #[serde(default)]
    size: String,
}

impl ApiEntry {
    fn into_candidate(self) -> TorrentCandidate {
        let hash = self.info_hash.to_ascii_lowercase();
        TorrentCandidate {
            magnet: Some(format!("magnet:?xt=urn:btih:{}", hash)),
            info_hash: Some(hash),
            seeders: self.seeders.parse().unwrap_or(0),
            leechers: self.leechers.parse().unwrap_or(0),
            size_bytes: self.size.parse().ok(),
            name: self.name,
            ..Default::default()
        }
    }
}
