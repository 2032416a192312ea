//! YTS scraper (movies, JSON API).
//!
//! YTS indexes by IMDb id, so the search skips query strings entirely and
//! asks for the title directly. Torrent entries carry their info hash in the
//! listing; no detail fetches are needed.

use async_trait::async_trait;
use serde::Deserialize;

use crate::services::http::FetchOptions;
use crate::services::id::ParsedRequestId;
use crate::services::scrapers::{
    candidate_into_stream, ScrapeContext, Scraper, Stream, StreamResponse, TorrentCandidate,
};

pub const SCRAPER_KEY: &str = "yts";

pub struct YtsScraper {
    bases: Vec<String>,
}

impl YtsScraper {
    pub fn new(bases: Vec<String>) -> Self {
        Self { bases }
    }
}

#[async_trait]
impl Scraper for YtsScraper {
    fn name(&self) -> &'static str {
        "YTS"
    }

    async fn scrape(&self, parsed: &ParsedRequestId, ctx: &ScrapeContext) -> StreamResponse {
        if self.bases.is_empty() || ctx.cancel.is_cancelled() {
            return StreamResponse::default();
        }

        let queries = ctx.queries(parsed).await;
        let opts = FetchOptions::with_cancel(ctx.cancel.clone());

        for base in &self.bases {
            let url = format!(
                "{}/api/v2/list_movies.json?query_term={}&limit=1",
                base,
                urlencoding::encode(&parsed.base_id)
            );
            let Some(response) = ctx.http.fetch_json::<ApiResponse>(SCRAPER_KEY, &url, &opts).await
            else {
                tracing::warn!(indexer = self.name(), url = %url, "search request failed");
                continue;
            };
            if response.status != "ok" {
                tracing::warn!(indexer = self.name(), url = %url, status = %response.status, "API error");
                continue;
            }

            let movies = response.data.and_then(|d| d.movies).unwrap_or_default();
            let streams: Vec<Stream> = movies
                .into_iter()
                .filter(|m| m.imdb_code == parsed.base_id)
                .flat_map(|movie| {
                    let movie_name = format!("{} ({})", movie.title, movie.year);
                    movie.torrents.into_iter().map(move |torrent| TorrentCandidate {
                        name: movie_name.clone(),
                        info_hash: Some(torrent.hash.to_ascii_lowercase()),
                        seeders: torrent.seeds,
                        leechers: torrent.peers,
                        size_bytes: Some(torrent.size_bytes),
                        quality: Some(format!("{} {}", torrent.quality, torrent.torrent_type)),
                        ..Default::default()
                    })
                })
                .filter_map(|candidate| candidate_into_stream(candidate, self.name(), parsed, &queries))
                .collect();

            if !streams.is_empty() {
                return StreamResponse { streams };
            }
        }

        StreamResponse::default()
    }
}

/// YTS API response structure.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    status: String,
    data: Option<ApiData>,
}

#[derive(Debug, Deserialize)]
struct ApiData {
    movies: Option<Vec<ApiMovie>>,
}

#[derive(Debug, Deserialize)]
struct ApiMovie {
    title: String,
    #[serde(default)]
    year: u16,
    imdb_code: String,
    #[serde(default)]
    torrents: Vec<ApiTorrent>,
}

#[derive(Debug, Deserialize)]
struct ApiTorrent {
    hash: String,
    quality: String,
    #[serde(rename = "type", default)]
    torrent_type: String,
    #[serde(default)]
    seeds: u32,
    #[serde(default)]
    peers: u32,
    #[serde(default)]
    size_bytes: u64,
}
