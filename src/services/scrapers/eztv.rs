//! EZTV scraper (TV, JSON API with an HTML fallback).
//!
//! The API is paginated and keyed by IMDb digits; some mirrors want the
//! `tt` prefix, so both forms are tried. When the API yields nothing for an
//! episode request, the HTML search page is scraped for `/ep/` detail links.

use async_trait::async_trait;
use futures::{stream, StreamExt};
use scraper::{Html, Selector};
use serde::Deserialize;

use crate::services::http::FetchOptions;
use crate::services::id::ParsedRequestId;
use crate::services::query;
use crate::services::scrapers::{
    candidate_into_stream, dedupe_and_rank, filter_episode, ScrapeContext, Scraper, Stream,
    StreamResponse, TorrentCandidate,
};

pub const SCRAPER_KEY: &str = "eztv";

const PAGE_CAP: usize = 50;
const PAGE_CONCURRENCY: usize = 5;
const EPISODE_LINK_LIMIT: usize = 15;

pub struct EztvScraper {
    bases: Vec<String>,
}

impl EztvScraper {
    pub fn new(bases: Vec<String>) -> Self {
        Self { bases }
    }

    /// Paginated API search for one id form.
    async fn api_search(
        &self,
        base: &str,
        imdb_id: &str,
        ctx: &ScrapeContext,
    ) -> Vec<TorrentCandidate> {
        let opts = FetchOptions::with_cancel(ctx.cancel.clone());
        let first_url = format!("{}/api/get-torrents?imdb_id={}&page=1", base, imdb_id);
        let Some(first) = ctx
            .http
            .fetch_json::<ApiResponse>(SCRAPER_KEY, &first_url, &opts)
            .await
        else {
            tracing::warn!(indexer = "EZTV", url = %first_url, "search request failed");
            return Vec::new();
        };

        let mut torrents = first.torrents.unwrap_or_default();
        if torrents.is_empty() {
            return Vec::new();
        }

        let total = first.torrents_count.unwrap_or(torrents.len() as u64) as usize;
        let per_page = torrents.len();
        let pages = total.div_ceil(per_page).clamp(1, PAGE_CAP);

        if pages > 1 && !ctx.cancel.is_cancelled() {
            let extra: Vec<Vec<ApiTorrent>> = stream::iter(2..=pages)
                .map(|page| {
                    let url = format!("{}/api/get-torrents?imdb_id={}&page={}", base, imdb_id, page);
                    let http = ctx.http.clone();
                    let opts = opts.clone();
                    async move {
                        http.fetch_json::<ApiResponse>(SCRAPER_KEY, &url, &opts)
                            .await
                            .and_then(|r| r.torrents)
                            .unwrap_or_default()
                    }
                })
                .buffer_unordered(PAGE_CONCURRENCY)
                .collect()
                .await;
            for page in extra {
                torrents.extend(page);
                if torrents.len() >= total {
                    break;
                }
            }
        }

        torrents.into_iter().map(ApiTorrent::into_candidate).collect()
    }

    /// Scrape the HTML search page for `/ep/` detail links and pull a magnet
    /// from each.
    async fn html_fallback(
        &self,
        base: &str,
        parsed: &ParsedRequestId,
        title: &str,
        suffix: &str,
        ctx: &ScrapeContext,
    ) -> Vec<TorrentCandidate> {
        let opts = FetchOptions::with_cancel(ctx.cancel.clone());
        let slug = query::normalize(&format!("{} {}", title, suffix)).replace(' ', "-");
        let url = format!("{}/search/{}", base, urlencoding::encode(&slug));
        let Some(html) = ctx.http.fetch_text(SCRAPER_KEY, &url, &opts).await else {
            tracing::warn!(indexer = "EZTV", url = %url, "search page fetch failed");
            return Vec::new();
        };

        // Extract plain data before any await: Html is not Send.
        let links: Vec<(String, String)> = {
            let document = Html::parse_document(&html);
            let link_selector = Selector::parse("a[href*='/ep/']").unwrap();
            let mut links = Vec::new();
            for element in document.select(&link_selector) {
                let Some(href) = element.value().attr("href") else {
                    continue;
                };
                let text = element.text().collect::<String>().trim().to_string();
                let href = if href.starts_with("http") {
                    href.to_string()
                } else {
                    format!("{}{}", base, href)
                };
                if !links.iter().any(|(h, _)| h == &href) {
                    links.push((href, text));
                }
                if links.len() >= EPISODE_LINK_LIMIT {
                    break;
                }
            }
            links
        };

        let mut candidates = Vec::new();
        for (href, text) in links {
            if ctx.cancel.is_cancelled() {
                break;
            }
            let name = if text.is_empty() { slug.clone() } else { text };
            if !query::matches_episode(&name, parsed.season, parsed.episode) {
                continue;
            }
            let Some(page) = ctx.http.fetch_text(SCRAPER_KEY, &href, &opts).await else {
                continue;
            };
            let magnet = {
                let document = Html::parse_document(&page);
                let magnet_selector = Selector::parse("a[href^='magnet:']").unwrap();
                document
                    .select(&magnet_selector)
                    .next()
                    .and_then(|e| e.value().attr("href"))
                    .map(str::to_string)
            };
            if let Some(magnet) = magnet {
                candidates.push(TorrentCandidate {
                    name,
                    detail_url: Some(href),
                    magnet: Some(magnet),
                    ..Default::default()
                });
            }
        }
        candidates
    }
}

#[async_trait]
impl Scraper for EztvScraper {
    fn name(&self) -> &'static str {
        "EZTV"
    }

    async fn scrape(&self, parsed: &ParsedRequestId, ctx: &ScrapeContext) -> StreamResponse {
        if self.bases.is_empty() || ctx.cancel.is_cancelled() {
            return StreamResponse::default();
        }

        let queries = ctx.queries(parsed).await;
        let digits = parsed.digits().to_string();
        let prefixed = format!("tt{}", digits);

        for base in &self.bases {
            let mut candidates = Vec::new();
            for id_form in [digits.as_str(), prefixed.as_str()] {
                candidates = self.api_search(base, id_form, ctx).await;
                if !candidates.is_empty() {
                    break;
                }
            }

            let mut candidates = filter_episode(candidates, parsed);
            if candidates.is_empty() {
                if let (Some(_), Some(_), Some(suffix)) =
                    (parsed.season, parsed.episode, queries.episode_suffix.as_deref())
                {
                    candidates = self
                        .html_fallback(base, parsed, &queries.base_title, suffix, ctx)
                        .await;
                }
            }

            let streams: Vec<Stream> = dedupe_and_rank(candidates)
                .into_iter()
                .filter_map(|c| candidate_into_stream(c, self.name(), parsed, &queries))
                .collect();

            if !streams.is_empty() {
                return StreamResponse { streams };
            }
        }

        StreamResponse::default()
    }
}

/// EZTV API response structure. Numeric fields arrive as strings.
#[derive(Debug, Deserialize)]
struct ApiResponse {
    torrents_count: Option<u64>,
    torrents: Option<Vec<ApiTorrent>>,
}

#[derive(Debug, Deserialize)]
struct ApiTorrent {
    #[serde(default)]
    title: String,
    #[serde(default)]
    magnet_url: String,
    #[serde(default)]
    size_bytes: String,
    #[serde(default)]
    seeds: u32,
    #[serde(default)]
    peers: u32,
    #[serde(default)]
    season: String,
    #[serde(default)]
    episode: String,
}

impl ApiTorrent {
    fn into_candidate(self) -> TorrentCandidate {
        TorrentCandidate {
            season: positive(&self.season),
            episode: positive(&self.episode),
            magnet: (!self.magnet_url.is_empty()).then_some(self.magnet_url),
            size_bytes: self.size_bytes.parse().ok(),
            seeders: self.seeds,
            leechers: self.peers.saturating_sub(self.seeds),
            name: self.title,
            ..Default::default()
        }
    }
}

/// EZTV reports `"0"` for unknown season/episode.
fn positive(s: &str) -> Option<u32> {
    match s.parse::<u32>() {
        Ok(n) if n > 0 => Some(n),
        _ => None,
    }
}
