//! 1337x scraper (HTML, bypass-heavy).
//!
//! The site sits behind aggressive bot protection, so its traffic is the
//! main consumer of the bypass session pool. Search rows never carry
//! magnets; every kept result costs one detail-page fetch.

use async_trait::async_trait;
use futures::{stream, StreamExt};
use scraper::{Html, Selector};

use crate::services::http::FetchOptions;
use crate::services::id::ParsedRequestId;
use crate::services::scrapers::{
    candidate_into_stream, dedupe_and_rank, filter_episode, parse_size, ScrapeContext, Scraper,
    Stream, StreamResponse, TorrentCandidate,
};

pub const SCRAPER_KEY: &str = "1337x";

const DETAIL_LIMIT: usize = 20;
pub const DETAIL_CONCURRENCY: usize = 5;

pub struct LeetxScraper {
    bases: Vec<String>,
}

impl LeetxScraper {
    pub fn new(bases: Vec<String>) -> Self {
        Self { bases }
    }

    async fn search(&self, base: &str, q: &str, ctx: &ScrapeContext) -> Vec<TorrentCandidate> {
        let opts = FetchOptions::with_cancel(ctx.cancel.clone());
        let url = format!("{}/search/{}/1/", base, urlencoding::encode(q));
        let Some(html) = ctx.http.fetch_text(SCRAPER_KEY, &url, &opts).await else {
            tracing::warn!(indexer = "1337x", url = %url, "search request failed");
            return Vec::new();
        };
        parse_search_results(base, &html)
    }

    async fn fetch_magnets(
        &self,
        candidates: Vec<TorrentCandidate>,
        ctx: &ScrapeContext,
    ) -> Vec<TorrentCandidate> {
        let opts = FetchOptions::with_cancel(ctx.cancel.clone());
        let resolved: Vec<Option<TorrentCandidate>> = stream::iter(candidates.into_iter().take(DETAIL_LIMIT))
            .map(|mut candidate| {
                let http = ctx.http.clone();
                let opts = opts.clone();
                async move {
                    let url = candidate.detail_url.clone()?;
                    let page = http.fetch_text(SCRAPER_KEY, &url, &opts).await?;
                    let magnet = extract_magnet(&page);
                    if magnet.is_none() {
                        tracing::debug!(indexer = "1337x", url = %url, "no magnet on detail page");
                    }
                    candidate.magnet = Some(magnet?);
                    Some(candidate)
                }
            })
            .buffer_unordered(DETAIL_CONCURRENCY)
            .collect()
            .await;
        resolved.into_iter().flatten().collect()
    }
}

#[async_trait]
impl Scraper for LeetxScraper {
    fn name(&self) -> &'static str {
        "1337x"
    }

    async fn scrape(&self, parsed: &ParsedRequestId, ctx: &ScrapeContext) -> StreamResponse {
        if self.bases.is_empty() || ctx.cancel.is_cancelled() {
            return StreamResponse::default();
        }

        let queries = ctx.queries(parsed).await;

        for base in &self.bases {
            let mut candidates = self.search(base, &queries.query, ctx).await;
            if candidates.is_empty() {
                if let Some(fallback) = &queries.fallback_query {
                    candidates = self.search(base, fallback, ctx).await;
                }
            }

            let candidates = filter_episode(candidates, parsed);
            let candidates = dedupe_and_rank(candidates);
            let candidates = self.fetch_magnets(candidates, ctx).await;

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

fn parse_search_results(base: &str, html: &str) -> Vec<TorrentCandidate> {
    let document = Html::parse_document(html);
    let row_selector = Selector::parse("table.table-list tbody tr").unwrap();
    let name_selector = Selector::parse("td.coll-1 a:nth-child(2)").unwrap();
    let seeds_selector = Selector::parse("td.coll-2").unwrap();
    let leechers_selector = Selector::parse("td.coll-3").unwrap();
    let size_selector = Selector::parse("td.coll-4").unwrap();

    let mut candidates = Vec::new();
    for row in document.select(&row_selector) {
        let Some(name_element) = row.select(&name_selector).next() else {
            continue;
        };
        let name = name_element.text().collect::<String>().trim().to_string();
        let Some(href) = name_element.value().attr("href") else {
            continue;
        };
        if name.is_empty() || !href.starts_with("/torrent/") {
            continue;
        }

        let seeders = row
            .select(&seeds_selector)
            .next()
            .map(|e| e.text().collect::<String>().trim().parse().unwrap_or(0))
            .unwrap_or(0);
        let leechers = row
            .select(&leechers_selector)
            .next()
            .map(|e| e.text().collect::<String>().trim().parse().unwrap_or(0))
            .unwrap_or(0);

        // The size cell appends the seed count in a nested span; keep the
        // leading "<number> <unit>" part only.
        let size_label = row.select(&size_selector).next().map(|e| {
            let text = e.text().collect::<String>();
            let parts: Vec<&str> = text.split_whitespace().collect();
            if parts.len() >= 2 {
                format!("{} {}", parts[0], parts[1])
            } else {
                text.trim().to_string()
            }
        });
        let size_bytes = size_label.as_deref().and_then(parse_size);

        candidates.push(TorrentCandidate {
            name,
            detail_url: Some(format!("{}{}", base, href)),
            seeders,
            leechers,
            size_bytes,
            size_label,
            ..Default::default()
        });
    }
    candidates
}

fn extract_magnet(html: &str) -> Option<String> {
    let document = Html::parse_document(html);
    let magnet_selector = Selector::parse("a[href^='magnet:']").unwrap();
    document
        .select(&magnet_selector)
        .next()
        .and_then(|e| e.value().attr("href"))
        .map(str::to_string)
}
