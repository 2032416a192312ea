//! TorrentGalaxy scraper (HTML).
//!
//! Search rows usually carry a magnet link directly; rows that don't get a
//! bounded number of detail-page fetches to recover one.

use async_trait::async_trait;
use futures::{stream, StreamExt};
use lazy_static::lazy_static;
use regex::Regex;
use scraper::{Html, Selector};

use crate::services::http::FetchOptions;
use crate::services::id::ParsedRequestId;
use crate::services::scrapers::{
    candidate_into_stream, dedupe_and_rank, filter_episode, parse_size, ScrapeContext, Scraper,
    Stream, StreamResponse, TorrentCandidate,
};

pub const SCRAPER_KEY: &str = "tgx";

lazy_static! {
    static ref SEED_LEECH_RE: Regex = Regex::new(r"\[?\s*(\d+)\s*/\s*(\d+)\s*\]?").unwrap();
    static ref SIZE_RE: Regex = Regex::new(r"(?i)\b\d+(?:\.\d+)?\s*[KMGT]i?B\b").unwrap();
}

pub struct TorrentGalaxyScraper {
    bases: Vec<String>,
    detail_limit: usize,
}

impl TorrentGalaxyScraper {
    pub fn new(bases: Vec<String>, detail_limit: usize) -> Self {
        Self { bases, detail_limit }
    }

    async fn search(&self, base: &str, q: &str, ctx: &ScrapeContext) -> Vec<TorrentCandidate> {
        let opts = FetchOptions::with_cancel(ctx.cancel.clone());
        let url = format!(
            "{}/lmsearch?q={}&category=lmsearch&page=1",
            base,
            urlencoding::encode(q)
        );
        let Some(html) = ctx.http.fetch_text(SCRAPER_KEY, &url, &opts).await else {
            tracing::warn!(indexer = "TGX", url = %url, "search request failed");
            return Vec::new();
        };
        parse_search_results(base, &html)
    }

    /// Recover magnets for candidates that lack one, up to the detail limit.
    async fn resolve_magnets(
        &self,
        candidates: Vec<TorrentCandidate>,
        ctx: &ScrapeContext,
    ) -> Vec<TorrentCandidate> {
        let opts = FetchOptions::with_cancel(ctx.cancel.clone());
        let mut remaining = self.detail_limit;
        let mut ready = Vec::new();
        let mut pending = Vec::new();

        for candidate in candidates {
            if candidate.magnet.is_some() {
                ready.push(candidate);
            } else if remaining > 0 && candidate.detail_url.is_some() {
                remaining -= 1;
                pending.push(candidate);
            }
        }

        let resolved: Vec<Option<TorrentCandidate>> = stream::iter(pending)
            .map(|mut candidate| {
                let http = ctx.http.clone();
                let opts = opts.clone();
                async move {
                    let url = candidate.detail_url.clone()?;
                    let page = http.fetch_text(SCRAPER_KEY, &url, &opts).await?;
                    let magnet = extract_magnet(&page)?;
                    candidate.magnet = Some(magnet);
                    Some(candidate)
                }
            })
            .buffer_unordered(self.detail_limit.max(1))
            .collect()
            .await;

        ready.extend(resolved.into_iter().flatten());
        ready
    }
}

#[async_trait]
impl Scraper for TorrentGalaxyScraper {
    fn name(&self) -> &'static str {
        "TGX"
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
            let candidates = self.resolve_magnets(candidates, ctx).await;

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
    let row_selector = Selector::parse(".table-list-wrap tbody tr").unwrap();
    let name_selector = Selector::parse("a[href^='/torrent/']").unwrap();
    let magnet_selector = Selector::parse("a[href^='magnet:?']").unwrap();
    let seed_selector = Selector::parse("span[title='Seeders/Leechers']").unwrap();

    let mut candidates = Vec::new();
    for row in document.select(&row_selector) {
        let Some(name_element) = row.select(&name_selector).next() else {
            continue;
        };
        let name = name_element
            .value()
            .attr("title")
            .map(str::to_string)
            .unwrap_or_else(|| name_element.text().collect::<String>())
            .trim()
            .to_string();
        if name.is_empty() {
            continue;
        }
        let detail_url = name_element
            .value()
            .attr("href")
            .map(|href| format!("{}{}", base, href));

        let magnet = row
            .select(&magnet_selector)
            .next()
            .and_then(|e| e.value().attr("href"))
            .map(str::to_string);

        let (seeders, leechers) = row
            .select(&seed_selector)
            .next()
            .map(|e| e.text().collect::<String>())
            .and_then(|text| {
                let caps = SEED_LEECH_RE.captures(&text)?;
                Some((
                    caps.get(1)?.as_str().parse().unwrap_or(0),
                    caps.get(2)?.as_str().parse().unwrap_or(0),
                ))
            })
            .unwrap_or((0, 0));

        let row_text = row.text().collect::<String>();
        let size_label = SIZE_RE.find(&row_text).map(|m| m.as_str().to_string());
        let size_bytes = size_label.as_deref().and_then(parse_size);

        candidates.push(TorrentCandidate {
            name,
            detail_url,
            magnet,
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
    let magnet_selector = Selector::parse("a[href^='magnet:?']").unwrap();
    document
        .select(&magnet_selector)
        .next()
        .and_then(|e| e.value().attr("href"))
        .map(str::to_string)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::services::http::HttpClient;
    use crate::services::query::QueryBuilder;
    use crate::services::scrapers::MediaType;
    use crate::services::title_index::TitleIndex;
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    const HASH: &str = "dd8255ecdc7ca55fb0bbf81323d87062db1f6d1c";

    fn context() -> ScrapeContext {
        ScrapeContext {
            media_type: MediaType::Movie,
            http: Arc::new(HttpClient::new(None)),
            query_builder: Arc::new(QueryBuilder::new(Arc::new(TitleIndex::new(
                "/nonexistent/title.basics.tsv",
            )))),
            cancel: CancellationToken::new(),
        }
    }

    fn search_page(magnet_in_row: bool) -> String {
        let magnet_cell = if magnet_in_row {
            format!(r#"<a href="magnet:?xt=urn:btih:{HASH}">magnet</a>"#)
        } else {
            String::new()
        };
        format!(
            r#"<html><body><div class="table-list-wrap"><table><tbody>
            <tr>
                <td><a href="/torrent/1/some-movie" title="Some.Movie.2021.1080p.WEB.x264">Some.Movie.2021...</a></td>
                <td>{magnet_cell}</td>
                <td><span>1.4 GB</span></td>
                <td><span title="Seeders/Leechers">[231/18]</span></td>
            </tr>
            </tbody></table></div></body></html>"#
        )
    }

    #[test]
    fn test_parse_search_results() {
        let candidates = parse_search_results("https://tgx.example", &search_page(true));
        assert_eq!(candidates.len(), 1);
        let c = &candidates[0];
        assert_eq!(c.name, "Some.Movie.2021.1080p.WEB.x264");
        assert_eq!(c.detail_url.as_deref(), Some("https://tgx.example/torrent/1/some-movie"));
        assert!(c.magnet.as_deref().unwrap().starts_with("magnet:?"));
        assert_eq!(c.seeders, 231);
        assert_eq!(c.leechers, 18);
        assert_eq!(c.size_label.as_deref(), Some("1.4 GB"));
        assert_eq!(c.size_bytes, Some((1.4f64 * 1024.0 * 1024.0 * 1024.0) as u64));
    }

    #[tokio::test]
    async fn test_scrape_with_row_magnet() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/lmsearch")
            .match_query(mockito::Matcher::Any)
            .with_body(search_page(true))
            .create_async()
            .await;

        let scraper = TorrentGalaxyScraper::new(vec![server.url()], 10);
        let parsed = ParsedRequestId::parse("tt10872600").unwrap();
        let response = scraper.scrape(&parsed, &context()).await;

        assert_eq!(response.streams.len(), 1);
        assert_eq!(response.streams[0].info_hash.as_deref(), Some(HASH));
        assert_eq!(response.streams[0].name, "TGX");
        assert_eq!(response.streams[0].seeders, Some(231));
    }

    #[tokio::test]
    async fn test_scrape_resolves_magnet_from_detail_page() {
        let mut server = mockito::Server::new_async().await;
        server
            .mock("GET", "/lmsearch")
            .match_query(mockito::Matcher::Any)
            .with_body(search_page(false))
            .create_async()
            .await;
        server
            .mock("GET", "/torrent/1/some-movie")
            .with_body(format!(
                r#"<html><a href="magnet:?xt=urn:btih:{HASH}&tr=udp://t.example:80">magnet</a></html>"#
            ))
            .create_async()
            .await;

        let scraper = TorrentGalaxyScraper::new(vec![server.url()], 10);
        let parsed = ParsedRequestId::parse("tt10872600").unwrap();
        let response = scraper.scrape(&parsed, &context()).await;

        assert_eq!(response.streams.len(), 1);
        assert_eq!(response.streams[0].info_hash.as_deref(), Some(HASH));
    }

    #[tokio::test]
    async fn test_detail_limit_bounds_fetches() {
        let mut server = mockito::Server::new_async().await;
        let rows: String = (0..5)
            .map(|i| {
                format!(
                    r#"<tr><td><a href="/torrent/{i}/x" title="Movie.{i}.1080p">x</a></td>
                    <td><span title="Seeders/Leechers">[{}/0]</span></td></tr>"#,
                    5 - i
                )
            })
            .collect();
        server
            .mock("GET", "/lmsearch")
            .match_query(mockito::Matcher::Any)
            .with_body(format!(
                r#"<div class="table-list-wrap"><table><tbody>{rows}</tbody></table></div>"#
            ))
            .create_async()
            .await;
        let detail = server
            .mock("GET", mockito::Matcher::Regex("^/torrent/.*".to_string()))
            .with_body(format!(r#"<a href="magnet:?xt=urn:btih:{HASH}">m</a>"#))
            .expect(2)
            .create_async()
            .await;

        let scraper = TorrentGalaxyScraper::new(vec![server.url()], 2);
        let parsed = ParsedRequestId::parse("tt10872600").unwrap();
        let _ = scraper.scrape(&parsed, &context()).await;
        detail.assert_async().await;
    }

    #[tokio::test]
    async fn test_disabled_without_bases() {
        let scraper = TorrentGalaxyScraper::new(Vec::new(), 10);
        let parsed = ParsedRequestId::parse("tt10872600").unwrap();
        assert!(scraper.scrape(&parsed, &context()).await.streams.is_empty());
    }
}
