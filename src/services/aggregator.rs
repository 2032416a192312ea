//! Request aggregation.
//!
//! Fans a stream request out to the type-appropriate scrapers under a
//! shared soft deadline, then merges the settled results: dedupe by
//! identity, drop dead magnets, rank by seeders, attach binge groups for
//! series, and cache the outcome.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::future::join_all;
use tokio_util::sync::CancellationToken;

use crate::cache::ResultCache;
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::services::http::HttpClient;
use crate::services::id::ParsedRequestId;
use crate::services::quality;
use crate::services::query::QueryBuilder;
use crate::services::scrapers::{
    ApiBayScraper, EztvScraper, LeetxScraper, MediaType, ScrapeContext, Scraper, Stream,
    StreamResponse, TorrentGalaxyScraper, YtsScraper,
};

/// Coordinates scrapers, cache and title resolution for stream requests.
pub struct Aggregator {
    config: Arc<Config>,
    http: Arc<HttpClient>,
    query_builder: Arc<QueryBuilder>,
    cache: Arc<dyn ResultCache>,
    /// Call order determines dedupe precedence and must stay stable.
    movie_scrapers: Vec<Arc<dyn Scraper>>,
    series_scrapers: Vec<Arc<dyn Scraper>>,
}

impl Aggregator {
    pub fn new(
        config: Arc<Config>,
        http: Arc<HttpClient>,
        query_builder: Arc<QueryBuilder>,
        cache: Arc<dyn ResultCache>,
    ) -> Self {
        let yts: Arc<dyn Scraper> = Arc::new(YtsScraper::new(config.yts_urls()));
        let eztv: Arc<dyn Scraper> = Arc::new(EztvScraper::new(config.eztv_urls()));
        let tgx: Arc<dyn Scraper> = Arc::new(TorrentGalaxyScraper::new(
            config.tgx_urls(),
            config.tgx_detail_limit,
        ));
        let apibay: Arc<dyn Scraper> = Arc::new(ApiBayScraper::new(config.apibay_urls()));
        let leetx: Arc<dyn Scraper> = Arc::new(LeetxScraper::new(config.x1337x_urls()));

        Self {
            config,
            http,
            query_builder,
            cache,
            movie_scrapers: vec![yts, Arc::clone(&tgx), Arc::clone(&apibay), Arc::clone(&leetx)],
            series_scrapers: vec![eztv, tgx, apibay, leetx],
        }
    }

    /// Override the scraper lists. Test seam.
    pub fn with_scrapers(
        mut self,
        movie_scrapers: Vec<Arc<dyn Scraper>>,
        series_scrapers: Vec<Arc<dyn Scraper>>,
    ) -> Self {
        self.movie_scrapers = movie_scrapers;
        self.series_scrapers = series_scrapers;
        self
    }

    /// Resolve the streams for a `(type, id)` request.
    pub async fn handle_stream(&self, media_type: &str, id: &str) -> Result<StreamResponse> {
        let started = Instant::now();

        let media_type = MediaType::parse(media_type)
            .ok_or_else(|| AppError::BadRequest(format!("unsupported type '{}'", media_type)))?;
        let parsed = ParsedRequestId::parse(id)
            .map_err(|e| AppError::BadRequest(format!("invalid id '{}': {}", id, e)))?;

        let cache_key = cache_key(media_type, &parsed);

        if let Some(cached) = self.cache.get(&cache_key).await {
            match serde_json::from_str::<StreamResponse>(&cached) {
                Ok(response) => {
                    self.log_request(media_type, id, None, true, started, &response, &BTreeMap::new());
                    return Ok(response);
                }
                Err(e) => {
                    tracing::warn!(key = %cache_key, error = %e, "discarding undecodable cache entry");
                }
            }
        }

        let cancel = CancellationToken::new();
        match self.config.max_request_wait_seconds {
            Some(0) => cancel.cancel(),
            Some(secs) => {
                let deadline = cancel.clone();
                tokio::spawn(async move {
                    tokio::time::sleep(Duration::from_secs(secs)).await;
                    deadline.cancel();
                });
            }
            None => {}
        }

        let ctx = ScrapeContext {
            media_type,
            http: Arc::clone(&self.http),
            query_builder: Arc::clone(&self.query_builder),
            cancel: cancel.clone(),
        };

        // Title resolution runs concurrently with the scraper fan-out; the
        // scrapers hit the same memoized lookup.
        let title_task = {
            let query_builder = Arc::clone(&self.query_builder);
            let parsed = parsed.clone();
            tokio::spawn(async move { query_builder.build(&parsed).await })
        };

        let scrapers = match media_type {
            MediaType::Movie => &self.movie_scrapers,
            MediaType::Series => &self.series_scrapers,
        };
        let settled: Vec<(&'static str, StreamResponse)> = join_all(scrapers.iter().map(|scraper| {
            let ctx = ctx.clone();
            let parsed = parsed.clone();
            async move { (scraper.name(), scraper.scrape(&parsed, &ctx).await) }
        }))
        .await;

        let mut source_counts: BTreeMap<&'static str, usize> = BTreeMap::new();
        for (name, response) in &settled {
            source_counts.insert(name, response.streams.len());
        }

        let mut streams = merge(settled);
        if media_type == MediaType::Series {
            attach_binge_groups(&mut streams);
        }
        let response = StreamResponse { streams };

        if !response.streams.is_empty() && !cancel.is_cancelled() {
            if let Ok(serialized) = serde_json::to_string(&response) {
                let ttl = Duration::from_secs(self.config.redis_ttl_hours * 3600);
                self.cache.set(&cache_key, &serialized, ttl).await;
            }
        }

        let imdb_title = title_task.await.ok().map(|q| q.base_title);
        self.log_request(media_type, id, imdb_title, false, started, &response, &source_counts);

        Ok(response)
    }

    #[allow(clippy::too_many_arguments)]
    fn log_request(
        &self,
        media_type: MediaType,
        id: &str,
        imdb_title: Option<String>,
        cache_hit: bool,
        started: Instant,
        response: &StreamResponse,
        sources: &BTreeMap<&'static str, usize>,
    ) {
        tracing::info!(
            r#type = media_type.as_str(),
            id = %id,
            imdb_title = imdb_title.as_deref().unwrap_or(""),
            cache_hit,
            duration_ms = started.elapsed().as_millis() as u64,
            magnet_links = response.streams.len(),
            sources = ?sources,
            "stream request resolved"
        );
    }
}

/// Cache key for one request: `stream:<type>:<base>[:<season>:<episode>]`.
fn cache_key(media_type: MediaType, parsed: &ParsedRequestId) -> String {
    match media_type {
        MediaType::Movie => format!("stream:movie:{}", parsed.base_id),
        MediaType::Series => format!("stream:series:{}", parsed.format()),
    }
}

/// Merge settled scraper responses in call order.
///
/// The first occurrence of an identity key (`infoHash` or `url`) wins and
/// keeps its display fields; later duplicates only union their `sources`
/// into it. Streams reporting zero seeders together with an info hash or
/// magnet URL are dead and dropped. The final order is seeders descending,
/// stable.
fn merge(settled: Vec<(&'static str, StreamResponse)>) -> Vec<Stream> {
    let mut by_identity: HashMap<String, usize> = HashMap::new();
    let mut merged: Vec<Stream> = Vec::new();

    for (_, response) in settled {
        for stream in response.streams {
            let Some(identity) = stream.identity().map(str::to_string) else {
                continue;
            };
            match by_identity.get(&identity) {
                Some(&index) => {
                    if let Some(extra) = stream.sources {
                        let existing = merged[index].sources.get_or_insert_with(Vec::new);
                        for tracker in extra {
                            if !existing.contains(&tracker) {
                                existing.push(tracker);
                            }
                        }
                    }
                }
                None => {
                    by_identity.insert(identity, merged.len());
                    merged.push(stream);
                }
            }
        }
    }

    merged.retain(|stream| {
        let dead = stream.seeders.unwrap_or(0) == 0
            && (stream.info_hash.is_some()
                || stream.url.as_deref().is_some_and(|u| u.starts_with("magnet:?")));
        !dead
    });

    merged.sort_by(|a, b| b.seeders.unwrap_or(0).cmp(&a.seeders.unwrap_or(0)));
    merged
}

/// Attach `behaviorHints.bingeGroup` to every stream of a series response.
fn attach_binge_groups(streams: &mut [Stream]) {
    for stream in streams {
        let quality = stream
            .behavior_hints
            .as_ref()
            .and_then(|h| h.filename.as_deref())
            .and_then(quality::extract)
            .or_else(|| stream.description.as_deref().and_then(quality::extract))
            .unwrap_or("unknown");
        let group = format!("barestreams-{}-{}", slug(&stream.name), quality);
        stream
            .behavior_hints
            .get_or_insert_with(Default::default)
            .binge_group = Some(group);
    }
}

/// Lowercased alphanumeric runs joined by `-`.
fn slug(s: &str) -> String {
    s.to_lowercase()
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|part| !part.is_empty())
        .collect::<Vec<_>>()
        .join("-")
}
