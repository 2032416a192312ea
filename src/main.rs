use std::sync::Arc;
use std::time::Duration;

use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use barestreams::cache::{NoopCache, RedisCache, ResultCache};
use barestreams::config::Config;
use barestreams::services::http::{BypassSettings, HttpClient};
use barestreams::services::scrapers::{self, leetx};
use barestreams::services::{dataset, Aggregator, QueryBuilder, TitleIndex};
use barestreams::{app, AppState};

fn init_tracing() {
    // RUST_LOG environment variable controls log levels
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("barestreams=debug,tower_http=debug,axum=info,warn"));

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Register every enabled scraper with the bypass layer and probe its front
/// page. Network-bound, so it runs off the serve path.
async fn register_scrapers(http: &HttpClient, config: &Config) {
    let pools: [(&str, Vec<String>, usize); 5] = [
        (scrapers::yts::SCRAPER_KEY, config.yts_urls(), 1),
        (scrapers::eztv::SCRAPER_KEY, config.eztv_urls(), 1),
        (scrapers::torrentgalaxy::SCRAPER_KEY, config.tgx_urls(), config.tgx_detail_limit),
        (scrapers::apibay::SCRAPER_KEY, config.apibay_urls(), 1),
        (leetx::SCRAPER_KEY, config.x1337x_urls(), leetx::DETAIL_CONCURRENCY),
    ];
    for (key, bases, parallelism) in pools {
        if let Some(front_page) = bases.first() {
            http.register_scraper(key, front_page, parallelism).await;
        }
    }
}

#[tokio::main]
async fn main() {
    // Initialize tracing first so we can log configuration loading
    init_tracing();

    tracing::info!("Starting barestreams v{}", env!("CARGO_PKG_VERSION"));

    let config = match Config::load() {
        Ok(cfg) => {
            tracing::info!("Configuration loaded successfully");
            tracing::debug!("Server: {}:{}", cfg.server.host, cfg.server.port);
            Arc::new(cfg)
        }
        Err(e) => {
            tracing::error!("Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    let enabled: Vec<&str> = [
        ("YTS", !config.yts_urls().is_empty()),
        ("EZTV", !config.eztv_urls().is_empty()),
        ("TGX", !config.tgx_urls().is_empty()),
        ("TPB", !config.apibay_urls().is_empty()),
        ("1337x", !config.x1337x_urls().is_empty()),
    ]
    .into_iter()
    .filter_map(|(name, on)| on.then_some(name))
    .collect();
    tracing::info!(scrapers = ?enabled, "scrapers enabled");

    // Refresh the IMDb dataset in the background; lookups degrade to the raw
    // id until it lands.
    {
        let dataset_config = config.dataset.clone();
        tokio::spawn(async move {
            dataset::ensure_fresh(&dataset_config).await;
        });
    }

    let bypass = config.flaresolverr_url.as_ref().map(|url| BypassSettings {
        url: url.trim_end_matches('/').to_string(),
        max_sessions: config.flaresolverr_sessions,
        refresh_interval: Duration::from_millis(config.flaresolverr_session_refresh_ms),
    });
    if bypass.is_some() {
        tracing::info!("anti-bot bypass configured");
    }

    let http = Arc::new(HttpClient::new(bypass));
    http.spawn_session_refresh();
    {
        let http = Arc::clone(&http);
        let config = Arc::clone(&config);
        tokio::spawn(async move {
            register_scrapers(&http, &config).await;
        });
    }

    let cache: Arc<dyn ResultCache> = match &config.redis_url {
        Some(url) => match RedisCache::new(url).await {
            Ok(cache) => Arc::new(cache),
            Err(e) => {
                tracing::warn!("Redis unavailable, caching disabled: {}", e);
                Arc::new(NoopCache)
            }
        },
        None => {
            tracing::info!("No Redis configured, caching disabled");
            Arc::new(NoopCache)
        }
    };

    let title_index = Arc::new(TitleIndex::new(&config.dataset.path));
    let query_builder = Arc::new(QueryBuilder::new(title_index));
    let aggregator = Arc::new(Aggregator::new(
        Arc::clone(&config),
        Arc::clone(&http),
        query_builder,
        cache,
    ));

    let state = AppState {
        config: Arc::clone(&config),
        aggregator,
    };

    let addr = config.server_addr();
    tracing::info!("barestreams listening on {}", addr);

    let listener = match tokio::net::TcpListener::bind(addr).await {
        Ok(listener) => listener,
        Err(e) => {
            tracing::error!("Failed to bind {}: {}", addr, e);
            std::process::exit(1);
        }
    };
    if let Err(e) = axum::serve(listener, app(state)).await {
        tracing::error!("Server error: {}", e);
        std::process::exit(1);
    }
}
