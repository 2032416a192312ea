//! Test infrastructure for barestreams integration tests.
//!
//! Provides a `TestApp` wrapper around `axum_test::TestServer` with an
//! in-memory result cache and a temporary IMDb dataset, wired to whatever
//! mock upstreams a test enables.

use std::io::Write;
use std::sync::Arc;

use axum_test::TestServer;
use tempfile::NamedTempFile;

use barestreams::cache::{MemoryCache, ResultCache};
use barestreams::config::Config;
use barestreams::services::http::HttpClient;
use barestreams::services::{Aggregator, QueryBuilder, TitleIndex};
use barestreams::{app, AppState};

const DATASET_HEADER: &str =
    "tconst\ttitleType\tprimaryTitle\toriginalTitle\tisAdult\tstartYear\tendYear\truntimeMinutes\tgenres\n";

/// Rows sorted by tconst, covering the titles used across the test suite.
const DATASET_ROWS: &[&str] = &[
    "tt10872600\tmovie\tSpider-Man: No Way Home\tSpider-Man: No Way Home\t0\t2021\t\\N\t148\tAction,Adventure,Fantasy",
    "tt5834204\ttvSeries\tThe Handmaid's Tale\tThe Handmaid's Tale\t0\t2017\t\\N\t60\tDrama,Sci-Fi",
];

/// Test application with every scraper disabled by default; tests opt in by
/// pointing the relevant `*_url` at a mock server.
pub struct TestApp {
    pub server: TestServer,
    pub cache: Arc<MemoryCache>,
    _dataset: NamedTempFile,
}

impl TestApp {
    pub async fn spawn(configure: impl FnOnce(&mut Config)) -> Self {
        let mut config = Config::load_from("nonexistent-test-config.toml").expect("default config");
        config.yts_url = String::new();
        config.eztv_url = String::new();
        config.tgx_url = String::new();
        config.apibay_url = String::new();
        config.x1337x_url = String::new();
        config.redis_url = None;
        config.max_request_wait_seconds = None;
        configure(&mut config);

        let dataset = write_dataset();
        config.dataset.path = dataset.path().to_path_buf();

        let cache = Arc::new(MemoryCache::new());
        let http = Arc::new(HttpClient::new(None));
        let title_index = Arc::new(TitleIndex::new(&config.dataset.path));
        let query_builder = Arc::new(QueryBuilder::new(title_index));
        let config = Arc::new(config);

        let aggregator = Arc::new(Aggregator::new(
            Arc::clone(&config),
            http,
            query_builder,
            Arc::clone(&cache) as Arc<dyn ResultCache>,
        ));

        let state = AppState {
            config,
            aggregator,
        };
        let server = TestServer::new(app(state)).expect("failed to start test server");

        Self {
            server,
            cache,
            _dataset: dataset,
        }
    }
}

fn write_dataset() -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("failed to create dataset fixture");
    file.write_all(DATASET_HEADER.as_bytes()).unwrap();
    for row in DATASET_ROWS {
        file.write_all(row.as_bytes()).unwrap();
        file.write_all(b"\n").unwrap();
    }
    file.flush().unwrap();
    file
}
