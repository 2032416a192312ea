//! End-to-end stream resolution tests against mock upstreams.

mod common;

use common::TestApp;
use serde_json::Value;

const YTS_HASH: &str = "dd8255ecdc7ca55fb0bbf81323d87062db1f6d1c";
const TGX_HASH: &str = "ee8255ecdc7ca55fb0bbf81323d87062db1f6d1c";
const EZTV_HASH: &str = "ff8255ecdc7ca55fb0bbf81323d87062db1f6d1c";
const SHARED_HASH: &str = "ab8255ecdc7ca55fb0bbf81323d87062db1f6d1c";

fn yts_body() -> String {
    format!(
        r#"{{
            "status": "ok",
            "status_message": "Query was successful",
            "data": {{
                "movie_count": 1,
                "movies": [{{
                    "id": 1,
                    "title": "Spider-Man: No Way Home",
                    "year": 2021,
                    "imdb_code": "tt10872600",
                    "torrents": [{{
                        "hash": "{}",
                        "quality": "1080p",
                        "type": "web",
                        "seeds": 120,
                        "peers": 30,
                        "size_bytes": 1073741824
                    }}]
                }}]
            }}
        }}"#,
        YTS_HASH.to_uppercase()
    )
}

fn tgx_row(name: &str, magnet: &str, seeders: u32) -> String {
    format!(
        r#"<div class="table-list-wrap"><table><tbody><tr>
            <td><a href="/torrent/1/r" title="{name}">{name}</a></td>
            <td><a href="{magnet}">magnet</a></td>
            <td><span>1.4 GB</span></td>
            <td><span title="Seeders/Leechers">[{seeders}/4]</span></td>
        </tr></tbody></table></div>"#
    )
}

#[tokio::test]
async fn test_movie_aggregation_then_cache_hit() {
    let mut upstream = mockito::Server::new_async().await;
    let yts_mock = upstream
        .mock("GET", "/api/v2/list_movies.json")
        .match_query(mockito::Matcher::UrlEncoded(
            "query_term".into(),
            "tt10872600".into(),
        ))
        .with_body(yts_body())
        .expect(1)
        .create_async()
        .await;
    let tgx_mock = upstream
        .mock("GET", "/lmsearch")
        .match_query(mockito::Matcher::Any)
        .with_body(tgx_row(
            "Spider-Man.No.Way.Home.2021.1080p.WEBRip.x264",
            &format!("magnet:?xt=urn:btih:{TGX_HASH}"),
            80,
        ))
        .expect(1)
        .create_async()
        .await;

    let url = upstream.url();
    let app = TestApp::spawn(|c| {
        c.yts_url = url.clone();
        c.tgx_url = url.clone();
    })
    .await;

    let response = app.server.get("/stream/movie/tt10872600.json").await;
    response.assert_status_ok();
    let body: Value = response.json();
    let streams = body["streams"].as_array().unwrap();

    assert_eq!(streams.len(), 2);
    assert_eq!(streams[0]["name"], "YTS");
    assert_eq!(streams[0]["infoHash"], YTS_HASH);
    assert_eq!(streams[1]["name"], "TGX");
    assert_eq!(streams[1]["infoHash"], TGX_HASH);
    assert!(streams[0]["description"].as_str().unwrap().contains("(YTS)"));
    assert!(streams[1]["description"].as_str().unwrap().contains("(TGX)"));
    for stream in streams {
        assert!(stream.get("seeders").is_none());
        assert!(stream.get("url").is_none());
    }

    // Second call is served from the cache: no additional upstream traffic.
    let second = app.server.get("/stream/movie/tt10872600.json").await;
    second.assert_status_ok();
    let cached: Value = second.json();
    assert_eq!(cached, body);
    assert_eq!(app.cache.len(), 1);
    yts_mock.assert_async().await;
    tgx_mock.assert_async().await;
}

#[tokio::test]
async fn test_series_episode_filtering() {
    let mut upstream = mockito::Server::new_async().await;
    upstream
        .mock("GET", "/api/get-torrents")
        .match_query(mockito::Matcher::Any)
        .with_body(format!(
            r#"{{
                "torrents_count": 2,
                "torrents": [
                    {{"title": "The Handmaids Tale S02E03 1080p", "magnet_url": "magnet:?xt=urn:btih:{EZTV_HASH}", "size_bytes": "1503238553", "seeds": 231, "peers": 250, "season": "2", "episode": "3"}},
                    {{"title": "The Handmaids Tale S02E02 1080p", "magnet_url": "magnet:?xt=urn:btih:{TGX_HASH}", "size_bytes": "1503238553", "seeds": 400, "peers": 500, "season": "2", "episode": "2"}}
                ]
            }}"#
        ))
        .create_async()
        .await;

    let url = upstream.url();
    let app = TestApp::spawn(|c| c.eztv_url = url.clone()).await;

    let response = app.server.get("/stream/series/tt5834204:2:3.json").await;
    response.assert_status_ok();
    let body: Value = response.json();
    let streams = body["streams"].as_array().unwrap();

    assert_eq!(streams.len(), 1);
    assert_eq!(streams[0]["name"], "EZTV");
    assert_eq!(streams[0]["infoHash"], EZTV_HASH);
    let description = streams[0]["description"].as_str().unwrap();
    assert!(description.contains("The Handmaid's Tale"));
    assert!(description.contains("Season 2 Episode 3"));
}

#[tokio::test]
async fn test_series_streams_carry_binge_group() {
    let mut upstream = mockito::Server::new_async().await;
    upstream
        .mock("GET", "/api/get-torrents")
        .match_query(mockito::Matcher::Any)
        .with_body(format!(
            r#"{{"torrents_count": 1, "torrents": [
                {{"title": "The Handmaids Tale S02E03 1080p WEB", "magnet_url": "magnet:?xt=urn:btih:{EZTV_HASH}", "size_bytes": "1", "seeds": 9, "peers": 9, "season": "2", "episode": "3"}}
            ]}}"#
        ))
        .create_async()
        .await;

    let url = upstream.url();
    let app = TestApp::spawn(|c| c.eztv_url = url.clone()).await;

    let response = app.server.get("/stream/series/tt5834204:2:3.json").await;
    let body: Value = response.json();
    let streams = body["streams"].as_array().unwrap();

    let suffix = regex::Regex::new(r"-(2160p|1080p|720p|480p|unknown)$").unwrap();
    for stream in streams {
        let group = stream["behaviorHints"]["bingeGroup"].as_str().unwrap();
        assert!(group.starts_with("barestreams-"));
        assert!(suffix.is_match(group), "unexpected binge group {group}");
    }
    assert_eq!(
        streams[0]["behaviorHints"]["bingeGroup"],
        "barestreams-eztv-1080p"
    );
}

#[tokio::test]
async fn test_duplicate_info_hash_unions_sources() {
    let mut upstream = mockito::Server::new_async().await;
    upstream
        .mock("GET", "/api/get-torrents")
        .match_query(mockito::Matcher::Any)
        .with_body(format!(
            r#"{{"torrents_count": 1, "torrents": [
                {{"title": "The Handmaids Tale S02E03 1080p", "magnet_url": "magnet:?xt=urn:btih:{SHARED_HASH}&tr=udp%3A%2F%2Fa.example%3A1", "size_bytes": "1000", "seeds": 50, "peers": 60, "season": "2", "episode": "3"}}
            ]}}"#
        ))
        .create_async()
        .await;
    upstream
        .mock("GET", "/lmsearch")
        .match_query(mockito::Matcher::Any)
        .with_body(tgx_row(
            "The.Handmaids.Tale.S02E03.1080p.WEB.x264",
            &format!("magnet:?xt=urn:btih:{SHARED_HASH}&tr=udp://b.example:2"),
            70,
        ))
        .create_async()
        .await;

    let url = upstream.url();
    let app = TestApp::spawn(|c| {
        c.eztv_url = url.clone();
        c.tgx_url = url.clone();
    })
    .await;

    let response = app.server.get("/stream/series/tt5834204:2:3.json").await;
    let body: Value = response.json();
    let streams = body["streams"].as_array().unwrap();

    assert_eq!(streams.len(), 1);
    // EZTV is called first, so its display fields win.
    assert_eq!(streams[0]["name"], "EZTV");
    assert_eq!(streams[0]["infoHash"], SHARED_HASH);
    let sources: Vec<&str> = streams[0]["sources"]
        .as_array()
        .unwrap()
        .iter()
        .map(|s| s.as_str().unwrap())
        .collect();
    assert!(sources.contains(&"tracker:udp://a.example:1"));
    assert!(sources.contains(&"tracker:udp://b.example:2"));
    assert_eq!(sources.len(), 2);
}

#[tokio::test]
async fn test_zero_deadline_returns_empty_and_skips_cache() {
    let mut upstream = mockito::Server::new_async().await;
    let api = upstream
        .mock("GET", "/api/get-torrents")
        .match_query(mockito::Matcher::Any)
        .expect(0)
        .create_async()
        .await;

    let url = upstream.url();
    let app = TestApp::spawn(|c| {
        c.eztv_url = url.clone();
        c.max_request_wait_seconds = Some(0);
    })
    .await;

    let response = app.server.get("/stream/series/tt5834204:2:3.json").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["streams"].as_array().unwrap().len(), 0);
    assert!(app.cache.is_empty());
    api.assert_async().await;
}

#[tokio::test]
async fn test_dead_magnets_are_dropped() {
    let mut upstream = mockito::Server::new_async().await;
    upstream
        .mock("GET", "/lmsearch")
        .match_query(mockito::Matcher::Any)
        .with_body(format!(
            r#"<div class="table-list-wrap"><table><tbody>
            <tr>
                <td><a href="/torrent/1/alive" title="Spider-Man.No.Way.Home.2021.1080p">x</a></td>
                <td><a href="magnet:?xt=urn:btih:{TGX_HASH}">m</a></td>
                <td><span title="Seeders/Leechers">[12/1]</span></td>
            </tr>
            <tr>
                <td><a href="/torrent/2/dead" title="Spider-Man.No.Way.Home.2021.720p">x</a></td>
                <td><a href="magnet:?xt=urn:btih:{SHARED_HASH}">m</a></td>
                <td><span title="Seeders/Leechers">[0/9]</span></td>
            </tr>
            </tbody></table></div>"#
        ))
        .create_async()
        .await;

    let url = upstream.url();
    let app = TestApp::spawn(|c| c.tgx_url = url.clone()).await;

    let response = app.server.get("/stream/movie/tt10872600.json").await;
    let body: Value = response.json();
    let streams = body["streams"].as_array().unwrap();
    assert_eq!(streams.len(), 1);
    assert_eq!(streams[0]["infoHash"], TGX_HASH);
}

#[tokio::test]
async fn test_failing_upstreams_yield_empty_response() {
    let mut upstream = mockito::Server::new_async().await;
    upstream
        .mock("GET", "/api/get-torrents")
        .match_query(mockito::Matcher::Any)
        .with_status(500)
        .create_async()
        .await;

    let url = upstream.url();
    let app = TestApp::spawn(|c| c.eztv_url = url.clone()).await;

    let response = app.server.get("/stream/series/tt5834204:2:3.json").await;
    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["streams"].as_array().unwrap().len(), 0);
    // Empty responses are not cached.
    assert!(app.cache.is_empty());
}
