//! Configuration module for the barestreams addon.
//!
//! Loads configuration from `config.toml` with environment variable overrides.
//! The flat upstream variables (`YTS_URL`, `EZTV_URL`, `REDIS_URL`, ...) map
//! directly onto top-level keys; every `*_URL` is a comma-separated list and
//! an empty list disables the corresponding scraper.

use config::{Config as ConfigLoader, Environment, File};
use serde::Deserialize;
use std::path::PathBuf;

use crate::error::AppError;

/// Main application configuration
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub dataset: DatasetConfig,

    /// Redis connection string; when unset, result caching is disabled.
    #[serde(default)]
    pub redis_url: Option<String>,
    /// TTL for cached stream responses, in hours.
    #[serde(default = "default_redis_ttl_hours")]
    pub redis_ttl_hours: u64,

    /// Soft deadline for a whole stream request, in seconds. Unset means no
    /// deadline: the request waits for every scraper to settle.
    #[serde(default)]
    pub max_request_wait_seconds: Option<u64>,

    #[serde(default = "default_yts_url")]
    pub yts_url: String,
    #[serde(default = "default_eztv_url")]
    pub eztv_url: String,
    #[serde(default = "default_tgx_url")]
    pub tgx_url: String,
    #[serde(default = "default_apibay_url")]
    pub apibay_url: String,
    #[serde(default = "default_x1337x_url")]
    pub x1337x_url: String,

    /// Maximum number of TorrentGalaxy detail pages fetched per search.
    #[serde(default = "default_tgx_detail_limit")]
    pub tgx_detail_limit: usize,

    /// FlareSolverr endpoint; when unset, no anti-bot bypass is available and
    /// blocked upstreams simply contribute nothing.
    #[serde(default)]
    pub flaresolverr_url: Option<String>,
    /// Upper bound on bypass sessions per scraper pool.
    #[serde(default = "default_flaresolverr_sessions")]
    pub flaresolverr_sessions: usize,
    /// Interval between bypass session warmup sweeps, in milliseconds.
    #[serde(default = "default_flaresolverr_session_refresh_ms")]
    pub flaresolverr_session_refresh_ms: u64,
}

/// Server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    7700
}

/// IMDb dataset configuration
#[derive(Debug, Clone, Deserialize)]
pub struct DatasetConfig {
    /// Local path of the sorted `title.basics.tsv` file.
    #[serde(default = "default_dataset_path")]
    pub path: PathBuf,
    /// Download location for the gzipped dataset.
    #[serde(default = "default_dataset_url")]
    pub url: String,
    /// Age in hours after which the local file is considered stale.
    #[serde(default = "default_dataset_stale_hours")]
    pub stale_hours: u64,
}

impl Default for DatasetConfig {
    fn default() -> Self {
        Self {
            path: default_dataset_path(),
            url: default_dataset_url(),
            stale_hours: default_dataset_stale_hours(),
        }
    }
}

fn default_dataset_path() -> PathBuf {
    PathBuf::from("./data/title.basics.tsv")
}

fn default_dataset_url() -> String {
    "https://datasets.imdbws.com/title.basics.tsv.gz".to_string()
}

fn default_dataset_stale_hours() -> u64 {
    24
}

fn default_redis_ttl_hours() -> u64 {
    24
}

fn default_yts_url() -> String {
    "https://yts.mx".to_string()
}

fn default_eztv_url() -> String {
    "https://eztv.re".to_string()
}

fn default_tgx_url() -> String {
    "https://torrentgalaxy.to".to_string()
}

fn default_apibay_url() -> String {
    "https://apibay.org".to_string()
}

fn default_x1337x_url() -> String {
    "https://1337x.to".to_string()
}

fn default_tgx_detail_limit() -> usize {
    10
}

fn default_flaresolverr_sessions() -> usize {
    3
}

fn default_flaresolverr_session_refresh_ms() -> u64 {
    300_000
}

/// Split a comma-separated URL list, dropping empty entries and trailing
/// slashes. An empty result disables the scraper.
pub fn split_urls(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().trim_end_matches('/').to_string())
        .filter(|s| !s.is_empty())
        .collect()
}

impl Config {
    /// Load configuration from file and environment variables.
    ///
    /// Configuration is loaded in the following order (later sources override
    /// earlier):
    /// 1. Default values
    /// 2. `config.toml` in current directory (optional)
    /// 3. Environment variables (`YTS_URL`, `REDIS_URL`, `SERVER__PORT`, ...)
    pub fn load() -> Result<Self, AppError> {
        Self::load_from("config.toml")
    }

    /// Load configuration from a specific file path.
    pub fn load_from(config_path: &str) -> Result<Self, AppError> {
        let config = ConfigLoader::builder()
            .add_source(File::with_name(config_path).required(false))
            // Flat variables land on top-level keys; nested keys use a
            // double-underscore separator (SERVER__PORT -> server.port).
            .add_source(Environment::default().separator("__"))
            .build()?;

        let config: Config = config.try_deserialize()?;
        Ok(config)
    }

    pub fn yts_urls(&self) -> Vec<String> {
        split_urls(&self.yts_url)
    }

    pub fn eztv_urls(&self) -> Vec<String> {
        split_urls(&self.eztv_url)
    }

    pub fn tgx_urls(&self) -> Vec<String> {
        split_urls(&self.tgx_url)
    }

    pub fn apibay_urls(&self) -> Vec<String> {
        split_urls(&self.apibay_url)
    }

    pub fn x1337x_urls(&self) -> Vec<String> {
        split_urls(&self.x1337x_url)
    }

    /// Get the server socket address
    pub fn server_addr(&self) -> std::net::SocketAddr {
        use std::net::{IpAddr, SocketAddr};
        let ip: IpAddr = self.server.host.parse().unwrap_or_else(|_| {
            tracing::warn!("Invalid host '{}', using 0.0.0.0", self.server.host);
            "0.0.0.0".parse().unwrap()
        });
        SocketAddr::new(ip, self.server.port)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::load_from("nonexistent.toml").unwrap();
        assert_eq!(config.server.port, 7700);
        assert_eq!(config.server.host, "0.0.0.0");
        assert_eq!(config.redis_ttl_hours, 24);
        assert!(config.max_request_wait_seconds.is_none());
        assert_eq!(config.yts_urls(), vec!["https://yts.mx".to_string()]);
    }

    #[test]
    fn test_split_urls() {
        assert_eq!(
            split_urls("https://a.example/, https://b.example"),
            vec!["https://a.example".to_string(), "https://b.example".to_string()]
        );
        assert!(split_urls("").is_empty());
        assert!(split_urls(" , ").is_empty());
    }

    #[test]
    fn test_server_addr() {
        let config = Config::load_from("nonexistent.toml").unwrap();
        let addr = config.server_addr();
        assert_eq!(addr.port(), 7700);
    }
}
