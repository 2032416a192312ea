//! Application services for the barestreams addon.

pub mod aggregator;
pub mod dataset;
pub mod display;
pub mod http;
pub mod id;
pub mod magnet;
pub mod quality;
pub mod query;
pub mod scrapers;
pub mod title_index;

pub use aggregator::Aggregator;
pub use http::HttpClient;
pub use query::QueryBuilder;
pub use title_index::TitleIndex;
