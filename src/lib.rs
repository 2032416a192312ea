//! barestreams library.
//!
//! Core functionality for the on-demand torrent stream resolver addon.
//! This library exposes modules for use in integration tests.

use axum::http::StatusCode;
use axum::response::Json;
use axum::routing::get;
use axum::Router;
use serde::Serialize;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};

pub mod api;
pub mod cache;
pub mod config;
pub mod error;
pub mod services;

use config::Config;
use services::Aggregator;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub aggregator: Arc<Aggregator>,
}

#[derive(Serialize)]
pub struct ApiResponse {
    pub message: String,
    pub version: String,
}

pub async fn health_check() -> Json<ApiResponse> {
    Json(ApiResponse {
        message: "barestreams is running".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
    })
}

async fn preflight() -> StatusCode {
    StatusCode::NO_CONTENT
}

/// Build the addon router: manifest, stream resolution and health, with
/// permissive CORS so any player origin can call it.
pub fn app(state: AppState) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([axum::http::Method::GET, axum::http::Method::OPTIONS])
        .allow_headers(Any);

    Router::new()
        .route("/manifest.json", get(api::manifest::manifest).options(preflight))
        .route(
            "/stream/{type}/{id}",
            get(api::stream::stream).options(preflight),
        )
        .route("/health", get(health_check))
        .layer(cors)
        .with_state(state)
}
