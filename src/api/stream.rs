//! Stream resolution endpoint.

use axum::extract::{Path, State};
use axum::Json;

use crate::error::Result;
use crate::services::scrapers::StreamResponse;
use crate::AppState;

/// GET /stream/{type}/{id}.json
///
/// Returns the aggregated stream list; 400 on a bad type or id.
pub async fn stream(
    State(state): State<AppState>,
    Path((media_type, id)): Path<(String, String)>,
) -> Result<Json<StreamResponse>> {
    let id = id.strip_suffix(".json").unwrap_or(&id);
    let response = state.aggregator.handle_stream(&media_type, id).await?;
    Ok(Json(response))
}
