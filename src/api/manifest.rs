//! Addon manifest endpoint.

use axum::Json;
use serde::Serialize;

/// Fixed addon manifest advertised to players.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Manifest {
    pub id: String,
    pub version: String,
    pub name: String,
    pub description: String,
    pub resources: Vec<String>,
    pub types: Vec<String>,
    pub id_prefixes: Vec<String>,
    pub catalogs: Vec<serde_json::Value>,
    pub behavior_hints: ManifestHints,
}

#[derive(Debug, Clone, Serialize)]
pub struct ManifestHints {
    pub p2p: bool,
}

impl Default for Manifest {
    fn default() -> Self {
        Self {
            id: "com.barestreams.addon".to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
            name: "BareStreams".to_string(),
            description: "On-demand torrent streams from public trackers".to_string(),
            resources: vec!["stream".to_string()],
            types: vec!["movie".to_string(), "series".to_string()],
            id_prefixes: vec!["tt".to_string()],
            catalogs: Vec::new(),
            behavior_hints: ManifestHints { p2p: true },
        }
    }
}

/// GET /manifest.json
pub async fn manifest() -> Json<Manifest> {
    Json(Manifest::default())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manifest_shape() {
        let json = serde_json::to_value(Manifest::default()).unwrap();
        assert_eq!(json["resources"], serde_json::json!(["stream"]));
        assert_eq!(json["types"], serde_json::json!(["movie", "series"]));
        assert_eq!(json["idPrefixes"], serde_json::json!(["tt"]));
        assert_eq!(json["catalogs"], serde_json::json!([]));
        assert_eq!(json["behaviorHints"]["p2p"], serde_json::json!(true));
    }
}
