//! IMDb dataset refresh.
//!
//! Downloads and gunzips `title.basics.tsv.gz` when the local copy is
//! missing or stale. Runs once at startup, off the request path; any failure
//! leaves the previous file (or no file) in place.

use std::io::{BufReader, BufWriter};
use std::path::Path;
use std::time::{Duration, SystemTime};

use flate2::read::GzDecoder;
use tokio::io::AsyncWriteExt;

use crate::config::DatasetConfig;
use crate::error::AppError;

/// Refresh the local dataset if needed. Logs and swallows failures.
pub async fn ensure_fresh(config: &DatasetConfig) {
    if is_fresh(&config.path, config.stale_hours) {
        tracing::debug!(path = ?config.path, "IMDb dataset is fresh");
        return;
    }

    tracing::info!(url = %config.url, path = ?config.path, "refreshing IMDb dataset");
    match refresh(config).await {
        Ok(()) => tracing::info!(path = ?config.path, "IMDb dataset refreshed"),
        Err(e) => tracing::warn!(error = %e, "IMDb dataset refresh failed, keeping existing file"),
    }
}

fn is_fresh(path: &Path, stale_hours: u64) -> bool {
    let Ok(metadata) = std::fs::metadata(path) else {
        return false;
    };
    let Ok(modified) = metadata.modified() else {
        return false;
    };
    match SystemTime::now().duration_since(modified) {
        Ok(age) => age < Duration::from_secs(stale_hours * 3600),
        // Future mtime; treat as fresh.
        Err(_) => true,
    }
}

async fn refresh(config: &DatasetConfig) -> Result<(), AppError> {
    if let Some(parent) = config.path.parent() {
        tokio::fs::create_dir_all(parent)
            .await
            .map_err(|e| AppError::Internal(format!("failed to create dataset dir: {}", e)))?;
    }

    let gz_path = config.path.with_extension("tsv.gz.part");
    let tsv_path = config.path.with_extension("tsv.part");

    // Stream the archive to disk; it is far too large to buffer in memory.
    let client = reqwest::Client::builder()
        .timeout(Duration::from_secs(600))
        .build()
        .map_err(|e| AppError::Internal(format!("failed to build dataset client: {}", e)))?;
    let mut response = client
        .get(&config.url)
        .send()
        .await
        .and_then(|r| r.error_for_status())
        .map_err(|e| AppError::Internal(format!("dataset download failed: {}", e)))?;

    let mut out = tokio::fs::File::create(&gz_path)
        .await
        .map_err(|e| AppError::Internal(format!("failed to create {}: {}", gz_path.display(), e)))?;
    while let Some(chunk) = response
        .chunk()
        .await
        .map_err(|e| AppError::Internal(format!("dataset download interrupted: {}", e)))?
    {
        out.write_all(&chunk)
            .await
            .map_err(|e| AppError::Internal(format!("dataset write failed: {}", e)))?;
    }
    out.flush()
        .await
        .map_err(|e| AppError::Internal(format!("dataset flush failed: {}", e)))?;
    drop(out);

    // Decompression is blocking CPU + sync IO work.
    let gz = gz_path.clone();
    let tsv = tsv_path.clone();
    tokio::task::spawn_blocking(move || -> std::io::Result<()> {
        let input = std::fs::File::open(&gz)?;
        let mut decoder = GzDecoder::new(BufReader::new(input));
        let mut output = BufWriter::new(std::fs::File::create(&tsv)?);
        std::io::copy(&mut decoder, &mut output)?;
        Ok(())
    })
    .await
    .map_err(|e| AppError::Internal(format!("dataset decompress task failed: {}", e)))?
    .map_err(|e| AppError::Internal(format!("dataset decompress failed: {}", e)))?;

    tokio::fs::rename(&tsv_path, &config.path)
        .await
        .map_err(|e| AppError::Internal(format!("dataset rename failed: {}", e)))?;
    let _ = tokio::fs::remove_file(&gz_path).await;

    Ok(())
}
