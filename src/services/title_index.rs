//! Local IMDb title lookup.
//!
//! Binary-searches the sorted `title.basics.tsv` dataset by byte offset, so
//! a lookup touches a handful of disk pages instead of reading the whole
//! file. Results (hits and misses alike) are memoized for the process
//! lifetime.

use std::collections::HashMap;
use std::io::SeekFrom;
use std::path::{Path, PathBuf};
use std::sync::RwLock;

use tokio::fs::File;
use tokio::io::{AsyncReadExt, AsyncSeekExt};

const BACKSCAN_CHUNK: usize = 256;
const READ_CHUNK: usize = 1024;

/// One record of the IMDb `title.basics` dataset.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TitleBasics {
    pub tconst: String,
    pub title_type: String,
    pub primary_title: Option<String>,
    pub original_title: Option<String>,
    pub is_adult: bool,
    pub start_year: Option<u16>,
    pub end_year: Option<u16>,
    pub runtime_minutes: Option<u32>,
    pub genres: Vec<String>,
}

/// Byte-offset binary search over the sorted dataset file.
pub struct TitleIndex {
    path: PathBuf,
    memo: RwLock<HashMap<String, Option<TitleBasics>>>,
}

impl TitleIndex {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            memo: RwLock::new(HashMap::new()),
        }
    }

    /// Look up a title by `tconst`.
    ///
    /// Filesystem errors degrade silently to `None`; the (possibly negative)
    /// result is memoized.
    pub async fn lookup(&self, tconst: &str) -> Option<TitleBasics> {
        if let Some(cached) = self.memo.read().ok()?.get(tconst) {
            return cached.clone();
        }

        let found = match self.search(tconst).await {
            Ok(found) => found,
            Err(e) => {
                tracing::debug!(tconst = %tconst, error = %e, "title lookup failed");
                None
            }
        };

        if let Ok(mut memo) = self.memo.write() {
            memo.insert(tconst.to_string(), found.clone());
        }
        found
    }

    async fn search(&self, tconst: &str) -> std::io::Result<Option<TitleBasics>> {
        // Every call opens its own handle; concurrent lookups never share a
        // file cursor.
        let mut file = File::open(&self.path).await?;
        let len = file.metadata().await?.len();

        let data_start = find_data_start(&mut file, len).await?;
        if data_start >= len {
            return Ok(None);
        }

        let mut low = data_start;
        let mut high = len - 1;

        while low <= high {
            let mid = low + (high - low) / 2;
            let line_start = find_line_start(&mut file, mid, data_start).await?;
            let (line, line_end) = read_line(&mut file, line_start, len).await?;

            let key = line.split('\t').next().unwrap_or("");
            match key.cmp(tconst) {
                std::cmp::Ordering::Equal => return Ok(parse_record(&line)),
                std::cmp::Ordering::Less => low = line_end + 1,
                std::cmp::Ordering::Greater => {
                    if line_start <= data_start {
                        break;
                    }
                    high = line_start - 1;
                }
            }
        }

        Ok(None)
    }
}

/// Offset of the first data byte: everything past the header line.
async fn find_data_start(file: &mut File, len: u64) -> std::io::Result<u64> {
    let mut offset = 0u64;
    let mut buf = [0u8; READ_CHUNK];
    file.seek(SeekFrom::Start(0)).await?;
    while offset < len {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        if let Some(pos) = buf[..n].iter().position(|&b| b == b'\n') {
            return Ok(offset + pos as u64 + 1);
        }
        offset += n as u64;
    }
    Ok(len)
}

/// Start offset of the line containing `offset`, clamped to the data region.
async fn find_line_start(file: &mut File, offset: u64, data_start: u64) -> std::io::Result<u64> {
    if offset <= data_start {
        return Ok(data_start);
    }
    // Scan backwards in chunks for the nearest preceding newline.
    let mut end = offset;
    let mut buf = [0u8; BACKSCAN_CHUNK];
    while end > data_start {
        let chunk_start = end.saturating_sub(BACKSCAN_CHUNK as u64).max(data_start);
        let size = (end - chunk_start) as usize;
        file.seek(SeekFrom::Start(chunk_start)).await?;
        file.read_exact(&mut buf[..size]).await?;
        if let Some(pos) = buf[..size].iter().rposition(|&b| b == b'\n') {
            return Ok(chunk_start + pos as u64 + 1);
        }
        end = chunk_start;
    }
    Ok(data_start)
}

/// Read one line starting at `start`; returns the text and the offset of its
/// terminating newline (or end of file).
async fn read_line(file: &mut File, start: u64, len: u64) -> std::io::Result<(String, u64)> {
    file.seek(SeekFrom::Start(start)).await?;
    let mut line: Vec<u8> = Vec::new();
    let mut buf = [0u8; READ_CHUNK];
    let mut offset = start;
    while offset < len {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        if let Some(pos) = buf[..n].iter().position(|&b| b == b'\n') {
            line.extend_from_slice(&buf[..pos]);
            return Ok((String::from_utf8_lossy(&line).into_owned(), offset + pos as u64));
        }
        line.extend_from_slice(&buf[..n]);
        offset += n as u64;
    }
    Ok((String::from_utf8_lossy(&line).into_owned(), len))
}

fn parse_record(line: &str) -> Option<TitleBasics> {
    let fields: Vec<&str> = line.split('\t').collect();
    if fields.len() < 9 {
        return None;
    }
    Some(TitleBasics {
        tconst: fields[0].to_string(),
        title_type: fields[1].to_string(),
        primary_title: non_null(fields[2]).map(str::to_string),
        original_title: non_null(fields[3]).map(str::to_string),
        is_adult: fields[4] == "1",
        start_year: non_null(fields[5]).and_then(|s| s.parse().ok()),
        end_year: non_null(fields[6]).and_then(|s| s.parse().ok()),
        runtime_minutes: non_null(fields[7]).and_then(|s| s.parse().ok()),
        genres: non_null(fields[8])
            .map(|g| g.split(',').map(str::to_string).collect())
            .unwrap_or_default(),
    })
}

/// IMDb datasets encode missing values as `\N`.
fn non_null(field: &str) -> Option<&str> {
    if field == r"\N" || field.is_empty() {
        None
    } else {
        Some(field)
    }
}
