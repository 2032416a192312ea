//! Search query construction.
//!
//! Turns a parsed request id into the query strings the scrapers search
//! with, using the local IMDb title index for the human-readable title.

use std::sync::Arc;

use lazy_static::lazy_static;
use regex::Regex;

use crate::services::id::ParsedRequestId;
use crate::services::title_index::TitleIndex;

lazy_static! {
    static ref NON_ALNUM_RE: Regex = Regex::new(r"[^A-Za-z0-9\s]+").unwrap();
    static ref WS_RE: Regex = Regex::new(r"\s+").unwrap();
    // Re-attach possessives severed by punctuation stripping.
    static ref SEVERED_S_RE: Regex = Regex::new(r"([A-Za-z0-9]) s\b").unwrap();
    static ref EPISODE_WORDY_RE: Regex =
        Regex::new(r"(?i)S(?:eason)?\s*0?(\d{1,2})\s*E(?:pisode)?\s*0?(\d{1,2})").unwrap();
    static ref EPISODE_COMPACT_RE: Regex = Regex::new(r"S(\d{1,2})E(\d{1,2})").unwrap();
    static ref EPISODE_X_RE: Regex = Regex::new(r"(\d{1,2})x(\d{1,2})").unwrap();
}

/// Query strings for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Queries {
    /// Resolved display title (falls back to the raw id on lookup miss).
    pub base_title: String,
    /// Primary search string.
    pub query: String,
    /// Broader search used when the primary one returns nothing.
    pub fallback_query: Option<String>,
    /// `S0XE0Y` suffix when season and episode are known.
    pub episode_suffix: Option<String>,
    /// Whether the title resolves to episodic content.
    pub is_series: bool,
}

/// Builds [`Queries`] from request ids, backed by the title index.
pub struct QueryBuilder {
    title_index: Arc<TitleIndex>,
}

impl QueryBuilder {
    pub fn new(title_index: Arc<TitleIndex>) -> Self {
        Self { title_index }
    }

    pub async fn build(&self, parsed: &ParsedRequestId) -> Queries {
        let basics = self.title_index.lookup(&parsed.base_id).await;

        let base_title = basics
            .as_ref()
            .and_then(|b| b.primary_title.clone().or_else(|| b.original_title.clone()))
            .unwrap_or_else(|| parsed.base_id.clone());

        let episode_suffix = match (parsed.season, parsed.episode) {
            (Some(season), Some(episode)) => Some(format!("S{:02}E{:02}", season, episode)),
            _ => None,
        };

        let episodic_type = basics
            .as_ref()
            .map(|b| {
                matches!(
                    b.title_type.to_ascii_lowercase().as_str(),
                    "tvseries" | "tvminiseries" | "tvepisode"
                )
            })
            .unwrap_or(false);
        let is_series = episodic_type || episode_suffix.is_some();

        if let Some(suffix) = &episode_suffix {
            return Queries {
                query: normalize(&format!("{} {}", base_title, suffix)),
                fallback_query: Some(normalize(&base_title)),
                base_title,
                episode_suffix,
                is_series,
            };
        }

        let query = match basics.as_ref().and_then(|b| b.start_year) {
            Some(year) => normalize(&format!("{} {}", base_title, year)),
            None => normalize(&base_title),
        };
        let fallback = normalize(&base_title);
        let fallback_query = (fallback != query).then_some(fallback);

        Queries {
            query,
            fallback_query,
            base_title,
            episode_suffix,
            is_series,
        }
    }
}

/// Normalize a search string: punctuation runs become single spaces,
/// whitespace collapses, and possessives severed by the stripping are
/// re-attached (`Handmaid s` -> `Handmaids`).
pub fn normalize(s: &str) -> String {
    let s = NON_ALNUM_RE.replace_all(s, " ");
    let s = WS_RE.replace_all(&s, " ");
    let s = s.trim();
    SEVERED_S_RE.replace_all(s, "${1}s").into_owned()
}

/// Extract `(season, episode)` from a release name.
///
/// Tries the wordy form (`Season 2 Episode 3`, `S02 E03`), then compact
/// `S02E03`, then `2x03`.
pub fn parse_episode(text: &str) -> Option<(u32, u32)> {
    for re in [&*EPISODE_WORDY_RE, &*EPISODE_COMPACT_RE, &*EPISODE_X_RE] {
        if let Some(caps) = re.captures(text) {
            let season = caps.get(1)?.as_str().parse().ok()?;
            let episode = caps.get(2)?.as_str().parse().ok()?;
            return Some((season, episode));
        }
    }
    None
}

/// Check whether a release name refers to the requested episode.
///
/// Vacuously true when no episode is requested; false when one is requested
/// but the name carries none.
pub fn matches_episode(name: &str, season: Option<u32>, episode: Option<u32>) -> bool {
    let (Some(season), Some(episode)) = (season, episode) else {
        return true;
    };
    match parse_episode(name) {
        Some((s, e)) => s == season && e == episode,
        None => false,
    }
}
