//! Request id parsing.
//!
//! A stream request id is either a bare IMDb title id (`tt10872600`) or a
//! title id with season and episode (`tt5834204:2:3`).

use thiserror::Error;

/// Reasons an incoming request id can be rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum IdError {
    #[error("id must have 1 or 3 colon-separated segments")]
    InvalidSegmentCount,
    #[error("base id must match tt<digits>")]
    InvalidBaseId,
    #[error("season must be a positive integer")]
    InvalidSeason,
    #[error("episode must be a positive integer")]
    InvalidEpisode,
}

/// A validated request id.
///
/// Season and episode are either both present or both absent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedRequestId {
    pub base_id: String,
    pub season: Option<u32>,
    pub episode: Option<u32>,
}

impl ParsedRequestId {
    /// Parse a request id.
    ///
    /// Accepts `tt<digits>` or `tt<digits>:<season>:<episode>` with positive
    /// integer season and episode. The `tt` prefix is case-sensitive.
    pub fn parse(id: &str) -> Result<Self, IdError> {
        let segments: Vec<&str> = id.split(':').collect();

        let (base, season, episode) = match segments.as_slice() {
            [base] => (*base, None, None),
            [base, season, episode] => (*base, Some(*season), Some(*episode)),
            _ => return Err(IdError::InvalidSegmentCount),
        };

        if !is_imdb_id(base) {
            return Err(IdError::InvalidBaseId);
        }

        let season = match season {
            Some(raw) => Some(parse_positive(raw).ok_or(IdError::InvalidSeason)?),
            None => None,
        };
        let episode = match episode {
            Some(raw) => Some(parse_positive(raw).ok_or(IdError::InvalidEpisode)?),
            None => None,
        };

        Ok(Self {
            base_id: base.to_string(),
            season,
            episode,
        })
    }

    /// Render the id back to its wire form. Inverse of [`parse`] for every
    /// accepted input.
    ///
    /// [`parse`]: ParsedRequestId::parse
    pub fn format(&self) -> String {
        match (self.season, self.episode) {
            (Some(season), Some(episode)) => {
                format!("{}:{}:{}", self.base_id, season, episode)
            }
            _ => self.base_id.clone(),
        }
    }

    /// IMDb id digits without the `tt` prefix.
    pub fn digits(&self) -> &str {
        self.base_id.trim_start_matches("tt")
    }
}

fn is_imdb_id(s: &str) -> bool {
    match s.strip_prefix("tt") {
        Some(digits) => !digits.is_empty() && digits.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

fn parse_positive(s: &str) -> Option<u32> {
    match s.parse::<u32>() {
        Ok(n) if n > 0 => Some(n),
        _ => None,
    }
}
