//! User-visible stream naming.
//!
//! Builds the `name`, `title` and multi-line `description` shown by the
//! player for each stream.

use lazy_static::lazy_static;
use regex::Regex;

use crate::services::quality;

lazy_static! {
    static ref SEASON_EP_RE: Regex = Regex::new(r"(?i)\bS\d{1,2}E\d{1,2}\b").unwrap();
    static ref DOTS_RE: Regex = Regex::new(r"[._]+").unwrap();
    static ref WS_RE: Regex = Regex::new(r"\s+").unwrap();
}

/// Everything known about a stream that feeds its display lines.
#[derive(Debug, Default)]
pub struct DisplayInput<'a> {
    pub imdb_title: &'a str,
    pub season: Option<u32>,
    pub episode: Option<u32>,
    pub torrent_name: Option<&'a str>,
    pub quality: Option<&'a str>,
    pub source: Option<&'a str>,
    pub seeders: Option<u32>,
    pub size_bytes: Option<u64>,
    pub size_label: Option<&'a str>,
}

/// Rendered display lines for one stream.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Display {
    pub name: String,
    pub title: String,
    pub description: String,
}

/// Render the display block for a stream.
pub fn format(input: &DisplayInput) -> Display {
    let name = input.source.unwrap_or("Stream").to_string();

    let label = input
        .quality
        .and_then(quality::extract)
        .or_else(|| input.torrent_name.and_then(quality::extract));
    let title = match label {
        Some("2160p") => "Watch 4K".to_string(),
        Some(q) => format!("Watch {}", q.to_lowercase()),
        None => "Watch 480p".to_string(),
    };

    let mut lines: Vec<String> = Vec::new();
    if !input.imdb_title.is_empty() {
        lines.push(input.imdb_title.to_string());
    }
    if let (Some(season), Some(episode)) = (input.season, input.episode) {
        lines.push(format!("Season {} Episode {}", season, episode));
    }

    let slug = input
        .torrent_name
        .map(|n| release_slug(n, input.imdb_title))
        .filter(|s| !s.is_empty())
        .or_else(|| input.quality.map(|q| q.to_string()))
        .unwrap_or_else(|| "Unknown release".to_string());
    lines.push(format!("{} ({})", slug, input.source.unwrap_or("Unknown")));

    let size = input
        .size_label
        .map(|s| s.to_string())
        .or_else(|| input.size_bytes.map(format_bytes))
        .unwrap_or_else(|| "Unknown size".to_string());
    lines.push(format!("🌱 {} • 💾 {}", input.seeders.unwrap_or(0), size));

    Display {
        name,
        title,
        description: lines.join("\n"),
    }
}

/// Reduce a raw torrent name to its release tail: the title pattern and any
/// `SxxEyy` segment are removed and separator punctuation collapses to
/// spaces. Returns an empty string when nothing remains.
fn release_slug(torrent_name: &str, imdb_title: &str) -> String {
    let mut s = torrent_name.to_string();

    if let Some(re) = title_pattern(imdb_title) {
        s = re.replace_all(&s, " ").into_owned();
    }
    s = SEASON_EP_RE.replace_all(&s, " ").into_owned();
    s = DOTS_RE.replace_all(&s, " ").into_owned();
    let s = WS_RE.replace_all(&s, " ");
    s.trim().trim_matches(|c: char| c == '-').trim().to_string()
}

/// Build a punctuation-tolerant matcher for the title: alphanumeric runs of
/// the title must appear in order, with any separators between them.
fn title_pattern(imdb_title: &str) -> Option<Regex> {
    let tokens: Vec<String> = imdb_title
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|t| !t.is_empty())
        .map(regex::escape)
        .collect();
    if tokens.is_empty() {
        return None;
    }
    Regex::new(&format!("(?i){}", tokens.join(r"[\W_]*"))).ok()
}

/// Human-readable byte count: greatest unit with value >= 1, no decimals for
/// bytes or values >= 10, two decimals otherwise.
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: [&str; 5] = ["B", "KB", "MB", "GB", "TB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 || value >= 10.0 {
        format!("{:.0} {}", value, UNITS[unit])
    } else {
        format!("{:.2} {}", value, UNITS[unit])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_episode_display_block() {
        let display = format(&DisplayInput {
            imdb_title: "The Handmaid's Tale",
            season: Some(6),
            episode: Some(7),
            torrent_name: Some("The.Handmaid's.Tale.S06E07.1080p.WEB.h264-ETHEL"),
            source: Some("EZTV"),
            seeders: Some(231),
            size_label: Some("1.4 GB"),
            ..Default::default()
        });

        assert_eq!(display.name, "EZTV");
        assert_eq!(display.title, "Watch 1080p");
        let lines: Vec<&str> = display.description.split('\n').collect();
        assert_eq!(
            lines,
            vec![
                "The Handmaid's Tale",
                "Season 6 Episode 7",
                "1080p WEB h264-ETHEL (EZTV)",
                "🌱 231 • 💾 1.4 GB",
            ]
        );
    }

    #[test]
    fn test_movie_display_defaults() {
        let display = format(&DisplayInput {
            imdb_title: "Some Film",
            ..Default::default()
        });
        assert_eq!(display.name, "Stream");
        assert_eq!(display.title, "Watch 480p");
        let lines: Vec<&str> = display.description.split('\n').collect();
        assert_eq!(
            lines,
            vec!["Some Film", "Unknown release (Unknown)", "🌱 0 • 💾 Unknown size"]
        );
    }

    #[test]
    fn test_4k_title() {
        let display = format(&DisplayInput {
            imdb_title: "Film",
            quality: Some("2160p bluray"),
            ..Default::default()
        });
        assert_eq!(display.title, "Watch 4K");

        let display = format(&DisplayInput {
            imdb_title: "Film",
            torrent_name: Some("Film.2021.4K.HDR.mkv"),
            ..Default::default()
        });
        assert_eq!(display.title, "Watch 4K");
    }

    #[test]
    fn test_slug_falls_back_to_quality() {
        // The torrent name reduces to nothing once the title is removed.
        let display = format(&DisplayInput {
            imdb_title: "Dune",
            torrent_name: Some("Dune"),
            quality: Some("720p web"),
            source: Some("YTS"),
            ..Default::default()
        });
        let lines: Vec<&str> = display.description.split('\n').collect();
        assert_eq!(lines[1], "720p web (YTS)");
    }

    #[test]
    fn test_size_from_bytes() {
        let display = format(&DisplayInput {
            imdb_title: "Film",
            size_bytes: Some(1_610_612_736),
            ..Default::default()
        });
        assert!(display.description.ends_with("💾 1.50 GB"));
    }

    #[test]
    fn test_format_bytes() {
        assert_eq!(format_bytes(0), "0 B");
        assert_eq!(format_bytes(512), "512 B");
        assert_eq!(format_bytes(1024), "1.00 KB");
        assert_eq!(format_bytes(10 * 1024), "10 KB");
        assert_eq!(format_bytes(1_610_612_736), "1.50 GB");
        assert_eq!(format_bytes(1024 * 1024 * 1024 * 1024), "1.00 TB");
    }
}
