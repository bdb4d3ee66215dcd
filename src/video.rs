//! Video identifiers and URL normalization.

use crate::error::{Result, SkriftError};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// A platform video identifier plus its canonical watch URL.
///
/// Every accepted URL shape for the same identifier normalizes to an equal value.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct VideoReference {
    id: String,
    url: String,
}

fn video_id_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-zA-Z0-9_-]{11}$").expect("valid video id regex"))
}

fn is_video_id(s: &str) -> bool {
    video_id_regex().is_match(s)
}

fn is_youtube_host(host: &str) -> bool {
    let h = host.to_ascii_lowercase();
    h == "youtube.com"
        || h == "youtu.be"
        || h == "youtube-nocookie.com"
        || h.ends_with(".youtube.com")
        || h.ends_with(".youtube-nocookie.com")
}

impl VideoReference {
    /// Parse a watch/short/embed/shorts/live URL or a bare 11-character ID.
    pub fn parse(input: &str) -> Result<Self> {
        let input = input.trim();

        if is_video_id(input) {
            return Ok(Self::from_id(input));
        }

        let with_scheme = if input.starts_with("http://") || input.starts_with("https://") {
            input.to_string()
        } else {
            format!("https://{}", input)
        };

        let url = url::Url::parse(&with_scheme)
            .map_err(|_| SkriftError::InvalidInput(format!("Not a video URL: {}", input)))?;

        extract_id(&url)
            .map(|id| Self::from_id(&id))
            .ok_or_else(|| SkriftError::InvalidInput(format!("Not a video URL: {}", input)))
    }

    fn from_id(id: &str) -> Self {
        Self {
            id: id.to_string(),
            url: format!("https://www.youtube.com/watch?v={}", id),
        }
    }

    /// The bare video identifier.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The canonical watch URL.
    pub fn url(&self) -> &str {
        &self.url
    }
}

impl std::fmt::Display for VideoReference {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.id)
    }
}

impl std::str::FromStr for VideoReference {
    type Err = SkriftError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}

fn extract_id(url: &url::Url) -> Option<String> {
    let host = url.host_str()?;
    if !is_youtube_host(host) {
        return None;
    }

    // youtu.be/<id>
    if host.eq_ignore_ascii_case("youtu.be") {
        let seg = url.path_segments()?.next()?;
        return is_video_id(seg).then(|| seg.to_string());
    }

    // /watch?v=<id>, in any query position
    if url.path() == "/watch" || url.path() == "/watch/" {
        return url
            .query_pairs()
            .find(|(k, _)| k == "v")
            .map(|(_, v)| v.into_owned())
            .filter(|v| is_video_id(v));
    }

    // /embed/<id>, /v/<id>, /shorts/<id>, /live/<id>
    let mut segs = url.path_segments()?;
    let kind = segs.next()?;
    let id = segs.next()?;
    match kind {
        "embed" | "v" | "shorts" | "live" if is_video_id(id) => Some(id.to_string()),
        _ => None,
    }
}
