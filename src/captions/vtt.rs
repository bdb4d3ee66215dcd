//! WebVTT caption parsing.
//!
//! Handles both manual tracks, where every cue is kept as written, and the
//! rolling auto-generated tracks, where each cue repeats the previous line and
//! carries inline word timings.

use super::CaptionEntry;
use regex::Regex;
use std::sync::OnceLock;

fn tag_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"<[^>]*>").expect("valid tag regex"))
}

/// Parse a WebVTT document into caption entries ordered by offset.
///
/// With `rolling` set, a line repeating the line before it is dropped. Manual
/// tracks must pass `false` so each cue stays one entry.
pub fn parse_vtt(vtt: &str, rolling: bool) -> Vec<CaptionEntry> {
    let normalized = vtt.replace("\r\n", "\n");
    let mut entries = Vec::new();
    let mut last_line: Option<String> = None;

    for block in normalized.split("\n\n") {
        let mut lines = block.lines().map(str::trim).skip_while(|l| !l.contains("-->"));

        let Some(timing) = lines.next() else {
            continue;
        };
        let Some((start, end)) = parse_timing(timing) else {
            continue;
        };

        let mut kept = Vec::new();
        for raw in lines {
            let line = clean_line(raw);
            if line.is_empty() || (rolling && last_line.as_deref() == Some(line.as_str())) {
                continue;
            }
            last_line = Some(line.clone());
            kept.push(line);
        }

        if kept.is_empty() {
            continue;
        }

        entries.push(CaptionEntry {
            offset_seconds: start,
            duration_seconds: (end - start).max(0.0),
            text: kept.join(" "),
        });
    }

    entries.sort_by(|a, b| a.offset_seconds.total_cmp(&b.offset_seconds));
    entries
}

fn clean_line(raw: &str) -> String {
    let stripped = tag_regex().replace_all(raw, "");
    let decoded = stripped
        .replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&");
    decoded.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Parse `00:00:01.000 --> 00:00:04.000 align:start` into (start, end) seconds.
fn parse_timing(line: &str) -> Option<(f64, f64)> {
    let (start, rest) = line.split_once("-->")?;
    let end = rest.split_whitespace().next()?;
    Some((parse_timestamp(start.trim())?, parse_timestamp(end)?))
}

/// Parse `HH:MM:SS.mmm` or `MM:SS.mmm`.
fn parse_timestamp(ts: &str) -> Option<f64> {
    let ts = ts.replace(',', ".");
    let parts: Vec<&str> = ts.split(':').collect();
    let (h, m, s) = match parts.as_slice() {
        [h, m, s] => (h.parse::<f64>().ok()?, m.parse::<f64>().ok()?, s.parse::<f64>().ok()?),
        [m, s] => (0.0, m.parse::<f64>().ok()?, s.parse::<f64>().ok()?),
        _ => return None,
    };
    Some(h * 3600.0 + m * 60.0 + s)
}
