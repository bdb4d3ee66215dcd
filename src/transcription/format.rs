//! Transcript output formatting (text, JSON, SRT, VTT, report).

use super::{AssemblyStats, ExtractionMethod, Transcript};
use crate::orchestrator::Acquisition;
use serde::Serialize;

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    /// Final transcript text: refined when available, else `[MM:SS]` lines.
    #[default]
    Text,
    Json,
    Srt,
    Vtt,
    /// Plain-text report with a video information header.
    Report,
}

impl std::str::FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "txt" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            "srt" => Ok(OutputFormat::Srt),
            "vtt" | "webvtt" => Ok(OutputFormat::Vtt),
            "report" => Ok(OutputFormat::Report),
            _ => Err(format!(
                "Unknown format: {}. Use text, json, srt, vtt, or report.",
                s
            )),
        }
    }
}

/// JSON-serializable acquisition result.
#[derive(Debug, Serialize)]
pub struct TranscriptExport {
    pub video_id: String,
    pub url: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    pub method: ExtractionMethod,
    pub duration_seconds: f64,
    pub transcript: String,
    pub segments: Vec<SegmentExport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stats: Option<AssemblyStats>,
}

#[derive(Debug, Serialize)]
pub struct SegmentExport {
    pub text: String,
    pub start_seconds: f64,
    pub end_seconds: f64,
}

impl From<&Acquisition> for TranscriptExport {
    fn from(acq: &Acquisition) -> Self {
        Self {
            video_id: acq.video.id().to_string(),
            url: acq.video.url().to_string(),
            title: acq.metadata.as_ref().map(|m| m.title.clone()),
            method: acq.method,
            duration_seconds: acq.transcript.duration_seconds,
            transcript: acq.text().to_string(),
            segments: acq
                .transcript
                .segments
                .iter()
                .map(|s| SegmentExport {
                    text: s.text.clone(),
                    start_seconds: s.start_seconds,
                    end_seconds: s.end_seconds,
                })
                .collect(),
            stats: acq.stats,
        }
    }
}

/// Format an acquisition for output.
pub fn format_acquisition(acq: &Acquisition, format: OutputFormat) -> String {
    match format {
        OutputFormat::Text => acq.text().to_string(),
        OutputFormat::Json => format_json(acq),
        OutputFormat::Srt => format_srt(&acq.transcript),
        OutputFormat::Vtt => format_vtt(&acq.transcript),
        OutputFormat::Report => format_report(acq),
    }
}

fn format_json(acq: &Acquisition) -> String {
    let export = TranscriptExport::from(acq);
    serde_json::to_string_pretty(&export).unwrap_or_else(|_| "{}".to_string())
}

/// Format as SRT (SubRip).
fn format_srt(transcript: &Transcript) -> String {
    let mut output = String::new();

    for (i, segment) in transcript.segments.iter().enumerate() {
        output.push_str(&format!("{}\n", i + 1));
        output.push_str(&format!(
            "{} --> {}\n",
            format_srt_timestamp(segment.start_seconds),
            format_srt_timestamp(segment.end_seconds)
        ));
        output.push_str(&segment.text);
        output.push_str("\n\n");
    }

    output
}

/// Format as WebVTT.
fn format_vtt(transcript: &Transcript) -> String {
    let mut output = String::from("WEBVTT\n\n");

    for segment in &transcript.segments {
        output.push_str(&format!(
            "{} --> {}\n",
            format_vtt_timestamp(segment.start_seconds),
            format_vtt_timestamp(segment.end_seconds)
        ));
        output.push_str(&segment.text);
        output.push_str("\n\n");
    }

    output
}

fn format_report(acq: &Acquisition) -> String {
    let rule = "=".repeat(80);
    let thin = "-".repeat(80);
    let na = || "N/A".to_string();
    let meta = acq.metadata.as_ref();

    let mut out = String::new();
    out.push_str("TRANSCRIPT EXTRACTION REPORT\n");
    out.push_str(&format!("{rule}\n\n"));
    out.push_str("VIDEO INFORMATION\n");
    out.push_str(&format!("{thin}\n"));
    out.push_str(&format!("Title: {}\n", meta.map(|m| m.title.clone()).unwrap_or_else(na)));
    out.push_str(&format!(
        "Channel: {}\n",
        meta.and_then(|m| m.channel.clone()).unwrap_or_else(na)
    ));
    out.push_str(&format!(
        "Duration: {}\n",
        meta.and_then(|m| m.duration_seconds)
            .map(|d| format!("{} ({} seconds)", super::format_timestamp(f64::from(d)), d))
            .unwrap_or_else(na)
    ));
    out.push_str(&format!(
        "Upload Date: {}\n",
        meta.and_then(|m| m.upload_date)
            .map(|d| d.format("%Y-%m-%d").to_string())
            .unwrap_or_else(na)
    ));
    out.push_str(&format!(
        "View Count: {}\n",
        meta.and_then(|m| m.view_count).map(group_thousands).unwrap_or_else(na)
    ));
    out.push_str(&format!(
        "Like Count: {}\n",
        meta.and_then(|m| m.like_count).map(group_thousands).unwrap_or_else(na)
    ));
    out.push_str(&format!("Video URL: {}\n", acq.video.url()));

    if let Some(description) = meta.and_then(|m| m.description.as_deref()).filter(|d| !d.is_empty()) {
        out.push_str(&format!("\nDESCRIPTION\n{thin}\n{description}\n"));
    }

    out.push_str(&format!("\n{rule}\n"));
    out.push_str(&format!(
        "EXTRACTION METHOD: {}\n",
        acq.method.as_str().to_uppercase()
    ));
    out.push_str(&format!("{rule}\n\n"));
    out.push_str("TRANSCRIPT\n");
    out.push_str(&format!("{thin}\n"));
    out.push_str(acq.text());
    out.push('\n');
    out
}

fn group_thousands(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Format timestamp for SRT (00:00:00,000).
fn format_srt_timestamp(seconds: f64) -> String {
    let (h, m, s, ms) = split_millis(seconds);
    format!("{:02}:{:02}:{:02},{:03}", h, m, s, ms)
}

/// Format timestamp for VTT (00:00:00.000).
fn format_vtt_timestamp(seconds: f64) -> String {
    let (h, m, s, ms) = split_millis(seconds);
    format!("{:02}:{:02}:{:02}.{:03}", h, m, s, ms)
}

fn split_millis(seconds: f64) -> (u64, u64, u64, u64) {
    let total_ms = (seconds * 1000.0).round() as u64;
    (
        total_ms / 3_600_000,
        (total_ms % 3_600_000) / 60_000,
        (total_ms % 60_000) / 1000,
        total_ms % 1000,
    )
}
