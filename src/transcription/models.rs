//! Data models for transcript acquisition.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// Segments and transcripts
// ============================================================================

/// Where a segment's text came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentSource {
    Caption,
    SpeechRecognition,
}

/// A single segment of a transcript with timestamp information.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TranscriptSegment {
    /// Start time in seconds.
    pub start_seconds: f64,
    /// End time in seconds.
    pub end_seconds: f64,
    /// Transcribed text content.
    pub text: String,
    pub source: SegmentSource,
}

impl TranscriptSegment {
    /// Create a new transcript segment.
    pub fn new(start_seconds: f64, end_seconds: f64, text: String, source: SegmentSource) -> Self {
        Self {
            start_seconds,
            end_seconds,
            text,
            source,
        }
    }
}

/// A complete transcript with segments ordered by start time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transcript {
    /// Video ID this transcript belongs to.
    pub video_id: String,
    /// Individual transcript segments with timestamps.
    pub segments: Vec<TranscriptSegment>,
    /// Full transcript text (concatenated segments).
    pub full_text: String,
    /// End of the last segment in seconds.
    pub duration_seconds: f64,
}

impl Transcript {
    /// Create a new transcript from segments.
    pub fn new(video_id: String, segments: Vec<TranscriptSegment>) -> Self {
        debug_assert!(
            segments
                .windows(2)
                .all(|w| w[0].start_seconds <= w[1].start_seconds),
            "segments must be ordered by start time"
        );

        let full_text = segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join(" ");

        let duration_seconds = segments.last().map(|s| s.end_seconds).unwrap_or(0.0);

        Self {
            video_id,
            segments,
            full_text,
            duration_seconds,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.segments.is_empty()
    }

    /// One `[MM:SS] text` line per segment.
    pub fn timestamped_text(&self) -> String {
        self.segments
            .iter()
            .map(|s| format!("[{}] {}", format_timestamp(s.start_seconds), s.text))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Format seconds as MM:SS or HH:MM:SS.
pub fn format_timestamp(seconds: f64) -> String {
    let total_seconds = seconds as u32;
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let secs = total_seconds % 60;

    if hours > 0 {
        format!("{:02}:{:02}:{:02}", hours, minutes, secs)
    } else {
        format!("{:02}:{:02}", minutes, secs)
    }
}

// ============================================================================
// Audio chunks
// ============================================================================

/// One fixed-duration window of a downloaded audio track.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AudioChunk {
    pub index: usize,
    pub start: Duration,
    pub end: Duration,
    /// Where the chunk's audio was materialized for recognition.
    pub local_path: PathBuf,
}

impl AudioChunk {
    pub fn duration(&self) -> Duration {
        self.end - self.start
    }
}

/// Result of recognizing one chunk.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChunkOutcome {
    Success(String),
    /// Silence, music or unintelligible speech. Never retried.
    Unrecognized,
    /// The backend kept failing after the retry budget was spent.
    BackendError(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkResult {
    pub chunk: AudioChunk,
    pub outcome: ChunkOutcome,
    /// Backend calls spent on this chunk.
    pub attempts: u32,
}

impl ChunkResult {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ChunkOutcome::Success(_))
    }
}

/// Per-outcome chunk counts gathered during assembly.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AssemblyStats {
    pub total_chunks: usize,
    pub recognized: usize,
    pub unrecognized: usize,
    pub backend_errors: usize,
}

// ============================================================================
// Attempt bookkeeping
// ============================================================================

/// Which extraction strategy produced (or failed to produce) text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    Direct,
    AudioFallback,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "status", content = "reason")]
pub enum AttemptOutcome {
    Success,
    NotFound,
    Disabled,
    Failed(String),
}

/// How the final transcript text was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExtractionMethod {
    YoutubeTranscript,
    SpeechToText,
    SpeechToTextWithAiCleanup,
}

impl ExtractionMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            ExtractionMethod::YoutubeTranscript => "youtube_transcript",
            ExtractionMethod::SpeechToText => "speech_to_text",
            ExtractionMethod::SpeechToTextWithAiCleanup => "speech_to_text_with_ai_cleanup",
        }
    }
}

impl std::fmt::Display for ExtractionMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One backend attempt, kept for retry bookkeeping and diagnostics only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AcquisitionAttempt {
    pub strategy: Strategy,
    /// What was attempted: a caption language, "metadata" or "download".
    pub target: String,
    /// Label of the endpoint used.
    pub endpoint_used: String,
    pub outcome: AttemptOutcome,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn speech(start: f64, end: f64, text: &str) -> TranscriptSegment {
        TranscriptSegment::new(start, end, text.to_string(), SegmentSource::SpeechRecognition)
    }

    #[test]
    fn test_transcript_creation() {
        let transcript = Transcript::new(
            "test_video".to_string(),
            vec![speech(0.0, 5.0, "Hello world"), speech(5.0, 10.0, "This is a test")],
        );

        assert_eq!(transcript.video_id, "test_video");
        assert_eq!(transcript.full_text, "Hello world This is a test");
        assert_eq!(transcript.duration_seconds, 10.0);
    }

    #[test]
    fn test_timestamped_text() {
        let transcript = Transcript::new(
            "v".to_string(),
            vec![speech(0.0, 60.0, "first"), speech(3660.0, 3700.0, "later")],
        );
        assert_eq!(transcript.timestamped_text(), "[00:00] first\n[01:01:00] later");
    }

    #[test]
    fn test_format_timestamp() {
        assert_eq!(format_timestamp(0.0), "00:00");
        assert_eq!(format_timestamp(65.0), "01:05");
        assert_eq!(format_timestamp(3665.0), "01:01:05");
    }

    #[test]
    fn test_extraction_method_names() {
        let json = serde_json::to_string(&ExtractionMethod::SpeechToTextWithAiCleanup).unwrap();
        assert_eq!(json, "\"speech_to_text_with_ai_cleanup\"");
        assert_eq!(ExtractionMethod::YoutubeTranscript.to_string(), "youtube_transcript");
    }

    #[test]
    fn test_attempt_outcome_serializes_tagged() {
        let json = serde_json::to_string(&AttemptOutcome::Failed("timeout".into())).unwrap();
        assert_eq!(json, r#"{"status":"failed","reason":"timeout"}"#);
    }
}
