//! Error types for Skrift.

use crate::transcription::AcquisitionAttempt;
use thiserror::Error;

/// Library-level error type for Skrift operations.
#[derive(Error, Debug)]
pub enum SkriftError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// No caption track exists for the requested language. Expected, not a failure.
    #[error("No caption track found for language '{0}'")]
    NotFound(String),

    /// The video has no caption tracks at all.
    #[error("Transcripts are disabled for video {0}")]
    TranscriptsDisabled(String),

    /// The egress path could not reach the backend. Drives endpoint rotation.
    #[error("Endpoint unavailable: {0}")]
    EndpointUnavailable(String),

    /// A backend answered with an error. Drives bounded retry.
    #[error("Backend error: {0}")]
    Backend(String),

    /// The speech backend heard nothing it could turn into text.
    #[error("Audio could not be recognized")]
    Unrecognizable,

    #[error("Transcript acquisition failed for {video_id}: {reason}")]
    TotalAcquisitionFailure {
        video_id: String,
        reason: String,
        attempts: Vec<AcquisitionAttempt>,
    },

    #[error("External tool not found: {0}. Please install it and ensure it's in your PATH.")]
    ToolNotFound(String),

    #[error("External tool failed: {0}")]
    ToolFailed(String),

    #[error("OpenAI API error: {0}")]
    OpenAI(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("TOML parse error: {0}")]
    TomlParse(#[from] toml::de::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),
}

impl SkriftError {
    /// Whether a later attempt (another endpoint, another try) may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            SkriftError::EndpointUnavailable(_) | SkriftError::Backend(_) | SkriftError::Http(_)
        )
    }

    /// Whether the failure should move the endpoint rotator forward.
    pub fn is_endpoint_failure(&self) -> bool {
        matches!(self, SkriftError::EndpointUnavailable(_) | SkriftError::Http(_))
    }
}

/// Result type alias for Skrift operations.
pub type Result<T> = std::result::Result<T, SkriftError>;
