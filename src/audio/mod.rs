//! Media retrieval and audio processing.
//!
//! Two seams live here: [`MediaBackend`] resolves metadata and materializes an
//! audio file through an egress endpoint, and [`AudioSplitter`] cuts that file
//! into windows for recognition. [`MediaRetriever`] drives the backend with
//! endpoint rotation and a fixed download retry budget.

mod downloader;
mod ffmpeg;
pub(crate) mod process;
mod retriever;

pub use downloader::YtDlpMediaBackend;
pub use ffmpeg::FfmpegSplitter;
pub use retriever::MediaRetriever;

use crate::endpoint::EndpointDescriptor;
use crate::error::Result;
use crate::video::VideoReference;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Metadata about a video as reported by the media backend.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MediaMetadata {
    pub id: String,
    pub title: String,
    pub channel: Option<String>,
    /// Duration in seconds (if known).
    pub duration_seconds: Option<u32>,
    pub upload_date: Option<DateTime<Utc>>,
    pub view_count: Option<u64>,
    pub like_count: Option<u64>,
    pub description: Option<String>,
    pub thumbnail_url: Option<String>,
}

/// An audio file materialized for one run.
#[derive(Debug, Clone)]
pub struct DownloadedAudio {
    pub path: PathBuf,
    pub metadata: MediaMetadata,
}

/// Backend that resolves metadata and downloads audio tracks.
#[async_trait]
pub trait MediaBackend: Send + Sync {
    async fn metadata(
        &self,
        video: &VideoReference,
        endpoint: &EndpointDescriptor,
    ) -> Result<MediaMetadata>;

    /// Download the audio track into `dir` and return the file path.
    async fn download_audio(
        &self,
        video: &VideoReference,
        endpoint: &EndpointDescriptor,
        dir: &Path,
    ) -> Result<PathBuf>;
}

/// Local audio probing and slicing.
#[async_trait]
pub trait AudioSplitter: Send + Sync {
    /// Total duration of the audio at `path`.
    async fn duration(&self, path: &Path) -> Result<Duration>;

    /// Write `[start, start + length)` of `source` to `dest`.
    async fn extract_segment(
        &self,
        source: &Path,
        dest: &Path,
        start: Duration,
        length: Duration,
    ) -> Result<()>;
}
