//! yt-dlp backed media retrieval.
//!
//! Metadata comes from `--dump-json`; audio is extracted with
//! `--extract-audio` and, when yt-dlp leaves a different container behind,
//! normalized with ffmpeg.

use super::process::{classify_ytdlp_failure, run_local_tool, run_network_tool, ytdlp_command};
use super::{MediaBackend, MediaMetadata};
use crate::config::MediaSettings;
use crate::endpoint::EndpointDescriptor;
use crate::error::{Result, SkriftError};
use crate::video::VideoReference;
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::Deserialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tokio::process::Command;
use tracing::{debug, info, instrument};

/// Fields read from yt-dlp's info JSON.
#[derive(Debug, Deserialize)]
struct InfoJson {
    id: Option<String>,
    title: Option<String>,
    channel: Option<String>,
    uploader: Option<String>,
    duration: Option<f64>,
    upload_date: Option<String>,
    view_count: Option<u64>,
    like_count: Option<u64>,
    description: Option<String>,
    thumbnail: Option<String>,
}

impl InfoJson {
    fn into_metadata(self, video: &VideoReference) -> MediaMetadata {
        // yt-dlp returns the date as YYYYMMDD
        let upload_date = self
            .upload_date
            .as_deref()
            .and_then(|d| NaiveDate::parse_from_str(d, "%Y%m%d").ok())
            .and_then(|d| d.and_hms_opt(0, 0, 0))
            .map(|dt| dt.and_utc());

        MediaMetadata {
            id: self.id.unwrap_or_else(|| video.id().to_string()),
            title: self.title.unwrap_or_else(|| "Unknown Title".to_string()),
            channel: self.channel.or(self.uploader),
            duration_seconds: self.duration.map(|d| d.round() as u32),
            upload_date,
            view_count: self.view_count,
            like_count: self.like_count,
            description: self.description,
            thumbnail_url: self.thumbnail,
        }
    }
}

/// Media backend driving the `yt-dlp` and `ffmpeg` binaries.
pub struct YtDlpMediaBackend {
    audio_format: String,
    audio_quality: String,
    socket_timeout: Duration,
    metadata_timeout: Duration,
    download_timeout: Duration,
}

impl YtDlpMediaBackend {
    pub fn new(settings: &MediaSettings) -> Self {
        Self {
            audio_format: settings.audio_format.clone(),
            audio_quality: settings.audio_quality.clone(),
            socket_timeout: Duration::from_secs(settings.socket_timeout_seconds),
            metadata_timeout: Duration::from_secs(settings.metadata_timeout_seconds),
            download_timeout: Duration::from_secs(settings.download_timeout_seconds),
        }
    }

    /// Convert a downloaded file to the configured format.
    async fn normalize(&self, source: &Path, dest: &Path) -> Result<()> {
        debug!("Converting {:?} to {}", source, self.audio_format);

        let mut cmd = Command::new("ffmpeg");
        cmd.arg("-i")
            .arg(source)
            .arg("-vn")
            .arg("-y")
            .arg("-loglevel")
            .arg("error")
            .arg(dest);

        let output = run_local_tool(cmd, "ffmpeg", self.download_timeout).await?;
        if !output.status.success() {
            let err = String::from_utf8_lossy(&output.stderr);
            return Err(SkriftError::ToolFailed(format!("ffmpeg conversion failed: {err}")));
        }
        Ok(())
    }
}

#[async_trait]
impl MediaBackend for YtDlpMediaBackend {
    #[instrument(skip(self, endpoint), fields(video_id = %video, endpoint = %endpoint))]
    async fn metadata(
        &self,
        video: &VideoReference,
        endpoint: &EndpointDescriptor,
    ) -> Result<MediaMetadata> {
        let mut cmd = ytdlp_command(endpoint, self.socket_timeout);
        cmd.arg("--dump-json").arg("--no-download").arg(video.url());

        let output = run_network_tool(cmd, "yt-dlp", self.metadata_timeout).await?;
        if !output.status.success() {
            return Err(classify_ytdlp_failure(&String::from_utf8_lossy(&output.stderr)));
        }

        let info: InfoJson = serde_json::from_slice(&output.stdout)
            .map_err(|e| SkriftError::Backend(format!("Failed to parse yt-dlp output: {}", e)))?;
        Ok(info.into_metadata(video))
    }

    #[instrument(skip(self, endpoint, dir), fields(video_id = %video, endpoint = %endpoint))]
    async fn download_audio(
        &self,
        video: &VideoReference,
        endpoint: &EndpointDescriptor,
        dir: &Path,
    ) -> Result<PathBuf> {
        std::fs::create_dir_all(dir)?;

        let target = dir.join(format!("{}.{}", video.id(), self.audio_format));
        let template = dir.join(format!("{}.%(ext)s", video.id()));

        info!("Downloading audio");

        let mut cmd = ytdlp_command(endpoint, self.socket_timeout);
        cmd.arg("--extract-audio")
            .arg("--audio-format")
            .arg(&self.audio_format)
            .arg("--audio-quality")
            .arg(&self.audio_quality)
            .arg("--output")
            .arg(&template)
            .arg("--quiet")
            .arg(video.url());

        let output = run_network_tool(cmd, "yt-dlp", self.download_timeout).await?;
        if !output.status.success() {
            return Err(classify_ytdlp_failure(&String::from_utf8_lossy(&output.stderr)));
        }

        let downloaded = find_audio_file(dir, video.id())?;
        if downloaded != target {
            self.normalize(&downloaded, &target).await?;
            let _ = std::fs::remove_file(&downloaded);
        }

        Ok(target)
    }
}

/// Locate a downloaded audio file by video ID.
fn find_audio_file(dir: &Path, video_id: &str) -> Result<PathBuf> {
    for ext in ["mp3", "opus", "m4a", "webm", "ogg", "wav"] {
        let candidate = dir.join(format!("{}.{}", video_id, ext));
        if candidate.exists() {
            return Ok(candidate);
        }
    }

    // yt-dlp occasionally picks an unexpected extension
    for entry in std::fs::read_dir(dir)?.flatten() {
        let name = entry.file_name();
        let name = name.to_string_lossy();
        if name.starts_with(video_id) && !name.ends_with(".part") {
            return Ok(entry.path());
        }
    }

    Err(SkriftError::Backend("Audio file not found after download".into()))
}
