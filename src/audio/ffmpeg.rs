//! Audio duration probing and segment extraction with ffmpeg.

use super::process::run_local_tool;
use super::AudioSplitter;
use crate::error::{Result, SkriftError};
use async_trait::async_trait;
use std::path::Path;
use std::time::Duration;
use tokio::process::Command;
use tracing::warn;

/// Probes with `ffprobe` and slices with `ffmpeg`.
pub struct FfmpegSplitter {
    timeout: Duration,
}

impl FfmpegSplitter {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    fn segment_command(source: &Path, start: Duration, length: Duration) -> Command {
        let mut cmd = Command::new("ffmpeg");
        cmd.arg("-ss")
            .arg(format!("{:.3}", start.as_secs_f64()))
            .arg("-i")
            .arg(source)
            .arg("-t")
            .arg(format!("{:.3}", length.as_secs_f64()))
            .arg("-vn");
        cmd
    }
}

impl Default for FfmpegSplitter {
    fn default() -> Self {
        Self::new(Duration::from_secs(300))
    }
}

#[async_trait]
impl AudioSplitter for FfmpegSplitter {
    async fn duration(&self, path: &Path) -> Result<Duration> {
        let mut cmd = Command::new("ffprobe");
        cmd.arg("-v")
            .arg("quiet")
            .arg("-print_format")
            .arg("json")
            .arg("-show_format")
            .arg(path);

        let output = run_local_tool(cmd, "ffprobe", self.timeout).await?;
        if !output.status.success() {
            return Err(SkriftError::ToolFailed("ffprobe returned error".into()));
        }

        parse_probe_duration(&output.stdout)
    }

    async fn extract_segment(
        &self,
        source: &Path,
        dest: &Path,
        start: Duration,
        length: Duration,
    ) -> Result<()> {
        // Stream copy first: fast and lossless
        let mut copy = Self::segment_command(source, start, length);
        copy.arg("-c").arg("copy").arg("-y").arg("-loglevel").arg("warning").arg(dest);

        if let Ok(out) = run_local_tool(copy, "ffmpeg", self.timeout).await {
            if out.status.success() && dest.exists() {
                return Ok(());
            }
        }

        warn!("Stream copy failed, re-encoding segment");

        let mut encode = Self::segment_command(source, start, length);
        encode
            .arg("-codec:a")
            .arg("libmp3lame")
            .arg("-qscale:a")
            .arg("2")
            .arg("-y")
            .arg("-loglevel")
            .arg("error")
            .arg(dest);

        let out = run_local_tool(encode, "ffmpeg", self.timeout).await?;
        if !out.status.success() {
            let err = String::from_utf8_lossy(&out.stderr);
            return Err(SkriftError::ToolFailed(format!("Segment extraction failed: {err}")));
        }
        Ok(())
    }
}

/// Read `format.duration` from ffprobe's JSON output.
fn parse_probe_duration(stdout: &[u8]) -> Result<Duration> {
    let parsed: serde_json::Value = serde_json::from_slice(stdout)
        .map_err(|_| SkriftError::ToolFailed("Invalid ffprobe output".into()))?;

    parsed["format"]["duration"]
        .as_str()
        .and_then(|s| s.parse::<f64>().ok())
        .filter(|d| d.is_finite() && *d >= 0.0)
        .map(Duration::from_secs_f64)
        .ok_or_else(|| SkriftError::ToolFailed("Could not determine audio duration".into()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_probe_duration() {
        let json = br#"{"format": {"filename": "a.mp3", "duration": "130.250000"}}"#;
        assert_eq!(parse_probe_duration(json).unwrap(), Duration::from_millis(130_250));
    }

    #[test]
    fn test_parse_probe_duration_missing() {
        assert!(parse_probe_duration(br#"{"format": {}}"#).is_err());
        assert!(parse_probe_duration(b"not json").is_err());
    }

    #[test]
    fn test_segment_command_args() {
        let cmd = FfmpegSplitter::segment_command(
            Path::new("in.mp3"),
            Duration::from_secs(60),
            Duration::from_millis(10_500),
        );
        let args: Vec<String> = cmd
            .as_std()
            .get_args()
            .map(|a| a.to_string_lossy().into_owned())
            .collect();
        assert_eq!(args, vec!["-ss", "60.000", "-i", "in.mp3", "-t", "10.500", "-vn"]);
    }
}
