//! Pre-flight checks before expensive operations.
//!
//! Validates that required tools and configuration are available
//! before starting operations that would otherwise fail midway.

use crate::error::{Result, SkriftError};
use crate::openai::is_api_key_configured;
use std::process::Command;

/// Requirements for different operations.
#[derive(Debug, Clone, Copy)]
pub enum Operation {
    /// Transcription needs yt-dlp, ffmpeg, ffprobe and an API key.
    Transcribe,
    /// Serving needs the same as transcription.
    Serve,
}

/// Run pre-flight checks for the given operation.
///
/// Returns Ok(()) if all checks pass, or an error describing what's missing.
pub fn check(operation: Operation) -> Result<()> {
    match operation {
        Operation::Transcribe | Operation::Serve => {
            check_tool("yt-dlp")?;
            check_tool("ffmpeg")?;
            check_tool("ffprobe")?;
            check_api_key()?;
        }
    }
    Ok(())
}

/// Check if OpenAI API key is configured.
fn check_api_key() -> Result<()> {
    if is_api_key_configured() {
        Ok(())
    } else {
        Err(SkriftError::Config(
            "OPENAI_API_KEY not set; videos without captions cannot be transcribed. \
             Set it with: export OPENAI_API_KEY='sk-...'"
                .to_string(),
        ))
    }
}

/// Check if an external tool is available.
pub fn check_tool(name: &str) -> Result<()> {
    // ffmpeg/ffprobe use -version (single dash), others use --version
    let version_arg = match name {
        "ffmpeg" | "ffprobe" => "-version",
        _ => "--version",
    };
    match Command::new(name).arg(version_arg).output() {
        Ok(output) if output.status.success() => Ok(()),
        Ok(_) => Err(SkriftError::ToolNotFound(format!(
            "{} is installed but not working correctly",
            name
        ))),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            Err(SkriftError::ToolNotFound(name.to_string()))
        }
        Err(e) => Err(SkriftError::ToolNotFound(format!("{}: {}", name, e))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_tool() {
        let err = check_tool("skrift-no-such-tool").unwrap_err();
        assert!(matches!(err, SkriftError::ToolNotFound(name) if name == "skrift-no-such-tool"));
    }
}
