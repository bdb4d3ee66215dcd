//! External tool invocation (yt-dlp, ffmpeg, ffprobe) with hard deadlines.

use crate::endpoint::EndpointDescriptor;
use crate::error::{Result, SkriftError};
use std::process::{Output, Stdio};
use std::time::Duration;
use tokio::process::Command;
use tracing::debug;

async fn run_with_deadline(
    mut cmd: Command,
    limit: Duration,
) -> std::result::Result<std::io::Result<Output>, tokio::time::error::Elapsed> {
    cmd.kill_on_drop(true)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped());

    tokio::time::timeout(limit, cmd.output()).await
}

fn spawn_error(tool: &str, e: std::io::Error) -> SkriftError {
    if e.kind() == std::io::ErrorKind::NotFound {
        SkriftError::ToolNotFound(tool.to_string())
    } else {
        SkriftError::ToolFailed(format!("{tool} execution failed: {e}"))
    }
}

/// Run a tool that talks to the network. Running out of time counts as an
/// endpoint failure.
pub(crate) async fn run_network_tool(cmd: Command, tool: &str, limit: Duration) -> Result<Output> {
    match run_with_deadline(cmd, limit).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(spawn_error(tool, e)),
        Err(_) => Err(SkriftError::EndpointUnavailable(format!(
            "{tool} timed out after {}s",
            limit.as_secs()
        ))),
    }
}

/// Run a purely local tool.
pub(crate) async fn run_local_tool(cmd: Command, tool: &str, limit: Duration) -> Result<Output> {
    match run_with_deadline(cmd, limit).await {
        Ok(Ok(output)) => Ok(output),
        Ok(Err(e)) => Err(spawn_error(tool, e)),
        Err(_) => Err(SkriftError::ToolFailed(format!(
            "{tool} timed out after {}s",
            limit.as_secs()
        ))),
    }
}

/// Base yt-dlp invocation routed through `endpoint`.
pub(crate) fn ytdlp_command(endpoint: &EndpointDescriptor, socket_timeout: Duration) -> Command {
    let mut cmd = Command::new("yt-dlp");
    cmd.arg("--no-warnings")
        .arg("--no-playlist")
        .arg("--socket-timeout")
        .arg(socket_timeout.as_secs().max(1).to_string());

    if let Some(proxy) = &endpoint.proxy {
        cmd.arg("--proxy").arg(proxy);
    }
    if let Some(cookies) = &endpoint.cookies_file {
        cmd.arg("--cookies").arg(cookies);
    }
    if let Some(user_agent) = &endpoint.user_agent {
        cmd.arg("--user-agent").arg(user_agent);
    }

    debug!(endpoint = %endpoint, "Prepared yt-dlp command");
    cmd
}

/// Map a failed yt-dlp run to an error kind.
///
/// Unavailable or private videos are permanent; everything else (blocks, rate
/// limits, dead proxies) may clear on another endpoint.
pub(crate) fn classify_ytdlp_failure(stderr: &str) -> SkriftError {
    const PERMANENT: [&str; 5] = [
        "Video unavailable",
        "Private video",
        "has been removed",
        "account associated with this video has been terminated",
        "Unsupported URL",
    ];

    let message = stderr
        .lines()
        .rev()
        .find(|l| !l.trim().is_empty())
        .unwrap_or("yt-dlp failed")
        .trim()
        .to_string();

    if PERMANENT.iter().any(|p| stderr.contains(p)) {
        SkriftError::InvalidInput(message)
    } else {
        SkriftError::EndpointUnavailable(message)
    }
}
