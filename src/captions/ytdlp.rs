//! Caption provider backed by yt-dlp track listings.

use super::{parse_vtt, CaptionEntry, CaptionProvider};
use crate::audio::process::{classify_ytdlp_failure, run_network_tool, ytdlp_command};
use crate::config::{CaptionSettings, MediaSettings};
use crate::endpoint::EndpointDescriptor;
use crate::error::{Result, SkriftError};
use crate::video::VideoReference;
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

/// How long a track listing is reused for the same video.
const LISTING_TTL: Duration = Duration::from_secs(120);

#[derive(Debug, Clone, Deserialize)]
struct TrackFormat {
    ext: String,
    url: String,
}

/// The caption part of yt-dlp's info JSON.
#[derive(Debug, Clone, Default, Deserialize)]
struct CaptionTracks {
    #[serde(default)]
    subtitles: BTreeMap<String, Vec<TrackFormat>>,
    #[serde(default)]
    automatic_captions: BTreeMap<String, Vec<TrackFormat>>,
}

/// A chosen track: its VTT URL and whether it is auto-generated.
#[derive(Debug, PartialEq, Eq)]
struct SelectedTrack<'a> {
    url: &'a str,
    automatic: bool,
}

impl CaptionTracks {
    fn manual(&self) -> impl Iterator<Item = (&String, &Vec<TrackFormat>)> {
        self.subtitles.iter().filter(|(lang, _)| *lang != "live_chat")
    }

    fn is_empty(&self) -> bool {
        self.manual().next().is_none() && self.automatic_captions.is_empty()
    }

    /// Pick the VTT URL for `language`; an `a.` prefix restricts the search to
    /// automatic tracks, otherwise manual tracks win.
    fn select(&self, video_id: &str, language: &str) -> Result<SelectedTrack<'_>> {
        if self.is_empty() {
            return Err(SkriftError::TranscriptsDisabled(video_id.to_string()));
        }

        let (auto_only, code) = match language.strip_prefix("a.") {
            Some(code) => (true, code),
            None => (false, language),
        };

        let manual = (!auto_only)
            .then(|| self.subtitles.get(code))
            .flatten()
            .filter(|_| code != "live_chat")
            .and_then(|fs| vtt_url(fs))
            .map(|url| SelectedTrack {
                url,
                automatic: false,
            });
        let selected = manual.or_else(|| {
            self.automatic_captions
                .get(code)
                .and_then(|fs| vtt_url(fs))
                .map(|url| SelectedTrack {
                    url,
                    automatic: true,
                })
        });

        selected.ok_or_else(|| SkriftError::NotFound(language.to_string()))
    }

    /// Manual languages first, then original-language automatic tracks
    /// (machine translations are left out).
    fn languages(&self) -> Vec<String> {
        let mut out: Vec<String> = self.manual().map(|(lang, _)| lang.clone()).collect();
        out.extend(
            self.automatic_captions
                .keys()
                .filter(|lang| lang.ends_with("-orig"))
                .map(|lang| format!("a.{}", lang)),
        );
        out
    }
}

fn vtt_url(formats: &[TrackFormat]) -> Option<&str> {
    formats.iter().find(|f| f.ext == "vtt").map(|f| f.url.as_str())
}

/// Lists tracks with `yt-dlp --dump-single-json` and downloads the chosen VTT file.
///
/// A listing is kept per video for a short while, so walking through the
/// language preferences costs one yt-dlp run instead of one per language.
pub struct YtDlpCaptionProvider {
    listing_timeout: Duration,
    socket_timeout: Duration,
    http_timeout: Duration,
    listing_ttl: Duration,
    listings: Mutex<HashMap<String, (Instant, CaptionTracks)>>,
}

impl YtDlpCaptionProvider {
    pub fn new(captions: &CaptionSettings, media: &MediaSettings) -> Self {
        Self {
            listing_timeout: Duration::from_secs(media.metadata_timeout_seconds),
            socket_timeout: Duration::from_secs(media.socket_timeout_seconds),
            http_timeout: captions.timeout(),
            listing_ttl: LISTING_TTL,
            listings: Mutex::new(HashMap::new()),
        }
    }

    fn listings(&self) -> MutexGuard<'_, HashMap<String, (Instant, CaptionTracks)>> {
        self.listings.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn cached_tracks(&self, video_id: &str) -> Option<CaptionTracks> {
        self.listings()
            .get(video_id)
            .filter(|(at, _)| at.elapsed() < self.listing_ttl)
            .map(|(_, tracks)| tracks.clone())
    }

    fn remember(&self, video_id: &str, tracks: &CaptionTracks) {
        let ttl = self.listing_ttl;
        let mut listings = self.listings();
        listings.retain(|_, (at, _)| at.elapsed() < ttl);
        listings.insert(video_id.to_string(), (Instant::now(), tracks.clone()));
    }

    async fn list_tracks(
        &self,
        video: &VideoReference,
        endpoint: &EndpointDescriptor,
    ) -> Result<CaptionTracks> {
        if let Some(tracks) = self.cached_tracks(video.id()) {
            debug!("Reusing caption track listing");
            return Ok(tracks);
        }

        let tracks = self.fetch_listing(video, endpoint).await?;
        self.remember(video.id(), &tracks);
        Ok(tracks)
    }

    async fn fetch_listing(
        &self,
        video: &VideoReference,
        endpoint: &EndpointDescriptor,
    ) -> Result<CaptionTracks> {
        let mut cmd = ytdlp_command(endpoint, self.socket_timeout);
        cmd.arg("--dump-single-json").arg("--skip-download").arg(video.url());

        let output = run_network_tool(cmd, "yt-dlp", self.listing_timeout).await?;
        if !output.status.success() {
            return Err(classify_ytdlp_failure(&String::from_utf8_lossy(&output.stderr)));
        }

        serde_json::from_slice(&output.stdout)
            .map_err(|e| SkriftError::Backend(format!("Failed to parse yt-dlp output: {}", e)))
    }

    fn http_client(&self, endpoint: &EndpointDescriptor) -> Result<reqwest::Client> {
        let mut builder = reqwest::Client::builder().timeout(self.http_timeout);

        if let Some(proxy) = &endpoint.proxy {
            let proxy = reqwest::Proxy::all(proxy)
                .map_err(|e| SkriftError::Config(format!("Invalid proxy '{}': {}", proxy, e)))?;
            builder = builder.proxy(proxy);
        }
        if let Some(user_agent) = &endpoint.user_agent {
            builder = builder.user_agent(user_agent);
        }

        builder
            .build()
            .map_err(|e| SkriftError::Config(format!("Failed to create HTTP client: {}", e)))
    }

    async fn download_track(&self, url: &str, endpoint: &EndpointDescriptor) -> Result<String> {
        let response = self
            .http_client(endpoint)?
            .get(url)
            .send()
            .await
            .map_err(|e| SkriftError::EndpointUnavailable(format!("Caption request failed: {}", e)))?;

        let status = response.status();
        if status.as_u16() == 429 || status.as_u16() == 403 {
            return Err(SkriftError::EndpointUnavailable(format!(
                "Caption request rejected with {}",
                status
            )));
        }
        if !status.is_success() {
            return Err(SkriftError::Backend(format!("Caption request returned {}", status)));
        }

        response
            .text()
            .await
            .map_err(|e| SkriftError::EndpointUnavailable(format!("Caption body read failed: {}", e)))
    }
}

#[async_trait]
impl CaptionProvider for YtDlpCaptionProvider {
    #[instrument(skip(self, endpoint), fields(video_id = %video))]
    async fn fetch(
        &self,
        video: &VideoReference,
        language: &str,
        endpoint: &EndpointDescriptor,
    ) -> Result<Vec<CaptionEntry>> {
        let tracks = self.list_tracks(video, endpoint).await?;
        let track = tracks.select(video.id(), language)?;

        debug!(automatic = track.automatic, "Downloading {} caption track", language);
        let body = self.download_track(track.url, endpoint).await?;
        Ok(parse_vtt(&body, track.automatic))
    }

    async fn available_languages(
        &self,
        video: &VideoReference,
        endpoint: &EndpointDescriptor,
    ) -> Result<Vec<String>> {
        Ok(self.list_tracks(video, endpoint).await?.languages())
    }
}
