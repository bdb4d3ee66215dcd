//! Platform caption retrieval.
//!
//! The [`DirectTranscriptFetcher`] asks a [`CaptionProvider`] for one language
//! at a time. A missing or disabled track is a permanent answer for that
//! language, so nothing here retries.

mod vtt;
mod ytdlp;

pub use vtt::parse_vtt;
pub use ytdlp::YtDlpCaptionProvider;

use crate::endpoint::EndpointDescriptor;
use crate::error::{Result, SkriftError};
use crate::transcription::{SegmentSource, TranscriptSegment};
use crate::video::VideoReference;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, instrument};

/// One caption cue as delivered by the provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptionEntry {
    pub offset_seconds: f64,
    pub duration_seconds: f64,
    pub text: String,
}

impl From<CaptionEntry> for TranscriptSegment {
    fn from(entry: CaptionEntry) -> Self {
        TranscriptSegment::new(
            entry.offset_seconds,
            entry.offset_seconds + entry.duration_seconds,
            entry.text,
            SegmentSource::Caption,
        )
    }
}

/// Source of pre-existing caption tracks.
#[async_trait]
pub trait CaptionProvider: Send + Sync {
    /// Fetch the track for `language`.
    ///
    /// Fails with [`SkriftError::NotFound`] when that language has no track and
    /// [`SkriftError::TranscriptsDisabled`] when the video has none at all.
    async fn fetch(
        &self,
        video: &VideoReference,
        language: &str,
        endpoint: &EndpointDescriptor,
    ) -> Result<Vec<CaptionEntry>>;

    /// Languages with a track, most preferable first.
    async fn available_languages(
        &self,
        _video: &VideoReference,
        _endpoint: &EndpointDescriptor,
    ) -> Result<Vec<String>> {
        Ok(Vec::new())
    }
}

/// Retrieves a platform-supplied transcript for a single language.
pub struct DirectTranscriptFetcher {
    provider: Arc<dyn CaptionProvider>,
}

impl DirectTranscriptFetcher {
    pub fn new(provider: Arc<dyn CaptionProvider>) -> Self {
        Self { provider }
    }

    /// Fetch and normalize the track for `language`.
    ///
    /// Blank cues are dropped and the rest ordered by offset; a track with no
    /// remaining text counts as [`SkriftError::NotFound`].
    #[instrument(skip(self, endpoint), fields(video_id = %video, endpoint = %endpoint))]
    pub async fn fetch(
        &self,
        video: &VideoReference,
        language: &str,
        endpoint: &EndpointDescriptor,
    ) -> Result<Vec<CaptionEntry>> {
        let mut entries: Vec<CaptionEntry> = self
            .provider
            .fetch(video, language, endpoint)
            .await?
            .into_iter()
            .filter_map(|mut e| {
                e.text = e.text.trim().to_string();
                (!e.text.is_empty()).then_some(e)
            })
            .collect();

        if entries.is_empty() {
            return Err(SkriftError::NotFound(language.to_string()));
        }

        entries.sort_by(|a, b| a.offset_seconds.total_cmp(&b.offset_seconds));
        debug!("Fetched {} caption entries", entries.len());
        Ok(entries)
    }

    /// Languages the provider has tracks for.
    pub async fn available_languages(
        &self,
        video: &VideoReference,
        endpoint: &EndpointDescriptor,
    ) -> Result<Vec<String>> {
        self.provider.available_languages(video, endpoint).await
    }
}
