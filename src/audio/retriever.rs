//! Audio download with endpoint rotation.

use super::{DownloadedAudio, MediaBackend, MediaMetadata};
use crate::endpoint::{EndpointDescriptor, EndpointPool};
use crate::error::{Result, SkriftError};
use crate::transcription::{AcquisitionAttempt, AttemptOutcome, Strategy};
use crate::video::VideoReference;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, instrument, warn};

/// Attempts made regardless of pool exhaustion: the first try plus one retry.
const GUARANTEED_ATTEMPTS: u32 = 2;

/// Downloads a video's audio track, rotating endpoints on transient failures.
///
/// A run makes at most `1 + download_retries` attempts, each through the next
/// endpoint the pool hands out. The first retry always happens, whatever the
/// pool saw before the download started; later retries stop once the pool
/// reports that every candidate has failed since the last success.
pub struct MediaRetriever {
    backend: Arc<dyn MediaBackend>,
    pool: Arc<EndpointPool>,
    download_retries: u32,
    max_duration_seconds: u32,
}

impl MediaRetriever {
    pub fn new(
        backend: Arc<dyn MediaBackend>,
        pool: Arc<EndpointPool>,
        download_retries: u32,
        max_duration_seconds: u32,
    ) -> Self {
        Self {
            backend,
            pool,
            download_retries,
            max_duration_seconds,
        }
    }

    /// Materialize the audio of `video` under `dir`.
    ///
    /// Every attempt is appended to `attempts`. Files left by a failed attempt
    /// are removed before the next one starts.
    #[instrument(skip(self, dir, attempts), fields(video_id = %video))]
    pub async fn retrieve(
        &self,
        video: &VideoReference,
        dir: &Path,
        attempts: &mut Vec<AcquisitionAttempt>,
    ) -> Result<DownloadedAudio> {
        let max_attempts = 1 + self.download_retries;
        let mut last_error = None;

        for n in 1..=max_attempts {
            let Some(endpoint) = self.pool.next() else {
                warn!("Every endpoint has been retired");
                break;
            };

            let attempt_dir = dir.join(format!("attempt-{}", n));
            match self.attempt(video, &endpoint, &attempt_dir).await {
                Ok(audio) => {
                    self.pool.report_success(&endpoint);
                    attempts.push(record(&endpoint, "download", AttemptOutcome::Success));
                    return Ok(audio);
                }
                Err((stage, e)) => {
                    let _ = std::fs::remove_dir_all(&attempt_dir);
                    attempts.push(record(&endpoint, stage, AttemptOutcome::Failed(e.to_string())));

                    if !e.is_transient() {
                        return Err(e);
                    }

                    warn!(endpoint = %endpoint, attempt = n, "Media {} failed: {}", stage, e);
                    self.pool.report_failure(&endpoint);
                    last_error = Some(e);

                    if n >= GUARANTEED_ATTEMPTS && self.pool.is_exhausted() {
                        info!("All endpoints failed since the last success, giving up");
                        break;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| {
            SkriftError::EndpointUnavailable("no usable endpoint left".to_string())
        }))
    }

    /// One metadata lookup plus download through `endpoint`. The error carries
    /// the stage that failed.
    async fn attempt(
        &self,
        video: &VideoReference,
        endpoint: &EndpointDescriptor,
        dir: &Path,
    ) -> std::result::Result<DownloadedAudio, (&'static str, SkriftError)> {
        let metadata = self
            .backend
            .metadata(video, endpoint)
            .await
            .map_err(|e| ("metadata", e))?;

        self.check_duration(&metadata).map_err(|e| ("metadata", e))?;

        let path = self
            .backend
            .download_audio(video, endpoint, dir)
            .await
            .map_err(|e| ("download", e))?;

        info!(title = %metadata.title, "Audio downloaded");
        Ok(DownloadedAudio { path, metadata })
    }

    fn check_duration(&self, metadata: &MediaMetadata) -> Result<()> {
        match metadata.duration_seconds {
            Some(d) if d > self.max_duration_seconds => Err(SkriftError::InvalidInput(format!(
                "Video is {}s long, longer than the {}s limit",
                d, self.max_duration_seconds
            ))),
            _ => Ok(()),
        }
    }
}

fn record(endpoint: &EndpointDescriptor, target: &str, outcome: AttemptOutcome) -> AcquisitionAttempt {
    AcquisitionAttempt {
        strategy: Strategy::AudioFallback,
        target: target.to_string(),
        endpoint_used: endpoint.label.clone(),
        outcome,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// Fails for the listed proxies, succeeds elsewhere. Writes a partial file
    /// before failing to mimic an interrupted download.
    struct FlakyBackend {
        failing: Vec<&'static str>,
        duration: u32,
        seen: Mutex<Vec<String>>,
    }

    #[async_trait]
    impl MediaBackend for FlakyBackend {
        async fn metadata(
            &self,
            video: &VideoReference,
            _endpoint: &EndpointDescriptor,
        ) -> Result<MediaMetadata> {
            Ok(MediaMetadata {
                id: video.id().to_string(),
                title: "Test".to_string(),
                duration_seconds: Some(self.duration),
                ..Default::default()
            })
        }

        async fn download_audio(
            &self,
            video: &VideoReference,
            endpoint: &EndpointDescriptor,
            dir: &Path,
        ) -> Result<PathBuf> {
            self.seen.lock().unwrap().push(endpoint.label.clone());
            std::fs::create_dir_all(dir)?;
            let path = dir.join(format!("{}.mp3", video.id()));
            std::fs::write(&path, b"audio")?;

            if self.failing.contains(&endpoint.label.as_str()) {
                return Err(SkriftError::EndpointUnavailable("blocked".into()));
            }
            Ok(path)
        }
    }

    fn backend(failing: Vec<&'static str>) -> Arc<FlakyBackend> {
        Arc::new(FlakyBackend {
            failing,
            duration: 130,
            seen: Mutex::new(Vec::new()),
        })
    }

    fn pool(labels: &[&str]) -> Arc<EndpointPool> {
        let candidates = labels
            .iter()
            .map(|l| EndpointDescriptor {
                label: l.to_string(),
                ..EndpointDescriptor::proxy(&format!("http://{}:8080", l))
            })
            .collect();
        Arc::new(EndpointPool::new(candidates, 3))
    }

    #[tokio::test]
    async fn test_rotates_to_next_endpoint() {
        let backend = backend(vec!["a"]);
        let retriever = MediaRetriever::new(backend.clone(), pool(&["a", "b"]), 1, 14_400);
        let dir = TempDir::new().unwrap();
        let mut attempts = Vec::new();

        let audio = retriever
            .retrieve(&VideoReference::parse("dQw4w9WgXcQ").unwrap(), dir.path(), &mut attempts)
            .await
            .unwrap();

        assert!(audio.path.exists());
        assert_eq!(*backend.seen.lock().unwrap(), vec!["a", "b"]);
        assert_eq!(attempts.len(), 2);
        assert!(matches!(attempts[0].outcome, AttemptOutcome::Failed(_)));
        assert_eq!(attempts[1].outcome, AttemptOutcome::Success);
        assert!(!dir.path().join("attempt-1").exists());
    }

    #[tokio::test]
    async fn test_gives_up_after_retry_budget() {
        let backend = backend(vec!["a", "b", "c"]);
        let retriever = MediaRetriever::new(backend.clone(), pool(&["a", "b", "c"]), 1, 14_400);
        let dir = TempDir::new().unwrap();
        let mut attempts = Vec::new();

        let err = retriever
            .retrieve(&VideoReference::parse("dQw4w9WgXcQ").unwrap(), dir.path(), &mut attempts)
            .await
            .unwrap_err();

        assert!(matches!(err, SkriftError::EndpointUnavailable(_)));
        assert_eq!(backend.seen.lock().unwrap().len(), 2);
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_stops_when_pool_exhausted() {
        let backend = backend(vec!["a"]);
        let retriever = MediaRetriever::new(backend.clone(), pool(&["a"]), 5, 14_400);
        let dir = TempDir::new().unwrap();
        let mut attempts = Vec::new();

        let result = retriever
            .retrieve(&VideoReference::parse("dQw4w9WgXcQ").unwrap(), dir.path(), &mut attempts)
            .await;

        assert!(result.is_err());
        assert_eq!(backend.seen.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_retry_survives_earlier_pool_failures() {
        let backend = backend(vec!["a"]);
        let pool = pool(&["a", "b"]);
        for _ in 0..2 {
            let endpoint = pool.next().unwrap();
            pool.report_failure(&endpoint);
        }
        assert!(pool.is_exhausted());

        let retriever = MediaRetriever::new(backend.clone(), pool, 1, 14_400);
        let dir = TempDir::new().unwrap();
        let mut attempts = Vec::new();

        let audio = retriever
            .retrieve(&VideoReference::parse("dQw4w9WgXcQ").unwrap(), dir.path(), &mut attempts)
            .await
            .unwrap();

        assert!(audio.path.exists());
        assert_eq!(*backend.seen.lock().unwrap(), vec!["a", "b"]);
    }

    #[tokio::test]
    async fn test_too_long_is_permanent() {
        let backend = backend(vec![]);
        let retriever = MediaRetriever::new(backend.clone(), pool(&["a", "b"]), 1, 60);
        let dir = TempDir::new().unwrap();
        let mut attempts = Vec::new();

        let err = retriever
            .retrieve(&VideoReference::parse("dQw4w9WgXcQ").unwrap(), dir.path(), &mut attempts)
            .await
            .unwrap_err();

        assert!(matches!(err, SkriftError::InvalidInput(_)));
        assert!(backend.seen.lock().unwrap().is_empty());
        assert_eq!(attempts[0].target, "metadata");
    }
}
