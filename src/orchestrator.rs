//! Pipeline orchestrator for Skrift.
//!
//! Runs one acquisition as an explicit state machine:
//!
//! ```text
//! Start -> DirectAttempt -> Done                                (captions found)
//!                        -> AudioFallback -> MediaDownload -> ChunkRecognize
//!                           -> Assemble -> [Refine] -> Done
//! ```
//!
//! `Failed` is entered from `DirectAttempt`, `MediaDownload` or
//! `ChunkRecognize` only when that stage produced nothing usable. Every
//! temporary file lives under a per-run scratch directory that is removed
//! when the run returns, whatever the outcome.

use crate::audio::{
    AudioSplitter, DownloadedAudio, FfmpegSplitter, MediaBackend, MediaMetadata, MediaRetriever,
    YtDlpMediaBackend,
};
use crate::captions::{CaptionEntry, CaptionProvider, DirectTranscriptFetcher, YtDlpCaptionProvider};
use crate::config::{Prompts, Settings};
use crate::endpoint::EndpointPool;
use crate::error::{Result, SkriftError};
use crate::transcription::{
    assemble, assemble_captions, refine_or_raw, AcquisitionAttempt, AssemblyStats,
    AttemptOutcome, ChunkResult, ChunkedRecognizer, ExtractionMethod, OpenAiRefiner, Refiner,
    SpeechBackend, Strategy, Transcript, WhisperSpeechBackend,
};
use crate::video::VideoReference;
use futures::StreamExt;
use serde::Serialize;
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::Arc;
use tempfile::TempDir;
use tracing::{debug, info, info_span, instrument, warn, Instrument};
use uuid::Uuid;

/// Pipeline states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Start,
    DirectAttempt,
    AudioFallback,
    MediaDownload,
    ChunkRecognize,
    Assemble,
    Refine,
    Done,
    Failed,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            Stage::Start => "Starting",
            Stage::DirectAttempt => "Looking for captions",
            Stage::AudioFallback => "No captions, falling back to audio",
            Stage::MediaDownload => "Downloading audio",
            Stage::ChunkRecognize => "Recognizing speech",
            Stage::Assemble => "Assembling transcript",
            Stage::Refine => "Refining transcript",
            Stage::Done => "Done",
            Stage::Failed => "Failed",
        };
        f.write_str(label)
    }
}

/// Progress events emitted while a run advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Progress {
    Stage(Stage),
    /// Chunk `index` (zero-based) of `total` finished.
    Chunk { index: usize, total: usize },
}

/// Per-call options.
#[derive(Debug, Clone, Copy)]
pub struct AcquireOptions {
    /// Run the refiner over speech-recognized text.
    pub refine: bool,
    /// Look up video metadata even when captions make the download unnecessary.
    pub with_metadata: bool,
}

impl Default for AcquireOptions {
    fn default() -> Self {
        Self {
            refine: true,
            with_metadata: false,
        }
    }
}

/// The outcome of a successful run.
#[derive(Debug, Clone)]
pub struct Acquisition {
    pub run_id: Uuid,
    pub video: VideoReference,
    pub metadata: Option<MediaMetadata>,
    pub method: ExtractionMethod,
    /// Caption language used, for the caption path.
    pub language: Option<String>,
    pub transcript: Transcript,
    /// `[MM:SS] text` lines built from the transcript segments.
    pub raw_text: String,
    pub refined_text: Option<String>,
    /// Chunk counts, for the audio path.
    pub stats: Option<AssemblyStats>,
    pub attempts: Vec<AcquisitionAttempt>,
}

impl Acquisition {
    /// The best available text: refined if refinement succeeded, else raw.
    pub fn text(&self) -> &str {
        self.refined_text.as_deref().unwrap_or(&self.raw_text)
    }
}

/// Injectable collaborators of the pipeline.
pub struct Backends {
    pub captions: Arc<dyn CaptionProvider>,
    pub media: Arc<dyn MediaBackend>,
    pub speech: Arc<dyn SpeechBackend>,
    pub splitter: Arc<dyn AudioSplitter>,
    pub refiner: Option<Arc<dyn Refiner>>,
}

/// Mutable state of one run.
struct Run {
    video: VideoReference,
    languages: Vec<String>,
    options: AcquireOptions,
    attempts: Vec<AcquisitionAttempt>,
    metadata: Option<MediaMetadata>,
    caption_language: Option<String>,
    work_dir: Option<TempDir>,
    audio: Option<DownloadedAudio>,
    chunk_results: Vec<ChunkResult>,
    transcript: Option<Transcript>,
    stats: Option<AssemblyStats>,
    refined_text: Option<String>,
    failure: Option<SkriftError>,
}

/// Outcome of the caption phase.
enum DirectOutcome {
    Found(String, Vec<CaptionEntry>),
    Missing,
}

/// The main orchestrator for the Skrift pipeline.
pub struct Orchestrator {
    settings: Settings,
    pool: Arc<EndpointPool>,
    captions: DirectTranscriptFetcher,
    media: Arc<dyn MediaBackend>,
    retriever: MediaRetriever,
    recognizer: ChunkedRecognizer,
    refiner: Option<Arc<dyn Refiner>>,
    temp_dir: PathBuf,
}

impl Orchestrator {
    /// Create an orchestrator with the yt-dlp, ffmpeg and OpenAI backends.
    ///
    /// `pool` is shared by every run of this orchestrator; build it once per
    /// process.
    pub fn new(settings: Settings, pool: Arc<EndpointPool>) -> Result<Self> {
        let prompts = Prompts::load(settings.prompts.custom_dir.as_deref())?;

        let refiner = OpenAiRefiner::from_settings(&settings.refine, prompts.refine)?
            .map(|r| Arc::new(r) as Arc<dyn Refiner>);
        if refiner.is_none() {
            info!("Transcript refinement disabled");
        }

        let backends = Backends {
            captions: Arc::new(YtDlpCaptionProvider::new(&settings.captions, &settings.media)),
            media: Arc::new(YtDlpMediaBackend::new(&settings.media)),
            speech: Arc::new(WhisperSpeechBackend::new(&settings.recognition)?),
            splitter: Arc::new(FfmpegSplitter::default()),
            refiner,
        };

        Self::with_components(settings, pool, backends)
    }

    /// Create an orchestrator with custom components.
    pub fn with_components(
        settings: Settings,
        pool: Arc<EndpointPool>,
        backends: Backends,
    ) -> Result<Self> {
        let temp_dir = settings.temp_dir();
        std::fs::create_dir_all(&temp_dir)?;

        let retriever = MediaRetriever::new(
            backends.media.clone(),
            pool.clone(),
            settings.media.download_retries,
            settings.media.max_duration_seconds,
        );
        let recognizer = ChunkedRecognizer::new(
            backends.speech,
            backends.splitter,
            settings.recognition.language.clone(),
            settings.recognition.retry_budget,
            settings.recognition.retry_delay(),
        );

        Ok(Self {
            captions: DirectTranscriptFetcher::new(backends.captions),
            media: backends.media,
            retriever,
            recognizer,
            refiner: backends.refiner,
            settings,
            pool,
            temp_dir,
        })
    }

    /// Get the settings.
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// The shared endpoint pool.
    pub fn pool(&self) -> &Arc<EndpointPool> {
        &self.pool
    }

    /// Acquire a transcript for `video`.
    ///
    /// `languages` are tried in order; an empty slice means the configured
    /// preferences. Fails only with [`SkriftError::TotalAcquisitionFailure`].
    pub async fn acquire(
        &self,
        video: &VideoReference,
        languages: &[String],
        options: AcquireOptions,
    ) -> Result<Acquisition> {
        self.acquire_with_progress(video, languages, options, &|_| {})
            .await
    }

    /// [`Orchestrator::acquire`], reporting progress to `progress`.
    pub async fn acquire_with_progress(
        &self,
        video: &VideoReference,
        languages: &[String],
        options: AcquireOptions,
        progress: &(dyn Fn(Progress) + Send + Sync),
    ) -> Result<Acquisition> {
        let run_id = Uuid::new_v4();
        let span = info_span!("acquire", run_id = %run_id, video_id = %video);

        let languages = if languages.is_empty() {
            self.settings.captions.language_preferences.clone()
        } else {
            languages.to_vec()
        };

        let run = Run {
            video: video.clone(),
            languages,
            options,
            attempts: Vec::new(),
            metadata: None,
            caption_language: None,
            work_dir: None,
            audio: None,
            chunk_results: Vec::new(),
            transcript: None,
            stats: None,
            refined_text: None,
            failure: None,
        };

        self.drive(run_id, run, progress).instrument(span).await
    }

    async fn drive(
        &self,
        run_id: Uuid,
        mut run: Run,
        progress: &(dyn Fn(Progress) + Send + Sync),
    ) -> Result<Acquisition> {
        let mut stage = Stage::Start;

        loop {
            debug!(?stage, "Entering stage");
            progress(Progress::Stage(stage));

            stage = match stage {
                Stage::Start => Stage::DirectAttempt,

                Stage::DirectAttempt => match self.direct_attempt(&mut run).await {
                    Ok(DirectOutcome::Found(language, entries)) => {
                        run.transcript = Some(assemble_captions(run.video.id(), entries));
                        run.caption_language = Some(language);
                        if run.options.with_metadata {
                            run.metadata = self.lookup_metadata(&run.video).await;
                        }
                        Stage::Done
                    }
                    Ok(DirectOutcome::Missing) => Stage::AudioFallback,
                    Err(e) => {
                        run.failure = Some(e);
                        Stage::Failed
                    }
                },

                Stage::AudioFallback => match self.scratch_dir(&run.video) {
                    Ok(dir) => {
                        run.work_dir = Some(dir);
                        Stage::MediaDownload
                    }
                    Err(e) => {
                        run.failure = Some(e);
                        Stage::Failed
                    }
                },

                Stage::MediaDownload => {
                    let dir = run.work_dir.as_ref().map(|d| d.path().to_path_buf());
                    let result = match dir {
                        Some(dir) => self.retriever.retrieve(&run.video, &dir, &mut run.attempts).await,
                        None => Err(SkriftError::Config("scratch directory missing".into())),
                    };
                    match result {
                        Ok(audio) => {
                            run.metadata = Some(audio.metadata.clone());
                            run.audio = Some(audio);
                            Stage::ChunkRecognize
                        }
                        Err(e) => {
                            run.failure = Some(e);
                            Stage::Failed
                        }
                    }
                }

                Stage::ChunkRecognize => match self.recognize(&run, progress).await {
                    Ok(results) if results.iter().any(ChunkResult::is_success) => {
                        run.chunk_results = results;
                        Stage::Assemble
                    }
                    Ok(results) => {
                        run.failure = Some(SkriftError::Backend(format!(
                            "none of {} chunks could be recognized",
                            results.len()
                        )));
                        Stage::Failed
                    }
                    Err(e) => {
                        run.failure = Some(e);
                        Stage::Failed
                    }
                },

                Stage::Assemble => {
                    let (transcript, stats) =
                        assemble(run.video.id(), std::mem::take(&mut run.chunk_results));
                    info!(
                        recognized = stats.recognized,
                        unrecognized = stats.unrecognized,
                        backend_errors = stats.backend_errors,
                        "Assembled {} segments",
                        transcript.segments.len()
                    );
                    run.transcript = Some(transcript);
                    run.stats = Some(stats);

                    if run.options.refine && self.refiner.is_some() {
                        Stage::Refine
                    } else {
                        Stage::Done
                    }
                }

                Stage::Refine => {
                    if let (Some(refiner), Some(transcript)) = (&self.refiner, &run.transcript) {
                        let raw = transcript.timestamped_text();
                        let (text, refined) = refine_or_raw(refiner.as_ref(), &raw).await;
                        if refined {
                            run.refined_text = Some(text);
                        }
                    }
                    Stage::Done
                }

                Stage::Done => return self.finish(run_id, run),

                Stage::Failed => {
                    let reason = run
                        .failure
                        .take()
                        .map(|e| e.to_string())
                        .unwrap_or_else(|| "no strategy produced a transcript".to_string());
                    warn!("Acquisition failed: {}", reason);
                    return Err(SkriftError::TotalAcquisitionFailure {
                        video_id: run.video.id().to_string(),
                        reason,
                        attempts: run.attempts,
                    });
                }
            };
        }
    }

    fn finish(&self, run_id: Uuid, run: Run) -> Result<Acquisition> {
        let transcript = run.transcript.ok_or_else(|| SkriftError::TotalAcquisitionFailure {
            video_id: run.video.id().to_string(),
            reason: "no transcript assembled".to_string(),
            attempts: run.attempts.clone(),
        })?;

        let method = match (&run.caption_language, &run.refined_text) {
            (Some(_), _) => ExtractionMethod::YoutubeTranscript,
            (None, Some(_)) => ExtractionMethod::SpeechToTextWithAiCleanup,
            (None, None) => ExtractionMethod::SpeechToText,
        };

        info!(%method, segments = transcript.segments.len(), "Transcript acquired");

        Ok(Acquisition {
            run_id,
            raw_text: transcript.timestamped_text(),
            video: run.video,
            metadata: run.metadata,
            method,
            language: run.caption_language,
            transcript,
            refined_text: run.refined_text,
            stats: run.stats,
            attempts: run.attempts,
        })
    }

    /// Try each language once, then any other available track.
    ///
    /// The phase ends early once every endpoint has failed since the last
    /// success, leaving the pool to the audio fallback.
    #[instrument(skip_all)]
    async fn direct_attempt(&self, run: &mut Run) -> Result<DirectOutcome> {
        let mut tried = HashSet::new();

        for language in run.languages.clone() {
            tried.insert(language.clone());
            match self.try_language(run, &language).await {
                Ok(Some(entries)) => return Ok(DirectOutcome::Found(language, entries)),
                Ok(None) if self.pool.is_exhausted() => return Ok(self.endpoints_exhausted()),
                Ok(None) => {}
                Err(SkriftError::TranscriptsDisabled(_)) => return Ok(DirectOutcome::Missing),
                Err(e) => return Err(e),
            }
        }

        if !self.settings.captions.fallback_to_any_language {
            return Ok(DirectOutcome::Missing);
        }

        let Some(endpoint) = self.pool.next() else {
            return Ok(DirectOutcome::Missing);
        };
        let available = match self.captions.available_languages(&run.video, &endpoint).await {
            Ok(languages) => languages,
            Err(e) => {
                debug!("Could not list caption languages: {}", e);
                run.attempts.push(AcquisitionAttempt {
                    strategy: Strategy::Direct,
                    target: "languages".to_string(),
                    endpoint_used: endpoint.label.clone(),
                    outcome: AttemptOutcome::Failed(e.to_string()),
                });
                if e.is_endpoint_failure() {
                    self.pool.report_failure(&endpoint);
                }
                Vec::new()
            }
        };

        for language in available.into_iter().filter(|l| !tried.contains(l)) {
            match self.try_language(run, &language).await {
                Ok(Some(entries)) => return Ok(DirectOutcome::Found(language, entries)),
                Ok(None) if self.pool.is_exhausted() => return Ok(self.endpoints_exhausted()),
                Ok(None) => {}
                Err(SkriftError::TranscriptsDisabled(_)) => return Ok(DirectOutcome::Missing),
                Err(e) => return Err(e),
            }
        }

        Ok(DirectOutcome::Missing)
    }

    fn endpoints_exhausted(&self) -> DirectOutcome {
        info!("Every endpoint failed during the caption phase, moving to audio");
        DirectOutcome::Missing
    }

    /// One caption request for `language`.
    ///
    /// `Ok(None)` means this language gave nothing and the next may be tried.
    /// Disabled transcripts and permanently unavailable videos are errors.
    /// A definite "no track" answer means the endpoint works.
    async fn try_language(&self, run: &mut Run, language: &str) -> Result<Option<Vec<CaptionEntry>>> {
        let Some(endpoint) = self.pool.next() else {
            return Ok(None);
        };

        let result = self.captions.fetch(&run.video, language, &endpoint).await;
        let outcome = match &result {
            Ok(_) => AttemptOutcome::Success,
            Err(SkriftError::NotFound(_)) => AttemptOutcome::NotFound,
            Err(SkriftError::TranscriptsDisabled(_)) => AttemptOutcome::Disabled,
            Err(e) => AttemptOutcome::Failed(e.to_string()),
        };
        run.attempts.push(AcquisitionAttempt {
            strategy: Strategy::Direct,
            target: language.to_string(),
            endpoint_used: endpoint.label.clone(),
            outcome,
        });

        match result {
            Ok(entries) => {
                self.pool.report_success(&endpoint);
                info!(language, entries = entries.len(), "Captions found");
                Ok(Some(entries))
            }
            Err(SkriftError::NotFound(_)) => {
                self.pool.report_success(&endpoint);
                debug!(language, "No caption track");
                Ok(None)
            }
            Err(e @ SkriftError::TranscriptsDisabled(_)) => {
                self.pool.report_success(&endpoint);
                info!("Captions are disabled for this video");
                Err(e)
            }
            Err(e @ SkriftError::InvalidInput(_)) => Err(e),
            Err(e) => {
                if e.is_endpoint_failure() {
                    self.pool.report_failure(&endpoint);
                }
                warn!(language, endpoint = %endpoint, "Caption request failed: {}", e);
                Ok(None)
            }
        }
    }

    async fn lookup_metadata(&self, video: &VideoReference) -> Option<MediaMetadata> {
        let endpoint = self.pool.next()?;
        match self.media.metadata(video, &endpoint).await {
            Ok(metadata) => {
                self.pool.report_success(&endpoint);
                Some(metadata)
            }
            Err(e) => {
                if e.is_endpoint_failure() {
                    self.pool.report_failure(&endpoint);
                }
                warn!("Metadata lookup failed: {}", e);
                None
            }
        }
    }

    fn scratch_dir(&self, video: &VideoReference) -> Result<TempDir> {
        std::fs::create_dir_all(&self.temp_dir)?;
        Ok(tempfile::Builder::new()
            .prefix(&format!("{}-", video.id()))
            .tempdir_in(&self.temp_dir)?)
    }

    async fn recognize(
        &self,
        run: &Run,
        progress: &(dyn Fn(Progress) + Send + Sync),
    ) -> Result<Vec<ChunkResult>> {
        let (Some(audio), Some(dir)) = (&run.audio, &run.work_dir) else {
            return Err(SkriftError::Config("no downloaded audio".into()));
        };

        let chunks = self
            .recognizer
            .plan(&audio.path, self.settings.recognition.chunk_duration(), dir.path())
            .await?;
        let total = chunks.len();

        let mut results = Vec::with_capacity(total);
        let mut stream = std::pin::pin!(self.recognizer.recognize(&audio.path, chunks));
        while let Some(result) = stream.next().await {
            progress(Progress::Chunk {
                index: result.chunk.index,
                total,
            });
            results.push(result);
        }

        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::endpoint::EndpointDescriptor;
    use async_trait::async_trait;
    use std::collections::HashMap;
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;
    use tokio_test::assert_ok;

    // ------------------------------------------------------------------
    // Fakes
    // ------------------------------------------------------------------

    enum Track {
        Entries(Vec<CaptionEntry>),
        Disabled,
        RateLimited,
    }

    #[derive(Default)]
    struct FakeCaptions {
        tracks: HashMap<String, Track>,
        available: Vec<String>,
        listing_rate_limited: bool,
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CaptionProvider for FakeCaptions {
        async fn fetch(
            &self,
            video: &VideoReference,
            language: &str,
            _endpoint: &EndpointDescriptor,
        ) -> Result<Vec<CaptionEntry>> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            match self.tracks.get(language) {
                Some(Track::Entries(entries)) => Ok(entries.clone()),
                Some(Track::Disabled) => Err(SkriftError::TranscriptsDisabled(video.id().to_string())),
                Some(Track::RateLimited) => Err(SkriftError::EndpointUnavailable("HTTP Error 429".into())),
                None => Err(SkriftError::NotFound(language.to_string())),
            }
        }

        async fn available_languages(
            &self,
            _video: &VideoReference,
            _endpoint: &EndpointDescriptor,
        ) -> Result<Vec<String>> {
            if self.listing_rate_limited {
                return Err(SkriftError::EndpointUnavailable("HTTP Error 429".into()));
            }
            Ok(self.available.clone())
        }
    }

    /// Fails the first `failing_downloads` downloads.
    struct FakeMedia {
        failing_downloads: usize,
        downloads: AtomicUsize,
    }

    impl FakeMedia {
        fn new(fail_download: bool) -> Self {
            Self::failing_first(if fail_download { usize::MAX } else { 0 })
        }

        fn failing_first(failing_downloads: usize) -> Self {
            Self {
                failing_downloads,
                downloads: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl MediaBackend for FakeMedia {
        async fn metadata(
            &self,
            video: &VideoReference,
            _endpoint: &EndpointDescriptor,
        ) -> Result<MediaMetadata> {
            Ok(MediaMetadata {
                id: video.id().to_string(),
                title: "Test video".to_string(),
                duration_seconds: Some(130),
                ..Default::default()
            })
        }

        async fn download_audio(
            &self,
            video: &VideoReference,
            _endpoint: &EndpointDescriptor,
            dir: &Path,
        ) -> Result<PathBuf> {
            let n = self.downloads.fetch_add(1, Ordering::SeqCst);
            std::fs::create_dir_all(dir)?;
            let path = dir.join(format!("{}.mp3", video.id()));
            std::fs::write(&path, b"partial audio")?;
            if n < self.failing_downloads {
                return Err(SkriftError::EndpointUnavailable("HTTP Error 429".into()));
            }
            Ok(path)
        }
    }

    struct FakeSplitter {
        total: Duration,
    }

    #[async_trait]
    impl AudioSplitter for FakeSplitter {
        async fn duration(&self, _path: &Path) -> Result<Duration> {
            Ok(self.total)
        }

        async fn extract_segment(
            &self,
            _source: &Path,
            dest: &Path,
            start: Duration,
            _length: Duration,
        ) -> Result<()> {
            std::fs::write(dest, start.as_secs().to_string())?;
            Ok(())
        }
    }

    /// Replies per chunk start second (read back from the chunk file).
    struct FakeSpeech {
        replies: std::sync::Mutex<HashMap<u64, Vec<Result<String>>>>,
        calls: AtomicUsize,
    }

    impl FakeSpeech {
        fn new(replies: Vec<(u64, Vec<Result<String>>)>) -> Self {
            Self {
                replies: std::sync::Mutex::new(replies.into_iter().collect()),
                calls: AtomicUsize::new(0),
            }
        }
    }

    #[async_trait]
    impl SpeechBackend for FakeSpeech {
        async fn recognize(&self, audio_path: &Path, _language: Option<&str>) -> Result<String> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let start: u64 = std::fs::read_to_string(audio_path)?.parse().unwrap();
            let mut replies = self.replies.lock().unwrap();
            match replies.get_mut(&start) {
                Some(queue) if !queue.is_empty() => queue.remove(0),
                _ => Ok(format!("speech at {start}")),
            }
        }
    }

    struct FakeRefiner {
        fail: bool,
    }

    #[async_trait]
    impl Refiner for FakeRefiner {
        async fn refine(&self, raw: &str) -> Result<String> {
            if self.fail {
                Err(SkriftError::OpenAI("quota exceeded".into()))
            } else {
                Ok(raw.to_uppercase())
            }
        }
    }

    // ------------------------------------------------------------------
    // Harness
    // ------------------------------------------------------------------

    struct Harness {
        orchestrator: Orchestrator,
        captions: Arc<FakeCaptions>,
        media: Arc<FakeMedia>,
        speech: Arc<FakeSpeech>,
        scratch: tempfile::TempDir,
    }

    impl Harness {
        fn scratch_is_empty(&self) -> bool {
            std::fs::read_dir(self.scratch.path()).unwrap().next().is_none()
        }
    }

    fn harness(
        captions: FakeCaptions,
        media: FakeMedia,
        speech: FakeSpeech,
        refiner: Option<FakeRefiner>,
        pool: EndpointPool,
    ) -> Harness {
        let scratch = tempfile::tempdir().unwrap();
        let mut settings = Settings::default();
        settings.general.temp_dir = scratch.path().to_string_lossy().into_owned();
        settings.recognition.retry_delay_seconds = 0;

        let captions = Arc::new(captions);
        let media = Arc::new(media);
        let speech = Arc::new(speech);

        let backends = Backends {
            captions: captions.clone(),
            media: media.clone(),
            speech: speech.clone(),
            splitter: Arc::new(FakeSplitter {
                total: Duration::from_secs(130),
            }),
            refiner: refiner.map(|r| Arc::new(r) as Arc<dyn Refiner>),
        };

        let orchestrator = Orchestrator::with_components(settings, Arc::new(pool), backends).unwrap();
        Harness {
            orchestrator,
            captions,
            media,
            speech,
            scratch,
        }
    }

    fn caption(offset: f64, text: &str) -> CaptionEntry {
        CaptionEntry {
            offset_seconds: offset,
            duration_seconds: 4.0,
            text: text.to_string(),
        }
    }

    fn no_captions() -> FakeCaptions {
        FakeCaptions {
            tracks: HashMap::from([("en".to_string(), Track::Disabled)]),
            ..Default::default()
        }
    }

    fn video() -> VideoReference {
        VideoReference::parse("https://youtu.be/dQw4w9WgXcQ").unwrap()
    }

    fn langs(list: &[&str]) -> Vec<String> {
        list.iter().map(|s| s.to_string()).collect()
    }

    fn proxies(n: usize) -> EndpointPool {
        let candidates = (0..n)
            .map(|i| EndpointDescriptor::proxy(&format!("http://10.0.0.{}:8080", i + 1)))
            .collect();
        EndpointPool::new(candidates, 3)
    }

    // ------------------------------------------------------------------
    // End-to-end scenarios
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_scenario_captions_short_circuit() {
        let captions = FakeCaptions {
            tracks: HashMap::from([(
                "en".to_string(),
                Track::Entries(vec![caption(15.0, "second"), caption(0.0, "first")]),
            )]),
            ..Default::default()
        };
        let h = harness(captions, FakeMedia::new(false), FakeSpeech::new(vec![]), None, EndpointPool::direct());

        let acq = assert_ok!(h.orchestrator.acquire(&video(), &langs(&["en"]), AcquireOptions::default()).await);

        assert_eq!(acq.method, ExtractionMethod::YoutubeTranscript);
        assert_eq!(acq.language.as_deref(), Some("en"));
        let starts: Vec<f64> = acq.transcript.segments.iter().map(|s| s.start_seconds).collect();
        assert_eq!(starts, vec![0.0, 15.0]);
        assert_eq!(acq.raw_text, "[00:00] first\n[00:15] second");
        assert_eq!(h.media.downloads.load(Ordering::SeqCst), 0);
        assert_eq!(h.speech.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_scenario_audio_fallback_drops_silence() {
        let speech = FakeSpeech::new(vec![(120, vec![Err(SkriftError::Unrecognizable)])]);
        let h = harness(no_captions(), FakeMedia::new(false), speech, None, EndpointPool::direct());

        let acq = assert_ok!(h.orchestrator.acquire(&video(), &langs(&["en"]), AcquireOptions::default()).await);

        assert_eq!(acq.method, ExtractionMethod::SpeechToText);
        assert_eq!(acq.transcript.segments.len(), 2);
        assert_eq!(acq.transcript.segments[0].end_seconds, 60.0);
        assert_eq!(acq.transcript.segments[1].start_seconds, 60.0);
        assert_eq!(acq.transcript.segments[1].end_seconds, 120.0);

        let stats = acq.stats.unwrap();
        assert_eq!(stats.total_chunks, 3);
        assert_eq!(stats.unrecognized, 1);
        assert_eq!(h.speech.calls.load(Ordering::SeqCst), 3);
        assert_eq!(acq.metadata.unwrap().title, "Test video");
        assert!(h.scratch_is_empty());
    }

    #[tokio::test]
    async fn test_scenario_all_endpoints_fail() {
        let h = harness(no_captions(), FakeMedia::new(true), FakeSpeech::new(vec![]), None, proxies(2));

        let err = h
            .orchestrator
            .acquire(&video(), &langs(&["en"]), AcquireOptions::default())
            .await
            .unwrap_err();

        match err {
            SkriftError::TotalAcquisitionFailure { video_id, attempts, .. } => {
                assert_eq!(video_id, "dQw4w9WgXcQ");
                let failed_downloads = attempts
                    .iter()
                    .filter(|a| a.strategy == Strategy::AudioFallback)
                    .count();
                assert_eq!(failed_downloads, 2);
            }
            other => panic!("unexpected error: {other:?}"),
        }
        assert_eq!(h.media.downloads.load(Ordering::SeqCst), 2);
        assert!(h.scratch_is_empty(), "no temporary files may remain");
    }

    // ------------------------------------------------------------------
    // Policy details
    // ------------------------------------------------------------------

    #[tokio::test]
    async fn test_chunk_retry_recovers_text() {
        let speech = FakeSpeech::new(vec![(60, vec![Err(SkriftError::Backend("503".into())), Ok("recovered".into())])]);
        let h = harness(no_captions(), FakeMedia::new(false), speech, None, EndpointPool::direct());

        let acq = assert_ok!(h.orchestrator.acquire(&video(), &[], AcquireOptions::default()).await);

        assert_eq!(acq.transcript.segments.len(), 3);
        assert_eq!(acq.transcript.segments[1].text, "recovered");
        assert_eq!(h.speech.calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_every_chunk_failing_is_total_failure() {
        let fail = || vec![Err(SkriftError::Backend("down".into())), Err(SkriftError::Backend("down".into()))];
        let speech = FakeSpeech::new(vec![(0, fail()), (60, fail()), (120, fail())]);
        let h = harness(no_captions(), FakeMedia::new(false), speech, None, EndpointPool::direct());

        let err = h
            .orchestrator
            .acquire(&video(), &[], AcquireOptions::default())
            .await
            .unwrap_err();

        assert!(matches!(err, SkriftError::TotalAcquisitionFailure { .. }));
        assert!(h.scratch_is_empty());
    }

    #[tokio::test]
    async fn test_refiner_failure_keeps_raw_text() {
        let h = harness(
            no_captions(),
            FakeMedia::new(false),
            FakeSpeech::new(vec![]),
            Some(FakeRefiner { fail: true }),
            EndpointPool::direct(),
        );

        let acq = assert_ok!(h.orchestrator.acquire(&video(), &[], AcquireOptions::default()).await);

        assert_eq!(acq.method, ExtractionMethod::SpeechToText);
        assert!(acq.refined_text.is_none());
        assert_eq!(acq.text(), acq.raw_text);
        assert!(acq.text().starts_with("[00:00] speech at 0"));
    }

    #[tokio::test]
    async fn test_refiner_success_marks_cleanup() {
        let h = harness(
            no_captions(),
            FakeMedia::new(false),
            FakeSpeech::new(vec![]),
            Some(FakeRefiner { fail: false }),
            EndpointPool::direct(),
        );

        let acq = assert_ok!(h.orchestrator.acquire(&video(), &[], AcquireOptions::default()).await);
        assert_eq!(acq.method, ExtractionMethod::SpeechToTextWithAiCleanup);
        assert!(acq.text().starts_with("[00:00] SPEECH AT 0"));

        let options = AcquireOptions {
            refine: false,
            ..Default::default()
        };
        let acq = assert_ok!(h.orchestrator.acquire(&video(), &[], options).await);
        assert_eq!(acq.method, ExtractionMethod::SpeechToText);
    }

    #[tokio::test]
    async fn test_disabled_stops_caption_phase() {
        let captions = FakeCaptions {
            tracks: HashMap::from([
                ("en".to_string(), Track::Disabled),
                ("de".to_string(), Track::Entries(vec![caption(0.0, "hallo")])),
            ]),
            available: langs(&["de"]),
            ..Default::default()
        };
        let h = harness(captions, FakeMedia::new(false), FakeSpeech::new(vec![]), None, EndpointPool::direct());

        let acq = assert_ok!(h.orchestrator.acquire(&video(), &langs(&["en", "de"]), AcquireOptions::default()).await);

        assert_eq!(h.captions.calls.load(Ordering::SeqCst), 1);
        assert_eq!(acq.method, ExtractionMethod::SpeechToText);
    }

    #[tokio::test]
    async fn test_falls_back_to_any_available_language() {
        let captions = FakeCaptions {
            tracks: HashMap::from([("de".to_string(), Track::Entries(vec![caption(0.0, "hallo")]))]),
            available: langs(&["en-US", "de"]),
            ..Default::default()
        };
        let h = harness(captions, FakeMedia::new(false), FakeSpeech::new(vec![]), None, EndpointPool::direct());

        let acq = assert_ok!(h.orchestrator.acquire(&video(), &langs(&["en", "en-US"]), AcquireOptions::default()).await);

        assert_eq!(acq.language.as_deref(), Some("de"));
        // en, en-US, then only de from the available list
        assert_eq!(h.captions.calls.load(Ordering::SeqCst), 3);
        assert_eq!(acq.attempts.len(), 3);
        assert_eq!(acq.attempts[0].outcome, AttemptOutcome::NotFound);
    }

    #[tokio::test]
    async fn test_download_retry_survives_rate_limited_captions() {
        let captions = FakeCaptions {
            tracks: HashMap::from([
                ("en".to_string(), Track::RateLimited),
                ("de".to_string(), Track::RateLimited),
            ]),
            ..Default::default()
        };
        let h = harness(captions, FakeMedia::failing_first(1), FakeSpeech::new(vec![]), None, proxies(2));

        let acq = assert_ok!(h.orchestrator.acquire(&video(), &langs(&["en", "de"]), AcquireOptions::default()).await);

        assert_eq!(acq.method, ExtractionMethod::SpeechToText);
        assert_eq!(h.media.downloads.load(Ordering::SeqCst), 2);
        let downloads: Vec<&str> = acq
            .attempts
            .iter()
            .filter(|a| a.strategy == Strategy::AudioFallback)
            .map(|a| a.endpoint_used.as_str())
            .collect();
        assert_eq!(downloads, vec!["http://10.0.0.1:8080", "http://10.0.0.2:8080"]);
    }

    #[tokio::test]
    async fn test_single_rate_limited_proxy_keeps_download_retry() {
        let tracks = ["en", "en-US", "en-GB", "a.en"]
            .iter()
            .map(|l| (l.to_string(), Track::RateLimited))
            .collect();
        let captions = FakeCaptions {
            tracks,
            ..Default::default()
        };
        let h = harness(captions, FakeMedia::failing_first(1), FakeSpeech::new(vec![]), None, proxies(1));

        let acq = assert_ok!(h.orchestrator.acquire(&video(), &[], AcquireOptions::default()).await);

        // the caption phase stops once the only proxy has failed
        assert_eq!(h.captions.calls.load(Ordering::SeqCst), 1);
        assert_eq!(h.media.downloads.load(Ordering::SeqCst), 2);
        assert_eq!(acq.method, ExtractionMethod::SpeechToText);
        assert_eq!(h.orchestrator.pool().active_count(), 1);
    }

    #[tokio::test]
    async fn test_language_listing_failure_counts_against_endpoint() {
        let captions = FakeCaptions {
            listing_rate_limited: true,
            ..Default::default()
        };
        let candidates = vec![
            EndpointDescriptor::proxy("http://10.0.0.1:8080"),
            EndpointDescriptor::proxy("http://10.0.0.2:8080"),
        ];
        let h = harness(
            captions,
            FakeMedia::new(false),
            FakeSpeech::new(vec![]),
            None,
            EndpointPool::new(candidates, 0),
        );

        let acq = assert_ok!(h.orchestrator.acquire(&video(), &langs(&["en"]), AcquireOptions::default()).await);

        assert_eq!(acq.method, ExtractionMethod::SpeechToText);
        assert_eq!(h.media.downloads.load(Ordering::SeqCst), 1);

        let listing = acq.attempts.iter().find(|a| a.target == "languages").unwrap();
        assert_eq!(listing.endpoint_used, "http://10.0.0.2:8080");
        assert!(matches!(listing.outcome, AttemptOutcome::Failed(_)));
        // threshold 0: the single failure retired the listing endpoint
        assert_eq!(h.orchestrator.pool().active_count(), 1);
    }

    #[tokio::test]
    async fn test_progress_reports_stages_in_order() {
        let h = harness(no_captions(), FakeMedia::new(false), FakeSpeech::new(vec![]), None, EndpointPool::direct());
        let seen = std::sync::Mutex::new(Vec::new());

        assert_ok!(
            h.orchestrator
                .acquire_with_progress(&video(), &[], AcquireOptions::default(), &|p| {
                    if let Progress::Stage(stage) = p {
                        seen.lock().unwrap().push(stage);
                    }
                })
                .await
        );

        assert_eq!(
            *seen.lock().unwrap(),
            vec![
                Stage::Start,
                Stage::DirectAttempt,
                Stage::AudioFallback,
                Stage::MediaDownload,
                Stage::ChunkRecognize,
                Stage::Assemble,
                Stage::Done,
            ]
        );
    }
}
