//! Chunked speech recognition.
//!
//! The audio is cut into fixed windows that are recognized strictly one after
//! another. Each window's file exists only while it is being recognized.

use super::{AudioChunk, ChunkOutcome, ChunkResult, SpeechBackend};
use crate::audio::AudioSplitter;
use crate::error::SkriftError;
use futures::stream::{self, Stream};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Partition `total` into consecutive windows of `chunk`.
///
/// Window `i` covers `[i * chunk, min((i + 1) * chunk, total))`. Computed in
/// whole milliseconds so the windows tile the track exactly.
pub fn plan_chunks(total: Duration, chunk: Duration) -> Vec<(usize, Duration, Duration)> {
    let total_ms = total.as_millis() as u64;
    let chunk_ms = chunk.as_millis() as u64;
    if total_ms == 0 || chunk_ms == 0 {
        return Vec::new();
    }

    let count = total_ms.div_ceil(chunk_ms);
    (0..count)
        .map(|i| {
            let start = i * chunk_ms;
            let end = ((i + 1) * chunk_ms).min(total_ms);
            (
                i as usize,
                Duration::from_millis(start),
                Duration::from_millis(end),
            )
        })
        .collect()
}

/// Converts an audio file to text one window at a time.
pub struct ChunkedRecognizer {
    speech: Arc<dyn SpeechBackend>,
    splitter: Arc<dyn AudioSplitter>,
    language: Option<String>,
    retry_budget: u32,
    retry_delay: Duration,
}

impl ChunkedRecognizer {
    pub fn new(
        speech: Arc<dyn SpeechBackend>,
        splitter: Arc<dyn AudioSplitter>,
        language: Option<String>,
        retry_budget: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            speech,
            splitter,
            language,
            retry_budget,
            retry_delay,
        }
    }

    /// Plan the windows for `audio`.
    pub async fn plan(
        &self,
        audio: &Path,
        chunk_duration: Duration,
        work_dir: &Path,
    ) -> crate::error::Result<Vec<AudioChunk>> {
        let total = self.splitter.duration(audio).await?;
        let ext = audio.extension().and_then(|e| e.to_str()).unwrap_or("mp3");

        let chunks: Vec<AudioChunk> = plan_chunks(total, chunk_duration)
            .into_iter()
            .map(|(index, start, end)| AudioChunk {
                index,
                start,
                end,
                local_path: work_dir.join(format!("chunk_{:04}.{}", index, ext)),
            })
            .collect();

        info!(
            "Audio is {:.1}s long, {} chunks of {}s",
            total.as_secs_f64(),
            chunks.len(),
            chunk_duration.as_secs()
        );
        Ok(chunks)
    }

    /// Recognize `chunks` of `audio` in index order.
    ///
    /// The stream is lazy and finite; each item is produced only when polled,
    /// so dropping it stops all further backend calls. It cannot be resumed
    /// midway: a new call starts again from the first chunk.
    pub fn recognize<'a>(
        &'a self,
        audio: &'a Path,
        chunks: Vec<AudioChunk>,
    ) -> impl Stream<Item = ChunkResult> + Send + 'a {
        stream::unfold(chunks.into_iter(), move |mut remaining| async move {
            let chunk = remaining.next()?;
            let result = self.recognize_chunk(audio, chunk).await;
            Some((result, remaining))
        })
    }

    async fn recognize_chunk(&self, audio: &Path, chunk: AudioChunk) -> ChunkResult {
        let guard = ChunkFile(chunk.local_path.clone());

        if let Err(e) = self
            .splitter
            .extract_segment(audio, &chunk.local_path, chunk.start, chunk.duration())
            .await
        {
            warn!(chunk = chunk.index, "Could not extract chunk: {}", e);
            drop(guard);
            return ChunkResult {
                chunk,
                outcome: ChunkOutcome::BackendError(e.to_string()),
                attempts: 0,
            };
        }

        let mut attempts = 0;
        let outcome = loop {
            attempts += 1;
            match self
                .speech
                .recognize(&chunk.local_path, self.language.as_deref())
                .await
            {
                Ok(text) => break ChunkOutcome::Success(text),
                Err(SkriftError::Unrecognizable) => {
                    debug!(chunk = chunk.index, "No speech detected");
                    break ChunkOutcome::Unrecognized;
                }
                Err(e) if attempts <= self.retry_budget => {
                    warn!(
                        chunk = chunk.index,
                        attempt = attempts,
                        "Recognition failed, retrying in {}s: {}",
                        self.retry_delay.as_secs(),
                        e
                    );
                    tokio::time::sleep(self.retry_delay).await;
                }
                Err(e) => {
                    warn!(chunk = chunk.index, "Recognition failed, skipping chunk: {}", e);
                    break ChunkOutcome::BackendError(e.to_string());
                }
            }
        };

        drop(guard);
        ChunkResult {
            chunk,
            outcome,
            attempts,
        }
    }
}

/// Removes a chunk file when dropped.
struct ChunkFile(PathBuf);

impl Drop for ChunkFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Result;
    use async_trait::async_trait;
    use futures::StreamExt;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use tempfile::TempDir;

    fn secs(s: u64) -> Duration {
        Duration::from_secs(s)
    }

    #[test]
    fn test_plan_chunks_scenario() {
        let plan = plan_chunks(secs(130), secs(60));
        assert_eq!(
            plan,
            vec![(0, secs(0), secs(60)), (1, secs(60), secs(120)), (2, secs(120), secs(130))]
        );
    }

    #[test]
    fn test_plan_chunks_tiles_exactly() {
        for total_ms in [1u64, 999, 60_000, 60_001, 119_999, 3_600_500] {
            for chunk_ms in [1_000u64, 30_000, 60_000] {
                let plan = plan_chunks(Duration::from_millis(total_ms), Duration::from_millis(chunk_ms));
                assert_eq!(plan.len() as u64, total_ms.div_ceil(chunk_ms));
                assert_eq!(plan[0].1, Duration::ZERO);
                assert_eq!(plan.last().unwrap().2, Duration::from_millis(total_ms));
                for w in plan.windows(2) {
                    assert_eq!(w[0].2, w[1].1);
                    assert_eq!(w[0].2 - w[0].1, Duration::from_millis(chunk_ms));
                }
            }
        }
    }

    #[test]
    fn test_plan_chunks_empty() {
        assert!(plan_chunks(Duration::ZERO, secs(60)).is_empty());
    }

    /// Writes an empty file for each extracted segment.
    struct TouchSplitter {
        total: Duration,
    }

    #[async_trait]
    impl AudioSplitter for TouchSplitter {
        async fn duration(&self, _path: &Path) -> Result<Duration> {
            Ok(self.total)
        }

        async fn extract_segment(
            &self,
            _source: &Path,
            dest: &Path,
            _start: Duration,
            _length: Duration,
        ) -> Result<()> {
            std::fs::write(dest, b"chunk")?;
            Ok(())
        }
    }

    /// Replays scripted responses per chunk file name.
    struct ScriptedSpeech {
        script: Mutex<HashMap<String, Vec<Result<String>>>>,
        calls: Mutex<Vec<String>>,
    }

    impl ScriptedSpeech {
        fn new(script: Vec<(&str, Vec<Result<String>>)>) -> Self {
            Self {
                script: Mutex::new(script.into_iter().map(|(k, v)| (k.to_string(), v)).collect()),
                calls: Mutex::new(Vec::new()),
            }
        }
    }

    #[async_trait]
    impl SpeechBackend for ScriptedSpeech {
        async fn recognize(&self, audio_path: &Path, _language: Option<&str>) -> Result<String> {
            assert!(audio_path.exists(), "chunk file must exist while recognized");
            let name = audio_path.file_stem().unwrap().to_string_lossy().into_owned();
            self.calls.lock().unwrap().push(name.clone());
            let mut script = self.script.lock().unwrap();
            let queue = script.get_mut(&name).expect("unscripted chunk");
            queue.remove(0)
        }
    }

    fn ok(text: &str) -> Result<String> {
        Ok(text.to_string())
    }

    async fn run(speech: Arc<ScriptedSpeech>, total: u64) -> (Vec<ChunkResult>, TempDir) {
        let dir = TempDir::new().unwrap();
        let recognizer = ChunkedRecognizer::new(
            speech,
            Arc::new(TouchSplitter { total: secs(total) }),
            Some("en".into()),
            1,
            Duration::from_millis(1),
        );
        let audio = dir.path().join("audio.mp3");
        let chunks = recognizer.plan(&audio, secs(60), dir.path()).await.unwrap();
        let results = recognizer.recognize(&audio, chunks).collect::<Vec<_>>().await;
        (results, dir)
    }

    #[tokio::test]
    async fn test_silence_is_not_retried() {
        let speech = Arc::new(ScriptedSpeech::new(vec![
            ("chunk_0000", vec![ok("one")]),
            ("chunk_0001", vec![Err(SkriftError::Unrecognizable)]),
        ]));
        let (results, _dir) = run(speech.clone(), 100).await;

        assert_eq!(results[0].outcome, ChunkOutcome::Success("one".into()));
        assert_eq!(results[1].outcome, ChunkOutcome::Unrecognized);
        assert_eq!(results[1].attempts, 1);
        assert_eq!(speech.calls.lock().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_backend_error_retried_once() {
        let speech = Arc::new(ScriptedSpeech::new(vec![
            ("chunk_0000", vec![Err(SkriftError::Backend("503".into())), ok("recovered")]),
            (
                "chunk_0001",
                vec![Err(SkriftError::Backend("503".into())), Err(SkriftError::Backend("503".into()))],
            ),
            ("chunk_0002", vec![ok("after")]),
        ]));
        let (results, dir) = run(speech, 130).await;

        assert_eq!(results.len(), 3);
        assert_eq!(results[0].outcome, ChunkOutcome::Success("recovered".into()));
        assert_eq!(results[0].attempts, 2);
        assert!(matches!(results[1].outcome, ChunkOutcome::BackendError(_)));
        assert_eq!(results[1].attempts, 2);
        assert_eq!(results[2].outcome, ChunkOutcome::Success("after".into()));

        let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
        assert_eq!(leftovers, 0, "chunk files must be removed");
    }

    #[tokio::test]
    async fn test_results_in_index_order() {
        let speech = Arc::new(ScriptedSpeech::new(vec![
            ("chunk_0000", vec![ok("a")]),
            ("chunk_0001", vec![ok("b")]),
            ("chunk_0002", vec![ok("c")]),
        ]));
        let (results, _dir) = run(speech.clone(), 150).await;

        let indices: Vec<usize> = results.iter().map(|r| r.chunk.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert_eq!(*speech.calls.lock().unwrap(), vec!["chunk_0000", "chunk_0001", "chunk_0002"]);
    }
}
