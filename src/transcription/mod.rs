//! Speech recognition, transcript assembly and refinement.
//!
//! Downloaded audio is recognized window by window through a
//! [`SpeechBackend`], the per-window results are assembled into a
//! [`Transcript`], and an optional [`Refiner`] cleans up the raw text.

mod assembler;
mod chunked;
mod format;
mod models;
mod refine;
mod whisper;

pub use assembler::{assemble, assemble_captions};
pub use chunked::{plan_chunks, ChunkedRecognizer};
pub use format::{format_acquisition, OutputFormat, SegmentExport, TranscriptExport};
pub use models::{
    format_timestamp, AcquisitionAttempt, AssemblyStats, AttemptOutcome, AudioChunk,
    ChunkOutcome, ChunkResult, ExtractionMethod, SegmentSource, Strategy, Transcript,
    TranscriptSegment,
};
pub use refine::{refine_or_raw, OpenAiRefiner, Refiner};
pub use whisper::WhisperSpeechBackend;

use crate::error::Result;
use async_trait::async_trait;
use std::path::Path;

/// Trait for speech-to-text services.
#[async_trait]
pub trait SpeechBackend: Send + Sync {
    /// Recognize the speech in one audio file.
    ///
    /// Fails with [`crate::SkriftError::Unrecognizable`] when the audio holds
    /// no intelligible speech and [`crate::SkriftError::Backend`] when the
    /// service itself failed.
    async fn recognize(&self, audio_path: &Path, language: Option<&str>) -> Result<String>;
}
