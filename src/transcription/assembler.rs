//! Turns chunk or caption results into a single ordered transcript.

use super::{
    AssemblyStats, ChunkOutcome, ChunkResult, SegmentSource, Transcript, TranscriptSegment,
};
use crate::captions::CaptionEntry;

/// Build a transcript from recognition results, one segment per recognized
/// chunk. Unrecognized and failed chunks are dropped but counted.
pub fn assemble<I>(video_id: &str, results: I) -> (Transcript, AssemblyStats)
where
    I: IntoIterator<Item = ChunkResult>,
{
    let mut stats = AssemblyStats::default();
    let mut segments = Vec::new();

    for result in results {
        stats.total_chunks += 1;
        match result.outcome {
            ChunkOutcome::Success(text) => {
                stats.recognized += 1;
                segments.push(TranscriptSegment::new(
                    result.chunk.start.as_secs_f64(),
                    result.chunk.end.as_secs_f64(),
                    text,
                    SegmentSource::SpeechRecognition,
                ));
            }
            ChunkOutcome::Unrecognized => stats.unrecognized += 1,
            ChunkOutcome::BackendError(_) => stats.backend_errors += 1,
        }
    }

    (Transcript::new(video_id.to_string(), segments), stats)
}

/// Map caption entries one-to-one onto segments at their native offsets.
pub fn assemble_captions(video_id: &str, entries: Vec<CaptionEntry>) -> Transcript {
    let segments = entries.into_iter().map(TranscriptSegment::from).collect();
    Transcript::new(video_id.to_string(), segments)
}
