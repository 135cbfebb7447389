use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use serde::Serialize;

/// One recognizer-predicted text unit with a known audio duration, to be
/// matched against the reference transcript. Chunks are ordered; their
/// position in the sequence encodes time.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Caller-chosen identifier, typically the chunk's audio file path.
    pub id: String,
    pub predicted_text: String,
    /// Seconds of audio covered by this chunk.
    pub duration: f64,
    /// Linkage to the source recording when several recordings are batched
    /// into one chunk sequence. `None` means "the default reference text".
    pub source: Option<SourceLink>,
}

#[derive(Debug, Clone)]
pub struct SourceLink {
    pub recording_id: String,
    pub reference_text: Arc<str>,
}

/// Immutable per-recording alignment input. A new context is swapped in
/// wholesale whenever the chunk sequence crosses a recording boundary.
#[derive(Debug, Clone)]
pub struct SegmentContext {
    pub recording_id: Option<String>,
    pub reference_text: Arc<str>,
    pub chunks: Vec<Chunk>,
}

/// Resolution of one chunk: the reference substring it maps to, the score of
/// that mapping and a timestamp interval from cumulative chunk durations.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchRecord {
    pub chunk_id: String,
    pub matched_text: String,
    pub chunk_text: String,
    pub start_time: f64,
    pub end_time: f64,
    /// Character offsets `[start, end)` into the recording's reference text.
    pub match_range: (usize, usize),
    pub cer: f64,
    pub duration: f64,
}

/// A rejected candidate window, kept around until the chunk resolves so the
/// recovery policy can fall back on the least-bad attempt.
#[derive(Debug, Clone)]
pub(crate) struct MismatchRecord {
    pub window_text: String,
    pub chunk_text: String,
    pub cer: f64,
    pub start: usize,
    pub end: usize,
    pub chunk_index: usize,
}

/// Cooperative cancellation flag, checked between chunks. Cancelling never
/// drops matches that were already accumulated.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cancel_token_starts_clear_and_latches() {
        let token = CancelToken::new();
        assert!(!token.is_cancelled());
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }

    #[test]
    fn match_record_serializes_to_json() {
        let record = MatchRecord {
            chunk_id: "chunk_0001.wav".to_string(),
            matched_text: "hello world".to_string(),
            chunk_text: "helo world".to_string(),
            start_time: 0.0,
            end_time: 1.5,
            match_range: (0, 11),
            cer: 0.1,
            duration: 1.5,
        };
        let line = serde_json::to_string(&record).expect("serializable");
        assert!(line.contains("\"matched_text\":\"hello world\""));
        assert!(line.contains("\"match_range\":[0,11]"));
    }
}
