use std::sync::Arc;

use indicatif::{ProgressBar, ProgressStyle};
use rayon::prelude::*;
use serde::Serialize;

use crate::config::AlignerConfig;
use crate::error::AlignError;
use crate::matching::aligner::Aligner;
use crate::matching::language::Language;
use crate::pipeline::traits::MatchSink;
use crate::types::{CancelToken, Chunk, MatchRecord, SegmentContext};

/// Drives alignment over a chunk sequence that may span several source
/// recordings. Each recording gets its own fully independent aligner
/// instance; recordings may be fanned out across rayon workers while chunks
/// within one recording stay strictly sequential.
pub struct AlignmentRunner {
    config: AlignerConfig,
    language: Language,
    sink: Arc<dyn MatchSink>,
    parallel: bool,
    show_progress: bool,
    cancel: Option<CancelToken>,
}

pub(crate) struct RunnerParts {
    pub config: AlignerConfig,
    pub language: Language,
    pub sink: Arc<dyn MatchSink>,
    pub parallel: bool,
    pub show_progress: bool,
    pub cancel: Option<CancelToken>,
}

impl AlignmentRunner {
    pub(crate) fn from_parts(parts: RunnerParts) -> Self {
        Self {
            config: parts.config,
            language: parts.language,
            sink: parts.sink,
            parallel: parts.parallel,
            show_progress: parts.show_progress,
            cancel: parts.cancel,
        }
    }

    /// Aligns `chunks` against `reference_text` (or against each chunk's own
    /// linked recording transcript), returning all match records. Within one
    /// recording records are ordered by chunk; across recordings run in
    /// parallel, relative order follows the segment order of the input.
    pub fn run(
        &self,
        reference_text: &str,
        chunks: Vec<Chunk>,
    ) -> Result<Vec<MatchRecord>, AlignError> {
        let segments = partition_segments(reference_text, chunks);
        let segment_count = segments.len();
        let total_chunks: u64 = segments.iter().map(|s| s.chunks.len() as u64).sum();
        let progress = self.progress_bar(total_chunks);

        let matches = if self.parallel && segment_count > 1 {
            let results: Vec<Result<Vec<MatchRecord>, AlignError>> = segments
                .into_par_iter()
                .map(|segment| {
                    let count = segment.chunks.len() as u64;
                    let matches = self.align_one(&segment)?;
                    progress.inc(count);
                    Ok(matches)
                })
                .collect();
            let mut all = Vec::new();
            for result in results {
                all.extend(result?);
            }
            all
        } else {
            let mut aligner = self.new_aligner()?;
            for segment in &segments {
                aligner.align_segment(segment, self.sink.as_ref())?;
                progress.inc(segment.chunks.len() as u64);
            }
            aligner.into_matches()
        };
        progress.finish_and_clear();

        let summary = RunSummary::from_matches(&matches, segment_count);
        tracing::info!(
            recordings = summary.recordings,
            chunks = summary.chunks,
            mean_cer = summary.mean_cer,
            "alignment run finished"
        );
        Ok(matches)
    }

    fn align_one(&self, segment: &SegmentContext) -> Result<Vec<MatchRecord>, AlignError> {
        let mut aligner = self.new_aligner()?;
        aligner.align_segment(segment, self.sink.as_ref())?;
        Ok(aligner.into_matches())
    }

    fn new_aligner(&self) -> Result<Aligner, AlignError> {
        let mut aligner = Aligner::new(self.config.clone(), self.language)?;
        if let Some(token) = &self.cancel {
            aligner = aligner.with_cancel(token.clone());
        }
        Ok(aligner)
    }

    fn progress_bar(&self, total: u64) -> ProgressBar {
        if !self.show_progress {
            return ProgressBar::hidden();
        }
        let bar = ProgressBar::new(total);
        bar.set_style(
            ProgressStyle::with_template("{wide_bar} {pos}/{len} chunks [{elapsed_precise}]")
                .unwrap_or_else(|_| ProgressStyle::default_bar()),
        );
        bar
    }
}

/// Groups consecutive chunks by their source-recording linkage into
/// immutable per-recording contexts. Unlinked chunks fall back to the
/// default reference text.
pub fn partition_segments(default_reference: &str, chunks: Vec<Chunk>) -> Vec<SegmentContext> {
    let default_reference: Arc<str> = Arc::from(default_reference);
    let mut segments: Vec<SegmentContext> = Vec::new();

    for chunk in chunks {
        let (recording_id, reference_text) = match &chunk.source {
            Some(link) => (Some(link.recording_id.clone()), link.reference_text.clone()),
            None => (None, default_reference.clone()),
        };
        match segments.last_mut() {
            Some(segment) if segment.recording_id == recording_id => {
                segment.chunks.push(chunk);
            }
            _ => segments.push(SegmentContext {
                recording_id,
                reference_text,
                chunks: vec![chunk],
            }),
        }
    }
    segments
}

/// Aggregate facts about one finished run, for logging or persisting next to
/// the output manifest.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub generated_at: String,
    pub recordings: usize,
    pub chunks: usize,
    pub mean_cer: f64,
}

impl RunSummary {
    pub fn from_matches(matches: &[MatchRecord], recordings: usize) -> Self {
        let mean_cer = if matches.is_empty() {
            0.0
        } else {
            matches.iter().map(|m| m.cer).sum::<f64>() / matches.len() as f64
        };
        Self {
            generated_at: chrono::Utc::now().to_rfc3339(),
            recordings,
            chunks: matches.len(),
            mean_cer,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(id: &str, recording: Option<(&str, &str)>) -> Chunk {
        Chunk {
            id: id.to_string(),
            predicted_text: "text".to_string(),
            duration: 1.0,
            source: recording.map(|(rid, reference)| crate::types::SourceLink {
                recording_id: rid.to_string(),
                reference_text: Arc::from(reference),
            }),
        }
    }

    #[test]
    fn partition_groups_consecutive_chunks_per_recording() {
        let chunks = vec![
            chunk("a", Some(("rec1", "first transcript"))),
            chunk("b", Some(("rec1", "first transcript"))),
            chunk("c", Some(("rec2", "second transcript"))),
            chunk("d", None),
        ];
        let segments = partition_segments("default transcript", chunks);
        assert_eq!(segments.len(), 3);
        assert_eq!(segments[0].recording_id.as_deref(), Some("rec1"));
        assert_eq!(segments[0].chunks.len(), 2);
        assert_eq!(segments[1].recording_id.as_deref(), Some("rec2"));
        assert_eq!(segments[2].recording_id, None);
        assert_eq!(&*segments[2].reference_text, "default transcript");
    }

    #[test]
    fn partition_of_unlinked_chunks_is_one_segment() {
        let chunks = vec![chunk("a", None), chunk("b", None)];
        let segments = partition_segments("reference", chunks);
        assert_eq!(segments.len(), 1);
        assert_eq!(segments[0].chunks.len(), 2);
    }

    #[test]
    fn summary_averages_cer_over_matches() {
        let matches = vec![
            MatchRecord {
                chunk_id: "a".into(),
                matched_text: "x".into(),
                chunk_text: "x".into(),
                start_time: 0.0,
                end_time: 1.0,
                match_range: (0, 1),
                cer: 0.2,
                duration: 1.0,
            },
            MatchRecord {
                chunk_id: "b".into(),
                matched_text: "y".into(),
                chunk_text: "y".into(),
                start_time: 1.0,
                end_time: 2.0,
                match_range: (1, 2),
                cer: 0.4,
                duration: 1.0,
            },
        ];
        let summary = RunSummary::from_matches(&matches, 1);
        assert_eq!(summary.chunks, 2);
        assert!((summary.mean_cer - 0.3).abs() < 1e-12);
        assert!(!summary.generated_at.is_empty());
    }

    #[test]
    fn summary_of_empty_run_is_zeroed() {
        let summary = RunSummary::from_matches(&[], 0);
        assert_eq!(summary.chunks, 0);
        assert_eq!(summary.mean_cer, 0.0);
    }
}
