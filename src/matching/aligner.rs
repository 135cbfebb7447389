//! Alignment state machine: a rolling-window search over the reference text
//! that resolves each chunk to the reference substring with the lowest CER.
//!
//! Per chunk the search opens a window at the cursor and asks the token-trim
//! optimizer to minimize CER. A good candidate is accepted and advances the
//! cursor; a poor one slides the window a character forward. After a streak
//! of poor attempts the search backtracks to the least-bad attempt and
//! re-arms the wider combination search. Persistent high CER across recent
//! chunks abandons the segment with whatever matches were accumulated.

use crate::config::AlignerConfig;
use crate::error::AlignError;
use crate::matching::cutting::{cut_extra_tokens, split_tokens, TrimOutcome};
use crate::matching::language::Language;
use crate::pipeline::traits::MatchSink;
use crate::types::{CancelToken, Chunk, MatchRecord, MismatchRecord, SegmentContext};

const ELLIPSIS: &str = "...";
/// Extra characters the base window extends past the chunk length, so small
/// recognizer deletions still fit inside the window.
const WINDOW_SLACK: usize = 6;
/// Hard ceiling on candidate offsets scanned per chunk, as a multiple of the
/// chunk length. Unrecoverable input must not scan the whole transcript.
const SCAN_BOUND_FACTOR: usize = 4;
/// Fraction of the chunk length the cursor advances when the scan exhausts
/// without a usable match.
const EXHAUSTED_ADVANCE_DIVISOR: usize = 4;
/// A remembered recovery with CER above this compounds the next chunk's
/// backward shift.
const COMPOUND_CER_BOUND: f64 = 0.3;
/// Number of recent best-CER values consulted by the lost check.
const ROLLING_WINDOW: usize = 8;
/// Trailing tokens at or under this many characters are treated as
/// punctuation when protecting token boundaries during recovery.
const PUNCTUATION_TOKEN_LEN: usize = 2;

/// Where in the reference text the next chunk is believed to begin.
#[derive(Debug, Clone, Default)]
struct SearchCursor {
    position: usize,
    shift_back: usize,
    try_combinations: bool,
}

/// Fixed-size window of recent best-CER values. All values above the loss
/// bound means the search has drifted beyond repair.
#[derive(Debug)]
struct RollingCer {
    values: [f64; ROLLING_WINDOW],
}

impl RollingCer {
    fn new() -> Self {
        Self {
            values: [0.0; ROLLING_WINDOW],
        }
    }

    fn push(&mut self, cer: f64) {
        self.values.rotate_left(1);
        self.values[ROLLING_WINDOW - 1] = cer;
    }

    fn all_above(&self, bound: f64) -> bool {
        self.values.iter().all(|&v| v > bound)
    }
}

#[derive(Debug, Clone)]
struct Candidate {
    text: String,
    cer: f64,
    range: (usize, usize),
}

enum Resolution {
    Accepted,
    Recovered,
    Exhausted,
}

/// Result of cutting one candidate window, with the bookkeeping needed to
/// map the trimmed text back to reference offsets.
struct WindowCut {
    outcome: TrimOutcome,
    start: usize,
    removed: usize,
}

pub struct Aligner {
    config: AlignerConfig,
    language: Language,
    cancel: Option<CancelToken>,
    cursor: SearchCursor,
    reference: Vec<char>,
    recording_id: Option<String>,
    current_time: f64,
    rolling: RollingCer,
    mismatches: Vec<MismatchRecord>,
    /// `(window_len, cer)` of the last recovery, consulted by the next chunk
    /// to compound the backward shift on consecutive failures.
    previous_pack: Option<(usize, f64)>,
    matches: Vec<MatchRecord>,
}

impl Aligner {
    pub fn new(config: AlignerConfig, language: Language) -> Result<Self, AlignError> {
        config.validate()?;
        Ok(Self {
            config,
            language,
            cancel: None,
            cursor: SearchCursor::default(),
            reference: Vec::new(),
            recording_id: None,
            current_time: 0.0,
            rolling: RollingCer::new(),
            mismatches: Vec::new(),
            previous_pack: None,
            matches: Vec::new(),
        })
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    /// Aligns one segment's chunk sequence, appending to the accumulated
    /// match list. Swaps in the segment's reference text wholesale and
    /// resets all search state; earlier segments' matches are kept.
    pub fn align_segment(
        &mut self,
        segment: &SegmentContext,
        sink: &dyn MatchSink,
    ) -> Result<(), AlignError> {
        for chunk in &segment.chunks {
            if !chunk.duration.is_finite() || chunk.duration < 0.0 {
                return Err(AlignError::invalid_input(format!(
                    "chunk {} has invalid duration {}",
                    chunk.id, chunk.duration
                )));
            }
        }

        self.begin_segment(segment);
        for (index, chunk) in segment.chunks.iter().enumerate() {
            if self.cancel.as_ref().is_some_and(CancelToken::is_cancelled) {
                tracing::info!(
                    recording = self.recording_label(),
                    resolved = index,
                    "cancelled; returning matches accumulated so far"
                );
                break;
            }
            if self.rolling.all_above(self.config.lost_search_cer) {
                tracing::warn!(
                    recording = self.recording_label(),
                    resolved = index,
                    "recent CER stayed above the loss bound; abandoning segment"
                );
                break;
            }
            self.align_chunk(index, chunk, sink)?;
        }
        Ok(())
    }

    pub fn matches(&self) -> &[MatchRecord] {
        &self.matches
    }

    pub fn into_matches(self) -> Vec<MatchRecord> {
        self.matches
    }

    fn begin_segment(&mut self, segment: &SegmentContext) {
        tracing::info!(
            recording = segment.recording_id.as_deref().unwrap_or("default"),
            chunks = segment.chunks.len(),
            reference_chars = segment.reference_text.chars().count(),
            "starting alignment segment"
        );
        self.reference = segment.reference_text.chars().collect();
        self.recording_id = segment.recording_id.clone();
        self.cursor = SearchCursor::default();
        self.rolling = RollingCer::new();
        self.mismatches.clear();
        self.previous_pack = None;
        self.current_time = 0.0;
    }

    fn recording_label(&self) -> &str {
        self.recording_id.as_deref().unwrap_or("default")
    }

    fn align_chunk(
        &mut self,
        index: usize,
        chunk: &Chunk,
        sink: &dyn MatchSink,
    ) -> Result<(), AlignError> {
        let chunk_text = self.language.clean_chunk_text(&chunk.predicted_text);
        let chunk_len = chunk_text.chars().count();

        if let Some((window_len, cer)) = self.previous_pack {
            if cer > COMPOUND_CER_BOUND {
                self.cursor.shift_back += window_len;
                self.cursor.position = self.cursor.position.saturating_sub(window_len);
                self.cursor.try_combinations = true;
            }
        }

        self.mismatches.clear();
        let mut best: Option<Candidate> = None;
        let mut resolution = Resolution::Exhausted;

        let base = self.cursor.position.min(self.reference.len());
        let scan_bound = (base + SCAN_BOUND_FACTOR * chunk_len.max(1)).min(self.reference.len());
        for start in base..scan_bound {
            if self.mismatches.len() > self.config.shift_back_indicator {
                best = Some(self.recover());
                resolution = Resolution::Recovered;
                break;
            }

            let raw_end = start + chunk_len + WINDOW_SLACK + self.cursor.shift_back;
            let (window, removed) = self.window_at(start, raw_end, &chunk_text);
            let cut = self.refine_window(&window, &chunk_text, start, raw_end, removed);
            self.cursor.try_combinations = false;
            self.cursor.shift_back = 0;

            let matched_start = cut.start + cut.outcome.shift;
            let matched_end = matched_start + cut.outcome.text.chars().count() + cut.removed;
            let candidate = Candidate {
                text: cut.outcome.text,
                cer: cut.outcome.cer,
                range: (matched_start, matched_end),
            };

            if candidate.cer <= self.config.cer_threshold {
                tracing::debug!(
                    chunk = %chunk.id,
                    cer = candidate.cer,
                    start = matched_start,
                    end = matched_end,
                    "accepted candidate window"
                );
                self.previous_pack = None;
                self.cursor.position = matched_end;
                best = Some(candidate);
                resolution = Resolution::Accepted;
                break;
            }

            let improves = best.as_ref().map_or(true, |b| candidate.cer < b.cer);
            self.mismatches.push(MismatchRecord {
                window_text: candidate.text.clone(),
                chunk_text: chunk_text.clone(),
                cer: candidate.cer,
                start: matched_start,
                end: matched_end,
                chunk_index: index,
            });
            if improves {
                best = Some(candidate);
            }
        }

        if matches!(resolution, Resolution::Exhausted) {
            // Non-committal partial advance: stay close enough that the next
            // chunk can still pick the search up.
            self.cursor.position += chunk_len / EXHAUSTED_ADVANCE_DIVISOR;
            tracing::debug!(
                chunk = %chunk.id,
                position = self.cursor.position,
                "search bound exhausted; keeping best-seen candidate"
            );
        }

        let resolved = best.unwrap_or_else(|| Candidate {
            text: String::new(),
            cer: 1.0,
            range: (self.cursor.position, self.cursor.position),
        });

        let (text, range) = self
            .language
            .post_process(resolved.text, resolved.range, &self.reference);
        let record = MatchRecord {
            chunk_id: chunk.id.clone(),
            matched_text: text.trim().to_string(),
            chunk_text,
            start_time: self.current_time,
            end_time: self.current_time + chunk.duration,
            match_range: range,
            cer: resolved.cer,
            duration: chunk.duration,
        };
        sink.persist(&record)?;
        self.rolling.push(resolved.cer);
        self.current_time += chunk.duration;
        self.matches.push(record);
        Ok(())
    }

    /// Reference substring `[start, end)` in character offsets, clamped to
    /// the text. Strips a literal ellipsis the recognizer would not have
    /// transcribed, reporting how many reference characters were dropped.
    fn window_at(&self, start: usize, end: usize, chunk_text: &str) -> (String, usize) {
        let start = start.min(self.reference.len());
        let end = end.min(self.reference.len());
        let window: String = self.reference[start..end].iter().collect();
        if window.contains(ELLIPSIS) && !chunk_text.contains(ELLIPSIS) {
            (window.replace(ELLIPSIS, ""), ELLIPSIS.chars().count())
        } else {
            (window, 0)
        }
    }

    /// Cuts the window down to its best token-aligned substring. When window
    /// and chunk lengths are disproportionate, two corrective windows (the
    /// window's tail and a widened window) are also tried, keeping whichever
    /// cut scores lowest.
    fn refine_window(
        &self,
        window: &str,
        chunk_text: &str,
        start: usize,
        raw_end: usize,
        removed: usize,
    ) -> WindowCut {
        let combos = self.cursor.try_combinations;
        let mut chosen = WindowCut {
            outcome: cut_extra_tokens(window, chunk_text, combos),
            start,
            removed,
        };

        let window_len = window.chars().count();
        let chunk_len = chunk_text.chars().count();
        let cfg = &self.config;
        let disproportionate = chunk_len * cfg.long_window_ratio < window_len
            || (chunk_len < cfg.search_segment_length_upper_bound
                && cfg.search_segment_length_upper_bound < window_len);
        if !disproportionate {
            return chosen;
        }

        if window_len > cfg.reduce_long_search_segment {
            let skip = window_len - cfg.reduce_long_search_segment;
            let tail: String = window.chars().skip(skip).collect();
            let alt = cut_extra_tokens(&tail, chunk_text, combos);
            if alt.cer <= chosen.outcome.cer {
                chosen = WindowCut {
                    outcome: alt,
                    start: start + skip,
                    removed,
                };
            }
        }

        let (wide, wide_removed) =
            self.window_at(start, raw_end + cfg.widen_window_by, chunk_text);
        let alt = cut_extra_tokens(&wide, chunk_text, combos);
        if alt.cer < chosen.outcome.cer {
            chosen = WindowCut {
                outcome: alt,
                start,
                removed: wide_removed,
            };
        }
        chosen
    }

    /// Backtracks after a streak of poor matches: the least-bad mismatch
    /// becomes the chunk's result, and the cursor is repositioned a bounded
    /// number of characters before its end so the next chunk can re-anchor.
    fn recover(&mut self) -> Candidate {
        self.mismatches.sort_by(|a, b| a.cer.total_cmp(&b.cer));
        let best = self.mismatches[0].clone();
        let window_len = best.window_text.chars().count();

        let mut shift_back = (window_len / 2).min(self.config.shift_back_minimum_bound);
        let protected = protected_tail_len(&best.window_text);
        if protected > shift_back {
            shift_back = protected + 1;
        }

        self.cursor.position = best.end.saturating_sub(shift_back);
        self.cursor.shift_back = shift_back;
        self.cursor.try_combinations = true;
        self.previous_pack = Some((window_len, best.cer));
        tracing::warn!(
            chunk_index = best.chunk_index,
            chunk_text = %best.chunk_text,
            cer = best.cer,
            start = best.start,
            end = best.end,
            shift_back,
            "repeated mismatches; backtracking to best attempt"
        );

        Candidate {
            text: best.window_text,
            cer: best.cer,
            range: (best.start, best.end),
        }
    }
}

/// Characters covered by the window's final whole token (or final two
/// tokens when the last one is short punctuation), so a backward shift never
/// lands mid-token.
fn protected_tail_len(window_text: &str) -> usize {
    let tokens = split_tokens(window_text);
    let word_indices: Vec<usize> = tokens
        .iter()
        .enumerate()
        .filter(|(_, t)| !t.chars().all(char::is_whitespace))
        .map(|(i, _)| i)
        .collect();
    let Some(&last) = word_indices.last() else {
        return 0;
    };
    let from = if tokens[last].chars().count() <= PUNCTUATION_TOKEN_LEN {
        word_indices.iter().rev().nth(1).copied().unwrap_or(last)
    } else {
        last
    };
    tokens[from..].iter().map(|t| t.chars().count()).sum()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::pipeline::sink::NullMatchSink;

    fn segment(reference: &str, chunks: Vec<Chunk>) -> SegmentContext {
        SegmentContext {
            recording_id: None,
            reference_text: Arc::from(reference),
            chunks,
        }
    }

    fn chunk(id: &str, text: &str, duration: f64) -> Chunk {
        Chunk {
            id: id.to_string(),
            predicted_text: text.to_string(),
            duration,
            source: None,
        }
    }

    fn aligner() -> Aligner {
        Aligner::new(AlignerConfig::default(), Language::Generic).expect("valid default config")
    }

    #[test]
    fn aligns_consecutive_chunks_in_order() {
        let mut aligner = aligner();
        let seg = segment(
            "hello world today is nice",
            vec![
                chunk("c1", "hello world", 1.0),
                chunk("c2", "today is nice", 2.0),
            ],
        );
        aligner.align_segment(&seg, &NullMatchSink).unwrap();

        let matches = aligner.matches();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].matched_text, "hello world");
        assert_eq!(matches[0].cer, 0.0);
        assert_eq!(matches[0].match_range, (0, 11));
        assert_eq!(matches[1].matched_text, "today is nice");
        assert_eq!(matches[1].match_range, (11, 25));

        // timestamps come from cumulative durations, not reference offsets
        assert_eq!(matches[0].start_time, 0.0);
        assert_eq!(matches[0].end_time, 1.0);
        assert_eq!(matches[1].start_time, 1.0);
        assert_eq!(matches[1].end_time, 3.0);
    }

    #[test]
    fn accepts_noisy_chunk_below_threshold() {
        let mut aligner = aligner();
        let seg = segment(
            "Text to Be Mached extra words here",
            vec![chunk("c1", "text to be mached", 1.0)],
        );
        aligner.align_segment(&seg, &NullMatchSink).unwrap();

        let matches = aligner.matches();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].matched_text, "Text to Be Mached");
        assert!(matches[0].cer > 0.0);
        assert!(matches[0].cer <= AlignerConfig::DEFAULT_CER_THRESHOLD);
    }

    #[test]
    fn ellipsis_in_window_does_not_penalize_match() {
        let mut aligner = aligner();
        let seg = segment(
            "hello world ... today fine",
            vec![
                chunk("c1", "hello world", 1.0),
                chunk("c2", "today fine", 1.0),
            ],
        );
        aligner.align_segment(&seg, &NullMatchSink).unwrap();

        let matches = aligner.matches();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[0].matched_text, "hello world");
        assert_eq!(matches[0].cer, 0.0);
        assert!(matches[1].cer <= AlignerConfig::DEFAULT_CER_THRESHOLD);
    }

    #[test]
    fn lost_condition_stops_early_without_error() {
        let mut aligner = aligner();
        let chunks: Vec<Chunk> = (0..10)
            .map(|i| chunk(&format!("c{i}"), "zzzzzz", 1.0))
            .collect();
        let seg = segment(
            "aaaa bbbb cccc dddd eeee ffff gggg hhhh iiii jjjj kkkk",
            chunks,
        );
        aligner.align_segment(&seg, &NullMatchSink).unwrap();

        // all 8 rolling slots fill with CER > 0.5, so the 9th chunk is never
        // attempted
        assert_eq!(aligner.matches().len(), 8);
        assert!(aligner.matches().iter().all(|m| m.cer > 0.5));
    }

    #[test]
    fn recovery_backtracks_and_arms_combination_search() {
        let mut aligner = aligner();
        let seg = segment(
            "alpha beta gamma delta epsilon zeta eta theta",
            vec![chunk("c1", "qqqq qqqq", 1.0)],
        );
        aligner.align_segment(&seg, &NullMatchSink).unwrap();

        assert_eq!(aligner.matches().len(), 1);
        assert!(aligner.matches()[0].cer > AlignerConfig::DEFAULT_CER_THRESHOLD);
        // recovery repositioned the cursor and armed the wider search for
        // the next chunk
        assert!(aligner.cursor.try_combinations);
        assert!(aligner.previous_pack.is_some());
    }

    #[test]
    fn empty_reference_yields_low_confidence_record() {
        let mut aligner = aligner();
        let seg = segment("", vec![chunk("c1", "hello", 1.0)]);
        aligner.align_segment(&seg, &NullMatchSink).unwrap();

        let matches = aligner.matches();
        assert_eq!(matches.len(), 1);
        assert_eq!(matches[0].matched_text, "");
        assert_eq!(matches[0].cer, 1.0);
    }

    #[test]
    fn cancel_before_run_flushes_empty_result() {
        let token = CancelToken::new();
        token.cancel();
        let mut aligner = aligner().with_cancel(token);
        let seg = segment("hello world", vec![chunk("c1", "hello world", 1.0)]);
        aligner.align_segment(&seg, &NullMatchSink).unwrap();
        assert!(aligner.matches().is_empty());
    }

    #[test]
    fn rejects_non_finite_chunk_duration() {
        let mut aligner = aligner();
        let seg = segment("hello world", vec![chunk("c1", "hello", f64::NAN)]);
        let err = aligner.align_segment(&seg, &NullMatchSink).unwrap_err();
        assert!(matches!(err, AlignError::InvalidInput { .. }));
        assert!(aligner.matches().is_empty());
    }

    #[test]
    fn new_segment_resets_cursor_but_keeps_matches() {
        let mut aligner = aligner();
        let first = segment("hello world tail text", vec![chunk("c1", "hello world", 1.0)]);
        aligner.align_segment(&first, &NullMatchSink).unwrap();
        assert!(aligner.cursor.position > 0);

        let second = SegmentContext {
            recording_id: Some("rec2".to_string()),
            reference_text: Arc::from("fresh start here and more"),
            chunks: vec![chunk("c2", "fresh start here", 1.0)],
        };
        aligner.align_segment(&second, &NullMatchSink).unwrap();

        let matches = aligner.matches();
        assert_eq!(matches.len(), 2);
        assert_eq!(matches[1].matched_text, "fresh start here");
        // second segment's range is relative to its own reference text
        assert_eq!(matches[1].match_range.0, 0);
    }

    #[test]
    fn rolling_cer_reports_lost_only_when_full_window_is_bad() {
        let mut rolling = RollingCer::new();
        assert!(!rolling.all_above(0.5));
        for _ in 0..7 {
            rolling.push(0.9);
        }
        assert!(!rolling.all_above(0.5));
        rolling.push(0.9);
        assert!(rolling.all_above(0.5));
        rolling.push(0.1);
        assert!(!rolling.all_above(0.5));
    }

    #[test]
    fn protected_tail_spans_short_trailing_punctuation() {
        // last token is short punctuation, so the previous word joins the
        // protected span
        assert_eq!(protected_tail_len("hello world ."), "world .".chars().count());
        assert_eq!(protected_tail_len("hello world"), "world".chars().count());
        assert_eq!(protected_tail_len("   "), 0);
        assert_eq!(protected_tail_len(""), 0);
    }
}
