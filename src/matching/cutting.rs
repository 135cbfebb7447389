//! Token-trim optimizer: finds the token-aligned substring of a candidate
//! window that minimizes CER against a chunk's predicted text.
//!
//! The search window is deliberately wider than the true spoken span, and
//! recognizers routinely drop or garble leading/trailing words, so trimming
//! is CER-driven and operates on whole tokens only. Whitespace runs are kept
//! as their own tokens so that re-joining tokens reconstructs the exact
//! substring, spacing included.

use crate::matching::metrics::character_error_rate;

/// How many consecutive non-improving left trims the refinement phase
/// tolerates once the candidate is already shorter than the chunk text.
const REFINE_STALL_LIMIT: usize = 3;

/// Left-start indices tried by the combination search are capped here;
/// drifts larger than a few tokens are the recovery policy's job.
const MAX_LEFT_START: usize = 7;

/// Outcome of a trim run: the surviving window text, its CER against the
/// chunk text, and how many characters were dropped from the window's left
/// edge (so the caller can advance its cursor).
#[derive(Debug, Clone, PartialEq)]
pub struct TrimOutcome {
    pub text: String,
    pub cer: f64,
    pub shift: usize,
}

/// Splits `text` into alternating maximal runs of non-whitespace and
/// whitespace characters. Concatenating the tokens reproduces `text`.
pub(crate) fn split_tokens(text: &str) -> Vec<String> {
    let mut tokens = Vec::new();
    let mut current = String::new();
    let mut current_is_ws = false;

    for c in text.chars() {
        let is_ws = c.is_whitespace();
        if current.is_empty() || is_ws == current_is_ws {
            current.push(c);
        } else {
            tokens.push(std::mem::take(&mut current));
            current.push(c);
        }
        current_is_ws = is_ws;
    }
    if !current.is_empty() {
        tokens.push(current);
    }
    tokens
}

/// All-caps tokens in reference transcripts mark styling (speaker names,
/// emphasis) the recognizer never reproduces; fold them to title case so
/// they don't distort the CER.
fn normalize_token(token: &str) -> String {
    if token.is_empty() || !token.chars().all(char::is_uppercase) {
        return token.to_string();
    }
    let mut chars = token.chars();
    let Some(first) = chars.next() else {
        return token.to_string();
    };
    let mut normalized: String = first.to_uppercase().collect();
    normalized.extend(chars.flat_map(char::to_lowercase));
    normalized
}

fn tokenize(text: &str) -> Vec<String> {
    split_tokens(text)
        .iter()
        .map(|t| normalize_token(t))
        .collect()
}

fn char_len(tokens: &[String]) -> usize {
    tokens.iter().map(|t| t.chars().count()).sum()
}

/// Trims extra tokens from `window` so the remainder best matches
/// `chunk_text`.
///
/// With `try_combinations` unset only trailing tokens are dropped and
/// `shift` stays 0. With it set, a two-phase search additionally removes
/// leading tokens: an outer scan over a few left-start positions crossed
/// with every right end, then incremental left-trim refinement of the best
/// candidate. Ties go to the shorter candidate.
pub fn cut_extra_tokens(window: &str, chunk_text: &str, try_combinations: bool) -> TrimOutcome {
    let tokens = tokenize(window);
    let full = tokens.concat();
    let mut best_cer = character_error_rate(&full, chunk_text);
    let mut best_cut = full;
    let mut shift = 0usize;

    if !try_combinations {
        for i in (1..=tokens.len()).rev() {
            let cutted = tokens[..i].concat();
            let cer = character_error_rate(&cutted, chunk_text);
            if cer <= best_cer {
                best_cer = cer;
                best_cut = cutted;
            }
        }
        return TrimOutcome {
            text: best_cut,
            cer: best_cer,
            shift,
        };
    }

    let left_start_bound = tokens.len().saturating_sub(4).min(MAX_LEFT_START);
    for start in 1..left_start_bound {
        for end in ((start + 1)..=tokens.len()).rev() {
            let cutted = tokens[start..end].concat();
            let cer = character_error_rate(&cutted, chunk_text);
            if cer <= best_cer {
                best_cer = cer;
                best_cut = cutted;
                shift = char_len(&tokens[..start]);
            }
        }
    }

    // Refinement: keep nibbling tokens off the left of the winner for as
    // long as the CER holds, with a stall guard so pathological inputs
    // cannot trim forever once the candidate is shorter than the chunk.
    let init_shift = shift;
    let refine_tokens = tokenize(&best_cut);
    let chunk_len = chunk_text.chars().count();
    let mut stalled = 0usize;
    for i in 0..refine_tokens.len() {
        let cutted = refine_tokens[i..].concat();
        if stalled >= REFINE_STALL_LIMIT && cutted.chars().count() < chunk_len {
            break;
        }
        let cer = character_error_rate(&cutted, chunk_text);
        if cer <= best_cer {
            stalled = 0;
            best_cer = cer;
            best_cut = cutted;
            shift = init_shift + char_len(&refine_tokens[..i]);
        } else {
            stalled += 1;
        }
    }

    TrimOutcome {
        text: best_cut,
        cer: best_cer,
        shift,
    }
}
