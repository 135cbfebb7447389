//! Character- and word-level error rates via classic unit-cost edit distance.
//!
//! These are the scoring primitives of the whole search: every candidate
//! window is ranked by [`character_error_rate`]. Both metrics normalize by
//! the *reference* length, so they are not symmetric in general.

/// Character error rate between `reference` and `hypothesis`.
///
/// Whitespace is stripped from both sides before comparison, then the
/// Levenshtein distance over characters is divided by the stripped reference
/// length. An empty reference scores 0 against an empty hypothesis and 1
/// against anything else.
pub fn character_error_rate(reference: &str, hypothesis: &str) -> f64 {
    let ref_chars: Vec<char> = reference.chars().filter(|c| !c.is_whitespace()).collect();
    let hyp_chars: Vec<char> = hypothesis.chars().filter(|c| !c.is_whitespace()).collect();

    if ref_chars.is_empty() {
        return if hyp_chars.is_empty() { 0.0 } else { 1.0 };
    }

    levenshtein(&ref_chars, &hyp_chars) as f64 / ref_chars.len() as f64
}

/// Cheap CER approximation from a longest-matching-blocks similarity ratio.
///
/// Not used by the search loop; kept for quick sanity checks where an exact
/// edit distance is overkill.
pub fn character_error_rate_approx(a: &str, b: &str) -> f64 {
    1.0 - similar::TextDiff::from_chars(a, b).ratio() as f64
}

/// Word error rate: unit-cost edit distance over whitespace-separated words,
/// divided by the reference word count. Both sides empty scores 0; exactly
/// one side empty scores 1.
pub fn word_error_rate(reference: &str, hypothesis: &str) -> f64 {
    let ref_words: Vec<&str> = reference.split_whitespace().collect();
    let hyp_words: Vec<&str> = hypothesis.split_whitespace().collect();

    match (ref_words.is_empty(), hyp_words.is_empty()) {
        (true, true) => 0.0,
        (true, false) | (false, true) => 1.0,
        (false, false) => {
            levenshtein(&ref_words, &hyp_words) as f64 / ref_words.len() as f64
        }
    }
}

/// Two-row Levenshtein with unit insertion/deletion/substitution costs.
fn levenshtein<T: PartialEq>(reference: &[T], hypothesis: &[T]) -> usize {
    let n = hypothesis.len();
    let mut prev: Vec<usize> = (0..=n).collect();
    let mut curr = vec![0usize; n + 1];

    for (i, r) in reference.iter().enumerate() {
        curr[0] = i + 1;
        for (j, h) in hypothesis.iter().enumerate() {
            let cost = usize::from(r != h);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[n]
}
