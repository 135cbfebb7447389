//! NeMo-style JSONL predictions-manifest ingestion: one JSON object per
//! line with the recognizer's prediction, the chunk's duration and,
//! optionally, the ground-truth text used to build a combined reference
//! transcript.

use std::fs::File;
use std::io::{BufRead, BufReader};
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::AlignError;
use crate::matching::language::Language;
use crate::types::Chunk;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestEntry {
    pub audio_filepath: String,
    pub pred_text: String,
    pub duration: f64,
    /// Ground-truth sentence, present when the manifest doubles as the
    /// source of the combined reference transcript.
    #[serde(default)]
    pub text: Option<String>,
    /// Ordering key for corpora where file names do not encode chunk order.
    #[serde(default)]
    pub id: Option<u64>,
}

/// Reads a JSONL manifest, skipping blank lines. Any malformed line or
/// invalid duration fails the whole read; a half-parsed chunk sequence is
/// worse than none.
pub fn read_manifest(path: impl AsRef<Path>) -> Result<Vec<ManifestEntry>, AlignError> {
    let file = File::open(path.as_ref()).map_err(|e| AlignError::io("open manifest", e))?;
    let reader = BufReader::new(file);

    let mut entries = Vec::new();
    for line in reader.lines() {
        let line = line.map_err(|e| AlignError::io("read manifest line", e))?;
        if line.trim().is_empty() {
            continue;
        }
        let entry: ManifestEntry =
            serde_json::from_str(&line).map_err(|e| AlignError::json("parse manifest line", e))?;
        if !entry.duration.is_finite() || entry.duration < 0.0 {
            return Err(AlignError::invalid_input(format!(
                "manifest entry {} has invalid duration {}",
                entry.audio_filepath, entry.duration
            )));
        }
        entries.push(entry);
    }
    Ok(entries)
}

/// Turns manifest entries into ordered chunks. With `order_by_id` set,
/// entries are sorted by their `id` field first (entries without one keep
/// their position at the front of the sort).
pub fn chunks_from_entries(entries: &[ManifestEntry], order_by_id: bool) -> Vec<Chunk> {
    let mut indexed: Vec<&ManifestEntry> = entries.iter().collect();
    if order_by_id {
        indexed.sort_by_key(|e| e.id.unwrap_or(0));
    }
    indexed
        .into_iter()
        .map(|entry| Chunk {
            id: entry.audio_filepath.clone(),
            predicted_text: entry.pred_text.clone(),
            duration: entry.duration,
            source: None,
        })
        .collect()
}

/// Concatenates per-entry ground-truth texts into one reference transcript.
/// Sentences that already end in a terminator get a joining space; anything
/// else gets the language's primary terminator so sentence boundaries stay
/// visible to the search.
pub fn combine_transcript(entries: &[ManifestEntry], language: Language) -> String {
    let ending = language.ending_punctuation();
    let terminators: String = format!(":,.{ending}");
    let primary = ending.chars().last().unwrap_or('.');

    let mut combined = String::new();
    for entry in entries {
        let Some(text) = entry.text.as_deref() else {
            continue;
        };
        if text.is_empty() {
            continue;
        }
        combined.push_str(text);
        match text.chars().last() {
            Some(last) if terminators.contains(last) => combined.push(' '),
            _ => combined.push(primary),
        }
    }
    combined
}
