//! Per-language behavior bundle: sentence-ending punctuation, chunk-text
//! cleaning and post-match repairs. A closed set of variants selected once at
//! construction; adding a language means adding a variant here.

/// Languages the aligner knows how to post-process. `Generic` applies only
/// the language-neutral cleaning and is a safe default for Latin-script
/// transcripts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Language {
    #[default]
    Generic,
    Armenian,
}

impl Language {
    pub fn code(self) -> &'static str {
        match self {
            Self::Generic => "und",
            Self::Armenian => "hy",
        }
    }

    /// Sentence-ending punctuation, most common terminator last. Used when
    /// combining per-chunk ground-truth texts into one reference transcript.
    pub fn ending_punctuation(self) -> &'static str {
        match self {
            Self::Generic => ";:.",
            Self::Armenian => "\u{2024},\u{0589}",
        }
    }

    /// Cleans a chunk's predicted text before searching: strips hyphen
    /// spacing artifacts, applies the language hook, collapses whitespace
    /// runs.
    pub fn clean_chunk_text(self, text: &str) -> String {
        let text = text.replace(" - ", " ").replace(" -", " ").replace("- ", " ");
        let text = match self {
            // A recognizer artifact around the Armenian emphasis mark:
            // "Ե ՛վ" comes out where the transcript has "Եվ".
            Self::Armenian => text.replace("Ե \u{055B}վ", "Եվ"),
            Self::Generic => text,
        };
        collapse_whitespace(&text)
    }

    /// Repairs language-specific artifacts at a match's boundaries. The
    /// Armenian variant re-attaches the leading "ո" of a "ու" digraph the
    /// window boundary split off.
    pub fn post_process(
        self,
        matched_text: String,
        range: (usize, usize),
        reference: &[char],
    ) -> (String, (usize, usize)) {
        match self {
            Self::Generic => (matched_text, range),
            Self::Armenian => {
                let (start, end) = range;
                if matched_text.starts_with('\u{0582}')
                    && start > 0
                    && reference.get(start - 1) == Some(&'\u{0578}')
                {
                    let mut repaired = String::from('\u{0578}');
                    repaired.push_str(&matched_text);
                    (repaired, (start - 1, end))
                } else {
                    (matched_text, range)
                }
            }
        }
    }
}

/// Collapses every whitespace run to a single space without trimming the
/// ends.
fn collapse_whitespace(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut in_ws = false;
    for c in text.chars() {
        if c.is_whitespace() {
            if !in_ws {
                out.push(' ');
            }
            in_ws = true;
        } else {
            out.push(c);
            in_ws = false;
        }
    }
    out
}
