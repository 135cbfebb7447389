use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::error::AlignError;
use crate::pipeline::traits::MatchSink;
use crate::types::MatchRecord;

/// Discards every record. The no-contention path for callers that only need
/// the returned match list.
#[derive(Debug, Default)]
pub struct NullMatchSink;

impl MatchSink for NullMatchSink {
    fn persist(&self, _record: &MatchRecord) -> Result<(), AlignError> {
        Ok(())
    }
}

/// Writes one JSON manifest line per record, plus an optional per-chunk
/// matched-text artifact. Appends are serialized behind a mutex so the sink
/// can be shared across recordings aligned in parallel; the lock covers both
/// the artifact and the manifest line so the two never interleave.
pub struct JsonlMatchSink {
    texts_dir: Option<PathBuf>,
    writer: Mutex<BufWriter<File>>,
}

impl JsonlMatchSink {
    /// Creates (or truncates) the manifest at `manifest_path`. When
    /// `texts_dir` is given, each record's matched text is additionally
    /// written there as `<chunk file stem>_matched.txt`.
    pub fn create(
        manifest_path: impl AsRef<Path>,
        texts_dir: Option<PathBuf>,
    ) -> Result<Self, AlignError> {
        let manifest_path = manifest_path.as_ref();
        if let Some(parent) = manifest_path.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent)
                    .map_err(|e| AlignError::io("create manifest directory", e))?;
            }
        }
        if let Some(dir) = &texts_dir {
            fs::create_dir_all(dir).map_err(|e| AlignError::io("create texts directory", e))?;
        }
        let file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(manifest_path)
            .map_err(|e| AlignError::io("open output manifest", e))?;
        Ok(Self {
            texts_dir,
            writer: Mutex::new(BufWriter::new(file)),
        })
    }

    fn artifact_path(&self, record: &MatchRecord) -> Option<PathBuf> {
        let dir = self.texts_dir.as_ref()?;
        let stem = Path::new(&record.chunk_id)
            .file_stem()
            .map(|s| s.to_string_lossy().into_owned())
            .unwrap_or_else(|| record.chunk_id.clone());
        Some(dir.join(format!("{stem}_matched.txt")))
    }
}

impl MatchSink for JsonlMatchSink {
    fn persist(&self, record: &MatchRecord) -> Result<(), AlignError> {
        let line = serde_json::to_string(record)
            .map_err(|e| AlignError::json("serialize match record", e))?;

        let mut writer = self
            .writer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        if let Some(path) = self.artifact_path(record) {
            fs::write(&path, record.matched_text.as_bytes())
                .map_err(|e| AlignError::io("write matched-text artifact", e))?;
        }
        writeln!(writer, "{line}").map_err(|e| AlignError::io("append manifest line", e))?;
        writer
            .flush()
            .map_err(|e| AlignError::io("flush output manifest", e))
    }
}
