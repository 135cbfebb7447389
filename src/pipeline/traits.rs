use crate::error::AlignError;
use crate::types::MatchRecord;

/// Persistence collaborator receiving one record per resolved chunk, in
/// chunk order within a recording. Implementations shared across parallel
/// recordings must serialize their writes internally; the aligner never
/// locks on their behalf.
pub trait MatchSink: Send + Sync {
    fn persist(&self, record: &MatchRecord) -> Result<(), AlignError>;
}
