pub mod config;
pub mod error;
pub mod manifest;
pub mod matching;
pub mod pipeline;
pub mod types;

pub use config::AlignerConfig;
pub use error::AlignError;
pub use matching::aligner::Aligner;
pub use matching::language::Language;
pub use matching::{
    character_error_rate, character_error_rate_approx, cut_extra_tokens, word_error_rate,
    TrimOutcome,
};
pub use pipeline::builder::AlignmentRunnerBuilder;
pub use pipeline::runner::{partition_segments, AlignmentRunner, RunSummary};
pub use pipeline::sink::{JsonlMatchSink, NullMatchSink};
pub use pipeline::traits::MatchSink;
pub use types::{CancelToken, Chunk, MatchRecord, SegmentContext, SourceLink};
