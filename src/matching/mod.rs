pub mod aligner;
pub mod cutting;
pub mod language;
pub mod metrics;

pub use cutting::{cut_extra_tokens, TrimOutcome};
pub use metrics::{character_error_rate, character_error_rate_approx, word_error_rate};
