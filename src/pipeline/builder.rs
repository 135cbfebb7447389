use std::sync::Arc;

use crate::config::AlignerConfig;
use crate::error::AlignError;
use crate::matching::language::Language;
use crate::pipeline::runner::{AlignmentRunner, RunnerParts};
use crate::pipeline::sink::NullMatchSink;
use crate::pipeline::traits::MatchSink;
use crate::types::CancelToken;

/// Assembles an [`AlignmentRunner`]. Configuration is validated at `build`
/// time; an invalid threshold never reaches the search loop.
pub struct AlignmentRunnerBuilder {
    config: AlignerConfig,
    language: Language,
    sink: Option<Arc<dyn MatchSink>>,
    parallel: bool,
    show_progress: bool,
    cancel: Option<CancelToken>,
}

impl AlignmentRunnerBuilder {
    pub fn new(config: AlignerConfig) -> Self {
        Self {
            config,
            language: Language::default(),
            sink: None,
            parallel: false,
            show_progress: false,
            cancel: None,
        }
    }

    pub fn with_language(mut self, language: Language) -> Self {
        self.language = language;
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn MatchSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Fan independent recordings out across rayon workers. Chunks within
    /// one recording always stay sequential.
    pub fn parallel(mut self, parallel: bool) -> Self {
        self.parallel = parallel;
        self
    }

    pub fn with_progress(mut self, show_progress: bool) -> Self {
        self.show_progress = show_progress;
        self
    }

    pub fn with_cancel(mut self, token: CancelToken) -> Self {
        self.cancel = Some(token);
        self
    }

    pub fn build(self) -> Result<AlignmentRunner, AlignError> {
        self.config.validate()?;
        Ok(AlignmentRunner::from_parts(RunnerParts {
            config: self.config,
            language: self.language,
            sink: self.sink.unwrap_or_else(|| Arc::new(NullMatchSink)),
            parallel: self.parallel,
            show_progress: self.show_progress,
            cancel: self.cancel,
        }))
    }
}
