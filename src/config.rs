use crate::error::AlignError;

/// Numeric knobs of the alignment search. All defaults were tuned on long
/// audiobook-style recordings with roughly sentence-sized chunks.
#[derive(Debug, Clone)]
pub struct AlignerConfig {
    /// A candidate window is accepted once its CER falls at or below this.
    pub cer_threshold: f64,
    /// The run for a reference segment is abandoned when every recent best-CER
    /// exceeds this value.
    pub lost_search_cer: f64,
    /// Minimum backward shift (in characters) applied when recovering from a
    /// streak of poor matches.
    pub shift_back_minimum_bound: usize,
    /// Number of consecutive mismatches on one chunk that must be exceeded
    /// before recovery kicks in.
    pub shift_back_indicator: usize,
    /// Windows longer than this while the chunk stays shorter are treated as
    /// disproportionate and get the corrective re-cut.
    pub search_segment_length_upper_bound: usize,
    /// Length (in characters) of the trailing sub-window tried when a window
    /// is disproportionately long.
    pub reduce_long_search_segment: usize,
    /// A window is disproportionate when it exceeds the chunk length times
    /// this factor.
    pub long_window_ratio: usize,
    /// How many characters past the window end the widened corrective window
    /// extends.
    pub widen_window_by: usize,
}

impl AlignerConfig {
    pub const DEFAULT_CER_THRESHOLD: f64 = 0.35;
    pub const DEFAULT_LOST_SEARCH_CER: f64 = 0.5;
    pub const DEFAULT_SHIFT_BACK_MINIMUM_BOUND: usize = 8;
    pub const DEFAULT_SHIFT_BACK_INDICATOR: usize = 4;
    pub const DEFAULT_SEARCH_SEGMENT_LENGTH_UPPER_BOUND: usize = 40;
    pub const DEFAULT_REDUCE_LONG_SEARCH_SEGMENT: usize = 30;
    pub const DEFAULT_LONG_WINDOW_RATIO: usize = 6;
    pub const DEFAULT_WIDEN_WINDOW_BY: usize = 10;

    /// Rejects thresholds the search loop cannot work with. Called once at
    /// construction; alignment itself never re-validates.
    pub fn validate(&self) -> Result<(), AlignError> {
        if !self.cer_threshold.is_finite() || self.cer_threshold <= 0.0 || self.cer_threshold > 1.0
        {
            return Err(AlignError::config(format!(
                "cer_threshold must be in (0, 1], got {}",
                self.cer_threshold
            )));
        }
        if !self.lost_search_cer.is_finite()
            || self.lost_search_cer <= 0.0
            || self.lost_search_cer > 1.0
        {
            return Err(AlignError::config(format!(
                "lost_search_cer must be in (0, 1], got {}",
                self.lost_search_cer
            )));
        }
        if self.shift_back_indicator == 0 {
            return Err(AlignError::config(
                "shift_back_indicator must be at least 1",
            ));
        }
        if self.long_window_ratio == 0 {
            return Err(AlignError::config("long_window_ratio must be at least 1"));
        }
        if self.reduce_long_search_segment == 0 {
            return Err(AlignError::config(
                "reduce_long_search_segment must be at least 1",
            ));
        }
        Ok(())
    }
}

impl Default for AlignerConfig {
    fn default() -> Self {
        Self {
            cer_threshold: Self::DEFAULT_CER_THRESHOLD,
            lost_search_cer: Self::DEFAULT_LOST_SEARCH_CER,
            shift_back_minimum_bound: Self::DEFAULT_SHIFT_BACK_MINIMUM_BOUND,
            shift_back_indicator: Self::DEFAULT_SHIFT_BACK_INDICATOR,
            search_segment_length_upper_bound: Self::DEFAULT_SEARCH_SEGMENT_LENGTH_UPPER_BOUND,
            reduce_long_search_segment: Self::DEFAULT_REDUCE_LONG_SEARCH_SEGMENT,
            long_window_ratio: Self::DEFAULT_LONG_WINDOW_RATIO,
            widen_window_by: Self::DEFAULT_WIDEN_WINDOW_BY,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = AlignerConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.cer_threshold, 0.35);
        assert_eq!(config.lost_search_cer, 0.5);
        assert_eq!(config.shift_back_minimum_bound, 8);
        assert_eq!(config.shift_back_indicator, 4);
        assert_eq!(config.search_segment_length_upper_bound, 40);
        assert_eq!(config.reduce_long_search_segment, 30);
    }

    #[test]
    fn rejects_out_of_range_cer_threshold() {
        let config = AlignerConfig {
            cer_threshold: 0.0,
            ..AlignerConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(crate::error::AlignError::Config { .. })
        ));

        let config = AlignerConfig {
            cer_threshold: 1.5,
            ..AlignerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_nan_lost_search_cer() {
        let config = AlignerConfig {
            lost_search_cer: f64::NAN,
            ..AlignerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn rejects_zero_shift_back_indicator() {
        let config = AlignerConfig {
            shift_back_indicator: 0,
            ..AlignerConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
