//! Translation of declarative processing options into an ffmpeg `-af` graph.

use crate::config::{FilterType, ProcessingOptions};

/// True-peak ceiling for loudness normalization (dBTP).
const LOUDNORM_TRUE_PEAK: f64 = -1.5;

/// Loudness range target for loudness normalization (LU).
const LOUDNORM_RANGE: u32 = 11;

/// Builds the filter-graph string for a set of [`ProcessingOptions`].
pub struct FilterGraphBuilder;

impl FilterGraphBuilder {
    /// Build the filter graph, or `None` when no filtering is configured.
    ///
    /// A raw `audio_filter` is returned verbatim. Otherwise clauses are
    /// emitted as normalization, frequency filter, noise reduction, silence
    /// trim; the engine applies them in that order.
    pub fn build(options: &ProcessingOptions) -> Option<String> {
        if let Some(raw) = options.audio_filter.as_ref() {
            return Some(raw.clone());
        }

        let mut filters = Vec::with_capacity(4);

        if options.normalize {
            filters.push(format!(
                "loudnorm=I={}:TP={}:LRA={}",
                options.normalize_level, LOUDNORM_TRUE_PEAK, LOUDNORM_RANGE
            ));
        }

        if let Some(clause) = Self::frequency_clause(options.filter_type, options.filter_frequency)
        {
            filters.push(clause);
        }

        if options.noise_reduction {
            let (nr, nf) = Self::noise_reduction_params(options.noise_reduction_level);
            filters.push(format!("afftdn=nr={}:nf={}", nr, nf));
        }

        if options.trim_silence {
            let threshold = options.silence_threshold;
            filters.push(format!(
                "silenceremove=1:0:{threshold}dB:2:0:{threshold}dB"
            ));
        }

        (!filters.is_empty()).then(|| filters.join(","))
    }

    fn frequency_clause(filter_type: FilterType, frequency: u32) -> Option<String> {
        match filter_type {
            FilterType::None => None,
            FilterType::Lowpass => Some(format!("lowpass=f={}", frequency)),
            FilterType::Highpass => Some(format!("highpass=f={}", frequency)),
            FilterType::Bandpass => Some(format!(
                "bandpass=f={}:width_type=h:width={}",
                frequency,
                frequency / 2
            )),
        }
    }

    /// Map a 0.0-1.0 level to `afftdn` (noise reduction dB, noise floor dB).
    ///
    /// Each product is rounded half away from zero before the offset is applied.
    fn noise_reduction_params(level: f64) -> (i64, i64) {
        let nr = (level * 20.0).round() as i64;
        let nf = -25 - (level * 15.0).round() as i64;
        (nr, nf)
    }
}
