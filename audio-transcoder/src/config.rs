//! Configuration for the transcoding pipeline.
//!
//! Options are deserialized once (from TOML or JSON) and validated by
//! [`AppConfig::validate`] before any record reaches the pipeline. After that
//! they are immutable for the lifetime of an [`AudioTranscoder`](crate::AudioTranscoder).

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;

use crate::{Error, Result};

/// Target container/codec family for transcoded output.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Keep the input's extension and derive the codec from it.
    #[default]
    Same,
    Mp3,
    Aac,
    Wav,
    Ogg,
    Flac,
}

impl OutputFormat {
    /// Extension for a concrete format, `None` for [`OutputFormat::Same`].
    pub fn extension(&self) -> Option<&'static str> {
        match self {
            Self::Same => None,
            Self::Mp3 => Some("mp3"),
            Self::Aac => Some("aac"),
            Self::Wav => Some("wav"),
            Self::Ogg => Some("ogg"),
            Self::Flac => Some("flac"),
        }
    }
}

/// Frequency-domain filter applied between normalization and noise reduction.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum FilterType {
    #[default]
    None,
    Lowpass,
    Highpass,
    Bandpass,
}

fn default_true() -> bool {
    true
}

fn default_normalize_level() -> i32 {
    -16
}

fn default_noise_reduction_level() -> f64 {
    0.21
}

fn default_filter_frequency() -> u32 {
    1000
}

fn default_silence_threshold() -> i32 {
    -60
}

fn default_bitrate() -> String {
    "192k".to_string()
}

fn default_sample_rate() -> u32 {
    44100
}

fn default_channels() -> u8 {
    1
}

fn default_buffer_path() -> PathBuf {
    std::env::temp_dir().join("audio-transcoder")
}

/// Declarative processing options for one pipeline instance.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProcessingOptions {
    /// Enable loudness normalization.
    #[serde(default = "default_true")]
    pub normalize: bool,

    /// Target integrated loudness (LUFS).
    #[serde(default = "default_normalize_level")]
    pub normalize_level: i32,

    /// Enable FFT noise reduction.
    #[serde(default = "default_true")]
    pub noise_reduction: bool,

    /// Noise reduction strength, 0.0 to 1.0.
    #[serde(default = "default_noise_reduction_level")]
    pub noise_reduction_level: f64,

    #[serde(default)]
    pub filter_type: FilterType,

    /// Cutoff (lowpass/highpass) or center (bandpass) frequency in Hz.
    #[serde(default = "default_filter_frequency")]
    pub filter_frequency: u32,

    /// Remove leading and trailing silence.
    #[serde(default = "default_true")]
    pub trim_silence: bool,

    /// Silence threshold in dB.
    #[serde(default = "default_silence_threshold")]
    pub silence_threshold: i32,

    #[serde(default)]
    pub output_format: OutputFormat,

    /// Audio bitrate passed to the engine (e.g. "192k").
    #[serde(default = "default_bitrate")]
    pub output_bitrate: String,

    #[serde(default = "default_sample_rate")]
    pub output_sample_rate: u32,

    #[serde(default = "default_channels")]
    pub output_channels: u8,

    /// Raw filter graph. When set, every declarative toggle above is ignored.
    #[serde(default)]
    pub audio_filter: Option<String>,

    /// Directory for staged inputs and engine outputs.
    #[serde(default = "default_buffer_path")]
    pub buffer_path: PathBuf,
}

impl Default for ProcessingOptions {
    fn default() -> Self {
        Self {
            normalize: true,
            normalize_level: default_normalize_level(),
            noise_reduction: true,
            noise_reduction_level: default_noise_reduction_level(),
            filter_type: FilterType::None,
            filter_frequency: default_filter_frequency(),
            trim_silence: true,
            silence_threshold: default_silence_threshold(),
            output_format: OutputFormat::Same,
            output_bitrate: default_bitrate(),
            output_sample_rate: default_sample_rate(),
            output_channels: default_channels(),
            audio_filter: None,
            buffer_path: default_buffer_path(),
        }
    }
}

impl ProcessingOptions {
    /// Options with every declarative toggle switched off.
    pub fn passthrough(buffer_path: impl Into<PathBuf>) -> Self {
        Self {
            normalize: false,
            noise_reduction: false,
            trim_silence: false,
            buffer_path: buffer_path.into(),
            ..Self::default()
        }
    }

    /// Validate and normalize the options.
    ///
    /// An empty `audio_filter` is treated as unset.
    pub fn validate(mut self) -> Result<Self> {
        if self
            .audio_filter
            .as_deref()
            .is_some_and(|f| f.trim().is_empty())
        {
            self.audio_filter = None;
        }

        if !self.noise_reduction_level.is_finite()
            || !(0.0..=1.0).contains(&self.noise_reduction_level)
        {
            return Err(Error::config(format!(
                "noise_reduction_level must be between 0.0 and 1.0, got {}",
                self.noise_reduction_level
            )));
        }

        if self.filter_type != FilterType::None && self.filter_frequency == 0 {
            return Err(Error::config(
                "filter_frequency must be greater than 0 when filter_type is set",
            ));
        }

        if self.output_sample_rate == 0 {
            return Err(Error::config("output_sample_rate must be greater than 0"));
        }

        if self.output_channels == 0 {
            return Err(Error::config("output_channels must be greater than 0"));
        }

        if self.output_bitrate.trim().is_empty() {
            return Err(Error::config("output_bitrate must not be empty"));
        }

        if self.buffer_path.as_os_str().is_empty() {
            return Err(Error::config("buffer_path must not be empty"));
        }

        Ok(self)
    }
}

fn default_ffmpeg_path() -> String {
    std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string())
}

fn default_timeout_secs() -> u64 {
    3600 // 1 hour
}

fn default_engine_loglevel() -> String {
    "warning".to_string()
}

/// Settings for the external ffmpeg engine.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct EngineConfig {
    /// Path to the ffmpeg binary. Falls back to `FFMPEG_PATH`, then `ffmpeg`.
    #[serde(default = "default_ffmpeg_path")]
    pub ffmpeg_path: String,

    /// Per-invocation timeout in seconds. `0` disables the timeout.
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Value passed to ffmpeg's `-loglevel`.
    #[serde(default = "default_engine_loglevel")]
    pub loglevel: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            ffmpeg_path: default_ffmpeg_path(),
            timeout_secs: default_timeout_secs(),
            loglevel: default_engine_loglevel(),
        }
    }
}

impl EngineConfig {
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

fn default_concurrency() -> usize {
    1
}

/// Top-level configuration file layout.
///
/// ```toml
/// concurrency = 4
///
/// [processing]
/// output_format = "mp3"
/// filter_type = "highpass"
/// filter_frequency = 80
///
/// [engine]
/// timeout_secs = 600
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AppConfig {
    #[serde(default)]
    pub processing: ProcessingOptions,

    #[serde(default)]
    pub engine: EngineConfig,

    /// Maximum number of records transcoded at once.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            processing: ProcessingOptions::default(),
            engine: EngineConfig::default(),
            concurrency: default_concurrency(),
        }
    }
}

impl AppConfig {
    /// Load configuration from a TOML file, or defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let config = match path {
            Some(path) => {
                debug!(path = %path.display(), "Loading configuration");
                let text = std::fs::read_to_string(path).map_err(|e| {
                    Error::config(format!("Failed to read {}: {}", path.display(), e))
                })?;
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };
        config.validate()
    }

    pub fn from_toml_str(text: &str) -> Result<Self> {
        toml::from_str(text).map_err(|e| Error::config(format!("Invalid configuration: {}", e)))
    }

    pub fn validate(mut self) -> Result<Self> {
        if self.concurrency == 0 {
            return Err(Error::config("concurrency must be at least 1"));
        }
        if self.engine.ffmpeg_path.trim().is_empty() {
            return Err(Error::config("engine.ffmpeg_path must not be empty"));
        }
        self.processing = self.processing.validate()?;
        Ok(self)
    }
}
