//! Record-driven audio transcoding.
//!
//! An [`AudioTranscoder`] takes an [`InputRecord`] carrying either inline
//! audio bytes or a filesystem path, runs it through ffmpeg with a filter
//! graph derived from [`ProcessingOptions`], and returns an [`OutputRecord`]
//! holding the transcoded bytes. Every temporary file a run creates is gone
//! by the time `process` returns.

pub mod config;
pub mod error;
pub mod logging;
pub mod pipeline;
pub mod record;
pub mod utils;

pub use config::{AppConfig, EngineConfig, FilterType, OutputFormat, ProcessingOptions};
pub use error::{Error, Result};
pub use pipeline::{
    AudioTranscoder, EngineReport, FfmpegEngine, FilterGraphBuilder, TranscodeEngine, TranscodeJob,
};
pub use record::{InputRecord, InputSource, OutputRecord};
