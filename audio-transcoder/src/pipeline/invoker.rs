//! Job assembly and engine invocation.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info};

use super::engine::TranscodeEngine;
use super::stager::StagedInput;
use crate::config::{OutputFormat, ProcessingOptions};
use crate::utils::split_extension;
use crate::{Error, Result};

/// Prefix of every output filename.
pub const OUTPUT_PREFIX: &str = "processed_";

/// Format used when the input format must be kept but cannot be determined.
const FALLBACK_FORMAT: &str = "aac";

/// A fully specified engine run.
#[derive(Debug, Clone, PartialEq)]
pub struct TranscodeJob {
    pub input_path: PathBuf,
    pub output_path: PathBuf,
    pub output_filename: String,
    /// Format tag of the output, also its extension.
    pub output_format: String,
    pub codec: &'static str,
    pub bitrate: String,
    pub sample_rate: u32,
    pub channels: u8,
    pub filter_graph: Option<String>,
    /// Always set: output paths are deterministic.
    pub overwrite: bool,
}

/// Audio codec for an output format tag. Unknown formats get AAC.
pub fn codec_for_format(format: &str) -> &'static str {
    match format.to_ascii_lowercase().as_str() {
        "mp3" => "libmp3lame",
        "aac" => "aac",
        "ogg" => "libvorbis",
        "flac" => "flac",
        "wav" => "pcm_s16le",
        _ => "aac",
    }
}

/// Prepares [`TranscodeJob`]s and runs them through a [`TranscodeEngine`].
pub struct TranscodeInvoker {
    engine: Arc<dyn TranscodeEngine>,
    options: Arc<ProcessingOptions>,
    timeout: Option<Duration>,
}

impl TranscodeInvoker {
    pub fn new(
        engine: Arc<dyn TranscodeEngine>,
        options: Arc<ProcessingOptions>,
        timeout: Option<Duration>,
    ) -> Self {
        Self {
            engine,
            options,
            timeout,
        }
    }

    /// Output format tag for a staged input.
    ///
    /// [`OutputFormat::Same`] keeps the input's extension, falling back to
    /// the record's format tag and then to AAC.
    pub fn output_format(&self, input: &StagedInput) -> String {
        match self.options.output_format.extension() {
            Some(ext) => ext.to_string(),
            None => split_extension(&input.name)
                .1
                .map(str::to_string)
                .or_else(|| input.format_tag.clone())
                .unwrap_or_else(|| FALLBACK_FORMAT.to_string()),
        }
    }

    /// `processed_<stem>.<format>`: the input's extension is replaced exactly once.
    pub fn output_filename(input: &StagedInput, format: &str) -> String {
        let (stem, _) = split_extension(&input.name);
        format!("{}{}.{}", OUTPUT_PREFIX, stem, format)
    }

    /// Assemble the job for `input`, writing into `output_dir`.
    pub fn prepare(
        &self,
        input: &StagedInput,
        output_dir: &Path,
        filter_graph: Option<String>,
    ) -> TranscodeJob {
        let output_format = self.output_format(input);
        let output_filename = Self::output_filename(input, &output_format);

        TranscodeJob {
            input_path: input.path.clone(),
            output_path: output_dir.join(&output_filename),
            output_filename,
            codec: codec_for_format(&output_format),
            output_format,
            bitrate: self.options.output_bitrate.clone(),
            sample_rate: self.options.output_sample_rate,
            channels: self.options.output_channels,
            filter_graph,
            overwrite: true,
        }
    }

    /// Run the job. Success requires both a successful engine report and
    /// an output file on disk.
    pub async fn invoke(&self, job: &TranscodeJob) -> Result<()> {
        info!(
            engine = self.engine.name(),
            input = %job.input_path.display(),
            output = %job.output_path.display(),
            codec = job.codec,
            "Transcoding audio"
        );
        debug!(?job, "Transcode job");

        let run = self.engine.transcode(job);
        let report = match self.timeout {
            Some(limit) => tokio::time::timeout(limit, run)
                .await
                .map_err(|_| Error::EngineTimeout(limit))??,
            None => run.await?,
        };

        if !report.success {
            return Err(Error::engine(
                report
                    .message
                    .unwrap_or_else(|| "engine reported failure".to_string()),
            ));
        }

        let exists = tokio::fs::metadata(&job.output_path)
            .await
            .map(|m| m.is_file())
            .unwrap_or(false);
        if !exists {
            return Err(Error::MissingOutputArtifact(job.output_path.clone()));
        }

        info!(
            "Transcode completed in {:.2}s: {}",
            report.duration_secs,
            job.output_path.display()
        );
        Ok(())
    }
}
