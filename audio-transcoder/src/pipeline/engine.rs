//! The external transcoding engine.
//!
//! [`TranscodeEngine`] is the only place the pipeline touches the codec
//! implementation. [`FfmpegEngine`] runs the ffmpeg CLI; tests substitute
//! their own implementations.

use async_trait::async_trait;
use std::process::Stdio;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, warn};

use super::invoker::TranscodeJob;
use crate::config::EngineConfig;
use crate::{Error, Result};

/// Outcome of one engine run.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EngineReport {
    /// Whether the engine reported success.
    pub success: bool,
    /// Wall-clock duration of the run in seconds.
    pub duration_secs: f64,
    /// Last diagnostic line the engine emitted, if any.
    pub message: Option<String>,
}

impl EngineReport {
    pub fn succeeded(duration_secs: f64) -> Self {
        Self {
            success: true,
            duration_secs,
            message: None,
        }
    }

    pub fn failed(message: impl Into<String>) -> Self {
        Self {
            success: false,
            duration_secs: 0.0,
            message: Some(message.into()),
        }
    }
}

/// An external capability that converts `job.input_path` into `job.output_path`.
///
/// # Cancel Safety
///
/// The pipeline may drop the returned future when the invocation times out.
/// Implementations must not leave a running process behind when that happens.
#[async_trait]
pub trait TranscodeEngine: Send + Sync {
    /// Engine name for diagnostics.
    fn name(&self) -> &'static str;

    /// Run the job to completion.
    ///
    /// `Err` means the engine could not be run at all; a run that completed
    /// with a failure status is `Ok` with `success == false`.
    async fn transcode(&self, job: &TranscodeJob) -> Result<EngineReport>;
}

/// Engine backed by the ffmpeg command-line tool.
#[derive(Debug, Clone)]
pub struct FfmpegEngine {
    /// Path to ffmpeg binary.
    ffmpeg_path: String,
    loglevel: String,
}

impl FfmpegEngine {
    pub fn new(config: &EngineConfig) -> Self {
        Self {
            ffmpeg_path: config.ffmpeg_path.clone(),
            loglevel: config.loglevel.clone(),
        }
    }

    /// Create with a custom ffmpeg path.
    pub fn with_ffmpeg_path(path: impl Into<String>) -> Self {
        Self {
            ffmpeg_path: path.into(),
            ..Self::new(&EngineConfig::default())
        }
    }

    /// Check that the configured binary runs, returning its version banner.
    pub async fn probe(&self) -> Result<String> {
        let output = process_utils::engine_command(&self.ffmpeg_path)
            .arg("-version")
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            .output()
            .await
            .map_err(|e| {
                Error::config(format!("FFmpeg not available at {}: {}", self.ffmpeg_path, e))
            })?;

        if !output.status.success() {
            return Err(Error::config(format!(
                "FFmpeg at {} exited with {}",
                self.ffmpeg_path, output.status
            )));
        }

        let stdout = String::from_utf8_lossy(&output.stdout);
        Ok(stdout.lines().next().unwrap_or_default().to_string())
    }

    /// Build FFmpeg command arguments for a job.
    pub fn build_args(&self, job: &TranscodeJob) -> Vec<String> {
        let mut args = Vec::new();

        // Output paths are deterministic, so re-runs must not prompt
        if job.overwrite {
            args.push("-y".to_string());
        }

        args.push("-hide_banner".to_string());
        args.push("-nostats".to_string());
        args.extend(["-loglevel".to_string(), self.loglevel.clone()]);

        args.extend([
            "-i".to_string(),
            job.input_path.to_string_lossy().into_owned(),
        ]);

        // No video output
        args.push("-vn".to_string());

        args.extend(["-c:a".to_string(), job.codec.to_string()]);
        args.extend(["-b:a".to_string(), job.bitrate.clone()]);
        args.extend(["-ar".to_string(), job.sample_rate.to_string()]);
        args.extend(["-ac".to_string(), job.channels.to_string()]);

        if let Some(ref filter) = job.filter_graph {
            args.extend(["-af".to_string(), filter.clone()]);
        }

        args.push(job.output_path.to_string_lossy().into_owned());

        args
    }
}

#[async_trait]
impl TranscodeEngine for FfmpegEngine {
    fn name(&self) -> &'static str {
        "ffmpeg"
    }

    async fn transcode(&self, job: &TranscodeJob) -> Result<EngineReport> {
        let start = std::time::Instant::now();
        let args = self.build_args(job);
        debug!("FFmpeg args: {:?}", args);

        let mut cmd = process_utils::engine_command(&self.ffmpeg_path);
        cmd.args(&args).stdout(Stdio::null()).stderr(Stdio::piped());

        let mut child = cmd
            .spawn()
            .map_err(|e| Error::engine(format!("Failed to spawn {}: {}", self.ffmpeg_path, e)))?;

        let mut last_error = None;
        if let Some(stderr) = child.stderr.take() {
            let mut lines = BufReader::new(stderr).lines();
            while let Some(line) = lines
                .next_line()
                .await
                .map_err(|e| Error::engine(format!("Failed to read ffmpeg output: {}", e)))?
            {
                if line.to_lowercase().contains("error") {
                    warn!("ffmpeg: {}", line);
                    last_error = Some(line);
                } else {
                    debug!("ffmpeg: {}", line);
                }
            }
        }

        let status = child
            .wait()
            .await
            .map_err(|e| Error::engine(format!("Failed to wait for ffmpeg: {}", e)))?;

        let duration_secs = start.elapsed().as_secs_f64();
        if status.success() {
            return Ok(EngineReport::succeeded(duration_secs));
        }

        Ok(EngineReport {
            success: false,
            duration_secs,
            message: Some(format!(
                "ffmpeg failed with exit code {}: {}",
                status.code().unwrap_or(-1),
                last_error.unwrap_or_else(|| "Unknown ffmpeg error".to_string())
            )),
        })
    }
}
