//! The transcode-and-cleanup pipeline.
//!
//! One [`AudioTranscoder::process`] call handles one record:
//!
//! 1. stage the input ([`InputStager`])
//! 2. build the filter graph ([`FilterGraphBuilder`])
//! 3. run the engine ([`TranscodeInvoker`])
//! 4. read the output back ([`OutputCapturer`])
//! 5. assemble the outgoing record ([`RecordAssembler`])
//!
//! A [`CleanupCoordinator`] is held for the whole run and removes every file
//! the run created when it goes out of scope.

mod assembler;
mod capture;
mod cleanup;
mod engine;
mod filter_graph;
mod invoker;
mod stager;

pub use assembler::{ORIGINAL_PREFIX, ProcessedResult, ProcessingEcho, RecordAssembler};
pub use capture::{CapturedOutput, OutputCapturer};
pub use cleanup::CleanupCoordinator;
pub use engine::{EngineReport, FfmpegEngine, TranscodeEngine};
pub use filter_graph::FilterGraphBuilder;
pub use invoker::{OUTPUT_PREFIX, TranscodeInvoker, TranscodeJob, codec_for_format};
pub use stager::{InputStager, StagedInput};

use std::sync::Arc;
use std::time::{Duration, Instant};

use tracing::{Instrument, Span, debug, error, info, info_span};

use crate::Result;
use crate::config::{AppConfig, ProcessingOptions};
use crate::record::{InputRecord, OutputRecord};

/// Record-driven audio transcoder.
///
/// Holds no per-record state, so one instance can serve concurrent
/// `process` calls; runs only share the staging directory, inside which
/// each run works in its own scratch directory.
pub struct AudioTranscoder {
    options: Arc<ProcessingOptions>,
    stager: InputStager,
    invoker: TranscodeInvoker,
    span: Span,
}

impl AudioTranscoder {
    /// Create a transcoder, creating the staging directory if needed.
    pub fn new(
        options: ProcessingOptions,
        engine: Arc<dyn TranscodeEngine>,
        timeout: Option<Duration>,
    ) -> Result<Self> {
        let options = Arc::new(options.validate()?);
        std::fs::create_dir_all(&options.buffer_path)?;

        let span = info_span!(
            "audio_transcoder",
            staging_dir = %options.buffer_path.display(),
            engine = engine.name()
        );
        span.in_scope(|| {
            debug!(filter_graph = ?FilterGraphBuilder::build(&options), "Transcoder ready")
        });

        Ok(Self {
            invoker: TranscodeInvoker::new(engine, Arc::clone(&options), timeout),
            stager: InputStager::new(),
            options,
            span,
        })
    }

    /// Create a transcoder backed by ffmpeg.
    pub fn from_config(config: &AppConfig) -> Result<Self> {
        Self::new(
            config.processing.clone(),
            Arc::new(FfmpegEngine::new(&config.engine)),
            config.engine.timeout(),
        )
    }

    pub fn options(&self) -> &ProcessingOptions {
        &self.options
    }

    /// Process one record. `None` means the record is dropped.
    ///
    /// Never panics on bad input and never propagates an error; failures are
    /// logged with the record's path or filename and the failure kind.
    pub async fn process(&self, record: &InputRecord) -> Option<OutputRecord> {
        let span = info_span!(parent: &self.span, "process", input = %record.describe());

        async {
            match self.try_process(record).await {
                Ok(output) => Some(output),
                Err(e) => {
                    error!(
                        input = %record.describe(),
                        kind = e.kind(),
                        "Failed to process audio record: {}",
                        e
                    );
                    None
                }
            }
        }
        .instrument(span)
        .await
    }

    /// Process one record, returning the failure instead of logging it.
    ///
    /// Cleanup runs on every exit path, including when the returned future
    /// is dropped before completion.
    pub async fn try_process(&self, record: &InputRecord) -> Result<OutputRecord> {
        let start = Instant::now();
        let mut cleanup = CleanupCoordinator::new(&self.options.buffer_path);

        let staged = self.stager.stage(record, &mut cleanup).await?;
        let filter_graph = FilterGraphBuilder::build(&self.options);

        let output_dir = cleanup.ensure_run_dir().await?.to_path_buf();
        let job = self.invoker.prepare(&staged, &output_dir, filter_graph);
        cleanup.track_output(&job.output_path);

        self.invoker.invoke(&job).await?;

        let captured = OutputCapturer::capture(&job.output_path).await?;
        cleanup.discard_output();

        let result = ProcessedResult::new(job, captured);
        info!(
            filename = %result.filename,
            size = result.size,
            owned_input = staged.owned,
            "Processed audio in {:.2}s",
            start.elapsed().as_secs_f64()
        );

        Ok(RecordAssembler::assemble(record, result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Error;
    use crate::config::{FilterType, OutputFormat};
    use async_trait::async_trait;
    use serde_json::json;
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::Mutex;
    use tempfile::TempDir;

    /// How a [`FakeEngine`] behaves.
    #[derive(Clone, Copy)]
    enum Behavior {
        /// Copy input to output and report success.
        Copy,
        /// Write a partial output, then report failure.
        FailWithPartialOutput,
        /// Report success without writing anything.
        LieAboutSuccess,
        /// Fail to start.
        Unavailable,
        /// Never finish.
        Hang,
    }

    struct FakeEngine {
        behavior: Behavior,
        jobs: Mutex<Vec<TranscodeJob>>,
    }

    impl FakeEngine {
        fn new(behavior: Behavior) -> Arc<Self> {
            Arc::new(Self {
                behavior,
                jobs: Mutex::new(Vec::new()),
            })
        }

        fn jobs(&self) -> Vec<TranscodeJob> {
            self.jobs.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl TranscodeEngine for FakeEngine {
        fn name(&self) -> &'static str {
            "fake"
        }

        async fn transcode(&self, job: &TranscodeJob) -> Result<EngineReport> {
            self.jobs.lock().unwrap().push(job.clone());
            match self.behavior {
                Behavior::Copy => {
                    tokio::fs::copy(&job.input_path, &job.output_path).await?;
                    Ok(EngineReport::succeeded(0.01))
                }
                Behavior::FailWithPartialOutput => {
                    tokio::fs::write(&job.output_path, b"partial").await?;
                    Ok(EngineReport::failed("Conversion failed!"))
                }
                Behavior::LieAboutSuccess => Ok(EngineReport::succeeded(0.01)),
                Behavior::Unavailable => Err(Error::engine("Failed to spawn ffmpeg")),
                Behavior::Hang => {
                    tokio::fs::write(&job.output_path, b"partial").await?;
                    std::future::pending::<()>().await;
                    unreachable!()
                }
            }
        }
    }

    struct Fixture {
        staging: TempDir,
        inputs: TempDir,
    }

    impl Fixture {
        fn new() -> Self {
            Self {
                staging: TempDir::new().unwrap(),
                inputs: TempDir::new().unwrap(),
            }
        }

        fn options(&self) -> ProcessingOptions {
            ProcessingOptions::passthrough(self.staging.path())
        }

        fn transcoder(
            &self,
            options: ProcessingOptions,
            engine: Arc<FakeEngine>,
        ) -> AudioTranscoder {
            AudioTranscoder::new(options, engine, Some(Duration::from_millis(200))).unwrap()
        }

        fn caller_file(&self, name: &str, data: &[u8]) -> PathBuf {
            let path = self.inputs.path().join(name);
            fs::write(&path, data).unwrap();
            path
        }

        fn staging_is_empty(&self) -> bool {
            fs::read_dir(self.staging.path()).unwrap().count() == 0
        }
    }

    fn path_record(path: &Path) -> InputRecord {
        InputRecord::from_path(path.to_string_lossy())
    }

    #[tokio::test]
    async fn test_process_path_record() {
        let fx = Fixture::new();
        let input = fx.caller_file("test.wav", b"RIFF-audio");
        let engine = FakeEngine::new(Behavior::Copy);
        let transcoder = fx.transcoder(fx.options(), engine.clone());

        let record = path_record(&input)
            .with_field("filename", "test.wav")
            .with_field("device", 0);
        let output = transcoder.process(&record).await.unwrap();

        assert_eq!(output.get("filename"), Some(&json!("processed_test.wav")));
        assert_eq!(output.get("format"), Some(&json!("wav")));
        assert_eq!(output.get("size"), Some(&json!(10)));
        assert_eq!(output.content().as_ref(), b"RIFF-audio");
        assert_eq!(
            output.get("original_path"),
            Some(&json!(input.to_string_lossy()))
        );
        assert_eq!(output.get("original_device"), Some(&json!(0)));
        assert!(output.get("processing").unwrap()["audio_filter"].is_null());

        // Caller data untouched, scratch space gone
        assert_eq!(fs::read(&input).unwrap(), b"RIFF-audio");
        assert!(fx.staging_is_empty());
        assert_eq!(engine.jobs().len(), 1);
    }

    #[tokio::test]
    async fn test_process_content_record() {
        let fx = Fixture::new();
        let engine = FakeEngine::new(Behavior::Copy);
        let transcoder = fx.transcoder(fx.options(), engine.clone());

        let record = InputRecord::from_content(b"inline-bytes".to_vec(), Some("memo.wav"));
        let output = transcoder.process(&record).await.unwrap();

        assert_eq!(output.get("filename"), Some(&json!("processed_memo.wav")));
        assert_eq!(output.content().as_ref(), b"inline-bytes");
        assert!(output.get("original_content").is_none());

        let job = &engine.jobs()[0];
        assert!(!job.input_path.exists());
        assert!(!job.output_path.exists());
        assert!(fx.staging_is_empty());
    }

    #[tokio::test]
    async fn test_unnamed_untagged_content_falls_back_to_aac() {
        let fx = Fixture::new();
        let engine = FakeEngine::new(Behavior::Copy);
        let transcoder = fx.transcoder(fx.options(), engine.clone());

        let record = InputRecord::from_content(b"bytes".to_vec(), None);
        let output = transcoder.process(&record).await.unwrap();

        assert_eq!(output.get("format"), Some(&json!("aac")));
        let filename = output.get("filename").unwrap().as_str().unwrap();
        assert!(filename.starts_with(OUTPUT_PREFIX));
        assert!(filename.ends_with(".aac"));
        assert_eq!(engine.jobs()[0].codec, "aac");
        assert!(fx.staging_is_empty());
    }

    #[tokio::test]
    async fn test_unnamed_content_uses_format_tag() {
        let fx = Fixture::new();
        let engine = FakeEngine::new(Behavior::Copy);
        let transcoder = fx.transcoder(fx.options(), engine.clone());

        let record = InputRecord::from_content(b"OggS".to_vec(), None).with_field("format", "ogg");
        let output = transcoder.process(&record).await.unwrap();

        assert_eq!(output.get("format"), Some(&json!("ogg")));
        assert_eq!(engine.jobs()[0].codec, "libvorbis");
    }

    #[tokio::test]
    async fn test_format_conversion() {
        let fx = Fixture::new();
        let input = fx.caller_file("test.wav", b"RIFF");
        let engine = FakeEngine::new(Behavior::Copy);
        let options = ProcessingOptions {
            output_format: OutputFormat::Mp3,
            ..fx.options()
        };
        let transcoder = fx.transcoder(options, engine.clone());

        let output = transcoder.process(&path_record(&input)).await.unwrap();
        assert_eq!(output.get("format"), Some(&json!("mp3")));
        assert_eq!(output.get("filename"), Some(&json!("processed_test.mp3")));
        assert_eq!(output.get("processing").unwrap()["audio_codec"], "libmp3lame");
        assert_eq!(engine.jobs()[0].codec, "libmp3lame");
    }

    #[tokio::test]
    async fn test_filter_graph_reaches_engine() {
        let fx = Fixture::new();
        let input = fx.caller_file("test.wav", b"RIFF");
        let engine = FakeEngine::new(Behavior::Copy);
        let options = ProcessingOptions {
            normalize: true,
            filter_type: FilterType::Highpass,
            filter_frequency: 200,
            ..fx.options()
        };
        let transcoder = fx.transcoder(options, engine.clone());

        let output = transcoder.process(&path_record(&input)).await.unwrap();
        let expected = "loudnorm=I=-16:TP=-1.5:LRA=11,highpass=f=200";
        assert_eq!(engine.jobs()[0].filter_graph.as_deref(), Some(expected));
        assert_eq!(output.get("processing").unwrap()["audio_filter"], expected);
    }

    #[tokio::test]
    async fn test_nonexistent_input_is_dropped() {
        let fx = Fixture::new();
        let engine = FakeEngine::new(Behavior::Copy);
        let transcoder = fx.transcoder(fx.options(), engine.clone());

        let record = InputRecord::from_path("/no/such/file.wav");
        assert!(transcoder.process(&record).await.is_none());
        assert!(engine.jobs().is_empty());
        assert!(fx.staging_is_empty());

        let err = transcoder.try_process(&record).await.unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn test_engine_failure_cleans_partial_output() {
        let fx = Fixture::new();
        let engine = FakeEngine::new(Behavior::FailWithPartialOutput);
        let transcoder = fx.transcoder(fx.options(), engine.clone());

        let record = InputRecord::from_content(b"bytes".to_vec(), Some("a.wav"));
        let err = transcoder.try_process(&record).await.unwrap_err();
        assert!(matches!(err, Error::EngineInvocation(_)));

        let job = &engine.jobs()[0];
        assert!(!job.output_path.exists());
        assert!(!job.input_path.exists());
        assert!(fx.staging_is_empty());
    }

    #[tokio::test]
    async fn test_engine_failure_keeps_caller_file() {
        let fx = Fixture::new();
        let input = fx.caller_file("keep.wav", b"caller");
        let engine = FakeEngine::new(Behavior::FailWithPartialOutput);
        let transcoder = fx.transcoder(fx.options(), engine);

        assert!(transcoder.process(&path_record(&input)).await.is_none());
        assert_eq!(fs::read(&input).unwrap(), b"caller");
        assert!(fx.staging_is_empty());
    }

    #[tokio::test]
    async fn test_success_without_artifact_is_failure() {
        let fx = Fixture::new();
        let engine = FakeEngine::new(Behavior::LieAboutSuccess);
        let transcoder = fx.transcoder(fx.options(), engine);

        let record = InputRecord::from_content(b"bytes".to_vec(), None);
        let err = transcoder.try_process(&record).await.unwrap_err();
        assert!(matches!(err, Error::MissingOutputArtifact(_)));
        assert!(fx.staging_is_empty());
    }

    #[tokio::test]
    async fn test_engine_unavailable() {
        let fx = Fixture::new();
        let engine = FakeEngine::new(Behavior::Unavailable);
        let transcoder = fx.transcoder(fx.options(), engine);

        let record = InputRecord::from_content(b"bytes".to_vec(), Some("a.wav"));
        assert!(transcoder.process(&record).await.is_none());
        assert!(fx.staging_is_empty());
    }

    #[tokio::test]
    async fn test_engine_timeout_cleans_up() {
        let fx = Fixture::new();
        let engine = FakeEngine::new(Behavior::Hang);
        let transcoder = fx.transcoder(fx.options(), engine.clone());

        let record = InputRecord::from_content(b"bytes".to_vec(), Some("a.wav"));
        let err = transcoder.try_process(&record).await.unwrap_err();
        assert!(matches!(err, Error::EngineTimeout(_)));
        assert!(err.is_transcode_failure());
        assert!(fx.staging_is_empty());
    }

    #[tokio::test]
    async fn test_cancelled_run_cleans_up() {
        let fx = Fixture::new();
        let engine = FakeEngine::new(Behavior::Hang);
        let transcoder =
            AudioTranscoder::new(fx.options(), engine.clone(), None).unwrap();

        let record = InputRecord::from_content(b"bytes".to_vec(), Some("a.wav"));
        let outcome =
            tokio::time::timeout(Duration::from_millis(100), transcoder.process(&record)).await;
        assert!(outcome.is_err());

        assert_eq!(engine.jobs().len(), 1);
        assert!(fx.staging_is_empty());
    }

    #[tokio::test]
    async fn test_concurrent_runs_with_same_name_do_not_collide() {
        let fx = Fixture::new();
        let engine = FakeEngine::new(Behavior::Copy);
        let transcoder = fx.transcoder(fx.options(), engine.clone());

        let first = InputRecord::from_content(b"first".to_vec(), Some("same.wav"));
        let second = InputRecord::from_content(b"second".to_vec(), Some("same.wav"));
        let (a, b) = tokio::join!(transcoder.process(&first), transcoder.process(&second));

        assert_eq!(a.unwrap().content().as_ref(), b"first");
        assert_eq!(b.unwrap().content().as_ref(), b"second");
        let jobs = engine.jobs();
        assert_ne!(jobs[0].output_path, jobs[1].output_path);
        assert!(fx.staging_is_empty());
    }

    #[test]
    fn test_new_creates_staging_dir() {
        let root = TempDir::new().unwrap();
        let staging = root.path().join("nested").join("staging");
        let options = ProcessingOptions::passthrough(&staging);

        AudioTranscoder::new(options, FakeEngine::new(Behavior::Copy), None).unwrap();
        assert!(staging.is_dir());
    }

    #[test]
    fn test_new_rejects_invalid_options() {
        let root = TempDir::new().unwrap();
        let options = ProcessingOptions {
            output_channels: 0,
            ..ProcessingOptions::passthrough(root.path())
        };
        let result = AudioTranscoder::new(options, FakeEngine::new(Behavior::Copy), None);
        assert!(matches!(result, Err(Error::Configuration(_))));
    }
}
