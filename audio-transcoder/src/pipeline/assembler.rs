//! Building the outgoing record.

use std::path::PathBuf;

use bytes::Bytes;
use serde_json::{Map, Value, json};

use super::capture::CapturedOutput;
use super::invoker::TranscodeJob;
use crate::record::{InputRecord, OutputRecord};

/// Prefix applied to every field carried over from the input record.
pub const ORIGINAL_PREFIX: &str = "original_";

/// Parameters that produced a [`ProcessedResult`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessingEcho {
    pub audio_filter: Option<String>,
    pub audio_codec: String,
    pub audio_bitrate: String,
    pub audio_sample_rate: u32,
    pub audio_channels: u8,
}

/// A successful transcode. After capture this holds the only copy of the output.
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedResult {
    pub path: PathBuf,
    pub filename: String,
    pub size: u64,
    pub format: String,
    pub content: Bytes,
    pub processing: ProcessingEcho,
}

impl ProcessedResult {
    pub fn new(job: TranscodeJob, captured: CapturedOutput) -> Self {
        Self {
            processing: ProcessingEcho {
                audio_filter: job.filter_graph,
                audio_codec: job.codec.to_string(),
                audio_bitrate: job.bitrate,
                audio_sample_rate: job.sample_rate,
                audio_channels: job.channels,
            },
            path: job.output_path,
            filename: job.output_filename,
            size: captured.size,
            format: job.output_format,
            content: captured.content,
        }
    }
}

pub struct RecordAssembler;

impl RecordAssembler {
    /// Merge the original record's fields, renamed `original_<key>`, with the result.
    ///
    /// The original `content` is never carried over.
    pub fn assemble(original: &InputRecord, result: ProcessedResult) -> OutputRecord {
        let mut fields = Map::with_capacity(original.fields().len() + 5);

        for (key, value) in original.fields() {
            fields.insert(format!("{}{}", ORIGINAL_PREFIX, key), value.clone());
        }

        fields.insert(
            "path".to_string(),
            Value::String(result.path.to_string_lossy().into_owned()),
        );
        fields.insert("filename".to_string(), Value::String(result.filename));
        fields.insert("size".to_string(), json!(result.size));
        fields.insert("format".to_string(), Value::String(result.format));
        fields.insert(
            "processing".to_string(),
            json!({
                "audio_filter": result.processing.audio_filter,
                "audio_codec": result.processing.audio_codec,
                "audio_bitrate": result.processing.audio_bitrate,
                "audio_sample_rate": result.processing.audio_sample_rate,
                "audio_channels": result.processing.audio_channels,
            }),
        );

        OutputRecord::new(fields, result.content)
    }
}
