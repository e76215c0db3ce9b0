//! Reading the engine's output back into memory.

use std::io::ErrorKind;
use std::path::Path;

use bytes::Bytes;
use tracing::debug;

use crate::{Error, Result};

/// Bytes of a produced output file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapturedOutput {
    pub content: Bytes,
    pub size: u64,
}

pub struct OutputCapturer;

impl OutputCapturer {
    /// Read `output_path` fully.
    ///
    /// A file that vanished after the engine finished is reported as
    /// [`Error::MissingOutputArtifact`], i.e. a transcode failure.
    pub async fn capture(output_path: &Path) -> Result<CapturedOutput> {
        let content = match tokio::fs::read(output_path).await {
            Ok(content) => Bytes::from(content),
            Err(e) if e.kind() == ErrorKind::NotFound => {
                return Err(Error::MissingOutputArtifact(output_path.to_path_buf()));
            }
            Err(e) => return Err(Error::Io(e)),
        };

        let size = content.len() as u64;
        debug!(path = %output_path.display(), size, "Captured output");
        Ok(CapturedOutput { content, size })
    }
}
