//! Input staging: turn a record into one readable file on disk.

use std::path::{Path, PathBuf};

use bytes::Bytes;
use tokio::io::AsyncWriteExt;
use tracing::debug;
use uuid::Uuid;

use super::cleanup::CleanupCoordinator;
use crate::record::{InputRecord, InputSource};
use crate::utils::sanitize_filename;
use crate::{Error, Result};

/// The resolved input file of a pipeline run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StagedInput {
    /// File handed to the engine.
    pub path: PathBuf,
    /// `true` when this pipeline wrote the file and must delete it.
    pub owned: bool,
    /// Logical filename used to derive the output name.
    pub name: String,
    /// The record's `format` tag, if any.
    pub format_tag: Option<String>,
}

impl StagedInput {
    pub fn owned(path: PathBuf, name: impl Into<String>, format_tag: Option<String>) -> Self {
        Self {
            path,
            owned: true,
            name: name.into(),
            format_tag,
        }
    }

    /// A caller-owned file. Its logical name is its base name.
    pub fn borrowed(path: PathBuf, format_tag: Option<String>) -> Self {
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        Self {
            path,
            owned: false,
            name,
            format_tag,
        }
    }
}

/// Materializes record inputs as files.
#[derive(Debug, Default)]
pub struct InputStager;

impl InputStager {
    pub fn new() -> Self {
        Self
    }

    /// Stage the record's input and register it with `cleanup`.
    ///
    /// Inline content is written into the run directory as a new file.
    /// A path is used as-is and marked caller-owned. Nothing is created
    /// when the record has no usable input.
    pub async fn stage(
        &self,
        record: &InputRecord,
        cleanup: &mut CleanupCoordinator,
    ) -> Result<StagedInput> {
        let format_tag = record.format().map(str::to_string);

        let staged = match record.source() {
            Some(InputSource::Content { bytes, filename }) => {
                // A path next to inline content only names it
                let logical_name = filename.or_else(|| {
                    record
                        .path()
                        .and_then(|p| Path::new(p).file_name())
                        .and_then(|n| n.to_str())
                });
                let name = match logical_name {
                    Some(name) => sanitize_filename(name),
                    None => generated_name(format_tag.as_deref()),
                };
                self.write_content(bytes, name, format_tag, cleanup).await?
            }
            Some(InputSource::Path(path)) => {
                let path = Path::new(path);
                let is_file = tokio::fs::metadata(path)
                    .await
                    .map(|m| m.is_file())
                    .unwrap_or(false);
                if !is_file {
                    return Err(Error::invalid_input(format!(
                        "Audio file does not exist: {}",
                        path.display()
                    )));
                }

                let staged = StagedInput::borrowed(path.to_path_buf(), format_tag);
                debug!(path = %staged.path.display(), "Using caller-owned input");
                cleanup.track_input(staged.clone());
                staged
            }
            None => {
                return Err(Error::invalid_input(
                    "record has neither content nor path",
                ));
            }
        };

        Ok(staged)
    }

    async fn write_content(
        &self,
        bytes: &Bytes,
        name: String,
        format_tag: Option<String>,
        cleanup: &mut CleanupCoordinator,
    ) -> Result<StagedInput> {
        let run_dir = cleanup.ensure_run_dir().await?.to_path_buf();
        let path = run_dir.join(&name);

        // create_new: never overwrite an existing file
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&path)
            .await?;

        let staged = StagedInput::owned(path, name, format_tag);
        cleanup.track_input(staged.clone());

        file.write_all(bytes).await?;
        file.flush().await?;

        debug!(
            path = %staged.path.display(),
            size = bytes.len(),
            "Staged inline content"
        );
        Ok(staged)
    }
}

/// `<uuid>.<format tag>`, or a bare `<uuid>` so output format selection
/// falls through to its defaults.
fn generated_name(format_tag: Option<&str>) -> String {
    let id = Uuid::new_v4().simple();
    match format_tag {
        Some(tag) => format!("{}.{}", id, sanitize_filename(tag)),
        None => id.to_string(),
    }
}
