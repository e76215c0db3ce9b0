//! Scoped cleanup of every file a pipeline run creates.
//!
//! A [`CleanupCoordinator`] is created at the start of each run and dropped at
//! the end of it, whichever way the run ends: success, early return on error,
//! or cancellation of the run's future. Dropping it deletes the tracked
//! output, the owned staged input and the run's scratch directory. A
//! caller-owned input is never touched.
//!
//! Deletion failures are logged and never surfaced as errors.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use tracing::{debug, warn};
use uuid::Uuid;

use super::stager::StagedInput;

/// Tracks the artifacts of a single pipeline run and removes them on drop.
#[derive(Debug)]
pub struct CleanupCoordinator {
    run_dir: PathBuf,
    run_dir_created: bool,
    input: Option<StagedInput>,
    output: Option<PathBuf>,
}

impl CleanupCoordinator {
    /// Start tracking a new run under `staging_dir`.
    ///
    /// The run's scratch directory is only named here; it is created on
    /// demand by [`ensure_run_dir`](Self::ensure_run_dir).
    pub fn new(staging_dir: &Path) -> Self {
        Self {
            run_dir: staging_dir.join(Uuid::new_v4().simple().to_string()),
            run_dir_created: false,
            input: None,
            output: None,
        }
    }

    pub fn run_dir(&self) -> &Path {
        &self.run_dir
    }

    /// Create the run's scratch directory if it does not exist yet.
    pub async fn ensure_run_dir(&mut self) -> std::io::Result<&Path> {
        if !self.run_dir_created {
            tokio::fs::create_dir_all(&self.run_dir).await?;
            self.run_dir_created = true;
            debug!(run_dir = %self.run_dir.display(), "Created run directory");
        }
        Ok(&self.run_dir)
    }

    /// Register the staged input. Only owned inputs are ever deleted.
    pub fn track_input(&mut self, input: StagedInput) {
        self.input = Some(input);
    }

    /// Register the engine's output path, whether or not it exists yet.
    pub fn track_output(&mut self, output: impl Into<PathBuf>) {
        self.output = Some(output.into());
    }

    /// Delete the output right away, once its bytes have been captured.
    pub fn discard_output(&mut self) {
        if let Some(output) = self.output.take() {
            remove_file_logged(&output, "output");
        }
    }

    fn run(&mut self) {
        self.discard_output();

        if let Some(input) = self.input.take() {
            if !input.owned {
                debug!(path = %input.path.display(), "Leaving caller-owned input in place");
            } else if input.path.starts_with(&self.run_dir) {
                remove_file_logged(&input.path, "staged input");
            } else {
                warn!(
                    path = %input.path.display(),
                    "Owned input is outside the run directory, not deleting"
                );
            }
        }

        if self.run_dir_created {
            match std::fs::remove_dir_all(&self.run_dir) {
                Ok(()) => debug!(run_dir = %self.run_dir.display(), "Removed run directory"),
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => warn!(
                    run_dir = %self.run_dir.display(),
                    error = %e,
                    "Failed to remove run directory"
                ),
            }
            self.run_dir_created = false;
        }
    }
}

impl Drop for CleanupCoordinator {
    fn drop(&mut self) {
        self.run();
    }
}

fn remove_file_logged(path: &Path, what: &str) {
    match std::fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "Deleted {}", what),
        Err(e) if e.kind() == ErrorKind::NotFound => {
            debug!(path = %path.display(), "No {} to delete", what)
        }
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to delete {}", what),
    }
}
