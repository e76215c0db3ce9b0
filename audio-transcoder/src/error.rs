//! Pipeline-wide error types.

use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

/// Pipeline-wide result type.
pub type Result<T> = std::result::Result<T, Error>;

/// Pipeline-wide error type.
#[derive(Error, Debug)]
pub enum Error {
    /// The record carries neither usable content nor an existing path.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The engine could not be started or exited with a failure status.
    #[error("Engine invocation failed: {0}")]
    EngineInvocation(String),

    /// The engine reported success but produced no output file.
    #[error("Engine reported success but no output exists at {}", .0.display())]
    MissingOutputArtifact(PathBuf),

    #[error("Engine timed out after {0:?}")]
    EngineTimeout(Duration),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl Error {
    pub fn invalid_input(msg: impl Into<String>) -> Self {
        Self::InvalidInput(msg.into())
    }

    pub fn engine(msg: impl Into<String>) -> Self {
        Self::EngineInvocation(msg.into())
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self::Configuration(msg.into())
    }

    /// Stable label used as the `kind` field in diagnostics.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid_input",
            Self::EngineInvocation(_) => "engine_invocation",
            Self::MissingOutputArtifact(_) => "missing_output_artifact",
            Self::EngineTimeout(_) => "engine_timeout",
            Self::Io(_) => "io",
            Self::Configuration(_) => "configuration",
            Self::Serialization(_) => "serialization",
        }
    }

    /// Whether this error means the transcode itself failed.
    pub fn is_transcode_failure(&self) -> bool {
        matches!(
            self,
            Self::EngineInvocation(_) | Self::MissingOutputArtifact(_) | Self::EngineTimeout(_)
        )
    }
}
