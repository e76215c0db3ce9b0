//! Subscriber setup for the binary.

use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use crate::{Error, Result};

/// Directive used when `RUST_LOG` is not set.
pub const DEFAULT_LOG_FILTER: &str = "audio_transcoder=info";

/// Filter for the given verbosity. `quiet` wins over `verbose`.
pub fn log_filter(verbose: u8, quiet: bool) -> EnvFilter {
    if quiet {
        return EnvFilter::new("error");
    }
    match verbose {
        0 => EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER)),
        1 => EnvFilter::new("audio_transcoder=debug"),
        _ => EnvFilter::new("trace"),
    }
}

/// Install the global subscriber. Logs go to stderr; stdout carries records.
pub fn init_logging(verbose: u8, quiet: bool) -> Result<()> {
    tracing_subscriber::registry()
        .with(log_filter(verbose, quiet))
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(verbose > 0),
        )
        .try_init()
        .map_err(|e| Error::config(format!("Failed to initialize logging: {}", e)))
}
