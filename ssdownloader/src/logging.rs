//! Tracing subscriber setup.
//!
//! Human-readable output goes to stderr so it never mixes with the summary
//! printed on stdout. An optional log file receives the same events without
//! ANSI colours through a non-blocking writer; the returned guard must be
//! held until exit so buffered lines are flushed.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Result type for logging setup.
pub type LoggingResult<T> = Result<T, LoggingError>;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log file path '{path}'")]
    InvalidPath { path: PathBuf },

    #[error("unable to create log directory '{path}': {source}")]
    CreateDir {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("unable to open log file: {0}")]
    Appender(#[from] tracing_appender::rolling::InitError),

    #[error("a global subscriber is already installed: {0}")]
    AlreadyInitialized(#[from] tracing_subscriber::util::TryInitError),
}

/// Default filter when `RUST_LOG` is not set.
pub fn default_directive(verbose: bool) -> &'static str {
    if verbose {
        "info,ssdownloader=debug,ssdownloader_cli=debug"
    } else {
        "info"
    }
}

fn file_appender(path: &Path) -> LoggingResult<RollingFileAppender> {
    let invalid = || LoggingError::InvalidPath {
        path: path.to_path_buf(),
    };
    let file_name = path.file_name().ok_or_else(invalid)?;
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };
    fs::create_dir_all(&dir).map_err(|e| LoggingError::CreateDir {
        path: dir.clone(),
        source: e,
    })?;

    Ok(RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name.to_string_lossy().into_owned())
        .build(dir)?)
}

/// Install the global subscriber.
pub fn init(verbose: bool, log_file: Option<&Path>) -> LoggingResult<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let (writer, guard) = tracing_appender::non_blocking(file_appender(path)?);
            (
                Some(fmt::layer().with_writer(writer).with_ansi(false)),
                Some(guard),
            )
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .compact()
                .with_writer(io::stderr)
                .with_target(verbose),
        )
        .with(file_layer)
        .with(filter)
        .try_init()?;

    Ok(guard)
}
