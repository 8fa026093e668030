//! Tracing subscriber setup.
//!
//! Logs always go to stderr so stdout stays free for command output. When
//! file logging is enabled a daily-rolling file is written under
//! [`crate::dirs::logs_dir`] (or the configured directory) through a
//! non-blocking writer.

use crate::config::LoggingConfig;
use crate::error::{ClientError, Result};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::prelude::*;

/// File name prefix for rolling log files.
pub const LOG_FILE_PREFIX: &str = "autohomework.log";

/// Install the global tracing subscriber.
///
/// `RUST_LOG` takes precedence over [`LoggingConfig::level`]. The returned
/// guard must be held for the life of the process when file logging is on,
/// otherwise buffered lines are lost on exit.
///
/// # Errors
///
/// Returns an error if the log directory cannot be created or a global
/// subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));
    let stderr_layer = fmt::layer().with_writer(std::io::stderr);

    if !config.file_enabled {
        tracing_subscriber::registry()
            .with(filter)
            .with(stderr_layer)
            .try_init()
            .map_err(|e| ClientError::Logging(e.to_string()))?;
        return Ok(None);
    }

    let dir = config
        .directory
        .clone()
        .unwrap_or_else(crate::dirs::logs_dir);
    std::fs::create_dir_all(&dir)?;

    let appender = tracing_appender::rolling::daily(&dir, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    let file_layer = fmt::layer().with_ansi(false).with_writer(writer);

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| ClientError::Logging(e.to_string()))?;

    tracing::debug!(dir = %dir.display(), "file logging enabled");
    Ok(Some(guard))
}
