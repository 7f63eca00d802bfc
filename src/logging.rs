use crate::types::SyncError;
use std::env;
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

/// Environment variable that overrides the configured level
pub const LOG_ENV: &str = "JOURNSYNC_LOG";

/// Install the global subscriber: stdout, plus a plain-text file when `log_file` is set.
///
/// Keep the returned guard alive until exit or buffered file lines are lost.
pub fn init_logging(level: &str, log_file: Option<&Path>) -> Result<Option<WorkerGuard>, SyncError> {
    let filter = env::var(LOG_ENV).unwrap_or_else(|_| level.to_string());
    let filter_layer = EnvFilter::try_new(&filter)
        .map_err(|e| SyncError::Config(format!("Invalid log filter '{}': {}", filter, e)))?;

    let stdout_layer = fmt::layer()
        .with_writer(std::io::stdout)
        .with_target(false)
        .with_ansi(true);

    let (file_layer, guard) = match log_file {
        Some(path) => {
            let directory = path.parent().filter(|p| !p.as_os_str().is_empty()).unwrap_or(Path::new("."));
            let file_name = path
                .file_name()
                .ok_or_else(|| SyncError::Config(format!("Invalid log file path {}", path.display())))?;
            std::fs::create_dir_all(directory)?;

            let appender = tracing_appender::rolling::never(directory, file_name);
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_writer(non_blocking).with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter_layer)
        .with(stdout_layer)
        .with(file_layer)
        .try_init()
        .map_err(|e| SyncError::Config(format!("Logging already initialised: {}", e)))?;

    Ok(guard)
}
