//! Logging setup.
//!
//! `RUST_LOG` wins over the configured filter. With a log file configured,
//! events also go to that file through a non-blocking writer; keep the
//! returned guard alive until shutdown or buffered lines are lost.

use crate::config::LoggingConfig;
use crate::error::{Result, TraceScopeError};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.filter))
        .map_err(|e| TraceScopeError::Config(format!("Invalid log filter: {}", e)))?;

    let (file_layer, guard) = match &config.log_file {
        Some(path) => {
            let directory = path
                .parent()
                .filter(|p| !p.as_os_str().is_empty())
                .unwrap_or_else(|| std::path::Path::new("."));
            let file_name = path.file_name().ok_or_else(|| {
                TraceScopeError::Config(format!("Log file {:?} has no file name", path))
            })?;
            std::fs::create_dir_all(directory)?;
            let appender = tracing_appender::rolling::never(directory, file_name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(tracing_subscriber::fmt::layer())
        .with(file_layer)
        .try_init()
        .map_err(|e| TraceScopeError::Config(format!("Logging already initialized: {}", e)))?;

    Ok(guard)
}
