//! Tracing subscriber setup: console output plus an optional daily rolling
//! log file.

use anyhow::{Context as _, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt as _, util::SubscriberInitExt as _, EnvFilter};

use crate::config::LoggingConfig;

const LOG_FILE_PREFIX: &str = "data-explorer";

/// `RUST_LOG` wins over the configured directives.
pub fn env_filter(default_directives: &str) -> Result<EnvFilter> {
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default_directives))
        .with_context(|| format!("Invalid log filter: {default_directives}"))
}

/// Installs the global subscriber. Keep the returned guard alive for the
/// life of the process or buffered file output is lost.
pub fn init_logger(config: &LoggingConfig) -> Result<Option<WorkerGuard>> {
    let filter = env_filter(&config.filter)?;

    let (file_layer, guard) = match config.directory.as_deref() {
        Some(dir) => {
            let appender = file_appender(Path::new(dir))?;
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_target(true)
                .with_line_number(true)
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(true))
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    if let Some(dir) = &config.directory {
        tracing::info!("File logging enabled in {}", dir);
    }
    Ok(guard)
}

fn file_appender(dir: &Path) -> Result<RollingFileAppender> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory: {}", dir.display()))?;
    RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .filename_suffix("log")
        .build(dir)
        .context("Failed to create rolling file appender")
}
