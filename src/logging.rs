//! Tracing subscriber setup.
//!
//! Console output always goes through a `fmt` layer. When `log_dir` is set a
//! second, non-blocking layer writes daily rolling files; keep the returned
//! guard alive or buffered lines are lost at exit.

use crate::config::LogConfig;
use crate::error::{Result, RuntimeError};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Filter used when neither `RUST_LOG` nor the config provides one.
pub const DEFAULT_FILTER: &str = "info,vpu_runtime=debug";

/// Resolve the filter: `RUST_LOG` first, then the config, then the default.
pub fn env_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        let directives = config.filter.as_deref().unwrap_or(DEFAULT_FILTER);
        EnvFilter::try_new(directives).unwrap_or_else(|e| {
            eprintln!("Invalid log filter '{}': {}", directives, e);
            EnvFilter::new(DEFAULT_FILTER)
        })
    })
}

/// Install the global subscriber.
pub fn init(config: &LogConfig) -> Result<Option<WorkerGuard>> {
    let console = fmt::layer().with_ansi(config.ansi).with_thread_names(true);

    let (file, guard) = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| {
                RuntimeError::Config(format!("Failed to create log directory {}: {}", dir.display(), e))
            })?;
            let appender = tracing_appender::rolling::daily(dir, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_ansi(false)
                .with_thread_names(true)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(env_filter(config))
        .with(console)
        .with(file)
        .try_init()
        .map_err(|e| RuntimeError::Config(format!("Failed to install log subscriber: {}", e)))?;

    Ok(guard)
}
