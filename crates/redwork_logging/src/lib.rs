//! Shared logging setup for redwork binaries.
//!
//! Mirrors the teacher's split of a rolling file layer plus a stderr layer
//! behind one `EnvFilter`, but leans on `tracing-appender`'s rolling writer
//! instead of hand-rolling file rotation — this system doesn't need the
//! size-capped rotation the teacher's data pipeline wanted, just a
//! fresh-file-per-day handle.

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter, Layer};

const DEFAULT_LOG_FILTER: &str = "redwork_core=info,redwork_cli=info";

/// Logging configuration shared by redwork binaries.
pub struct LogConfig<'a> {
    pub app_name: &'a str,
    pub verbose: bool,
}

/// Guard returned by [`init_logging`]; drop it to flush buffered file writes.
pub struct LoggingGuard {
    _file_guard: tracing_appender::non_blocking::WorkerGuard,
}

/// Initialize tracing with a daily-rolling file writer and a stderr layer.
pub fn init_logging(config: LogConfig<'_>) -> Result<LoggingGuard> {
    let log_dir = ensure_logs_dir().context("failed to ensure log directory")?;
    let file_appender =
        tracing_appender::rolling::daily(&log_dir, format!("{}.log", config.app_name));
    let (non_blocking, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    let console_filter =
        if config.verbose { EnvFilter::new("debug") } else { file_filter.clone() };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_filter(file_filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_filter(console_filter),
        )
        .init();

    Ok(LoggingGuard { _file_guard: file_guard })
}

/// Get the redwork home directory: `~/.redwork`, overridable via `REDWORK_HOME`.
pub fn redwork_home() -> PathBuf {
    if let Ok(override_path) = std::env::var("REDWORK_HOME") {
        return PathBuf::from(override_path);
    }
    dirs::home_dir().unwrap_or_else(|| PathBuf::from(".")).join(".redwork")
}

/// Get the logs directory: `~/.redwork/logs`.
pub fn logs_dir() -> PathBuf {
    redwork_home().join("logs")
}

/// Ensure the logs directory exists, returning its path.
pub fn ensure_logs_dir() -> Result<PathBuf> {
    let logs = logs_dir();
    std::fs::create_dir_all(&logs)
        .with_context(|| format!("failed to create log directory: {}", logs.display()))?;
    Ok(logs)
}
