//! Logging and tracing initialization

use std::fs::File;
use std::path::Path;
use tracing::Level;
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Verbosity selected on the CLI. `-v` bumps one level, `-vv` two, and so
/// on past Trace has no further effect.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogLevel {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl LogLevel {
    pub fn from_verbosity(verbosity: u8) -> Self {
        match verbosity {
            0 => LogLevel::Info,
            1 => LogLevel::Debug,
            _ => LogLevel::Trace,
        }
    }

    fn to_tracing_level(self) -> Level {
        match self {
            LogLevel::Error => Level::ERROR,
            LogLevel::Warn => Level::WARN,
            LogLevel::Info => Level::INFO,
            LogLevel::Debug => Level::DEBUG,
            LogLevel::Trace => Level::TRACE,
        }
    }
}

/// Initialize structured logging. Honors `RUST_LOG` if set; otherwise
/// scopes the default filter to the `contentforge` crates at `level`.
/// Writes JSON to `log_file` if given, compact text to stdout otherwise.
pub fn init_logging(level: LogLevel, log_file: Option<&Path>) -> anyhow::Result<()> {
    let level = level.to_tracing_level();
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(format!("contentforge={level}")))
        .map_err(|e| anyhow::anyhow!("failed to build log filter: {e}"))?;

    if let Some(path) = log_file {
        init_file_logging(path, env_filter)
    } else {
        init_stdout_logging(env_filter);
        Ok(())
    }
}

fn init_stdout_logging(env_filter: EnvFilter) {
    let fmt_layer = fmt::layer()
        .with_target(true)
        .with_thread_ids(false)
        .with_thread_names(false)
        .with_file(false)
        .with_line_number(false)
        .with_span_events(FmtSpan::NONE)
        .compact();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();
}

fn init_file_logging(log_path: &Path, env_filter: EnvFilter) -> anyhow::Result<()> {
    let file = File::create(log_path)
        .map_err(|e| anyhow::anyhow!("failed to create log file {}: {e}", log_path.display()))?;

    let fmt_layer = fmt::layer()
        .with_writer(file)
        .with_target(true)
        .with_thread_ids(true)
        .with_thread_names(true)
        .with_file(true)
        .with_line_number(true)
        .with_span_events(FmtSpan::CLOSE)
        .with_ansi(false)
        .json();

    tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt_layer)
        .init();

    Ok(())
}
