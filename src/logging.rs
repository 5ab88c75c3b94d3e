//! Tracing initialization: JSON to a rotating daily file under `log_dir`,
//! pretty to stdout, both filtered by `RUST_LOG` (default `info`).

use anyhow::Result;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Holds the non-blocking file appender's flush guard; keep this alive for
/// the process lifetime or buffered log lines are lost on exit.
pub struct LoggingGuard {
    _file_guard: WorkerGuard,
}

pub fn init(log_dir: &str) -> Result<LoggingGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let file_appender = tracing_appender::rolling::daily(log_dir, "cardforge.log");
    let (non_blocking_file, file_guard) = tracing_appender::non_blocking(file_appender);

    let file_layer = tracing_subscriber::fmt::layer()
        .json()
        .with_writer(non_blocking_file)
        .with_ansi(false)
        .with_current_span(true)
        .with_target(true)
        .with_filter(env_filter);

    let stdout_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let stdout_layer = tracing_subscriber::fmt::layer()
        .pretty()
        .with_writer(std::io::stdout)
        .with_target(true)
        .with_filter(stdout_filter);

    tracing_subscriber::registry().with(file_layer).with(stdout_layer).init();

    Ok(LoggingGuard { _file_guard: file_guard })
}
