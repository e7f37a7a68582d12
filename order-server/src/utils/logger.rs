//! Logging Infrastructure
//!
//! Structured logging with `RUST_LOG` support and optional daily-rolling
//! file output.

use std::path::Path;

use tracing_subscriber::EnvFilter;

/// Initialize the logger writing to stdout
pub fn init_logger(log_level: &str) -> anyhow::Result<()> {
    init_logger_with_file(log_level, None)
}

/// Initialize the logger with optional file output
///
/// `RUST_LOG` overrides `log_level` when set. A missing `log_dir` is created.
pub fn init_logger_with_file(log_level: &str, log_dir: Option<&str>) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(log_level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_target(true);

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(Path::new(dir))?;
            let file_appender = tracing_appender::rolling::daily(dir, "order-server");
            subscriber
                .with_ansi(false)
                .with_writer(file_appender)
                .try_init()
        }
        None => subscriber.try_init(),
    }
    .map_err(|e| anyhow::anyhow!("failed to install tracing subscriber: {e}"))
}
