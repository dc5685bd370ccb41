//! Logging Infrastructure
//!
//! Console output always; daily rolling files when a log directory is given.

use std::path::Path;

use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, fmt};

/// File name prefix of the rolling log files
const LOG_FILE_PREFIX: &str = "print-server";

/// Initialize the logger with optional file output
///
/// `RUST_LOG`, when set, takes precedence over `log_level`. Calling this more
/// than once is harmless: later calls leave the first subscriber in place.
pub fn init_logger_with_file(log_level: Option<&str>, log_dir: Option<&Path>) {
    let level = log_level.unwrap_or("info");
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let console = fmt::layer()
        .with_file(false)
        .with_line_number(false)
        .with_thread_ids(false)
        .with_target(false);

    let file = log_dir.and_then(|dir| {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("Cannot create log directory {}: {}", dir.display(), e);
            return None;
        }
        let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
        Some(
            fmt::layer()
                .with_ansi(false)
                .with_target(false)
                .with_writer(appender),
        )
    });

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init();
}
