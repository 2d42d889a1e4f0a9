// Logging module
// Structured logging through the `tracing` ecosystem: human-readable
// stdout layer always, plus a daily-rolling JSON file when a log
// directory is configured.

use std::path::Path;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};
use tracing_appender::rolling;

/// Placeholder written into log records instead of sensitive values.
/// Password material, ephemerals, session keys, proofs, tokens, salts, and
/// verifiers must never appear in a record.
pub const REDACTED: &str = "[REDACTED]";

/// Initialize the logging system
pub fn initialize_logging(log_dir: Option<&str>, log_level: &str) {
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level));

    if let Some(dir) = log_dir {
        let path = Path::new(dir);
        if !path.exists() {
            let _ = std::fs::create_dir_all(path);
        }

        let file_appender = rolling::daily(dir, "boardingpassd.log");
        let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

        // The guard flushes on drop; it must live for the program duration
        std::mem::forget(guard);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(false)
                    .with_thread_ids(false),
            )
            .with(
                fmt::layer()
                    .json()
                    .with_writer(non_blocking)
                    .with_ansi(false)
                    .with_target(true),
            )
            .init();
    } else {
        tracing_subscriber::registry()
            .with(env_filter)
            .with(
                fmt::layer()
                    .with_ansi(true)
                    .with_target(false)
                    .with_thread_ids(false),
            )
            .init();
    }
}
