#![forbid(unsafe_code)]

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt};

/// Environment variable that overrides the configured filter.
pub const LOG_ENV: &str = "BLOSSOM_LOG";

fn filter(level: Option<&str>, verbose: u8) -> EnvFilter {
    EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| {
        let directive = match (verbose, level) {
            (0, Some(level)) => level,
            (0, None) => "warn",
            (1, _) => "info",
            (2, _) => "debug",
            _ => "trace",
        };
        EnvFilter::new(directive)
    })
}

/// Install the global subscriber.
///
/// With a log file, events go through a non-blocking appender and the
/// returned guard must stay alive until the process exits so buffered
/// lines are flushed.
pub fn init_logging(level: Option<&str>, file: Option<&Path>, verbose: u8) -> Option<WorkerGuard> {
    let filter = filter(level, verbose);
    match file {
        Some(path) => {
            let dir = path.parent().unwrap_or_else(|| Path::new("."));
            let name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| "blossom.log".to_string());
            let appender = tracing_appender::rolling::never(dir, name);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let subscriber = fmt::fmt()
                .with_env_filter(filter)
                .with_writer(writer)
                .with_ansi(false)
                .with_thread_names(true)
                .with_timer(fmt::time::uptime())
                .finish();
            let _ = tracing::subscriber::set_global_default(subscriber);
            Some(guard)
        }
        None => {
            let subscriber = fmt::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .with_target(true)
                .compact()
                .finish();
            let _ = tracing::subscriber::set_global_default(subscriber);
            None
        }
    }
}
