//! Tracing setup for the `qaforge` binary.
//!
//! Two layers: compact human-readable output on stderr, and a daily-rolling
//! plain-text file under the store's `logs/` directory when it exists. The
//! filter comes from `RUST_LOG`, else `qaforge=info` (`qaforge=debug` with
//! `--verbose`).

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

pub const LOG_FILE_PREFIX: &str = "qaforge.log";

/// Keeps the file writer flushing; hold it until `main` returns.
pub struct LogGuard {
    _file: Option<WorkerGuard>,
}

pub fn default_directive(verbose: bool) -> &'static str {
    if verbose { "qaforge=debug" } else { "qaforge=info" }
}

fn env_filter(verbose: bool) -> EnvFilter {
    let default = default_directive(verbose);
    EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(default))
        .unwrap_or_else(|_| EnvFilter::new(default))
}

/// Install the global subscriber. A second call is a no-op.
pub fn init_logging(verbose: bool, log_dir: Option<&Path>) -> LogGuard {
    let stderr_layer = fmt::layer()
        .compact()
        .with_target(false)
        .with_writer(std::io::stderr);

    let (file_layer, guard) = match log_dir.filter(|dir| dir.is_dir()) {
        Some(dir) => {
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_PREFIX);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(env_filter(verbose))
        .with(stderr_layer)
        .with(file_layer)
        .try_init();

    LogGuard { _file: guard }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_directive_follows_verbosity() {
        assert_eq!(default_directive(false), "qaforge=info");
        assert_eq!(default_directive(true), "qaforge=debug");
    }

    #[test]
    fn test_init_is_idempotent_and_skips_missing_dir() {
        let missing = Path::new("/nonexistent/qaforge/logs");
        let _first = init_logging(false, Some(missing));
        let _second = init_logging(true, None);
    }
}
