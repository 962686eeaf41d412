//! Diagnostics for the deploy engine.
//!
//! Connection, transfer and cache events go through `tracing`; audit events
//! use the `security` target. None of this is the deployment log itself,
//! which is written to a [`LogSink`](crate::sink::LogSink).

use std::path::PathBuf;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

const DEFAULT_FILTER: &str = "warn,autodeploy=info,security=info";

fn default_filter() -> EnvFilter {
    EnvFilter::new(DEFAULT_FILTER)
}

/// Install the subscriber. `RUST_LOG` replaces the default filter, which
/// keeps this crate and the audit trail at info and everything else at warn.
/// Lines go to stderr, away from the deployment log on stdout, and to a
/// daily `autodeploy.log` under `log_dir` when one is given.
///
/// Keep the returned guard alive until exit or buffered file lines are lost.
pub fn init_logging(log_dir: Option<PathBuf>) -> Option<WorkerGuard> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| default_filter());

    let console_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(true)
        .with_thread_ids(false);

    match log_dir {
        Some(dir) => {
            let file_appender = tracing_appender::rolling::daily(&dir, "autodeploy.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

            let file_layer = fmt::layer()
                .with_writer(non_blocking)
                .with_ansi(false)
                .with_target(true);

            tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .with(file_layer)
                .init();

            Some(guard)
        }
        None => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(console_layer)
                .init();
            None
        }
    }
}
