//! File logging for hook processes.
//!
//! Hooks share stdout/stderr with the host, so diagnostics go to a daily
//! rolling file under the project's `logs/` directory instead.

use std::env;

use phoenix_core::{ProjectLayout, DEBUG_LOG_ENV};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::EnvFilter;

const LOG_FILE_PREFIX: &str = "phoenix-hook.log";

/// Installs the global subscriber. Keep the guard alive until exit so
/// buffered lines are flushed. Returns `None` when logging could not be set up.
pub fn init(layout: &ProjectLayout) -> Option<WorkerGuard> {
    let logs_dir = layout.logs_dir();
    if fs_err::create_dir_all(&logs_dir).is_err() {
        return None;
    }

    // An unopenable log file disables logging; the hook itself still runs.
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(LOG_FILE_PREFIX)
        .build(&logs_dir)
        .ok()?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::fmt()
        .with_env_filter(filter())
        .with_writer(writer)
        .with_ansi(false)
        .with_target(false)
        .try_init()
        .ok()?;

    Some(guard)
}

fn filter() -> EnvFilter {
    let debug_enabled = env::var(DEBUG_LOG_ENV)
        .map(|value| matches!(value.as_str(), "1" | "true" | "TRUE" | "yes" | "YES"))
        .unwrap_or(false);
    if debug_enabled {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
    }
}
