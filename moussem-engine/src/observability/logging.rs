//! Process-wide observability bootstrap: compact console output plus a
//! daily-rolling JSON file under the data directory, with the Prometheus
//! exporter started alongside when configured.

use tracing::warn;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::config::Config;

/// Per-target defaults when RUST_LOG is unset. The pipeline crates stay
/// chatty; the HTTP plumbing underneath them does not — a six-hour ingest
/// cycle over a dozen sources drowns the file log otherwise.
const DEFAULT_DIRECTIVES: &[&str] = &[
    "info",
    "moussem=debug",
    "moussem_engine=debug",
    "moussem_core=debug",
    "reqwest=warn",
    "hyper=warn",
];

/// Keeps the file writer flushing; hold it for the life of the process.
#[must_use]
pub struct LoggingGuard {
    _file: WorkerGuard,
}

pub fn init(config: &Config) -> LoggingGuard {
    let log_dir = config.data_dir.join("logs");
    let _ = std::fs::create_dir_all(&log_dir);
    let (file_writer, file_guard) =
        tracing_appender::non_blocking(tracing_appender::rolling::daily(&log_dir, "engine.log"));

    tracing_subscriber::registry()
        .with(env_filter())
        .with(fmt::layer().json().with_writer(file_writer))
        .with(fmt::layer().compact())
        .init();

    if let Some(port) = config.metrics_port {
        if let Err(e) = super::metrics::init(port) {
            warn!(error = %e, "metrics exporter not started");
        }
    }

    LoggingGuard { _file: file_guard }
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVES.join(",")))
}
