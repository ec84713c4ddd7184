//! Logging setup for rigctl (component J): the central service log, the
//! per-BIB/UUT file hierarchy, and daily summaries.
//!
//! Composes three [`tracing_subscriber::Layer`]s on top of a shared
//! [`tracing_subscriber::Registry`]: an optional console layer, an optional
//! rolling file layer for the central service log, and [`router::BibRouterLayer`]
//! for per-entity routing. Per spec.md §6/§7, the logging configuration
//! file's absence is a fatal startup error, and so is the case where
//! neither the file sink nor the console sink could be stood up.

pub mod config;
pub mod error;
pub mod router;
pub mod summary;

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

pub use config::LoggingConfig;
pub use error::LoggingError;
pub use router::BibRouterLayer;
pub use summary::append_daily_summary;

/// Keeps the non-blocking file writer's background flush thread alive for
/// the service's lifetime. Dropping it stops the writer, so callers must
/// hold this for as long as logging is needed (typically the whole of `main`).
#[must_use = "dropping this stops the non-blocking file writer"]
pub struct LoggingGuards {
    _service_log: Option<WorkerGuard>,
}

/// Initialize global tracing with the central service log, the console
/// (if enabled), and per-BIB/UUT file routing.
///
/// `detailed` selects [`LoggingConfig::detailed_filter`] over
/// [`LoggingConfig::filter`], mirroring the CLI's `--detailed-logs` flag.
pub fn init(config: &LoggingConfig, detailed: bool) -> Result<LoggingGuards, LoggingError> {
    let directive = if detailed { &config.detailed_filter } else { &config.filter };

    let (file_layer, guard) = match tracing_appender::rolling::Builder::new()
        .rotation(tracing_appender::rolling::Rotation::DAILY)
        .filename_prefix("service")
        .filename_suffix("log")
        .build(&config.log_dir)
    {
        Ok(appender) => {
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_ansi(false)
                .with_filter(EnvFilter::new(directive.clone()));
            (Some(layer), Some(guard))
        }
        Err(err) => {
            if !config.console_enabled {
                return Err(LoggingError::NoSinkAvailable(err.to_string()));
            }
            eprintln!("rigctl-logging: could not open central log file ({err}), continuing with console only");
            (None, None)
        }
    };

    if file_layer.is_none() && !config.console_enabled {
        return Err(LoggingError::NoSinkAvailable("no file sink and console disabled".to_string()));
    }

    let console_layer = config
        .console_enabled
        .then(|| tracing_subscriber::fmt::layer().with_filter(EnvFilter::new(directive.clone())));

    let router_layer = BibRouterLayer::new(config.log_dir.clone());

    tracing_subscriber::registry().with(file_layer).with(console_layer).with(router_layer).init();

    Ok(LoggingGuards { _service_log: guard })
}

/// Append a [`rigctl_core::workflow_model::BibWorkflowResult`] to its BIB's
/// daily summary file, logging (rather than propagating) any failure: a
/// summary write failing must never unwind a workflow that already completed.
pub fn record_result(log_dir: &Path, result: &rigctl_core::workflow_model::BibWorkflowResult) {
    if let Err(err) = append_daily_summary(log_dir, result) {
        tracing::warn!(bib_id = %result.bib_id, uut_id = %result.uut_id, error = %err, "failed to append daily summary");
    }
}
