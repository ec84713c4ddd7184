//! `rigctl`: CLI entry point and service wiring (component/CLI, spec.md §6).
//!
//! Composes every component crate into a running service: loads the
//! logging and service configuration, stands up the hot-reload watcher and
//! dispatcher, and waits for `Ctrl-C` to shut down cleanly.

mod cli;

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use anyhow::{bail, Context};
use clap::Parser;
use rigctl_core::service_config::ServiceConfig;
use rigctl_gpio::RealGpioConfig;
use rigctl_orchestrator::{Dispatcher, ExecutionMode};
use rigctl_watch::BibWatcher;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = cli::Cli::parse();

    let logging_config = rigctl_logging::LoggingConfig::load(&cli.logging_config)
        .map_err(|e| anyhow::anyhow!("{e}"))
        .with_context(|| format!("loading logging configuration from {}", cli.logging_config.display()))?;
    let _logging_guards = rigctl_logging::init(&logging_config, cli.detailed_logs).map_err(|e| anyhow::anyhow!("{e}"))?;

    let mode = resolve_mode(&cli)?;

    let service_config_path = cli.service_config.clone().unwrap_or_else(|| cli.config_dir.join("rigctl.toml"));
    let mut service_config = ServiceConfig::load(&service_config_path)
        .with_context(|| format!("loading service configuration from {}", service_config_path.display()))?;
    service_config.config_dir = cli.config_dir.clone();
    service_config.log_dir = logging_config.log_dir.clone();

    std::fs::create_dir_all(&service_config.config_dir)
        .with_context(|| format!("config directory {} missing and could not be created", service_config.config_dir.display()))?;

    let real_gpio_config = RealGpioConfig {
        power_on_ready_bit: service_config.gpio.power_on_ready_bit,
        power_down_heads_up_bit: service_config.gpio.power_down_heads_up_bit,
        critical_fail_bit: service_config.gpio.critical_fail_bit,
        workflow_active_bit: service_config.gpio.workflow_active_bit,
        active_low: service_config.gpio.active_low,
        poll_period: service_config.gpio.poll_period,
        signal_hold_time: service_config.gpio.signal_hold_time,
    };

    let backups_dir = service_config.config_dir.join("backups");
    let reservation_ttl = service_config.reservation_ttl;
    let log_dir = service_config.log_dir.clone();
    let selected = cli.selected_bib_ids();

    let (dispatcher, mut results_rx) =
        Dispatcher::with_selection(service_config.clone(), real_gpio_config, backups_dir, selected);
    let dispatcher = Arc::new(dispatcher);

    let watcher = Arc::new(BibWatcher::new(
        service_config.config_dir.clone(),
        service_config.debounce_window,
        service_config.watcher_backoff,
    ));

    let cancel = CancellationToken::new();

    let results_task = {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    result = results_rx.recv() => {
                        match result {
                            Some(result) => rigctl_logging::record_result(&log_dir, &result),
                            None => break,
                        }
                    }
                }
            }
        })
    };

    let sweeper_task = {
        let pool = dispatcher.pool().clone();
        let cancel = cancel.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(reservation_ttl) => {
                        let swept = pool.sweep_expired(SystemTime::now());
                        if swept > 0 {
                            warn!(swept, "reservation pool swept expired allocations");
                        }
                    }
                }
            }
        })
    };

    info!(config_dir = %service_config.config_dir.display(), mode = ?cli.mode, "rigctl starting");

    let dispatcher_run = tokio::spawn({
        let dispatcher = dispatcher.clone();
        let watcher = watcher.clone();
        let cancel = cancel.clone();
        async move {
            dispatcher.run(watcher, mode, cancel).await;
        }
    });

    if tokio::signal::ctrl_c().await.is_err() {
        error!("failed to install Ctrl-C handler, shutting down immediately");
    }
    info!("shutdown requested, stopping running BIBs");
    cancel.cancel();

    let _ = dispatcher_run.await;
    let _ = results_task.await;
    let _ = sweeper_task.await;

    info!("rigctl stopped cleanly");
    Ok(())
}

fn resolve_mode(cli: &cli::Cli) -> anyhow::Result<ExecutionMode> {
    match cli.mode {
        cli::Mode::Single => Ok(ExecutionMode::Single),
        cli::Mode::Continuous => {
            let Some(interval) = cli.interval else { bail!("--mode continuous requires --interval") };
            Ok(ExecutionMode::Continuous { cycle_interval: Duration::from_secs_f64(interval) })
        }
        cli::Mode::Scheduled => {
            let Some(interval) = cli.interval else { bail!("--mode scheduled requires --interval") };
            Ok(ExecutionMode::Scheduled { interval: Duration::from_secs_f64(interval) })
        }
        cli::Mode::Ondemand => Ok(ExecutionMode::OnDemand),
    }
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn continuous_without_interval_is_a_fatal_argument_error() {
        let cli = cli::Cli::try_parse_from(["rigctl", "--mode", "continuous"]).unwrap();
        assert!(resolve_mode(&cli).is_err());
    }

    #[test]
    fn continuous_with_interval_resolves_to_a_cycle_interval() {
        let cli = cli::Cli::try_parse_from(["rigctl", "--mode", "continuous", "--interval", "2.5"]).unwrap();
        let mode = resolve_mode(&cli).unwrap();
        assert!(matches!(mode, ExecutionMode::Continuous { cycle_interval } if cycle_interval == Duration::from_secs_f64(2.5)));
    }

    #[test]
    fn single_mode_ignores_a_missing_interval() {
        let cli = cli::Cli::try_parse_from(["rigctl"]).unwrap();
        assert!(resolve_mode(&cli).is_ok());
    }
}
