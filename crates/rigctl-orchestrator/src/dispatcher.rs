//! Dispatcher: owns the hot-reload loop and the per-BIB task sets
//! (spec.md §4.I's "dedicated dispatcher owns the task set").

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use rigctl_config::ConfigLoader;
use rigctl_core::ids::{BibId, ClientId};
use rigctl_core::service_config::ServiceConfig;
use rigctl_core::workflow_model::BibWorkflowResult;
use rigctl_discovery::PortDiscovery;
use rigctl_eeprom::EepromReader;
use rigctl_gpio::{GpioProvider, RealGpioConfig};
use rigctl_pool::ReservationPool;
use rigctl_watch::{BibEvent, BibWatcher};
use tokio::sync::{mpsc, Notify, Semaphore};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::gpio_resolve::{self, ResolvedDevice};
use crate::task::UutPortTask;

/// How a BIB's task set re-runs its production loop over time (spec.md
/// §4.I: "single / continuous / scheduled / on-demand").
#[derive(Debug, Clone)]
pub enum ExecutionMode {
    /// Run once per (UUT, port), then stop.
    Single,
    /// Run back-to-back, pausing `cycle_interval` between passes.
    Continuous { cycle_interval: Duration },
    /// Wait `interval` between the end of one pass and the start of the next.
    Scheduled { interval: Duration },
    /// Wait for an external trigger (see [`Dispatcher::trigger_on_demand`]) before each pass.
    OnDemand,
}

struct BibTaskSet {
    cancel: CancellationToken,
    handles: Vec<JoinHandle<()>>,
}

/// Owns every component needed to go from a hot-reloaded BIB file to a
/// running set of per-(UUT, port) tasks: config loading, device
/// discovery/resolution, the reservation pool, and the task registry.
pub struct Dispatcher {
    config_loader: ConfigLoader,
    discovery: PortDiscovery,
    eeprom: EepromReader,
    pool: Arc<ReservationPool>,
    service_config: ServiceConfig,
    real_gpio_config: RealGpioConfig,
    shutdown_grace: Duration,
    loaded_bibs: DashMap<BibId, rigctl_core::config_model::BibConfiguration>,
    bib_tasks: DashMap<BibId, BibTaskSet>,
    on_demand: Arc<Notify>,
    results_tx: mpsc::UnboundedSender<BibWorkflowResult>,
    /// Caps concurrently-running (BIB, UUT, port) tasks service-wide
    /// (spec.md §9: `max_concurrent_uuts`, default unbounded). `None` means
    /// no cap is configured.
    concurrency_limit: Option<Arc<Semaphore>>,
    /// When set, only these BIB ids are ever started — the CLI's
    /// `--bib-ids` selection. `None` means `--discover-bibs`: every
    /// `bib_*.xml` the watcher finds is run.
    selected_bib_ids: Option<std::collections::HashSet<BibId>>,
}

impl Dispatcher {
    /// Build a dispatcher. Returns the dispatcher plus the receiving end
    /// of its result stream; every finished [`BibWorkflowResult`] is sent
    /// there exactly once, for the logging layer or a CLI summary to consume.
    pub fn new(
        service_config: ServiceConfig,
        real_gpio_config: RealGpioConfig,
        backups_dir: PathBuf,
    ) -> (Self, mpsc::UnboundedReceiver<BibWorkflowResult>) {
        Self::with_selection(service_config, real_gpio_config, backups_dir, None)
    }

    /// Like [`Self::new`], but restricts which BIB ids are ever started to
    /// `selected_bib_ids` (the CLI's `--bib-ids` flag). `None` runs every
    /// BIB the watcher discovers (`--discover-bibs`).
    pub fn with_selection(
        service_config: ServiceConfig,
        real_gpio_config: RealGpioConfig,
        backups_dir: PathBuf,
        selected_bib_ids: Option<std::collections::HashSet<BibId>>,
    ) -> (Self, mpsc::UnboundedReceiver<BibWorkflowResult>) {
        let (results_tx, results_rx) = mpsc::unbounded_channel();
        let config_loader =
            ConfigLoader::new(service_config.config_dir.clone(), backups_dir, service_config.backup_retention);
        let concurrency_limit = service_config.max_concurrent_uuts.map(|n| Arc::new(Semaphore::new(n)));

        let dispatcher = Self {
            config_loader,
            discovery: PortDiscovery::new(),
            eeprom: EepromReader::new(service_config.eeprom_ttl),
            pool: Arc::new(ReservationPool::new()),
            shutdown_grace: Duration::from_secs(5),
            service_config,
            real_gpio_config,
            loaded_bibs: DashMap::new(),
            bib_tasks: DashMap::new(),
            on_demand: Arc::new(Notify::new()),
            results_tx,
            concurrency_limit,
            selected_bib_ids,
        };
        (dispatcher, results_rx)
    }

    /// Wake every BIB task currently waiting on [`ExecutionMode::OnDemand`].
    pub fn trigger_on_demand(&self) {
        self.on_demand.notify_waiters();
    }

    pub fn pool(&self) -> &Arc<ReservationPool> {
        &self.pool
    }

    /// Run the hot-reload loop until `cancel` fires: consumes `watcher`'s
    /// event stream, starting/restarting/tearing down BIB task sets as
    /// `BibEvent`s arrive, then drains every remaining task set on exit.
    pub async fn run(self: Arc<Self>, watcher: Arc<BibWatcher>, mode: ExecutionMode, cancel: CancellationToken) {
        let mut events = watcher.run(cancel.clone()).await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => break,
                maybe_event = events.recv() => {
                    match maybe_event {
                        Some(event) => self.handle_event(event, mode.clone()).await,
                        None => break,
                    }
                }
            }
        }

        let ids: Vec<BibId> = self.bib_tasks.iter().map(|e| e.key().clone()).collect();
        for id in ids {
            self.stop_bib(&id).await;
        }
    }

    fn is_selected(&self, id: &BibId) -> bool {
        self.selected_bib_ids.as_ref().map(|ids| ids.contains(id)).unwrap_or(true)
    }

    async fn handle_event(self: &Arc<Self>, event: BibEvent, mode: ExecutionMode) {
        match event {
            BibEvent::Discovered(id, _) | BibEvent::Changed(id, _) => {
                if !self.is_selected(&id) {
                    return;
                }
                match self.config_loader.load_bib(&id) {
                    Ok(bib) => {
                        self.loaded_bibs.insert(id.clone(), bib.clone());
                        if let Err(e) = self.start_bib(bib, mode).await {
                            warn!(bib_id = %id, error = %e, "failed to start bib task set");
                        }
                    }
                    Err(e) => {
                        warn!(bib_id = %id, error = %e, "failed to load bib, attempting last known-good");
                        if let Some(bib) = self.config_loader.restore_latest_known_good(&id) {
                            self.loaded_bibs.insert(id.clone(), bib.clone());
                            if let Err(e) = self.start_bib(bib, mode).await {
                                warn!(bib_id = %id, error = %e, "failed to start bib task set from known-good snapshot");
                            }
                        }
                    }
                }
            }
            BibEvent::Removed(id) => {
                self.loaded_bibs.remove(&id);
                self.stop_bib(&id).await;
            }
            BibEvent::Error(id, message) => {
                warn!(bib_id = %id, error = %message, "bib event processing failed");
            }
        }
    }

    /// Cancel and terminate any existing task set for `bib.id`, resolve its
    /// device and ports, and spawn a fresh task set in the given mode.
    pub async fn start_bib(
        self: &Arc<Self>,
        bib: rigctl_core::config_model::BibConfiguration,
        mode: ExecutionMode,
    ) -> Result<(), crate::error::WorkflowError> {
        self.stop_bib(&bib.id).await;

        let groups = self.discovery.discover_groups().await?;
        let known_ids: Vec<BibId> = self.loaded_bibs.iter().map(|e| e.key().clone()).collect();
        let resolved: HashMap<BibId, ResolvedDevice> =
            gpio_resolve::resolve_devices(&groups, &self.eeprom, &known_ids, None);
        let device = resolved.get(&bib.id);

        let built = gpio_resolve::build_provider(&bib, device, self.real_gpio_config)?;
        let cancel = CancellationToken::new();
        if let Some(real) = built.real.clone() {
            gpio_resolve::spawn_poller(real, cancel.clone());
        }

        let candidates = gpio_resolve::flatten_candidates(&groups);
        let trigger_hardware_on_fail =
            bib.hardware_simulation.as_ref().map(|s| s.trigger_hardware_on_fail).unwrap_or(false);

        let mut handles = Vec::new();
        let mut skipped = 0usize;

        for uut in &bib.uuts {
            for port in &uut.ports {
                let port_name = device.and_then(|d| gpio_resolve::resolve_port_name(d, port.number));
                let Some(port_name) = port_name else {
                    skipped += 1;
                    continue;
                };

                let task = UutPortTask {
                    bib_id: bib.id.clone(),
                    uut_id: uut.id.clone(),
                    port_config: port.clone(),
                    port_name,
                    client_id: ClientId::from(format!("{}/{}/{}", bib.id, uut.id, port.number)),
                    unmatched_response_mode: self.service_config.unmatched_response_mode,
                    trigger_hardware_on_fail,
                    start_wait_timeout: Duration::from_secs(30),
                    critical_hold_time: self.real_gpio_config.signal_hold_time,
                };

                let pool = self.pool.clone();
                let gpio = built.provider.clone();
                let candidates = candidates.clone();
                let cancel_child = cancel.clone();
                let results_tx = self.results_tx.clone();
                let on_demand = self.on_demand.clone();
                let mode = mode.clone();
                let concurrency_limit = self.concurrency_limit.clone();

                handles.push(tokio::spawn(async move {
                    run_uut_loop(
                        task,
                        pool,
                        candidates,
                        gpio,
                        mode,
                        on_demand,
                        cancel_child,
                        results_tx,
                        concurrency_limit,
                    )
                    .await;
                }));
            }
        }

        if skipped > 0 {
            warn!(bib_id = %bib.id, skipped, "some ports could not be resolved to an OS device and were not started");
        }
        info!(bib_id = %bib.id, started = handles.len(), "bib task set started");

        self.bib_tasks.insert(bib.id.clone(), BibTaskSet { cancel, handles });
        Ok(())
    }

    /// Cancel and await (bounded by `shutdown_grace`) every task for `id`, if any.
    pub async fn stop_bib(&self, id: &BibId) {
        let Some((_, task_set)) = self.bib_tasks.remove(id) else { return };
        task_set.cancel.cancel();
        for handle in task_set.handles {
            if tokio::time::timeout(self.shutdown_grace, handle).await.is_err() {
                warn!(bib_id = %id, "uut task did not exit within the shutdown grace period");
            }
        }
    }

    pub fn running_bib_ids(&self) -> Vec<BibId> {
        self.bib_tasks.iter().map(|e| e.key().clone()).collect()
    }
}

/// Drives one (UUT, port) task's repeated passes according to `mode`,
/// forwarding each completed [`BibWorkflowResult`] and stopping on cancel.
async fn run_uut_loop(
    task: UutPortTask,
    pool: Arc<ReservationPool>,
    candidates: Vec<rigctl_core::discovery::SerialPortDescriptor>,
    gpio: Arc<dyn GpioProvider>,
    mode: ExecutionMode,
    on_demand: Arc<Notify>,
    cancel: CancellationToken,
    results_tx: mpsc::UnboundedSender<BibWorkflowResult>,
    concurrency_limit: Option<Arc<Semaphore>>,
) {
    loop {
        if cancel.is_cancelled() {
            return;
        }

        match &mode {
            ExecutionMode::OnDemand => {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = on_demand.notified() => {}
                }
            }
            ExecutionMode::Scheduled { interval } => {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    _ = tokio::time::sleep(*interval) => {}
                }
            }
            ExecutionMode::Single | ExecutionMode::Continuous { .. } => {}
        }

        let _permit = match &concurrency_limit {
            Some(sem) => {
                tokio::select! {
                    _ = cancel.cancelled() => return,
                    permit = sem.clone().acquire_owned() => Some(permit.expect("semaphore is never closed")),
                }
            }
            None => None,
        };

        let result = task.run(&pool, &candidates, &gpio, &cancel).await;
        let single_shot = matches!(mode, ExecutionMode::Single);
        let cancelled = cancel.is_cancelled();
        let _ = results_tx.send(result);

        if single_shot || cancelled {
            return;
        }

        if let ExecutionMode::Continuous { cycle_interval } = &mode {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(*cycle_interval) => {}
            }
        }
    }
}
