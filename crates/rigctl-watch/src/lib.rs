//! Hot-reload configuration directory watcher (component D).
//!
//! Watches for `bib_*.xml` add/change/remove/rename, debounces per-file,
//! and emits [`BibEvent`]s on an unbounded channel. Recovery from a
//! watcher error is back-off-and-rescan so no change is lost in the gap.

pub mod error;
pub mod events;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use notify::{RecursiveMode, Watcher};
use notify_debouncer_full::{new_debouncer, DebounceEventResult};
use rigctl_config::bib_id_from_filename;
use rigctl_core::ids::BibId;
use tokio::sync::{mpsc, Mutex};
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

pub use error::WatchError;
pub use events::BibEvent;

/// Watches `config_dir` for `bib_*.xml` changes and serializes per-BIB
/// event handling for downstream consumers.
pub struct BibWatcher {
    config_dir: PathBuf,
    debounce_window: Duration,
    backoff: Duration,
    locks: DashMap<BibId, Arc<Mutex<()>>>,
}

impl BibWatcher {
    pub fn new(config_dir: PathBuf, debounce_window: Duration, backoff: Duration) -> Self {
        Self { config_dir, debounce_window, backoff, locks: DashMap::new() }
    }

    /// Per-BIB mutex a consumer should hold for the duration of handling one
    /// event, guaranteeing no two handlers for the same BIB run concurrently.
    /// Different BIBs get independent locks and may run in parallel.
    pub fn lock_for(&self, id: &BibId) -> Arc<Mutex<()>> {
        self.locks.entry(id.clone()).or_insert_with(|| Arc::new(Mutex::new(()))).clone()
    }

    /// Emit [`BibEvent::Discovered`] for every `bib_*.xml` file currently in
    /// the configuration directory, in filename order.
    pub fn initial_scan(&self) -> Result<Vec<BibEvent>, WatchError> {
        let mut events = Vec::new();
        let entries = std::fs::read_dir(&self.config_dir).map_err(|e| WatchError::InitialScan {
            path: self.config_dir.display().to_string(),
            source: e,
        })?;
        let mut paths: Vec<PathBuf> = entries.filter_map(|e| e.ok()).map(|e| e.path()).collect();
        paths.sort();

        for path in paths {
            if let Some(id) = bib_id_from_filename(&path) {
                events.push(BibEvent::Discovered(id, path));
            }
        }
        Ok(events)
    }

    /// Run until `cancel` fires. Spawns a background OS-thread-backed
    /// watcher and forwards translated, debounced events to the returned
    /// receiver. On an underlying watcher error, waits `backoff` then
    /// re-establishes the watch and performs a fresh [`Self::initial_scan`]
    /// so no change during the gap is missed.
    pub async fn run(self: Arc<Self>, cancel: CancellationToken) -> mpsc::UnboundedReceiver<BibEvent> {
        let (tx, rx) = mpsc::unbounded_channel();

        for event in self.initial_scan().unwrap_or_default() {
            let _ = tx.send(event);
        }

        let watcher = self.clone();
        tokio::spawn(async move {
            loop {
                if cancel.is_cancelled() {
                    return;
                }
                match watcher.watch_until_error(&tx, cancel.clone()).await {
                    Ok(()) => return, // cancelled cleanly
                    Err(e) => {
                        error!(error = %e, "filesystem watcher failed, retrying after back-off");
                        tokio::time::sleep(watcher.backoff).await;
                        for event in watcher.initial_scan().unwrap_or_default() {
                            let _ = tx.send(event);
                        }
                    }
                }
            }
        });

        rx
    }

    /// Run one instance of the underlying OS watcher until it errors or
    /// `cancel` fires. Bridges `notify`'s synchronous callback into the
    /// async channel via a bounded std channel drained on a blocking task.
    async fn watch_until_error(
        &self,
        tx: &mpsc::UnboundedSender<BibEvent>,
        cancel: CancellationToken,
    ) -> Result<(), WatchError> {
        let (std_tx, std_rx) = std::sync::mpsc::channel::<DebounceEventResult>();
        let path = self.config_dir.clone();

        let mut debouncer = new_debouncer(self.debounce_window, None, move |result| {
            let _ = std_tx.send(result);
        })
        .map_err(|e| WatchError::WatcherSetup { path: path.display().to_string(), source: e })?;

        debouncer
            .watcher()
            .watch(&self.config_dir, RecursiveMode::NonRecursive)
            .map_err(|e| WatchError::WatcherSetup { path: self.config_dir.display().to_string(), source: e })?;

        loop {
            let recv = tokio::task::spawn_blocking({
                let std_rx_recv_timeout = Duration::from_millis(250);
                move || std_rx.recv_timeout(std_rx_recv_timeout)
            });

            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                result = recv => {
                    match result {
                        Ok(Ok(Ok(debounced_events))) => {
                            for debounced in debounced_events {
                                self.translate_and_send(&debounced.event, tx);
                            }
                        }
                        Ok(Ok(Err(errors))) => {
                            let message = errors.into_iter().map(|e| e.to_string()).collect::<Vec<_>>().join("; ");
                            return Err(WatchError::WatcherSetup {
                                path: self.config_dir.display().to_string(),
                                source: notify::Error::generic(&message),
                            });
                        }
                        Ok(Err(_recv_timeout)) => continue,
                        Err(join_error) => {
                            warn!(error = %join_error, "watcher bridge task panicked");
                            return Err(WatchError::WatcherSetup {
                                path: self.config_dir.display().to_string(),
                                source: notify::Error::generic("watcher bridge task panicked"),
                            });
                        }
                    }
                }
            }
        }
    }

    fn translate_and_send(&self, event: &notify::Event, tx: &mpsc::UnboundedSender<BibEvent>) {
        use notify::EventKind;

        for path in &event.paths {
            let Some(id) = bib_id_from_filename(path) else { continue };
            let bib_event = match event.kind {
                EventKind::Create(_) => BibEvent::Discovered(id, path.clone()),
                EventKind::Modify(_) => BibEvent::Changed(id, path.clone()),
                EventKind::Remove(_) => BibEvent::Removed(id),
                _ => continue,
            };
            info!(bib_id = %bib_event.bib_id(), ?bib_event, "configuration event");
            let _ = tx.send(bib_event);
        }
    }
}

/// Extract the BIB id from a `bib_<id>.xml` path. Re-exported here for
/// convenience; the canonical implementation lives in `rigctl-config`
/// since the backup service needs the same parsing.
pub fn bib_id_from_path(path: &Path) -> Option<BibId> {
    bib_id_from_filename(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn initial_scan_picks_up_existing_bib_files_sorted() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("bib_b.xml"), "").unwrap();
        std::fs::write(tmp.path().join("bib_a.xml"), "").unwrap();
        std::fs::write(tmp.path().join("rigctl.toml"), "").unwrap();

        let watcher = BibWatcher::new(tmp.path().to_path_buf(), Duration::from_millis(100), Duration::from_secs(1));
        let events = watcher.initial_scan().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].bib_id(), &BibId::from("a"));
        assert_eq!(events[1].bib_id(), &BibId::from("b"));
    }

    #[tokio::test]
    async fn per_bib_locks_are_independent_across_bibs() {
        let watcher = BibWatcher::new(PathBuf::from("."), Duration::from_millis(1), Duration::from_secs(1));
        let a = watcher.lock_for(&BibId::from("a"));
        let b = watcher.lock_for(&BibId::from("b"));

        let _guard_a = a.lock().await;
        // A lock on a different BIB must not block.
        let result = tokio::time::timeout(Duration::from_millis(50), b.lock()).await;
        assert!(result.is_ok());
    }

    #[tokio::test]
    async fn same_bib_lock_is_reentrant_handle_but_serializes_holders() {
        let watcher = BibWatcher::new(PathBuf::from("."), Duration::from_millis(1), Duration::from_secs(1));
        let first = watcher.lock_for(&BibId::from("a"));
        let second = watcher.lock_for(&BibId::from("a"));

        let _guard = first.lock().await;
        let result = tokio::time::timeout(Duration::from_millis(50), second.lock()).await;
        assert!(result.is_err(), "second handle to the same BIB's lock must block while held");
    }
}
