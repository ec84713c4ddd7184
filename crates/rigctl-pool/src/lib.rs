//! Thread-safe serial port reservation pool (component E).
//!
//! `allocate`/`release` are linearizable per port name: [`dashmap::DashMap`]'s
//! sharded locking gives us the "one lock per port name plus a structural
//! lock for the map itself" discipline spec.md §4.E calls for without hand
//! rolling it. A background sweeper expires [`PortReservation`]s and
//! releases their underlying allocations.

pub mod error;

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, SystemTime};

use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use rigctl_core::discovery::SerialPortDescriptor;
use rigctl_core::ids::{ClientId, PortName, ReservationId, SessionToken};
use rigctl_core::pool_model::{PortAllocation, PortReservation, PoolStatistics};
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

pub use error::PoolError;

/// Tracks all-time allocation counters used by `statistics()`.
#[derive(Debug, Default)]
struct LifetimeStats {
    all_time_allocation_count: AtomicU64,
    completed_count: AtomicU64,
    completed_duration_sum: Mutex<Duration>,
}

impl LifetimeStats {
    fn record_allocation(&self) {
        self.all_time_allocation_count.fetch_add(1, Ordering::Relaxed);
    }

    fn record_release(&self, allocation: &PortAllocation) {
        let held_for = allocation.allocated_at.elapsed().unwrap_or_default();
        self.completed_count.fetch_add(1, Ordering::Relaxed);
        let mut sum = self.completed_duration_sum.lock().expect("pool stats lock poisoned");
        *sum += held_for;
    }

    fn average_duration(&self) -> Duration {
        let count = self.completed_count.load(Ordering::Relaxed);
        if count == 0 {
            return Duration::ZERO;
        }
        let sum = *self.completed_duration_sum.lock().expect("pool stats lock poisoned");
        sum / count as u32
    }
}

/// Serializes access to each serial port across concurrent clients.
#[derive(Default)]
pub struct ReservationPool {
    allocations: DashMap<PortName, PortAllocation>,
    reservations: DashMap<ReservationId, PortReservation>,
    stats: LifetimeStats,
}

impl ReservationPool {
    pub fn new() -> Self {
        Self::default()
    }

    /// Scan `candidates` in order and atomically allocate the first port
    /// that both passes `criteria` and is not currently allocated.
    ///
    /// At-most-one allocation per port is a hard invariant: two concurrent
    /// calls racing for the same port resolve to exactly one success, via
    /// `DashMap`'s atomic vacant-entry insertion.
    pub fn allocate(
        &self,
        candidates: &[SerialPortDescriptor],
        criteria: impl Fn(&SerialPortDescriptor) -> bool,
        client_id: ClientId,
    ) -> Option<PortAllocation> {
        for candidate in candidates.iter().filter(|c| criteria(c)) {
            let allocation = PortAllocation {
                port_name: candidate.port_name.clone(),
                client_id: client_id.clone(),
                session_token: SessionToken::generate(),
                allocated_at: SystemTime::now(),
                metadata: Default::default(),
            };

            match self.allocations.entry(candidate.port_name.clone()) {
                Entry::Occupied(_) => continue,
                Entry::Vacant(entry) => {
                    entry.insert(allocation.clone());
                    self.stats.record_allocation();
                    info!(port = %allocation.port_name, client = %allocation.client_id, "port allocated");
                    return Some(allocation);
                }
            }
        }
        None
    }

    /// Release `port_name` only if `session_token` matches the current
    /// allocation. Returns `true` iff a release actually happened.
    pub fn release(&self, port_name: &PortName, session_token: &SessionToken) -> bool {
        let Entry::Occupied(entry) = self.allocations.entry(port_name.clone()) else {
            return false;
        };
        if entry.get().session_token != *session_token {
            return false;
        }
        let (_, allocation) = entry.remove_entry();
        self.stats.record_release(&allocation);
        info!(port = %port_name, "port released");
        true
    }

    pub fn is_allocated(&self, port_name: &PortName) -> bool {
        self.allocations.contains_key(port_name)
    }

    pub fn get_allocation(&self, port_name: &PortName) -> Option<PortAllocation> {
        self.allocations.get(port_name).map(|r| r.value().clone())
    }

    /// Release every allocation held by `client_id`, returning the count released.
    pub fn release_all_for_client(&self, client_id: &ClientId) -> usize {
        let to_release: Vec<PortName> = self
            .allocations
            .iter()
            .filter(|entry| &entry.value().client_id == client_id)
            .map(|entry| entry.key().clone())
            .collect();

        let mut released = 0;
        for port_name in to_release {
            if let Entry::Occupied(entry) = self.allocations.entry(port_name) {
                let (_, allocation) = entry.remove_entry();
                self.stats.record_release(&allocation);
                released += 1;
            }
        }
        released
    }

    /// Wrap `allocation` in a [`PortReservation`] expiring after `duration`.
    pub fn reserve_from_allocation(&self, allocation: PortAllocation, duration: Duration) -> PortReservation {
        let reservation = PortReservation::new(allocation, duration);
        self.reservations.insert(reservation.reservation_id.clone(), reservation.clone());
        reservation
    }

    /// Expire and release every reservation whose `expires_at` has passed.
    /// Returns the number of reservations swept.
    pub fn sweep_expired(&self, now: SystemTime) -> usize {
        let expired: Vec<ReservationId> = self
            .reservations
            .iter()
            .filter(|entry| entry.value().is_expired(now))
            .map(|entry| entry.key().clone())
            .collect();

        for id in &expired {
            if let Some((_, reservation)) = self.reservations.remove(id) {
                self.release(&reservation.allocation.port_name, &reservation.allocation.session_token);
                warn!(reservation = %id, port = %reservation.allocation.port_name, "reservation expired");
            }
        }
        expired.len()
    }

    /// Consistent snapshot of pool-wide counters. `total_ports` is supplied
    /// by the caller (the current discovery result's eligible universe)
    /// since the pool itself does not track the port universe.
    pub fn statistics(&self, total_ports: usize) -> PoolStatistics {
        let allocated = self.allocations.len();
        let unique_clients: HashSet<ClientId> =
            self.allocations.iter().map(|e| e.value().client_id.clone()).collect();

        PoolStatistics {
            total_ports,
            allocated,
            available: total_ports.saturating_sub(allocated),
            error: 0,
            unique_clients: unique_clients.len(),
            average_allocation_duration: self.stats.average_duration(),
            all_time_allocation_count: self.stats.all_time_allocation_count.load(Ordering::Relaxed),
        }
    }

    /// Run a background sweeper on `interval`, stopping when `cancel` fires.
    pub async fn run_sweeper(self: std::sync::Arc<Self>, interval: Duration, cancel: CancellationToken) {
        let mut ticker = tokio::time::interval(interval);
        loop {
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = ticker.tick() => {
                    let swept = self.sweep_expired(SystemTime::now());
                    if swept > 0 {
                        info!(count = swept, "swept expired reservations");
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::time::Duration as StdDuration;

    fn descriptor(port: &str) -> SerialPortDescriptor {
        SerialPortDescriptor {
            port_name: PortName::from(port),
            friendly_name: None,
            device_id: "0403:6001".to_string(),
            ftdi: None,
            last_seen: SystemTime::now(),
        }
    }

    #[test]
    fn allocate_then_release_returns_pool_to_prior_state() {
        let pool = ReservationPool::new();
        let candidates = vec![descriptor("/dev/ttyUSB0")];
        let client = ClientId::from("client-a");

        let allocation = pool.allocate(&candidates, |_| true, client.clone()).unwrap();
        assert_eq!(pool.statistics(1).allocated, 1);

        assert!(pool.release(&allocation.port_name, &allocation.session_token));
        let stats = pool.statistics(1);
        assert_eq!(stats.allocated, 0);
        assert_eq!(stats.all_time_allocation_count, 1);
    }

    #[test]
    fn release_with_wrong_token_is_rejected() {
        let pool = ReservationPool::new();
        let candidates = vec![descriptor("/dev/ttyUSB0")];
        let allocation = pool.allocate(&candidates, |_| true, ClientId::from("a")).unwrap();

        let wrong_token = SessionToken::generate();
        assert!(!pool.release(&allocation.port_name, &wrong_token));
        assert!(pool.is_allocated(&allocation.port_name));
    }

    #[test]
    fn only_one_concurrent_allocate_wins_for_the_same_port() {
        let pool = Arc::new(ReservationPool::new());
        let candidates = Arc::new(vec![descriptor("/dev/ttyUSB0")]);

        let mut handles = Vec::new();
        for i in 0..8 {
            let pool = pool.clone();
            let candidates = candidates.clone();
            handles.push(std::thread::spawn(move || {
                pool.allocate(&candidates, |_| true, ClientId::from(format!("client-{i}")))
            }));
        }

        let results: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(results.iter().filter(|r| r.is_some()).count(), 1);
    }

    #[test]
    fn allocate_skips_ports_failing_criteria() {
        let pool = ReservationPool::new();
        let candidates = vec![descriptor("/dev/ttyUSB0"), descriptor("/dev/ttyUSB1")];
        let allocation = pool
            .allocate(&candidates, |d| d.port_name.as_str() == "/dev/ttyUSB1", ClientId::from("a"))
            .unwrap();
        assert_eq!(allocation.port_name, PortName::from("/dev/ttyUSB1"));
    }

    #[test]
    fn release_all_for_client_releases_only_that_clients_ports() {
        let pool = ReservationPool::new();
        let candidates = vec![descriptor("/dev/ttyUSB0"), descriptor("/dev/ttyUSB1")];
        pool.allocate(&candidates[..1], |_| true, ClientId::from("a")).unwrap();
        pool.allocate(&candidates[1..], |_| true, ClientId::from("b")).unwrap();

        let released = pool.release_all_for_client(&ClientId::from("a"));
        assert_eq!(released, 1);
        assert!(!pool.is_allocated(&PortName::from("/dev/ttyUSB0")));
        assert!(pool.is_allocated(&PortName::from("/dev/ttyUSB1")));
    }

    #[test]
    fn sweeper_releases_expired_reservation() {
        let pool = ReservationPool::new();
        let candidates = vec![descriptor("/dev/ttyUSB0")];
        let allocation = pool.allocate(&candidates, |_| true, ClientId::from("a")).unwrap();

        let reservation = pool.reserve_from_allocation(allocation.clone(), StdDuration::from_millis(0));
        assert!(reservation.is_expired(SystemTime::now() + StdDuration::from_millis(1)));

        let swept = pool.sweep_expired(SystemTime::now() + StdDuration::from_millis(1));
        assert_eq!(swept, 1);
        assert!(!pool.is_allocated(&allocation.port_name));
    }
}
