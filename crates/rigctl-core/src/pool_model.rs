//! Reservation pool types (component E).

use std::collections::HashMap;
use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

use crate::ids::{ClientId, PortName, ReservationId, SessionToken};

/// A currently reserved port.
///
/// Invariant: at most one active allocation per port name (enforced by
/// the pool, not representable here).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortAllocation {
    /// OS port name this allocation covers.
    pub port_name: PortName,
    /// Caller that holds the allocation.
    pub client_id: ClientId,
    /// Opaque token required to release this allocation.
    pub session_token: SessionToken,
    /// Time the allocation was created.
    pub allocated_at: SystemTime,
    /// Free-form metadata attached by the caller.
    pub metadata: HashMap<String, String>,
}

/// Wraps a [`PortAllocation`] with an expiration.
///
/// Invariant: `expires_at` strictly greater than the wrapped allocation's
/// `allocated_at`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortReservation {
    /// Identifier for this reservation (distinct from the session token).
    pub reservation_id: ReservationId,
    /// The allocation this reservation wraps.
    pub allocation: PortAllocation,
    /// Wall-clock time at which the reservation (and its allocation) expire.
    pub expires_at: SystemTime,
}

impl PortReservation {
    /// Build a reservation expiring `duration` after the allocation's creation time.
    ///
    /// `duration` must be positive so the invariant `expires_at > allocated_at` holds.
    pub fn new(allocation: PortAllocation, duration: Duration) -> Self {
        let expires_at = allocation.allocated_at + duration;
        Self { reservation_id: ReservationId::generate(), allocation, expires_at }
    }

    /// True once `now` has passed `expires_at`.
    pub fn is_expired(&self, now: SystemTime) -> bool {
        now >= self.expires_at
    }
}

/// Aggregate counters returned by `statistics()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct PoolStatistics {
    /// Total number of ports known to the pool's criteria universe.
    pub total_ports: usize,
    /// Number of currently allocated ports.
    pub allocated: usize,
    /// Number of ports currently eligible and free.
    pub available: usize,
    /// Number of ports currently in an error state (discovery-reported).
    pub error: usize,
    /// Number of distinct clients holding at least one allocation.
    pub unique_clients: usize,
    /// Mean allocation duration across all-time completed allocations.
    pub average_allocation_duration: Duration,
    /// Count of allocations ever granted, including released ones.
    pub all_time_allocation_count: u64,
}
