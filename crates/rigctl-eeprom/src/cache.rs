//! TTL-bounded in-memory EEPROM snapshot cache, keyed by USB serial number.

use std::collections::HashMap;
use std::sync::RwLock;
use std::time::Duration;

use rigctl_core::eeprom::EepromSnapshot;
use rigctl_core::ids::SerialNumber;

/// Holds the most recent snapshot read per serial number. Stale entries are
/// not evicted proactively; they are simply treated as a miss on next
/// lookup and refreshed lazily by the caller.
#[derive(Debug, Default)]
pub struct SnapshotCache {
    entries: RwLock<HashMap<SerialNumber, EepromSnapshot>>,
}

impl SnapshotCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return a fresh cached snapshot for `serial`, or `None` if absent or
    /// older than `ttl`.
    pub fn get_fresh(&self, serial: &SerialNumber, ttl: Duration) -> Option<EepromSnapshot> {
        let entries = self.entries.read().expect("eeprom cache lock poisoned");
        entries
            .get(serial)
            .filter(|snapshot| !snapshot.is_stale(ttl))
            .cloned()
    }

    pub fn insert(&self, serial: SerialNumber, snapshot: EepromSnapshot) {
        let mut entries = self.entries.write().expect("eeprom cache lock poisoned");
        entries.insert(serial, snapshot);
    }

    pub fn len(&self) -> usize {
        self.entries.read().expect("eeprom cache lock poisoned").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::SystemTime;

    fn snapshot(product: &str) -> EepromSnapshot {
        EepromSnapshot {
            product_description: product.to_string(),
            manufacturer: "FTDI".to_string(),
            max_power_ma: 90,
            self_powered: false,
            remote_wakeup: false,
            usb_version: 0x0200,
            read_at: SystemTime::now(),
            error: None,
        }
    }

    #[test]
    fn fresh_entry_is_returned_until_ttl_elapses() {
        let cache = SnapshotCache::new();
        let serial = SerialNumber::from("AB123");
        cache.insert(serial.clone(), snapshot("rig-demo"));

        assert!(cache.get_fresh(&serial, Duration::from_secs(60)).is_some());
        assert!(cache.get_fresh(&serial, Duration::from_nanos(0)).is_none());
    }

    #[test]
    fn missing_entry_is_a_miss() {
        let cache = SnapshotCache::new();
        let serial = SerialNumber::from("not-cached");
        assert!(cache.get_fresh(&serial, Duration::from_secs(60)).is_none());
    }
}
