//! EEPROM snapshot types (component B).

use std::time::{Duration, SystemTime};

use serde::{Deserialize, Serialize};

/// Default time-to-live before a cached [`EepromSnapshot`] is considered stale.
pub const DEFAULT_EEPROM_TTL: Duration = Duration::from_secs(5 * 60);

/// Read-only copy of FTDI on-chip descriptor data.
///
/// `product_description` is the BIB selector: its value is matched,
/// case-insensitively, against the id suffix of a `bib_<id>.xml` file by
/// the dynamic BIB mapper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EepromSnapshot {
    /// Free-form string used as the BIB selector.
    pub product_description: String,
    /// Manufacturer string.
    pub manufacturer: String,
    /// Maximum bus current in milliamps.
    pub max_power_ma: u16,
    /// Whether the device reports itself as self-powered.
    pub self_powered: bool,
    /// Whether the device supports USB remote wakeup.
    pub remote_wakeup: bool,
    /// USB version the descriptor advertises (e.g. `0x0200`).
    pub usb_version: u16,
    /// Time this snapshot was read from hardware.
    pub read_at: SystemTime,
    /// Set when this snapshot represents a failed read (see `readAllConnected`);
    /// carries the error message instead of a usable product description.
    pub error: Option<String>,
}

impl EepromSnapshot {
    /// Build a placeholder snapshot representing a non-fatal per-device read
    /// failure, as required by `readAllConnected`'s "continues past individual
    /// failures" contract.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            product_description: String::new(),
            manufacturer: String::new(),
            max_power_ma: 0,
            self_powered: false,
            remote_wakeup: false,
            usb_version: 0,
            read_at: SystemTime::now(),
            error: Some(message.into()),
        }
    }

    /// True when this snapshot carries a failed read rather than real data.
    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }

    /// Whether this snapshot is older than `ttl`.
    pub fn is_stale(&self, ttl: Duration) -> bool {
        self.read_at.elapsed().map(|age| age > ttl).unwrap_or(false)
    }
}
