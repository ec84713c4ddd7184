//! Port discovery and device-grouping types (component A).

use std::time::SystemTime;

use serde::{Deserialize, Serialize};

use crate::ids::{PortName, SerialNumber};

/// USB vendor id FTDI ships under. Used to decide whether a discovered
/// port gets an [`FtdiIdentity`] attached.
pub const FTDI_VENDOR_ID: u16 = 0x0403;

/// One OS-visible serial endpoint.
///
/// Created and mutated only by discovery (component A); destroyed when a
/// rediscovery scan no longer observes it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SerialPortDescriptor {
    /// OS port name, stable within a boot (e.g. `COM4`, `/dev/ttyUSB1`).
    pub port_name: PortName,
    /// Human-friendly name reported by the OS, if any.
    pub friendly_name: Option<String>,
    /// Raw device identifier string used to parse VID/PID/serial.
    pub device_id: String,
    /// FTDI identity, present only when `device_id` parsed as an FTDI USB device.
    pub ftdi: Option<FtdiIdentity>,
    /// Wall-clock time this descriptor was last confirmed present.
    pub last_seen: SystemTime,
}

/// FTDI-specific identity parsed out of a device id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FtdiIdentity {
    /// USB vendor id (0x0403 for FTDI).
    pub vendor_id: u16,
    /// USB product id, selects the chip-type label.
    pub product_id: u16,
    /// Human label for the chip family (e.g. "FT232R", "FT4232H").
    pub chip_type: String,
    /// Serial number shared by every port of a multi-port chip.
    ///
    /// Falls back to the port name (producing a group of one) when the
    /// device id carried no serial number.
    pub serial_number: SerialNumber,
    /// 0-based index of this port within its physical chip.
    ///
    /// Derived from the USB interface number where the OS exposes one for
    /// composite devices; single-port chips have exactly one interface, so
    /// `0` is correct for them even when the OS reports none.
    pub port_index: u8,
}

/// The physical chip behind one or more [`SerialPortDescriptor`]s.
///
/// Invariant: every member shares `serial_number` and (vendor_id, product_id).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceGroup {
    /// Stable id for this group, derived from vendor/product/serial.
    pub group_id: String,
    /// Serial number shared by every member port.
    pub serial_number: SerialNumber,
    /// Chip-type label, as in [`FtdiIdentity::chip_type`].
    pub chip_type: String,
    /// Number of ports this chip family is expected to expose (1, 2, or 4).
    pub expected_port_count: u8,
    /// EEPROM snapshot for this chip, if one has been read.
    pub eeprom: Option<crate::eeprom::EepromSnapshot>,
    /// Member ports, sorted by OS port name for deterministic ordering.
    pub ports: Vec<SerialPortDescriptor>,
}

impl DeviceGroup {
    /// True iff this chip advertises more than one serial port.
    pub fn is_multi_port(&self) -> bool {
        self.ports.len() > 1
    }

    /// Look up a member port by OS name.
    pub fn port(&self, name: &PortName) -> Option<&SerialPortDescriptor> {
        self.ports.iter().find(|p| &p.port_name == name)
    }
}

/// Known FTDI product ids mapped to a chip-type label.
///
/// Unknown product ids fall back to a label carrying the raw hex code
/// (see [`chip_type_label`]), never a silent guess.
pub const KNOWN_FTDI_PRODUCTS: &[(u16, &str, u8)] = &[
    (0x6001, "FT232R", 1),
    (0x6010, "FT2232H", 2),
    (0x6011, "FT4232H", 4),
    (0x6014, "FT232H", 1),
    (0x6015, "FT230X", 1),
];

/// Resolve a chip-type label and expected port count for a product id.
pub fn chip_type_label(product_id: u16) -> (String, u8) {
    for (pid, label, ports) in KNOWN_FTDI_PRODUCTS {
        if *pid == product_id {
            return (label.to_string(), *ports);
        }
    }
    (format!("Unknown(0x{product_id:04x})"), 1)
}

/// Aggregate counts returned by `statistics()`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryStatistics {
    /// Total number of distinct physical devices (groups) found.
    pub total_devices: usize,
    /// Number of groups exposing more than one port.
    pub multi_port_devices: usize,
    /// Number of groups carrying an FTDI identity.
    pub ftdi_devices: usize,
    /// Number of groups with no FTDI identity (device id unparsed or non-FTDI VID).
    pub non_ftdi_devices: usize,
    /// Size (port count) of the largest group observed.
    pub largest_group_size: usize,
}
