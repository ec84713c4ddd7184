//! Serial port discovery and FTDI device grouping (component A).
//!
//! Enumerates OS-level serial endpoints via [`serialport`], attaches FTDI
//! identity where the VID matches, and groups multi-port FTDI chips (e.g.
//! FT2232H, FT4232H) into a single [`DeviceGroup`] keyed by serial number.

pub mod error;

use std::collections::BTreeMap;
use std::time::SystemTime;

use rigctl_core::discovery::{
    chip_type_label, DeviceGroup, DiscoveryStatistics, FtdiIdentity, SerialPortDescriptor,
    FTDI_VENDOR_ID,
};
use rigctl_core::ids::PortName;

pub use error::DiscoveryError;

/// Stateless discovery driver. Cheap to construct; holds no OS handles.
#[derive(Debug, Default, Clone, Copy)]
pub struct PortDiscovery;

impl PortDiscovery {
    pub fn new() -> Self {
        Self
    }

    /// Enumerate every serial port the OS currently exposes.
    ///
    /// Ports whose USB identifier cannot be parsed are still returned, just
    /// without an [`FtdiIdentity`]. This is a blocking syscall; callers on
    /// an async executor should run it via `spawn_blocking`.
    pub fn discover(&self) -> Result<Vec<SerialPortDescriptor>, DiscoveryError> {
        let ports = serialport::available_ports()
            .map_err(|e| DiscoveryError::EnumerationFailed(e.to_string()))?;

        let now = SystemTime::now();
        let mut descriptors: Vec<SerialPortDescriptor> = ports
            .into_iter()
            .map(|p| {
                let port_name = PortName::from(p.port_name.as_str());
                let (device_id, ftdi) = match &p.port_type {
                    serialport::SerialPortType::UsbPort(usb) => {
                        let device_id = format!("{:04x}:{:04x}", usb.vid, usb.pid);
                        let ftdi = if usb.vid == FTDI_VENDOR_ID {
                            let (chip_type, _expected_ports) = chip_type_label(usb.pid);
                            let serial_number = usb
                                .serial_number
                                .clone()
                                .map(rigctl_core::ids::SerialNumber::from)
                                .unwrap_or_else(|| {
                                    rigctl_core::ids::SerialNumber::from(port_name.as_str())
                                });
                            // `interface` is the USB composite-device interface number
                            // (populated by the OS for multi-port chips like the
                            // FT2232H/FT4232H); single-port chips and platforms that
                            // don't report it leave this `None`, and port 0 is correct
                            // there since there is only ever one interface.
                            let port_index = usb.interface.unwrap_or(0);
                            Some(FtdiIdentity {
                                vendor_id: usb.vid,
                                product_id: usb.pid,
                                chip_type,
                                serial_number,
                                port_index,
                            })
                        } else {
                            None
                        };
                        (device_id, ftdi)
                    }
                    _ => (port_name.as_str().to_string(), None),
                };
                SerialPortDescriptor {
                    port_name: port_name.clone(),
                    friendly_name: None,
                    device_id,
                    ftdi,
                    last_seen: now,
                }
            })
            .collect();

        descriptors.sort_by(|a, b| a.port_name.as_str().cmp(b.port_name.as_str()));
        Ok(descriptors)
    }

    /// Group descriptors sharing (VID, PID, serial number) into one
    /// [`DeviceGroup`] each. Descriptors without an FTDI identity, or
    /// without a usable serial number, each become a one-member group
    /// keyed by their own port name.
    pub fn group_by_device(descriptors: &[SerialPortDescriptor]) -> Vec<DeviceGroup> {
        let mut groups: BTreeMap<String, DeviceGroup> = BTreeMap::new();

        for descriptor in descriptors {
            let key = match &descriptor.ftdi {
                Some(ftdi) => ftdi.serial_number.as_str().to_string(),
                None => descriptor.port_name.as_str().to_string(),
            };

            let entry = groups.entry(key).or_insert_with(|| {
                let (serial_number, chip_type, expected_port_count) = match &descriptor.ftdi {
                    Some(ftdi) => {
                        let (_label, count) = chip_type_label(ftdi.product_id);
                        (ftdi.serial_number.clone(), ftdi.chip_type.clone(), count)
                    }
                    None => (
                        rigctl_core::ids::SerialNumber::from(descriptor.port_name.as_str()),
                        "unknown".to_string(),
                        1,
                    ),
                };
                DeviceGroup {
                    group_id: format!("{}-{}", chip_type, serial_number.as_str()),
                    serial_number,
                    chip_type,
                    expected_port_count,
                    eeprom: None,
                    ports: Vec::new(),
                }
            });
            entry.ports.push(descriptor.clone());
        }

        for group in groups.values_mut() {
            group.ports.sort_by(|a, b| a.port_name.as_str().cmp(b.port_name.as_str()));
        }

        groups.into_values().collect()
    }

    /// Find the device group containing `name`, if any.
    pub fn find_by_port_name<'a>(
        groups: &'a [DeviceGroup],
        name: &PortName,
    ) -> Option<&'a DeviceGroup> {
        groups.iter().find(|g| g.port(name).is_some())
    }

    /// Summary counts over a discovered group set.
    pub fn statistics(groups: &[DeviceGroup]) -> DiscoveryStatistics {
        let total_devices = groups.len();
        let multi_port_devices = groups.iter().filter(|g| g.is_multi_port()).count();
        let ftdi_devices = groups
            .iter()
            .filter(|g| g.ports.iter().any(|p| p.ftdi.is_some()))
            .count();
        let largest_group_size = groups.iter().map(|g| g.ports.len()).max().unwrap_or(0);
        DiscoveryStatistics {
            total_devices,
            multi_port_devices,
            ftdi_devices,
            non_ftdi_devices: total_devices - ftdi_devices,
            largest_group_size,
        }
    }

    /// `discover()` followed by `group_by_device()`, run off the async
    /// executor's worker threads.
    pub async fn discover_groups(&self) -> Result<Vec<DeviceGroup>, DiscoveryError> {
        let this = *self;
        tokio::task::spawn_blocking(move || {
            let descriptors = this.discover()?;
            Ok(Self::group_by_device(&descriptors))
        })
        .await
        .map_err(|e| DiscoveryError::EnumerationFailed(format!("discovery task panicked: {e}")))?
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigctl_core::ids::SerialNumber;

    fn descriptor(port: &str, ftdi: Option<FtdiIdentity>) -> SerialPortDescriptor {
        SerialPortDescriptor {
            port_name: PortName::from(port),
            friendly_name: None,
            device_id: "0403:6010".to_string(),
            ftdi,
            last_seen: SystemTime::now(),
        }
    }

    fn ftdi(serial: &str, pid: u16, index: u8) -> FtdiIdentity {
        FtdiIdentity {
            vendor_id: FTDI_VENDOR_ID,
            product_id: pid,
            chip_type: chip_type_label(pid).0,
            serial_number: SerialNumber::from(serial),
            port_index: index,
        }
    }

    #[test]
    fn groups_share_vid_pid_serial() {
        let descriptors = vec![
            descriptor("/dev/ttyUSB0", Some(ftdi("AB123", 0x6010, 0))),
            descriptor("/dev/ttyUSB1", Some(ftdi("AB123", 0x6010, 1))),
        ];
        let groups = PortDiscovery::group_by_device(&descriptors);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].ports.len(), 2);
        assert!(groups[0].is_multi_port());
    }

    #[test]
    fn partial_multi_port_group_still_forms_one_group() {
        // FT4232H exposes 4 ports but only 2 are currently plugged in.
        let descriptors = vec![
            descriptor("/dev/ttyUSB2", Some(ftdi("CD456", 0x6011, 0))),
            descriptor("/dev/ttyUSB3", Some(ftdi("CD456", 0x6011, 1))),
        ];
        let groups = PortDiscovery::group_by_device(&descriptors);
        assert_eq!(groups.len(), 1);
        assert_eq!(groups[0].expected_port_count, 4);
        assert_eq!(groups[0].ports.len(), 2);
    }

    #[test]
    fn non_ftdi_port_becomes_singleton_group() {
        let descriptors = vec![descriptor("/dev/ttyS0", None)];
        let groups = PortDiscovery::group_by_device(&descriptors);
        assert_eq!(groups.len(), 1);
        assert!(!groups[0].is_multi_port());
        assert_eq!(groups[0].chip_type, "unknown");
    }

    #[test]
    fn find_by_port_name_locates_containing_group() {
        let descriptors = vec![
            descriptor("/dev/ttyUSB0", Some(ftdi("AB123", 0x6010, 0))),
            descriptor("/dev/ttyUSB1", Some(ftdi("AB123", 0x6010, 1))),
        ];
        let groups = PortDiscovery::group_by_device(&descriptors);
        let found = PortDiscovery::find_by_port_name(&groups, &PortName::from("/dev/ttyUSB1"));
        assert!(found.is_some());
        assert!(PortDiscovery::find_by_port_name(&groups, &PortName::from("/dev/ttyUSB9"))
            .is_none());
    }

    #[test]
    fn statistics_count_multi_port_and_ftdi_devices() {
        let descriptors = vec![
            descriptor("/dev/ttyUSB0", Some(ftdi("AB123", 0x6010, 0))),
            descriptor("/dev/ttyUSB1", Some(ftdi("AB123", 0x6010, 1))),
            descriptor("/dev/ttyS0", None),
        ];
        let groups = PortDiscovery::group_by_device(&descriptors);
        let stats = PortDiscovery::statistics(&groups);
        assert_eq!(stats.total_devices, 2);
        assert_eq!(stats.multi_port_devices, 1);
        assert_eq!(stats.ftdi_devices, 1);
        assert_eq!(stats.non_ftdi_devices, 1);
        assert_eq!(stats.largest_group_size, 2);
    }

    #[test]
    fn discovery_is_idempotent_on_a_stable_input() {
        let descriptors = vec![
            descriptor("/dev/ttyUSB1", Some(ftdi("AB123", 0x6010, 1))),
            descriptor("/dev/ttyUSB0", Some(ftdi("AB123", 0x6010, 0))),
        ];
        let first = PortDiscovery::group_by_device(&descriptors);
        let second = PortDiscovery::group_by_device(&descriptors);
        assert_eq!(first.len(), second.len());
        assert_eq!(
            first[0].ports.iter().map(|p| p.port_name.clone()).collect::<Vec<_>>(),
            second[0].ports.iter().map(|p| p.port_name.clone()).collect::<Vec<_>>(),
        );
    }
}
