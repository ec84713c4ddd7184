//! Resolves which [`GpioProvider`] backs a given BIB and which OS port
//! name backs each of its logical [`PortConfiguration`]s.
//!
//! Simulated BIBs need neither step: the provider is built straight from
//! the BIB's own `hardware_simulation` section, and their ports are
//! bound by name already (spec.md's BIB/UUT/PORT model does not require
//! hardware presence for a simulated run). Real BIBs need a physical
//! FTDI device: resolved by reading every connected device's EEPROM and
//! matching its `ProductDescription` against the BIB id (component B).

use std::collections::HashMap;
use std::sync::Arc;

use rigctl_core::discovery::{DeviceGroup, SerialPortDescriptor};
use rigctl_core::ids::{BibId, SerialNumber};
use rigctl_eeprom::EepromReader;
use rigctl_gpio::{GpioProvider, RealGpioConfig, RealGpioProvider, SimulatedGpioProvider};
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::WorkflowError;

/// A resolved physical device backing a real (non-simulated) BIB.
pub struct ResolvedDevice {
    pub serial_number: SerialNumber,
    pub group: DeviceGroup,
}

/// Read every connected FTDI device's EEPROM and match it to a known BIB
/// id. Devices whose description resolves ambiguously or not at all are
/// logged and skipped rather than failing the whole scan, matching
/// `EepromReader::read_all_connected`'s per-device fault isolation.
pub fn resolve_devices(
    groups: &[DeviceGroup],
    eeprom: &EepromReader,
    known_bib_ids: &[BibId],
    translation_table: Option<&HashMap<String, BibId>>,
) -> HashMap<BibId, ResolvedDevice> {
    let mut resolved = HashMap::new();

    for group in groups {
        let snapshot = match eeprom.read_eeprom(&group.serial_number) {
            Ok(s) => s,
            Err(e) => {
                warn!(serial = %group.serial_number, error = %e, "eeprom read failed during bib resolution");
                continue;
            }
        };
        if let Some(err) = &snapshot.error {
            warn!(serial = %group.serial_number, error = %err, "eeprom snapshot carries an error, skipping");
            continue;
        }

        match rigctl_eeprom::resolve_bib_id(&snapshot.product_description, known_bib_ids, translation_table) {
            Ok(bib_id) => {
                resolved.insert(
                    bib_id,
                    ResolvedDevice { serial_number: group.serial_number.clone(), group: group.clone() },
                );
            }
            Err(e) => warn!(serial = %group.serial_number, error = %e, "could not resolve bib id for device"),
        }
    }

    resolved
}

/// Map a 1-based logical port `number` to the OS port name within a
/// resolved device, by FTDI `port_index` (`number - 1`).
pub fn resolve_port_name(device: &ResolvedDevice, number: u32) -> Option<rigctl_core::ids::PortName> {
    let index = number.checked_sub(1)?;
    device
        .group
        .ports
        .iter()
        .find(|p| p.ftdi.as_ref().map(|f| u32::from(f.port_index) == index).unwrap_or(false))
        .map(|p| p.port_name.clone())
}

/// A built GPIO provider, plus the background poller task handle a real
/// provider needs spawned alongside it. Simulated providers need none.
pub struct BuiltProvider {
    pub provider: Arc<dyn GpioProvider>,
    pub real: Option<Arc<RealGpioProvider>>,
}

/// Build the GPIO provider for one BIB: simulated if its configuration
/// says so, otherwise a real FTDI bit-bang provider opened against its
/// resolved device.
pub fn build_provider(
    bib: &rigctl_core::config_model::BibConfiguration,
    device: Option<&ResolvedDevice>,
    real_config: RealGpioConfig,
) -> Result<BuiltProvider, WorkflowError> {
    if let Some(sim) = bib.hardware_simulation.as_ref().filter(|s| s.enabled) {
        return Ok(BuiltProvider { provider: Arc::new(SimulatedGpioProvider::new(sim.clone())), real: None });
    }

    let device = device.ok_or_else(|| WorkflowError::DeviceUnresolved(bib.id.clone()))?;
    let provider = Arc::new(RealGpioProvider::open(&device.serial_number, real_config)?);
    Ok(BuiltProvider { provider: provider.clone(), real: Some(provider) })
}

/// Spawn the real provider's background input poller. No-op call site for
/// simulated BIBs, which simply never have a `real` handle to spawn.
pub fn spawn_poller(provider: Arc<RealGpioProvider>, cancel: CancellationToken) {
    tokio::spawn(provider.run_poller(cancel));
}

/// All `SerialPortDescriptor`s across every discovered group, used as the
/// candidate list handed to [`rigctl_pool::ReservationPool::allocate`].
pub fn flatten_candidates(groups: &[DeviceGroup]) -> Vec<SerialPortDescriptor> {
    groups.iter().flat_map(|g| g.ports.iter().cloned()).collect()
}
