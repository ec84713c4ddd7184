//! FTDI EEPROM reader and dynamic BIB mapper (component B).
//!
//! Reads the on-chip descriptor of an FTDI device and translates its
//! `ProductDescription` string into a BIB identifier. All hardware access
//! goes through [`libftd2xx`] and is always run via `spawn_blocking` since
//! the library is synchronous and can block on USB control transfers.

pub mod cache;
pub mod error;

use std::collections::HashMap;
use std::time::Duration;

use rigctl_core::eeprom::EepromSnapshot;
use rigctl_core::ids::{BibId, SerialNumber};
use tracing::warn;

pub use cache::SnapshotCache;
pub use error::EepromError;

/// Reads FTDI EEPROM descriptors, caching results per serial number.
pub struct EepromReader {
    cache: SnapshotCache,
    ttl: Duration,
}

impl EepromReader {
    pub fn new(ttl: Duration) -> Self {
        Self { cache: SnapshotCache::new(), ttl }
    }

    /// Read the EEPROM of the device with the given serial number, using a
    /// cached snapshot if one is younger than the configured TTL.
    ///
    /// Blocking; run via `tokio::task::spawn_blocking` from async callers.
    pub fn read_eeprom(&self, serial: &SerialNumber) -> Result<EepromSnapshot, EepromError> {
        if let Some(cached) = self.cache.get_fresh(serial, self.ttl) {
            return Ok(cached);
        }

        let snapshot = read_hardware(serial)
            .map_err(|msg| EepromError::Unavailable(serial.clone(), msg))?;
        self.cache.insert(serial.clone(), snapshot.clone());
        Ok(snapshot)
    }

    /// Read every serial in `serials`. Per-device failures are recorded as
    /// an error snapshot rather than aborting the whole batch.
    pub fn read_all_connected(
        &self,
        serials: &[SerialNumber],
    ) -> HashMap<SerialNumber, EepromSnapshot> {
        let mut out = HashMap::with_capacity(serials.len());
        for serial in serials {
            let snapshot = match self.read_eeprom(serial) {
                Ok(snapshot) => snapshot,
                Err(e) => {
                    warn!(%serial, error = %e, "EEPROM read failed for device");
                    EepromSnapshot::error(e.to_string())
                }
            };
            out.insert(serial.clone(), snapshot);
        }
        out
    }

    pub fn cache_len(&self) -> usize {
        self.cache.len()
    }
}

/// Resolve a `ProductDescription` string to a [`BibId`].
///
/// Matching rule: case-insensitive equality against the suffix of any
/// discovered `bib_<id>.xml` file. If no exact match, `translation_table`
/// (an optional user-supplied override, keyed by the raw product
/// description) is consulted. Never guesses: an ambiguous match across more
/// than one known BIB is reported as an error rather than resolved.
pub fn resolve_bib_id(
    product_description: &str,
    known_bib_ids: &[BibId],
    translation_table: Option<&HashMap<String, BibId>>,
) -> Result<BibId, EepromError> {
    let matches: Vec<&BibId> = known_bib_ids
        .iter()
        .filter(|id| id.as_str().eq_ignore_ascii_case(product_description))
        .collect();

    match matches.len() {
        1 => return Ok(matches[0].clone()),
        n if n > 1 => {
            return Err(EepromError::Ambiguous(
                product_description.to_string(),
                matches.into_iter().cloned().collect(),
            ));
        }
        _ => {}
    }

    if let Some(table) = translation_table {
        if let Some(id) = table.get(product_description) {
            return Ok(id.clone());
        }
    }

    Err(EepromError::Unresolved(product_description.to_string()))
}

/// Open the FTDI device with `serial`, read its descriptor, and close it.
///
/// Uses scoped acquisition (the `Ftdi` handle is dropped at the end of this
/// function's scope regardless of outcome) so the device is always released.
fn read_hardware(serial: &SerialNumber) -> Result<EepromSnapshot, String> {
    use libftd2xx::{Ftdi, FtdiCommon};

    let mut ftdi = Ftdi::with_serial_number(serial.as_str())
        .map_err(|e| format!("open failed: {e:?}"))?;

    let device_info = ftdi
        .device_info()
        .map_err(|e| format!("device_info failed: {e:?}"))?;

    let snapshot = read_eeprom_for_device_type(&mut ftdi, device_info.device_type)
        .map_err(|e| format!("eeprom_read failed: {e:?}"))?;

    // `ftdi` is dropped here, closing the handle regardless of the branch taken above.
    Ok(snapshot)
}

/// Dispatches to the chip-specific EEPROM struct each FTDI device family
/// requires, normalizing the result into our own [`EepromSnapshot`].
fn read_eeprom_for_device_type(
    ftdi: &mut libftd2xx::Ftdi,
    device_type: libftd2xx::DeviceType,
) -> Result<EepromSnapshot, libftd2xx::FtStatus> {
    use libftd2xx::DeviceType;

    macro_rules! read_eeprom_as {
        ($chip:ty) => {{
            let mut chip: $chip = ftdi.clone().try_into().expect("device type already matched");
            let (eeprom, strings) = chip.eeprom_read()?;
            let header = eeprom.header();
            Ok(EepromSnapshot {
                product_description: strings.description(),
                manufacturer: strings.manufacturer(),
                max_power_ma: header.max_current(),
                self_powered: header.self_powered(),
                remote_wakeup: header.remote_wakeup(),
                usb_version: 0x0200,
                read_at: std::time::SystemTime::now(),
                error: None,
            })
        }};
    }

    match device_type {
        DeviceType::FT232R => read_eeprom_as!(libftd2xx::Ft232r),
        DeviceType::FT2232H => read_eeprom_as!(libftd2xx::Ft2232h),
        DeviceType::FT4232H => read_eeprom_as!(libftd2xx::Ft4232h),
        DeviceType::FT232H => read_eeprom_as!(libftd2xx::Ft232h),
        DeviceType::FT230X => read_eeprom_as!(libftd2xx::Ft230x),
        _ => Err(libftd2xx::FtStatus::DEVICE_NOT_FOUND),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bib(id: &str) -> BibId {
        BibId::from(id)
    }

    #[test]
    fn resolves_exact_case_insensitive_match() {
        let known = vec![bib("demo"), bib("bench2")];
        let resolved = resolve_bib_id("DEMO", &known, None).unwrap();
        assert_eq!(resolved, bib("demo"));
    }

    #[test]
    fn falls_back_to_translation_table_when_no_direct_match() {
        let known = vec![bib("demo")];
        let mut table = HashMap::new();
        table.insert("Legacy Rig Board".to_string(), bib("demo"));
        let resolved = resolve_bib_id("Legacy Rig Board", &known, Some(&table)).unwrap();
        assert_eq!(resolved, bib("demo"));
    }

    #[test]
    fn unresolved_when_nothing_matches() {
        let known = vec![bib("demo")];
        let err = resolve_bib_id("Unknown Board", &known, None).unwrap_err();
        assert!(matches!(err, EepromError::Unresolved(_)));
    }

    #[test]
    fn ambiguous_when_multiple_bibs_share_a_description() {
        let known = vec![bib("demo"), bib("DEMO")];
        let err = resolve_bib_id("demo", &known, None).unwrap_err();
        assert!(matches!(err, EepromError::Ambiguous(_, _)));
    }
}
