//! Ambient, non-BIB service settings (`rigctl.toml`), distinct from the
//! per-BIB XML model in [`crate::config_model`].

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::validation::UnmatchedResponseMode;

/// Top-level settings read once at startup, analogous in shape to the
/// teacher's `hadron.toml`-backed `ProjectConfig`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ServiceConfig {
    /// Directory watched for `bib_*.xml` files.
    pub config_dir: PathBuf,
    /// Root directory for the log hierarchy (`logs/...`).
    pub log_dir: PathBuf,
    /// Maximum number of rotating backups kept per BIB.
    pub backup_retention: usize,
    /// Debounce window for the hot-reload watcher.
    #[serde(with = "humantime_serde")]
    pub debounce_window: Duration,
    /// Default reservation time-to-live when a caller does not specify one.
    #[serde(with = "humantime_serde")]
    pub reservation_ttl: Duration,
    /// EEPROM snapshot cache time-to-live.
    #[serde(with = "humantime_serde")]
    pub eeprom_ttl: Duration,
    /// Optional cap on concurrently running (BIB, UUT) tasks across the
    /// whole service. `None` (default) means unbounded, matching the
    /// "undefined in the source" Open Question resolution in spec.md §9.
    pub max_concurrent_uuts: Option<usize>,
    /// Watcher recovery back-off after the underlying OS watch errors.
    #[serde(with = "humantime_serde")]
    pub watcher_backoff: Duration,
    /// Policy applied when a response matches none of a command's patterns.
    pub unmatched_response_mode: UnmatchedResponseMode,
    /// Real FTDI GPIO bit layout and timing (spec.md §4.F: "bit indices,
    /// active-low polarity, polling period, and signal hold time are
    /// configurable"). Applies to every BIB that resolves to real hardware.
    pub gpio: GpioLayoutConfig,
}

/// Service-wide real-GPIO bit layout, read from `rigctl.toml`. Mirrors
/// [`rigctl_gpio::real::RealGpioConfig`]'s fields; kept here rather than in
/// `rigctl-gpio` since `rigctl-core` cannot depend on it, and the CLI/bin
/// crate needs a serde-backed shape to read the setting from before
/// constructing the real `RealGpioConfig` it hands to the orchestrator.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GpioLayoutConfig {
    pub power_on_ready_bit: u8,
    pub power_down_heads_up_bit: u8,
    pub critical_fail_bit: u8,
    pub workflow_active_bit: u8,
    pub active_low: bool,
    #[serde(with = "humantime_serde")]
    pub poll_period: Duration,
    #[serde(with = "humantime_serde")]
    pub signal_hold_time: Duration,
}

impl Default for GpioLayoutConfig {
    fn default() -> Self {
        Self {
            power_on_ready_bit: 0,
            power_down_heads_up_bit: 1,
            critical_fail_bit: 2,
            workflow_active_bit: 3,
            active_low: false,
            poll_period: Duration::from_millis(50),
            signal_hold_time: Duration::from_millis(500),
        }
    }
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            config_dir: PathBuf::from("Configuration"),
            log_dir: PathBuf::from("logs"),
            backup_retention: 10,
            debounce_window: Duration::from_millis(500),
            reservation_ttl: Duration::from_secs(60),
            eeprom_ttl: crate::eeprom::DEFAULT_EEPROM_TTL,
            max_concurrent_uuts: None,
            watcher_backoff: Duration::from_secs(2),
            unmatched_response_mode: UnmatchedResponseMode::default(),
            gpio: GpioLayoutConfig::default(),
        }
    }
}

impl ServiceConfig {
    /// Load from an optional TOML file at `path`, falling back to defaults
    /// for any section/field the file omits (and entirely when the file is
    /// absent — unlike the logging config, this file's absence is not fatal).
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| anyhow::anyhow!("failed to read {}: {e}", path.display()))?;
        let config: Self = toml::from_str(&text)
            .map_err(|e| anyhow::anyhow!("failed to parse {}: {e}", path.display()))?;
        Ok(config)
    }
}
