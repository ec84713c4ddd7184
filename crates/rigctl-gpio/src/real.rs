//! Real FTDI bit-bang GPIO provider.
//!
//! Two input bits (power-on-ready, power-down-heads-up) and two output
//! bits (critical-fail, workflow-active) on one FTDI device's GPIO port.
//! A background poller owns the only synchronous access to the handle and
//! publishes a cached snapshot the async-facing methods read without
//! blocking.

use std::io::{Read, Write};
use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use libftd2xx::{BitMode, Ftdi, FtdiCommon};
use rigctl_core::ids::SerialNumber;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;
use tracing::warn;

use crate::error::GpioError;
use crate::{GpioProvider, StartOutcome};

/// Bit layout and timing for one physical GPIO port.
#[derive(Debug, Clone, Copy)]
pub struct RealGpioConfig {
    pub power_on_ready_bit: u8,
    pub power_down_heads_up_bit: u8,
    pub critical_fail_bit: u8,
    pub workflow_active_bit: u8,
    /// When `true`, a logic-low level on a bit means "asserted".
    pub active_low: bool,
    /// How often the background poller samples the input bits.
    pub poll_period: Duration,
    /// Minimum time an output stays asserted once driven.
    pub signal_hold_time: Duration,
}

/// Drives GPIO through an FTDI device's asynchronous bit-bang mode.
pub struct RealGpioProvider {
    serial_number: SerialNumber,
    config: RealGpioConfig,
    handle: Mutex<Ftdi>,
    input_snapshot: AtomicU8,
    output_state: AtomicU8,
    critical_tx: broadcast::Sender<()>,
}

impl RealGpioProvider {
    /// Open the FTDI device with `serial_number` and place it in bit-bang
    /// mode with the configured output bits driven, inputs left floating.
    pub fn open(serial_number: &SerialNumber, config: RealGpioConfig) -> Result<Self, GpioError> {
        let mut ftdi = Ftdi::with_serial_number(serial_number.as_str())
            .map_err(|e| GpioError::HardwareInit(serial_number.clone(), format!("{e:?}")))?;

        let output_mask = (1 << config.critical_fail_bit) | (1 << config.workflow_active_bit);
        ftdi.set_bit_mode(output_mask, BitMode::AsyncBitbang)
            .map_err(|e| GpioError::HardwareInit(serial_number.clone(), format!("{e:?}")))?;

        Ok(Self {
            serial_number: serial_number.clone(),
            config,
            handle: Mutex::new(ftdi),
            input_snapshot: AtomicU8::new(0),
            output_state: AtomicU8::new(0),
            critical_tx: broadcast::channel(16).0,
        })
    }

    fn bit_asserted(&self, byte: u8, bit: u8) -> bool {
        let raw = byte & (1 << bit) != 0;
        if self.config.active_low {
            !raw
        } else {
            raw
        }
    }

    fn poll_once(&self) -> Result<u8, GpioError> {
        let mut buf = [0u8; 1];
        let mut handle = self.handle.lock().expect("gpio handle lock poisoned");
        handle.read_exact(&mut buf).map_err(|e| GpioError::ReadFailed(e.to_string()))?;
        Ok(buf[0])
    }

    fn write_output(&self, bit: u8, assert: bool) -> Result<(), GpioError> {
        let physical_high = if self.config.active_low { !assert } else { assert };
        let prev = self.output_state.load(Ordering::SeqCst);
        let next = if physical_high { prev | (1 << bit) } else { prev & !(1 << bit) };

        let mut handle = self.handle.lock().expect("gpio handle lock poisoned");
        handle.write_all(&[next]).map_err(|e| GpioError::WriteFailed(e.to_string()))?;
        drop(handle);

        self.output_state.store(next, Ordering::SeqCst);
        Ok(())
    }

    /// Continuously refresh the cached input snapshot until `cancel` fires.
    /// Must be spawned once per provider; blocking reads run off the async
    /// scheduler via `spawn_blocking`.
    pub async fn run_poller(self: Arc<Self>, cancel: CancellationToken) {
        loop {
            if cancel.is_cancelled() {
                return;
            }
            let this = self.clone();
            let poll_result = tokio::task::spawn_blocking(move || this.poll_once()).await;
            match poll_result {
                Ok(Ok(byte)) => self.input_snapshot.store(byte, Ordering::SeqCst),
                Ok(Err(e)) => warn!(serial = %self.serial_number, error = %e, "gpio poll failed"),
                Err(join_error) => warn!(error = %join_error, "gpio poller task panicked"),
            }

            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(self.config.poll_period) => {}
            }
        }
    }
}

#[async_trait]
impl GpioProvider for RealGpioProvider {
    async fn wait_for_start(&self, timeout: Duration, cancel: &CancellationToken) -> Result<StartOutcome, GpioError> {
        let deadline = Instant::now() + timeout;
        loop {
            let byte = self.input_snapshot.load(Ordering::SeqCst);
            if self.bit_asserted(byte, self.config.power_on_ready_bit) {
                return Ok(StartOutcome::Started);
            }
            if Instant::now() >= deadline {
                return Ok(StartOutcome::TimedOut);
            }
            tokio::select! {
                _ = cancel.cancelled() => return Ok(StartOutcome::Cancelled),
                _ = tokio::time::sleep(self.config.poll_period) => {}
            }
        }
    }

    fn should_stop(&self) -> bool {
        let byte = self.input_snapshot.load(Ordering::SeqCst);
        self.bit_asserted(byte, self.config.power_down_heads_up_bit)
    }

    fn subscribe_critical(&self) -> broadcast::Receiver<()> {
        self.critical_tx.subscribe()
    }

    /// Real hardware carries no dedicated critical *input*; this channel
    /// only reflects software-driven assertions raised here.
    async fn assert_critical(&self, duration: Duration) -> Result<(), GpioError> {
        self.write_output(self.config.critical_fail_bit, true)?;
        let _ = self.critical_tx.send(());
        tokio::time::sleep(duration.max(self.config.signal_hold_time)).await;
        Ok(())
    }

    async fn clear_critical(&self) -> Result<(), GpioError> {
        self.write_output(self.config.critical_fail_bit, false)
    }

    async fn set_workflow_active(&self, active: bool) -> Result<(), GpioError> {
        self.write_output(self.config.workflow_active_bit, active)
    }
}
