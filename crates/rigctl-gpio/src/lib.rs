//! GPIO trigger providers (component F): real FTDI bit-bang and simulated.
//!
//! Both variants implement [`GpioProvider`] so the orchestrator can be
//! generic over which one backs a given BIB, switching purely on whether
//! that BIB's configuration carries a [`HardwareSimulationConfig`].
//!
//! [`HardwareSimulationConfig`]: rigctl_core::config_model::HardwareSimulationConfig

pub mod error;
pub mod real;
pub mod simulated;

use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

pub use error::GpioError;
pub use real::{RealGpioConfig, RealGpioProvider};
pub use simulated::SimulatedGpioProvider;

/// Result of a [`GpioProvider::wait_for_start`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StartOutcome {
    /// The start signal was observed.
    Started,
    /// `timeout` elapsed with no start signal.
    TimedOut,
    /// The cancellation token fired before either of the above.
    Cancelled,
}

/// Produces the start / stop / critical signals that drive one UUT's
/// production loop, from either real FTDI GPIO bits or a simulator.
#[async_trait]
pub trait GpioProvider: Send + Sync {
    /// Block cooperatively until the start signal is observed, `timeout`
    /// elapses, or `cancel` fires.
    async fn wait_for_start(&self, timeout: Duration, cancel: &CancellationToken) -> Result<StartOutcome, GpioError>;

    /// Snapshot of the stop signal. Non-blocking.
    fn should_stop(&self) -> bool;

    /// Subscribe to critical-input transitions. Every subscriber receives
    /// every future assertion; lagged subscribers skip ahead rather than
    /// block the broadcaster.
    fn subscribe_critical(&self) -> broadcast::Receiver<()>;

    /// Assert the critical-fail output for `duration`. No-op for simulators
    /// that do not model outputs.
    async fn assert_critical(&self, duration: Duration) -> Result<(), GpioError>;

    /// Clear the critical-fail output immediately.
    async fn clear_critical(&self) -> Result<(), GpioError>;

    /// Drive the workflow-active output.
    async fn set_workflow_active(&self, active: bool) -> Result<(), GpioError>;
}
