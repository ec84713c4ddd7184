use rigctl_core::error::{ErrorKind, HasErrorKind};

/// Composed error type for the orchestrator and its dispatcher.
///
/// Every component error flows through here via `#[from]` so call sites
/// inside the orchestrator can use `?` across crate boundaries; per-UUT
/// task failures themselves are folded into a
/// [`rigctl_core::workflow_model::BibWorkflowResult`] rather than
/// propagated as `Err`, matching the protocol handler's "failures are
/// outcomes, not exceptions" convention.
#[derive(Debug, thiserror::Error)]
pub enum WorkflowError {
    #[error(transparent)]
    Config(#[from] rigctl_config::ConfigError),
    #[error(transparent)]
    Discovery(#[from] rigctl_discovery::DiscoveryError),
    #[error(transparent)]
    Eeprom(#[from] rigctl_eeprom::EepromError),
    #[error(transparent)]
    Pool(#[from] rigctl_pool::PoolError),
    #[error(transparent)]
    Gpio(#[from] rigctl_gpio::GpioError),
    #[error(transparent)]
    Protocol(#[from] rigctl_protocol::ProtocolError),
    #[error(transparent)]
    Watch(#[from] rigctl_watch::WatchError),
    #[error("no port available for {uut_id}/{port_number} matching the configured criteria")]
    NoPortAvailable { uut_id: String, port_number: u32 },
    #[error("BIB {0} has no resolvable device (no EEPROM match and no simulation configured)")]
    DeviceUnresolved(rigctl_core::ids::BibId),
}

impl HasErrorKind for WorkflowError {
    fn kind(&self) -> ErrorKind {
        match self {
            WorkflowError::Config(e) => e.kind(),
            WorkflowError::Discovery(e) => e.kind(),
            WorkflowError::Eeprom(e) => e.kind(),
            WorkflowError::Pool(e) => e.kind(),
            WorkflowError::Gpio(e) => e.kind(),
            WorkflowError::Protocol(e) => e.kind(),
            WorkflowError::Watch(e) => e.kind(),
            WorkflowError::NoPortAvailable { .. } => ErrorKind::PortUnavailable,
            WorkflowError::DeviceUnresolved(_) => ErrorKind::BibUnresolved,
        }
    }
}
