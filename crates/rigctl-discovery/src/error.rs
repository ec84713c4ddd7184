use rigctl_core::error::{ErrorKind, HasErrorKind};
use rigctl_core::ids::PortName;

/// Errors surfaced by port discovery.
#[derive(Debug, thiserror::Error)]
pub enum DiscoveryError {
    #[error("failed to enumerate serial ports: {0}")]
    EnumerationFailed(String),
    #[error("port {0} not found in the current device set")]
    PortNotFound(PortName),
}

impl HasErrorKind for DiscoveryError {
    fn kind(&self) -> ErrorKind {
        match self {
            DiscoveryError::EnumerationFailed(_) => ErrorKind::PortUnavailable,
            DiscoveryError::PortNotFound(_) => ErrorKind::PortUnavailable,
        }
    }
}
