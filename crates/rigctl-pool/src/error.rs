use rigctl_core::error::{ErrorKind, HasErrorKind};
use rigctl_core::ids::PortName;

/// Errors surfaced by the reservation pool.
#[derive(Debug, thiserror::Error)]
pub enum PoolError {
    #[error("port {0} is already allocated")]
    AlreadyAllocated(PortName),
    #[error("no eligible port is currently free")]
    NoneAvailable,
}

impl HasErrorKind for PoolError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::PortUnavailable
    }
}
