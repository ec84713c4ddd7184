use rigctl_core::error::{ErrorKind, HasErrorKind};
use rigctl_core::ids::PortName;

/// Errors surfaced when opening or tearing down a [`crate::ProtocolSession`].
///
/// Per-command failures never surface here: they are folded into a
/// [`rigctl_core::workflow_model::CommandResult`] instead, since transient
/// I/O errors and FAIL-level responses are both ordinary outcomes of
/// sending a command, not exceptional conditions.
#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("port {0} is not available to open: {1}")]
    PortUnavailable(PortName, String),
    #[error("failed to configure or open session on {0}: {1}")]
    OpenFailed(PortName, String),
}

impl HasErrorKind for ProtocolError {
    fn kind(&self) -> ErrorKind {
        match self {
            ProtocolError::PortUnavailable(..) => ErrorKind::PortUnavailable,
            ProtocolError::OpenFailed(..) => ErrorKind::ProtocolOpenError,
        }
    }
}
