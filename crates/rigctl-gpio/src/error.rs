use rigctl_core::error::{ErrorKind, HasErrorKind};
use rigctl_core::ids::SerialNumber;

/// Errors surfaced by either GPIO provider.
#[derive(Debug, thiserror::Error)]
pub enum GpioError {
    #[error("failed to initialize GPIO on device {0}: {1}")]
    HardwareInit(SerialNumber, String),
    #[error("GPIO read failed: {0}")]
    ReadFailed(String),
    #[error("GPIO write failed: {0}")]
    WriteFailed(String),
}

impl HasErrorKind for GpioError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::ProtocolOpenError
    }
}
