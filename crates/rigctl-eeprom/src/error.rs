use rigctl_core::error::{ErrorKind, HasErrorKind};
use rigctl_core::ids::{BibId, SerialNumber};

/// Errors surfaced by the EEPROM reader and BIB mapper.
#[derive(Debug, thiserror::Error)]
pub enum EepromError {
    #[error("FTDI device {0} is absent, busy, or reported a non-success status: {1}")]
    Unavailable(SerialNumber, String),
    #[error("product description {0:?} matches no known BIB")]
    Unresolved(String),
    #[error("product description {0:?} matches more than one BIB: {1:?}")]
    Ambiguous(String, Vec<BibId>),
}

impl HasErrorKind for EepromError {
    fn kind(&self) -> ErrorKind {
        match self {
            EepromError::Unavailable(_, _) => ErrorKind::EepromUnavailable,
            EepromError::Unresolved(_) | EepromError::Ambiguous(_, _) => ErrorKind::BibUnresolved,
        }
    }
}
