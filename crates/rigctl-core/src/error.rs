//! Shared error-kind vocabulary (spec.md §7).
//!
//! Component crates define their own `thiserror` enums for the actual
//! `std::error::Error` types callers match on; this module only supplies
//! the cross-cutting classification (kind + severity) that the logging
//! router (component J) and the orchestrator use to decide how loudly to
//! log a failure and whether it is fatal.

use serde::{Deserialize, Serialize};

/// Closed set of error kinds surfaced across every component boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    ConfigNotFound,
    ConfigParseError,
    ConfigInvalid,
    EepromUnavailable,
    BibUnresolved,
    PortUnavailable,
    ProtocolOpenError,
    CommandTimeout,
    ValidationFailed,
    ValidationCritical,
    Cancelled,
    LoggingUnavailable,
}

/// Logging severity a given [`ErrorKind`] should be reported at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warn,
    Error,
    Critical,
}

impl ErrorKind {
    /// Severity this kind should be logged at, per spec.md §7's propagation policy.
    pub fn severity(self) -> Severity {
        match self {
            ErrorKind::ConfigNotFound
            | ErrorKind::BibUnresolved
            | ErrorKind::Cancelled => Severity::Warn,
            ErrorKind::ConfigParseError
            | ErrorKind::ConfigInvalid
            | ErrorKind::EepromUnavailable
            | ErrorKind::PortUnavailable
            | ErrorKind::ProtocolOpenError
            | ErrorKind::CommandTimeout
            | ErrorKind::ValidationFailed => Severity::Error,
            ErrorKind::ValidationCritical | ErrorKind::LoggingUnavailable => Severity::Critical,
        }
    }

    /// Whether this kind is fatal to the whole service (only logging/directory
    /// setup failures are, per spec.md §7: "Only `LoggingUnavailable` and
    /// directory-creation failures are fatal").
    pub fn is_fatal(self) -> bool {
        matches!(self, ErrorKind::LoggingUnavailable)
    }
}

/// Implemented by every component's error enum so cross-cutting code (the
/// log router, the orchestrator's failure reporting) can classify an error
/// without matching on component-specific variants.
pub trait HasErrorKind {
    /// Classify this error into the shared taxonomy.
    fn kind(&self) -> ErrorKind;
}
