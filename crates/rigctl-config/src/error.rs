use rigctl_core::error::{ErrorKind, HasErrorKind};
use rigctl_core::ids::BibId;

use crate::diagnostics::Diagnostic;

/// Errors surfaced by the configuration loader.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("no configuration file found for BIB {0}")]
    NotFound(BibId),
    #[error("failed to parse configuration for BIB {0}: {1}")]
    ParseError(BibId, String),
    #[error("configuration for BIB {0} is invalid ({} diagnostic(s))", .1.len())]
    Invalid(BibId, Vec<Diagnostic>),
    #[error("io error reading {path}: {source}")]
    Io { path: String, #[source] source: std::io::Error },
}

impl HasErrorKind for ConfigError {
    fn kind(&self) -> ErrorKind {
        match self {
            ConfigError::NotFound(_) => ErrorKind::ConfigNotFound,
            ConfigError::ParseError(_, _) => ErrorKind::ConfigParseError,
            ConfigError::Invalid(_, _) => ErrorKind::ConfigInvalid,
            ConfigError::Io { .. } => ErrorKind::ConfigNotFound,
        }
    }
}
