use rigctl_core::error::{ErrorKind, HasErrorKind};

/// Every variant classifies as [`ErrorKind::LoggingUnavailable`]: this
/// crate's only job is to get logging itself stood up, so any failure
/// here is the one spec.md §7 calls fatal to the whole service.
#[derive(Debug, thiserror::Error)]
pub enum LoggingError {
    #[error("logging configuration file not found at {0}")]
    NotFound(std::path::PathBuf),
    #[error("failed to read {path}: {source}")]
    Io { path: String, source: std::io::Error },
    #[error("failed to parse logging configuration {0}: {1}")]
    ParseError(String, String),
    #[error("neither a file sink nor a console sink could be initialized ({0})")]
    NoSinkAvailable(String),
}

impl HasErrorKind for LoggingError {
    fn kind(&self) -> ErrorKind {
        ErrorKind::LoggingUnavailable
    }
}
