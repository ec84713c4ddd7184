use rigctl_core::error::{ErrorKind, HasErrorKind};

/// Errors surfaced by the hot-reload file watcher.
#[derive(Debug, thiserror::Error)]
pub enum WatchError {
    #[error("failed to establish filesystem watch on {path}: {source}")]
    WatcherSetup { path: String, #[source] source: notify::Error },
    #[error("initial scan of {path} failed: {source}")]
    InitialScan { path: String, #[source] source: std::io::Error },
}

impl HasErrorKind for WatchError {
    fn kind(&self) -> ErrorKind {
        // Neither variant maps to a fatal condition; the watcher retries
        // with back-off rather than surfacing these to the orchestrator.
        match self {
            WatchError::WatcherSetup { .. } => ErrorKind::ConfigNotFound,
            WatchError::InitialScan { .. } => ErrorKind::ConfigNotFound,
        }
    }
}
