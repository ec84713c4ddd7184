//! The logging configuration file (spec.md §6: "a single file in the
//! working directory; its absence is a fatal startup error").

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::LoggingError;

/// Settings read once at startup from the logging configuration file.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Root directory for the log hierarchy (`logs/...`).
    pub log_dir: PathBuf,
    /// Whether to also emit to the console.
    pub console_enabled: bool,
    /// `tracing_subscriber::EnvFilter` directive used at normal verbosity.
    pub filter: String,
    /// Filter directive used instead of `filter` when `--detailed-logs` is passed.
    pub detailed_filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            log_dir: PathBuf::from("logs"),
            console_enabled: true,
            filter: "info".to_string(),
            detailed_filter: "debug".to_string(),
        }
    }
}

impl LoggingConfig {
    /// Load from `path`. Unlike [`rigctl_core::service_config::ServiceConfig`],
    /// this file's absence is itself the fatal condition, per spec.md §6.
    pub fn load(path: &Path) -> Result<Self, LoggingError> {
        if !path.exists() {
            return Err(LoggingError::NotFound(path.to_path_buf()));
        }
        let text = std::fs::read_to_string(path)
            .map_err(|e| LoggingError::Io { path: path.display().to_string(), source: e })?;
        toml::from_str(&text).map_err(|e| LoggingError::ParseError(path.display().to_string(), e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn absence_is_a_loggingerror_not_found() {
        let tmp = tempfile::tempdir().unwrap();
        let err = LoggingConfig::load(&tmp.path().join("logging.toml")).unwrap_err();
        assert!(matches!(err, LoggingError::NotFound(_)));
    }

    #[test]
    fn loads_overrides_and_falls_back_to_defaults_for_missing_fields() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("logging.toml");
        std::fs::write(&path, "console_enabled = false\n").unwrap();

        let config = LoggingConfig::load(&path).unwrap();
        assert!(!config.console_enabled);
        assert_eq!(config.filter, "info");
        assert_eq!(config.log_dir, PathBuf::from("logs"));
    }
}
