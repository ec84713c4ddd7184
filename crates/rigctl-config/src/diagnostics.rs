//! Validation diagnostics produced by [`crate::validate::validate`].

/// Severity of one [`Diagnostic`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticSeverity {
    /// Non-fatal; the BIB still loads.
    Warning,
    /// Fatal; the BIB is rejected with `ConfigInvalid`.
    Error,
}

/// One validation finding against a parsed [`rigctl_core::config_model::BibConfiguration`].
#[derive(Debug, Clone, PartialEq)]
pub struct Diagnostic {
    pub severity: DiagnosticSeverity,
    /// Dotted path to the offending element, e.g. `uut[0].port[1].line_settings.baud`.
    pub path: String,
    pub message: String,
}

impl Diagnostic {
    pub fn error(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self { severity: DiagnosticSeverity::Error, path: path.into(), message: message.into() }
    }

    pub fn warning(path: impl Into<String>, message: impl Into<String>) -> Self {
        Self { severity: DiagnosticSeverity::Warning, path: path.into(), message: message.into() }
    }

    pub fn is_error(&self) -> bool {
        self.severity == DiagnosticSeverity::Error
    }
}

impl std::fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self.severity {
            DiagnosticSeverity::Warning => "warning",
            DiagnosticSeverity::Error => "error",
        };
        write!(f, "{label}: {} ({})", self.message, self.path)
    }
}
