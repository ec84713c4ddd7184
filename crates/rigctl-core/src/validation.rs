//! Validation-result vocabulary shared between the validator (component H),
//! the protocol handler (G), and the orchestrator (I).

use std::collections::HashMap;

use serde::{Deserialize, Serialize};

/// Validation level, in ascending severity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ValidationLevel {
    Pass,
    Warn,
    Fail,
    Critical,
}

impl ValidationLevel {
    /// `true` for PASS/WARN, `false` for FAIL/CRITICAL — invariant 3 in spec.md §8.
    pub fn should_continue_workflow(self) -> bool {
        matches!(self, ValidationLevel::Pass | ValidationLevel::Warn)
    }
}

impl std::fmt::Display for ValidationLevel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            ValidationLevel::Pass => "PASS",
            ValidationLevel::Warn => "WARN",
            ValidationLevel::Fail => "FAIL",
            ValidationLevel::Critical => "CRITICAL",
        };
        write!(f, "{s}")
    }
}

/// Policy applied when no configured pattern matches a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum UnmatchedResponseMode {
    #[default]
    TreatAsFailure,
    TreatAsWarning,
    TreatAsPass,
}

impl UnmatchedResponseMode {
    /// The level assigned when no pattern matched.
    pub fn fallback_level(self) -> ValidationLevel {
        match self {
            UnmatchedResponseMode::TreatAsFailure => ValidationLevel::Fail,
            UnmatchedResponseMode::TreatAsWarning => ValidationLevel::Warn,
            UnmatchedResponseMode::TreatAsPass => ValidationLevel::Pass,
        }
    }
}

/// Outcome of classifying one response against a [`crate::config_model::ResponsePatterns`] set.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnhancedValidationResult {
    /// Classified severity.
    pub level: ValidationLevel,
    /// The pattern text that matched, if any pattern matched at all.
    pub matched_pattern: Option<String>,
    /// Named and numbered regex capture groups, empty for literal matches.
    pub captures: HashMap<String, String>,
    /// The raw response text that was classified.
    pub actual_response: String,
    /// Whether the state machine should proceed to the next iteration/command.
    pub should_continue_workflow: bool,
    /// Whether this result should assert the outbound critical hardware signal.
    pub should_trigger_critical_output: bool,
}

impl EnhancedValidationResult {
    /// Build a result, deriving the two behavioural flags from `level` and
    /// the `trigger_hardware_on_fail` policy.
    pub fn new(
        level: ValidationLevel,
        matched_pattern: Option<String>,
        captures: HashMap<String, String>,
        actual_response: impl Into<String>,
        trigger_hardware_on_fail: bool,
    ) -> Self {
        let should_trigger_critical_output = match level {
            ValidationLevel::Critical => true,
            ValidationLevel::Fail => trigger_hardware_on_fail,
            ValidationLevel::Pass | ValidationLevel::Warn => false,
        };
        Self {
            should_continue_workflow: level.should_continue_workflow(),
            level,
            matched_pattern,
            captures,
            actual_response: actual_response.into(),
            should_trigger_critical_output,
        }
    }
}
