//! Multi-level response validator (component H).
//!
//! Pure and synchronous: no I/O, no shared state, deterministic for a
//! given `(response, patterns)` pair. Classifies one response string
//! against a [`ResponsePatterns`] set, checking CRITICAL, FAIL, WARN, PASS
//! in that order and returning the first match.

use std::collections::HashMap;

use regex::Regex;
use rigctl_core::config_model::{ResponsePattern, ResponsePatterns};
use rigctl_core::validation::{EnhancedValidationResult, UnmatchedResponseMode, ValidationLevel};

/// Classify `response` against `patterns`, falling back to `unmatched`'s
/// policy when none of PASS/WARN/FAIL/CRITICAL match.
pub fn classify(
    response: &str,
    patterns: &ResponsePatterns,
    unmatched: UnmatchedResponseMode,
    trigger_hardware_on_fail: bool,
) -> EnhancedValidationResult {
    let ordered: [(ValidationLevel, Option<&ResponsePattern>); 4] = [
        (ValidationLevel::Critical, patterns.critical.as_ref()),
        (ValidationLevel::Fail, patterns.fail.as_ref()),
        (ValidationLevel::Warn, patterns.warn.as_ref()),
        (ValidationLevel::Pass, Some(&patterns.pass)),
    ];

    for (level, maybe_pattern) in ordered {
        let Some(pattern) = maybe_pattern else { continue };
        if let Some((matched_text, captures)) = evaluate_pattern(response, pattern) {
            return EnhancedValidationResult::new(level, Some(matched_text), captures, response, trigger_hardware_on_fail);
        }
    }

    EnhancedValidationResult::new(unmatched.fallback_level(), None, HashMap::new(), response, trigger_hardware_on_fail)
}

/// The result a command timing out with no response should be classified
/// as, per spec.md's "timeout is a FAIL-level outcome by default".
pub fn timeout_result(trigger_hardware_on_fail: bool) -> EnhancedValidationResult {
    EnhancedValidationResult::new(ValidationLevel::Fail, None, HashMap::new(), String::new(), trigger_hardware_on_fail)
}

/// Check one pattern against `response`. Literal patterns match by
/// substring containment; regex patterns match anywhere in the string and
/// contribute their named and numbered capture groups. An uncompilable
/// regex is treated as non-matching rather than surfaced as an error here —
/// patterns are already validated at config load time (component C).
fn evaluate_pattern(response: &str, pattern: &ResponsePattern) -> Option<(String, HashMap<String, String>)> {
    if pattern.is_regex {
        let re = Regex::new(&pattern.pattern).ok()?;
        let caps = re.captures(response)?;
        let mut captures = HashMap::new();
        for (index, name) in re.capture_names().enumerate().skip(1) {
            if let Some(m) = caps.get(index) {
                let key = name.map(str::to_string).unwrap_or_else(|| index.to_string());
                captures.insert(key, m.as_str().to_string());
            }
        }
        Some((pattern.pattern.clone(), captures))
    } else {
        response.contains(pattern.pattern.as_str()).then(|| (pattern.pattern.clone(), HashMap::new()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn pattern(text: &str, is_regex: bool) -> ResponsePattern {
        ResponsePattern { pattern: text.to_string(), is_regex }
    }

    fn patterns(
        pass: &str,
        warn: Option<&str>,
        fail: Option<&str>,
        critical: Option<&str>,
    ) -> ResponsePatterns {
        ResponsePatterns {
            pass: pattern(pass, false),
            warn: warn.map(|p| pattern(p, false)),
            fail: fail.map(|p| pattern(p, false)),
            critical: critical.map(|p| pattern(p, false)),
        }
    }

    #[test]
    fn literal_pass_matches_by_substring() {
        let result = classify("OK ready", &patterns("OK", None, None, None), UnmatchedResponseMode::TreatAsFailure, false);
        assert_eq!(result.level, ValidationLevel::Pass);
        assert!(result.should_continue_workflow);
    }

    #[test]
    fn critical_is_checked_before_fail_warn_and_pass() {
        let p = patterns("OK", Some("WARN"), Some("FAIL"), Some("EMERGENCY"));
        let result = classify("EMERGENCY OK FAIL WARN", &p, UnmatchedResponseMode::TreatAsFailure, false);
        assert_eq!(result.level, ValidationLevel::Critical);
        assert!(result.should_trigger_critical_output);
    }

    #[test]
    fn fail_does_not_trigger_critical_output_unless_configured() {
        let p = patterns("OK", None, Some("ERR"), None);
        let result = classify("ERR 42", &p, UnmatchedResponseMode::TreatAsFailure, false);
        assert_eq!(result.level, ValidationLevel::Fail);
        assert!(!result.should_trigger_critical_output);
        assert!(!result.should_continue_workflow);
    }

    #[test]
    fn fail_triggers_critical_output_when_policy_enabled() {
        let p = patterns("OK", None, Some("ERR"), None);
        let result = classify("ERR 42", &p, UnmatchedResponseMode::TreatAsFailure, true);
        assert!(result.should_trigger_critical_output);
    }

    #[test]
    fn unmatched_response_falls_back_to_configured_mode() {
        let p = patterns("OK", None, None, None);
        let result = classify("garbage", &p, UnmatchedResponseMode::TreatAsWarning, false);
        assert_eq!(result.level, ValidationLevel::Warn);
        assert!(result.matched_pattern.is_none());
    }

    #[test]
    fn regex_pattern_extracts_named_captures() {
        let mut p = patterns("IGNORED", None, None, None);
        p.pass = pattern(r"^VOLT=(?P<millivolts>\d+)$", true);
        let result = classify("VOLT=3300", &p, UnmatchedResponseMode::TreatAsFailure, false);
        assert_eq!(result.level, ValidationLevel::Pass);
        assert_eq!(result.captures.get("millivolts"), Some(&"3300".to_string()));
    }

    #[test]
    fn timeout_result_is_fail_level_with_no_response() {
        let result = timeout_result(false);
        assert_eq!(result.level, ValidationLevel::Fail);
        assert!(!result.should_trigger_critical_output);
    }
}
