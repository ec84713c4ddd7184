//! Shared data model, identifiers, and error vocabulary for the `rigctl`
//! production test orchestration service.
//!
//! Every other `rigctl-*` crate depends on this one; it depends on none of
//! them. Component-specific behavior (parsing, I/O, scheduling) lives in
//! the crate that owns that component — this crate only defines the types
//! that cross component boundaries.

pub mod config_model;
pub mod discovery;
pub mod eeprom;
pub mod error;
pub mod ids;
pub mod pool_model;
pub mod service_config;
pub mod validation;
pub mod workflow_model;

#[cfg(test)]
mod tests {
    use super::config_model::DataPattern;
    use super::ids::{BibId, SessionToken};
    use super::validation::{EnhancedValidationResult, ValidationLevel};

    #[test]
    fn data_pattern_round_trips() {
        let p = DataPattern::parse("n81").unwrap();
        assert_eq!(p.to_string(), "n81");
        let p2 = DataPattern::parse("e72").unwrap();
        assert_eq!(p2.to_string(), "e72");
    }

    #[test]
    fn data_pattern_rejects_wrong_length() {
        assert!(DataPattern::parse("n8").is_err());
        assert!(DataPattern::parse("n811").is_err());
    }

    #[test]
    fn data_pattern_rejects_bad_chars() {
        assert!(DataPattern::parse("x81").is_err());
        assert!(DataPattern::parse("n91").is_err());
        assert!(DataPattern::parse("n8x").is_err());
    }

    #[test]
    fn session_token_short_never_panics_on_short_strings() {
        let t = SessionToken("abc".to_string());
        assert_eq!(t.short(), "abc");
    }

    #[test]
    fn bib_id_display_matches_wrapped_string() {
        let id = BibId::from("demo");
        assert_eq!(id.to_string(), "demo");
        assert_eq!(id.as_str(), "demo");
    }

    #[test]
    fn validation_result_continue_flag_matches_level() {
        let pass = EnhancedValidationResult::new(
            ValidationLevel::Pass,
            Some("OK".into()),
            Default::default(),
            "OK",
            false,
        );
        assert!(pass.should_continue_workflow);
        assert!(!pass.should_trigger_critical_output);

        let critical = EnhancedValidationResult::new(
            ValidationLevel::Critical,
            Some("EMERGENCY".into()),
            Default::default(),
            "EMERGENCY",
            false,
        );
        assert!(!critical.should_continue_workflow);
        assert!(critical.should_trigger_critical_output);

        let fail_no_trigger = EnhancedValidationResult::new(
            ValidationLevel::Fail,
            None,
            Default::default(),
            "ERROR",
            false,
        );
        assert!(!fail_no_trigger.should_trigger_critical_output);

        let fail_with_trigger = EnhancedValidationResult::new(
            ValidationLevel::Fail,
            None,
            Default::default(),
            "ERROR",
            true,
        );
        assert!(fail_with_trigger.should_trigger_critical_output);
    }
}
