//! Business-rule validation over an already-parsed [`BibConfiguration`]
//! (spec.md §4.C validation rules).

use std::collections::HashSet;

use rigctl_core::config_model::{BibConfiguration, CommandSequence, PortConfiguration, STANDARD_BAUD_RATES};

use crate::diagnostics::Diagnostic;

/// Validate `bib`, returning every diagnostic found. An empty result means
/// the BIB is fully valid; diagnostics of [`crate::diagnostics::DiagnosticSeverity::Error`]
/// severity mean the caller should reject the BIB with `ConfigInvalid`.
pub fn validate(bib: &BibConfiguration) -> Vec<Diagnostic> {
    let mut diagnostics = Vec::new();

    if let Some(sim) = &bib.hardware_simulation {
        if !sim.speed_multiplier_in_range() {
            diagnostics.push(Diagnostic::error(
                "hardware_simulation.speed_multiplier",
                format!("speed_multiplier {} must be in (0, 10]", sim.speed_multiplier),
            ));
        }
        if sim.start_trigger.delay_seconds < 0.0 {
            diagnostics.push(Diagnostic::error(
                "hardware_simulation.start_trigger.delay_seconds",
                "delay must be non-negative",
            ));
        }
        if let Some(stop) = &sim.stop_trigger {
            if stop.delay_seconds < 0.0 {
                diagnostics.push(Diagnostic::error(
                    "hardware_simulation.stop_trigger.delay_seconds",
                    "delay must be non-negative",
                ));
            }
        }
    }

    for (uut_idx, uut) in bib.uuts.iter().enumerate() {
        let mut seen_numbers = HashSet::new();
        for (port_idx, port) in uut.ports.iter().enumerate() {
            let path = format!("uut[{uut_idx}].port[{port_idx}]");
            validate_port(port, &path, &mut seen_numbers, &mut diagnostics);
        }
    }

    diagnostics
}

fn validate_port(
    port: &PortConfiguration,
    path: &str,
    seen_numbers: &mut HashSet<u32>,
    diagnostics: &mut Vec<Diagnostic>,
) {
    if port.number == 0 {
        diagnostics.push(Diagnostic::error(
            format!("{path}.number"),
            "port number must be positive",
        ));
    } else if !seen_numbers.insert(port.number) {
        diagnostics.push(Diagnostic::error(
            format!("{path}.number"),
            format!("port number {} is not unique within its UUT", port.number),
        ));
    }

    if !STANDARD_BAUD_RATES.contains(&port.line_settings.baud) {
        diagnostics.push(Diagnostic::warning(
            format!("{path}.line_settings.baud"),
            format!("baud rate {} is not a standard rate", port.line_settings.baud),
        ));
    }

    validate_sequence(&port.start, &format!("{path}.start"), diagnostics);
    validate_sequence(&port.test, &format!("{path}.test"), diagnostics);
    validate_sequence(&port.stop, &format!("{path}.stop"), diagnostics);
}

fn validate_sequence(sequence: &CommandSequence, path: &str, diagnostics: &mut Vec<Diagnostic>) {
    for (cmd_idx, command) in sequence.commands.iter().enumerate() {
        let cmd_path = format!("{path}.command[{cmd_idx}]");
        if command.outbound.is_empty() {
            diagnostics.push(Diagnostic::error(
                format!("{cmd_path}.outbound"),
                "outbound string must be non-empty",
            ));
        }
        if command.timeout_ms == 0 {
            diagnostics.push(Diagnostic::error(
                format!("{cmd_path}.timeout_ms"),
                "timeout must be positive",
            ));
        }

        for (label, pattern) in [
            ("pass", Some(&command.patterns.pass)),
            ("warn", command.patterns.warn.as_ref()),
            ("fail", command.patterns.fail.as_ref()),
            ("critical", command.patterns.critical.as_ref()),
        ] {
            let Some(pattern) = pattern else { continue };
            if pattern.is_regex {
                if let Err(e) = regex::Regex::new(&pattern.pattern) {
                    diagnostics.push(Diagnostic::error(
                        format!("{cmd_path}.{label}.pattern"),
                        format!("regex does not compile: {e}"),
                    ));
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigctl_core::config_model::*;
    use rigctl_core::ids::{BibId, UutId};

    fn minimal_bib() -> BibConfiguration {
        BibConfiguration {
            id: BibId::from("demo"),
            description: String::new(),
            hardware_simulation: None,
            uuts: vec![UutConfiguration {
                id: UutId::from("uut1"),
                description: String::new(),
                ports: vec![PortConfiguration {
                    number: 1,
                    protocol: ProtocolTag::Rs232,
                    line_settings: LineSettings {
                        baud: 115200,
                        data_pattern: DataPattern::parse("n81").unwrap(),
                    },
                    start: CommandSequence::default(),
                    test: CommandSequence::default(),
                    stop: CommandSequence::default(),
                    read_timeout_ms: 1000,
                    write_timeout_ms: 1000,
                    extras: Default::default(),
                }],
            }],
            metadata: Default::default(),
        }
    }

    #[test]
    fn minimal_valid_bib_has_no_errors() {
        let diagnostics = validate(&minimal_bib());
        assert!(diagnostics.iter().all(|d| !d.is_error()));
    }

    #[test]
    fn zero_port_number_is_an_error() {
        let mut bib = minimal_bib();
        bib.uuts[0].ports[0].number = 0;
        let diagnostics = validate(&bib);
        assert!(diagnostics.iter().any(|d| d.is_error()));
    }

    #[test]
    fn duplicate_port_numbers_within_a_uut_is_an_error() {
        let mut bib = minimal_bib();
        let port = bib.uuts[0].ports[0].clone();
        bib.uuts[0].ports.push(port);
        let diagnostics = validate(&bib);
        assert!(diagnostics.iter().any(|d| d.is_error() && d.path.ends_with(".number")));
    }

    #[test]
    fn nonstandard_baud_is_a_warning_not_an_error() {
        let mut bib = minimal_bib();
        bib.uuts[0].ports[0].line_settings.baud = 12345;
        let diagnostics = validate(&bib);
        assert!(diagnostics.iter().any(|d| !d.is_error()));
        assert!(diagnostics.iter().all(|d| !d.is_error() || d.path != "uut[0].port[0].line_settings.baud"));
    }

    #[test]
    fn invalid_regex_pattern_is_an_error() {
        let mut bib = minimal_bib();
        bib.uuts[0].ports[0].start = CommandSequence {
            commands: vec![ProtocolCommand {
                outbound: "ATZ\r\n".to_string(),
                patterns: ResponsePatterns {
                    pass: ResponsePattern { pattern: "(unterminated".to_string(), is_regex: true },
                    warn: None,
                    fail: None,
                    critical: None,
                },
                timeout_ms: 1000,
                retry_count: 0,
                retry_delay_ms: 0,
            }],
            sequence_timeout_ms: 1000,
            continue_on_failure: false,
        };
        let diagnostics = validate(&bib);
        assert!(diagnostics.iter().any(|d| d.is_error() && d.path.contains("pass")));
    }

    #[test]
    fn zero_timeout_command_is_an_error() {
        let mut bib = minimal_bib();
        bib.uuts[0].ports[0].start = CommandSequence {
            commands: vec![ProtocolCommand {
                outbound: "ATZ\r\n".to_string(),
                patterns: ResponsePatterns {
                    pass: ResponsePattern { pattern: "OK".to_string(), is_regex: false },
                    warn: None,
                    fail: None,
                    critical: None,
                },
                timeout_ms: 0,
                retry_count: 0,
                retry_delay_ms: 0,
            }],
            sequence_timeout_ms: 1000,
            continue_on_failure: false,
        };
        let diagnostics = validate(&bib);
        assert!(diagnostics.iter().any(|d| d.is_error() && d.path.ends_with("timeout_ms")));
    }
}
