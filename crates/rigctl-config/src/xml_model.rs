//! Wire-format XML DTOs and their conversion into [`rigctl_core::config_model`].
//!
//! Kept separate from the domain model because the domain types (newtype
//! ids, the `DataPattern` `TryFrom<String>` wrapper, `ProtocolTag`) do not
//! map cleanly onto `quick_xml`'s attribute/element conventions; this
//! module absorbs that impedance mismatch in one place.

use serde::Deserialize;

use rigctl_core::config_model::{
    BibConfiguration, CommandSequence, CriticalTriggerConfig, DataPattern, HardwareSimulationConfig,
    LineSettings, PortConfiguration, ProtocolCommand, ProtocolTag, RandomBehaviorConfig,
    ResponsePattern, ResponsePatterns, StartTrigger, StopTrigger, UutConfiguration,
};
use rigctl_core::ids::{BibId, UutId};

use crate::error::ConfigError;

#[derive(Debug, Deserialize)]
#[serde(rename = "bib")]
pub struct XmlBib {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@description", default)]
    pub description: String,
    #[serde(default)]
    pub hardware_simulation: Option<XmlHardwareSimulation>,
    #[serde(rename = "uut", default)]
    pub uuts: Vec<XmlUut>,
}

#[derive(Debug, Deserialize)]
pub struct XmlHardwareSimulation {
    #[serde(rename = "@enabled", default)]
    pub enabled: bool,
    #[serde(rename = "@mode", default)]
    pub mode: String,
    pub start_trigger: XmlDelay,
    #[serde(default)]
    pub stop_trigger: Option<XmlDelay>,
    #[serde(default)]
    pub critical_trigger: XmlCriticalTrigger,
    pub speed_multiplier: f64,
    #[serde(default)]
    pub random_behavior: XmlRandomBehavior,
    #[serde(default)]
    pub random_seed: Option<u64>,
    #[serde(default)]
    pub trigger_hardware_on_fail: bool,
}

#[derive(Debug, Deserialize)]
pub struct XmlDelay {
    #[serde(rename = "@delay_seconds")]
    pub delay_seconds: f64,
}

#[derive(Debug, Default, Deserialize)]
pub struct XmlCriticalTrigger {
    #[serde(rename = "@enabled", default)]
    pub enabled: bool,
    #[serde(rename = "@probability", default)]
    pub probability: f64,
}

#[derive(Debug, Default, Deserialize)]
pub struct XmlRandomBehavior {
    #[serde(rename = "@response_variation", default)]
    pub response_variation: bool,
    #[serde(rename = "@delay_jitter_fraction", default)]
    pub delay_jitter_fraction: f64,
}

#[derive(Debug, Deserialize)]
pub struct XmlUut {
    #[serde(rename = "@id")]
    pub id: String,
    #[serde(rename = "@description", default)]
    pub description: String,
    #[serde(rename = "port", default)]
    pub ports: Vec<XmlPort>,
}

#[derive(Debug, Deserialize)]
pub struct XmlPort {
    #[serde(rename = "@number")]
    pub number: i64,
    pub protocol: String,
    pub speed: u32,
    pub data_pattern: String,
    pub read_timeout_ms: u64,
    pub write_timeout_ms: u64,
    #[serde(default)]
    pub start: XmlCommandSequence,
    #[serde(default)]
    pub test: XmlCommandSequence,
    #[serde(default)]
    pub stop: XmlCommandSequence,
}

#[derive(Debug, Default, Deserialize)]
pub struct XmlCommandSequence {
    #[serde(rename = "@sequence_timeout_ms", default)]
    pub sequence_timeout_ms: u64,
    #[serde(rename = "@continue_on_failure", default)]
    pub continue_on_failure: bool,
    #[serde(rename = "command", default)]
    pub commands: Vec<XmlCommand>,
}

#[derive(Debug, Deserialize)]
pub struct XmlCommand {
    #[serde(rename = "@outbound")]
    pub outbound: String,
    #[serde(rename = "@timeout_ms")]
    pub timeout_ms: u64,
    #[serde(rename = "@retry_count", default)]
    pub retry_count: u32,
    #[serde(rename = "@retry_delay_ms", default)]
    pub retry_delay_ms: u64,
    pub pass: XmlPattern,
    #[serde(default)]
    pub warn: Option<XmlPattern>,
    #[serde(default)]
    pub fail: Option<XmlPattern>,
    #[serde(default)]
    pub critical: Option<XmlPattern>,
}

#[derive(Debug, Deserialize)]
pub struct XmlPattern {
    #[serde(rename = "@pattern")]
    pub pattern: String,
    #[serde(rename = "@is_regex", default)]
    pub is_regex: bool,
}

/// Resolve literal `\r`, `\n`, `\t` escape sequences embedded in an XML
/// attribute into real control characters (spec.md §4.G).
fn unescape_outbound(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    let mut chars = s.chars().peekable();
    while let Some(c) = chars.next() {
        if c == '\\' {
            match chars.peek() {
                Some('r') => {
                    out.push('\r');
                    chars.next();
                }
                Some('n') => {
                    out.push('\n');
                    chars.next();
                }
                Some('t') => {
                    out.push('\t');
                    chars.next();
                }
                _ => out.push(c),
            }
        } else {
            out.push(c);
        }
    }
    out
}

impl XmlBib {
    /// Convert the parsed XML DTO tree into the domain model, rejecting
    /// anything that cannot be structurally represented (unknown protocol
    /// tag, malformed data pattern) with a [`ConfigError::ParseError`].
    /// Business-rule validation (uniqueness, ranges, regex compilation)
    /// happens afterward in [`crate::validate::validate`].
    pub fn into_model(self, expected_id: &BibId) -> Result<BibConfiguration, ConfigError> {
        let bib_id = BibId::from(self.id.clone());
        let uuts = self
            .uuts
            .into_iter()
            .map(|u| u.into_model(expected_id))
            .collect::<Result<Vec<_>, _>>()?;

        Ok(BibConfiguration {
            id: bib_id,
            description: self.description,
            hardware_simulation: self
                .hardware_simulation
                .map(|h| h.into_model(expected_id))
                .transpose()?,
            uuts,
            metadata: Default::default(),
        })
    }
}

impl XmlHardwareSimulation {
    fn into_model(self, _bib_id: &BibId) -> Result<HardwareSimulationConfig, ConfigError> {
        Ok(HardwareSimulationConfig {
            enabled: self.enabled,
            mode: self.mode,
            start_trigger: StartTrigger { delay_seconds: self.start_trigger.delay_seconds },
            stop_trigger: self.stop_trigger.map(|d| StopTrigger { delay_seconds: d.delay_seconds }),
            critical_trigger: CriticalTriggerConfig {
                enabled: self.critical_trigger.enabled,
                probability: self.critical_trigger.probability,
            },
            speed_multiplier: self.speed_multiplier,
            random_behavior: RandomBehaviorConfig {
                response_variation: self.random_behavior.response_variation,
                delay_jitter_fraction: self.random_behavior.delay_jitter_fraction,
            },
            random_seed: self.random_seed,
            trigger_hardware_on_fail: self.trigger_hardware_on_fail,
        })
    }
}

impl XmlUut {
    fn into_model(self, bib_id: &BibId) -> Result<UutConfiguration, ConfigError> {
        let ports = self
            .ports
            .into_iter()
            .map(|p| p.into_model(bib_id))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(UutConfiguration { id: UutId::from(self.id), description: self.description, ports })
    }
}

impl XmlPort {
    fn into_model(self, bib_id: &BibId) -> Result<PortConfiguration, ConfigError> {
        if self.protocol.trim().to_lowercase() != "rs232" {
            return Err(ConfigError::ParseError(
                bib_id.clone(),
                format!("unknown protocol tag {:?} (only \"rs232\" is supported)", self.protocol),
            ));
        }
        let data_pattern = DataPattern::parse(&self.data_pattern).map_err(|e| {
            ConfigError::ParseError(bib_id.clone(), format!("invalid data_pattern: {e}"))
        })?;

        Ok(PortConfiguration {
            number: self.number.max(0) as u32,
            protocol: ProtocolTag::Rs232,
            line_settings: LineSettings { baud: self.speed, data_pattern },
            start: self.start.into_model(),
            test: self.test.into_model(),
            stop: self.stop.into_model(),
            read_timeout_ms: self.read_timeout_ms,
            write_timeout_ms: self.write_timeout_ms,
            extras: Default::default(),
        })
    }
}

impl XmlCommandSequence {
    fn into_model(self) -> CommandSequence {
        CommandSequence {
            commands: self.commands.into_iter().map(XmlCommand::into_model).collect(),
            sequence_timeout_ms: self.sequence_timeout_ms,
            continue_on_failure: self.continue_on_failure,
        }
    }
}

impl XmlCommand {
    fn into_model(self) -> ProtocolCommand {
        ProtocolCommand {
            outbound: unescape_outbound(&self.outbound),
            patterns: ResponsePatterns {
                pass: self.pass.into_model(),
                warn: self.warn.map(XmlPattern::into_model),
                fail: self.fail.map(XmlPattern::into_model),
                critical: self.critical.map(XmlPattern::into_model),
            },
            timeout_ms: self.timeout_ms,
            retry_count: self.retry_count,
            retry_delay_ms: self.retry_delay_ms,
        }
    }
}

impl XmlPattern {
    fn into_model(self) -> ResponsePattern {
        ResponsePattern { pattern: self.pattern, is_regex: self.is_regex }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unescape_resolves_common_control_sequences() {
        assert_eq!(unescape_outbound("ATZ\\r\\n"), "ATZ\r\n");
        assert_eq!(unescape_outbound("A\\tB"), "A\tB");
        assert_eq!(unescape_outbound("plain"), "plain");
    }

    #[test]
    fn rejects_unknown_protocol() {
        let port = XmlPort {
            number: 1,
            protocol: "can".to_string(),
            speed: 9600,
            data_pattern: "n81".to_string(),
            read_timeout_ms: 100,
            write_timeout_ms: 100,
            start: XmlCommandSequence::default(),
            test: XmlCommandSequence::default(),
            stop: XmlCommandSequence::default(),
        };
        let err = port.into_model(&BibId::from("demo")).unwrap_err();
        assert!(matches!(err, ConfigError::ParseError(_, _)));
    }
}
