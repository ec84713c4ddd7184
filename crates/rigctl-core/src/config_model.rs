//! The declarative BIB → UUT → PORT configuration model (component C).

use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::ids::{BibId, UutId};

/// A Board-In-Board: the top-level declarative unit, one XML file per BIB.
///
/// Invariant: `id` equals the suffix of the source filename `bib_<id>.xml`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BibConfiguration {
    /// BIB identifier; must equal the `<id>` suffix of `bib_<id>.xml`.
    pub id: BibId,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Simulated-GPIO configuration, enabled per BIB.
    #[serde(default)]
    pub hardware_simulation: Option<HardwareSimulationConfig>,
    /// UUTs declared in this BIB, in file order.
    pub uuts: Vec<UutConfiguration>,
    /// Free-form metadata carried alongside the BIB (not interpreted by the core).
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

/// A unit under test: a logical group of one or more ports within a BIB.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UutConfiguration {
    /// UUT identifier, unique within its BIB.
    pub id: UutId,
    /// Human-readable description.
    #[serde(default)]
    pub description: String,
    /// Logical port slots, each bound at runtime to an OS port via EEPROM mapping.
    pub ports: Vec<PortConfiguration>,
}

/// One logical port slot within a UUT.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortConfiguration {
    /// 1-based port number, unique within its UUT.
    pub number: u32,
    /// Wire protocol. Only `rs232` is currently supported.
    pub protocol: ProtocolTag,
    /// Baud rate and n81-style line encoding.
    pub line_settings: LineSettings,
    /// Command sequence run once at the start of a UUT's production loop.
    #[serde(default)]
    pub start: CommandSequence,
    /// Command sequence run repeatedly inside the production loop.
    #[serde(default)]
    pub test: CommandSequence,
    /// Command sequence run once at the end of a UUT's production loop.
    #[serde(default)]
    pub stop: CommandSequence,
    /// Read timeout applied when opening the session.
    pub read_timeout_ms: u64,
    /// Write timeout applied when opening the session.
    pub write_timeout_ms: u64,
    /// Protocol-specific extra key/value settings, currently unused by `rs232`.
    #[serde(default)]
    pub extras: HashMap<String, String>,
}

/// Wire protocol tag. Only `Rs232` is implemented; the variant exists so
/// future protocols can be added without reshaping [`PortConfiguration`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolTag {
    /// RS-232 serial.
    Rs232,
}

impl std::fmt::Display for ProtocolTag {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ProtocolTag::Rs232 => write!(f, "rs232"),
        }
    }
}

/// Baud rate plus an n81-style `[n|e|o|m|s][5-8][1|2|5]` line encoding.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LineSettings {
    /// Baud rate (e.g. 9600, 115200). A warning, not an error, if non-standard.
    pub baud: u32,
    /// Three-character pattern, e.g. `"n81"`: parity, data bits, stop bits.
    pub data_pattern: DataPattern,
}

/// Parsed `[n|e|o|m|s][5-8][1|2|5]` triplet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DataPattern {
    pub parity: Parity,
    pub data_bits: u8,
    pub stop_bits: StopBits,
}

impl DataPattern {
    /// Parse a three-character data-pattern string such as `"n81"`.
    pub fn parse(s: &str) -> Result<Self, DataPatternError> {
        let chars: Vec<char> = s.chars().collect();
        if chars.len() != 3 {
            return Err(DataPatternError::WrongLength(s.to_string()));
        }
        let parity = Parity::from_char(chars[0]).ok_or_else(|| DataPatternError::BadParity(chars[0]))?;
        let data_bits = chars[1]
            .to_digit(10)
            .filter(|d| (5..=8).contains(d))
            .ok_or(DataPatternError::BadDataBits(chars[1]))? as u8;
        let stop_bits = StopBits::from_char(chars[2]).ok_or(DataPatternError::BadStopBits(chars[2]))?;
        Ok(Self { parity, data_bits, stop_bits })
    }
}

impl TryFrom<String> for DataPattern {
    type Error = DataPatternError;
    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<DataPattern> for String {
    fn from(value: DataPattern) -> Self {
        format!("{value}")
    }
}

impl std::fmt::Display for DataPattern {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}{}{}", self.parity.as_char(), self.data_bits, self.stop_bits.as_char())
    }
}

/// Error parsing a [`DataPattern`] string.
#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum DataPatternError {
    #[error("data pattern {0:?} must be exactly 3 characters")]
    WrongLength(String),
    #[error("unknown parity character {0:?}")]
    BadParity(char),
    #[error("data bits character {0:?} must be 5-8")]
    BadDataBits(char),
    #[error("unknown stop-bits character {0:?}")]
    BadStopBits(char),
}

/// Parity setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Parity {
    None,
    Even,
    Odd,
    Mark,
    Space,
}

impl Parity {
    fn from_char(c: char) -> Option<Self> {
        match c.to_ascii_lowercase() {
            'n' => Some(Self::None),
            'e' => Some(Self::Even),
            'o' => Some(Self::Odd),
            'm' => Some(Self::Mark),
            's' => Some(Self::Space),
            _ => None,
        }
    }

    fn as_char(&self) -> char {
        match self {
            Self::None => 'n',
            Self::Even => 'e',
            Self::Odd => 'o',
            Self::Mark => 'm',
            Self::Space => 's',
        }
    }
}

/// Stop-bits setting. `OnePointFive` is encoded as `'5'` in the data pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopBits {
    One,
    OnePointFive,
    Two,
}

impl StopBits {
    fn from_char(c: char) -> Option<Self> {
        match c {
            '1' => Some(Self::One),
            '5' => Some(Self::OnePointFive),
            '2' => Some(Self::Two),
            _ => None,
        }
    }

    fn as_char(&self) -> char {
        match self {
            Self::One => '1',
            Self::OnePointFive => '5',
            Self::Two => '2',
        }
    }
}

/// Standard baud rates. A `data_pattern` baud outside this list is a
/// validation *warning*, not an error.
pub const STANDARD_BAUD_RATES: &[u32] =
    &[110, 300, 600, 1200, 2400, 4800, 9600, 14400, 19200, 38400, 57600, 115200, 230400, 460800, 921600];

/// Ordered list of commands plus sequence-level policy.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CommandSequence {
    /// Commands to run in order. May be empty.
    #[serde(default)]
    pub commands: Vec<ProtocolCommand>,
    /// Overall timeout bounding cumulative elapsed time across all commands.
    #[serde(default)]
    pub sequence_timeout_ms: u64,
    /// When `false` (default), the first failing command aborts the sequence.
    #[serde(default)]
    pub continue_on_failure: bool,
}

impl CommandSequence {
    /// Overall sequence timeout as a [`Duration`].
    pub fn sequence_timeout(&self) -> Duration {
        Duration::from_millis(self.sequence_timeout_ms)
    }
}

/// One outbound command plus its expected-response patterns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProtocolCommand {
    /// Outbound bytes, with `\r`, `\n`, `\t` escapes resolved to literal control characters.
    pub outbound: String,
    /// Expected-response pattern set, evaluated by the validator.
    pub patterns: ResponsePatterns,
    /// Per-command timeout.
    pub timeout_ms: u64,
    /// Number of retries on transient failure.
    #[serde(default)]
    pub retry_count: u32,
    /// Delay between retries.
    #[serde(default)]
    pub retry_delay_ms: u64,
}

impl ProtocolCommand {
    /// Per-command timeout as a [`Duration`].
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Delay between retry attempts as a [`Duration`].
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }
}

/// Severity-ordered set of expected-response patterns for one command.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsePatterns {
    /// Mandatory PASS pattern.
    pub pass: ResponsePattern,
    /// Optional WARN pattern, checked before PASS.
    #[serde(default)]
    pub warn: Option<ResponsePattern>,
    /// Optional FAIL pattern, checked before WARN.
    #[serde(default)]
    pub fail: Option<ResponsePattern>,
    /// Optional CRITICAL pattern, checked first of all.
    #[serde(default)]
    pub critical: Option<ResponsePattern>,
}

/// A single expected-response pattern.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponsePattern {
    /// The literal string or regex source.
    pub pattern: String,
    /// When `true`, `pattern` is compiled as a regex; otherwise matched literally.
    #[serde(default)]
    pub is_regex: bool,
}

/// Enables a virtual GPIO provider per BIB.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HardwareSimulationConfig {
    /// Whether simulation is active for this BIB (vs. a real GPIO provider).
    #[serde(default)]
    pub enabled: bool,
    /// Free-form simulation mode label, carried through from the XML `mode` attribute.
    #[serde(default)]
    pub mode: String,
    /// Start-trigger timing.
    pub start_trigger: StartTrigger,
    /// Stop-trigger timing. `None` means the loop runs until service shutdown.
    #[serde(default)]
    pub stop_trigger: Option<StopTrigger>,
    /// Critical-trigger behavior.
    #[serde(default)]
    pub critical_trigger: CriticalTriggerConfig,
    /// Wall-clock speed multiplier applied to all simulated delays.
    pub speed_multiplier: f64,
    /// Randomized jitter/response-variation behavior.
    #[serde(default)]
    pub random_behavior: RandomBehaviorConfig,
    /// Optional deterministic seed for the simulator's RNG.
    #[serde(default)]
    pub random_seed: Option<u64>,
    /// Whether a FAIL-level validation should also assert the critical
    /// hardware output (Open Question resolution: default `false`).
    #[serde(default)]
    pub trigger_hardware_on_fail: bool,
}

/// Start-trigger delay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StartTrigger {
    /// Seconds of (unscaled) delay before `waitForStart` resolves.
    pub delay_seconds: f64,
}

/// Stop-trigger delay.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StopTrigger {
    /// Seconds after loop start at which `shouldStop` begins returning true.
    pub delay_seconds: f64,
}

/// Critical-event simulation behavior.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct CriticalTriggerConfig {
    /// Whether critical events can be generated at all.
    pub enabled: bool,
    /// Per-iteration probability of a critical event firing, in `[0, 1]`.
    pub probability: f64,
}

/// Randomized jitter / response-variation knobs.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct RandomBehaviorConfig {
    /// Whether simulated responses may vary between iterations.
    pub response_variation: bool,
    /// Fractional jitter applied to simulated delays (e.g. `0.1` = ±10%).
    pub delay_jitter_fraction: f64,
}

impl HardwareSimulationConfig {
    /// `speed_multiplier` validity range per spec.md §4.C: `(0, 10]`.
    pub fn speed_multiplier_in_range(&self) -> bool {
        self.speed_multiplier > 0.0 && self.speed_multiplier <= 10.0
    }
}
