//! RS-232 session handling (component G).
//!
//! Opens one serial session per (BIB, UUT, port) triple, runs request-response
//! commands against it, and releases the native handle on close. Per-command
//! I/O failures never escape as `Result::Err` from [`send_command`]: they are
//! folded into a [`CommandResult`] so the caller's retry/abort policy stays
//! uniform whether a command failed on I/O or on response classification.

pub mod error;

use std::sync::atomic::{AtomicBool, Ordering};
use std::time::{Duration, Instant, SystemTime};

use rigctl_core::config_model::{
    CommandSequence, DataPattern, Parity as LineParity, PortConfiguration, ProtocolCommand, StopBits as LineStopBits,
};
use rigctl_core::ids::{ClientId, PortName};
use rigctl_core::validation::{UnmatchedResponseMode, ValidationLevel};
use rigctl_core::workflow_model::{CommandResult, CommandSequenceResult};
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::sync::Mutex;
use tokio_serial::{SerialPortBuilderExt, SerialStream};
use tracing::{info, warn};

pub use error::ProtocolError;

/// Quiet period after the last received byte before a response is
/// considered complete. Devices in this domain do not advertise an
/// explicit terminator, so end-of-response is inferred the same way a
/// human watching a terminal would: nothing more arrived for a while.
const INTER_BYTE_QUIET: Duration = Duration::from_millis(50);

/// An open serial session bound to one OS port.
pub struct ProtocolSession {
    port_name: PortName,
    client_id: ClientId,
    stream: Mutex<SerialStream>,
    opened_at: SystemTime,
    active: AtomicBool,
}

impl ProtocolSession {
    pub fn port_name(&self) -> &PortName {
        &self.port_name
    }

    pub fn client_id(&self) -> &ClientId {
        &self.client_id
    }

    pub fn opened_at(&self) -> SystemTime {
        self.opened_at
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::SeqCst)
    }
}

/// Open a session on `port_name` with the line settings and timeouts from
/// `port_config`. Fails with [`ProtocolError::PortUnavailable`] when the OS
/// reports the device missing, [`ProtocolError::OpenFailed`] otherwise.
pub async fn open_session(
    port_name: &PortName,
    port_config: &PortConfiguration,
    client_id: ClientId,
) -> Result<ProtocolSession, ProtocolError> {
    let overall_timeout = Duration::from_millis(port_config.read_timeout_ms.max(port_config.write_timeout_ms).max(1));

    let builder = tokio_serial::new(port_name.as_str(), port_config.line_settings.baud)
        .data_bits(to_data_bits(port_config.line_settings.data_pattern))
        .parity(to_parity(port_config.line_settings.data_pattern.parity))
        .stop_bits(to_stop_bits(port_config.line_settings.data_pattern.stop_bits))
        .timeout(overall_timeout);

    let stream = builder.open_native_async().map_err(|e| classify_open_error(port_name, &e))?;

    info!(port = %port_name, baud = port_config.line_settings.baud, "protocol session opened");

    Ok(ProtocolSession {
        port_name: port_name.clone(),
        client_id,
        stream: Mutex::new(stream),
        opened_at: SystemTime::now(),
        active: AtomicBool::new(true),
    })
}

/// Release the session's handle. Safe to call more than once; only the
/// first call logs.
pub fn close_session(session: &ProtocolSession) {
    if session.active.swap(false, Ordering::SeqCst) {
        info!(port = %session.port_name, "protocol session closed");
    }
}

/// Quick open/close probe, independent of any session.
pub async fn test_connectivity(port_name: &PortName, baud: u32) -> Result<(), ProtocolError> {
    let builder = tokio_serial::new(port_name.as_str(), baud).timeout(Duration::from_millis(250));
    builder.open_native_async().map(|_| ()).map_err(|e| classify_open_error(port_name, &e))
}

/// Send one command, retrying transient I/O failures up to
/// `command.retry_count` times with `command.retry_delay()` between
/// attempts. A timeout or a FAIL/CRITICAL classification is a normal,
/// non-retried outcome.
pub async fn send_command(
    session: &ProtocolSession,
    command: &ProtocolCommand,
    unmatched_mode: UnmatchedResponseMode,
    trigger_hardware_on_fail: bool,
) -> CommandResult {
    let started = Instant::now();
    let max_attempts = command.retry_count + 1;
    let mut attempts = 0;

    loop {
        attempts += 1;
        match try_once(session, command, unmatched_mode, trigger_hardware_on_fail).await {
            Ok((response, level)) => {
                return CommandResult { response, level, duration: started.elapsed(), attempts, error: None };
            }
            Err(message) if attempts < max_attempts => {
                warn!(port = %session.port_name, attempt = attempts, error = %message, "command attempt failed, retrying");
                tokio::time::sleep(command.retry_delay()).await;
            }
            Err(message) => {
                return CommandResult {
                    response: String::new(),
                    level: ValidationLevel::Fail,
                    duration: started.elapsed(),
                    attempts,
                    error: Some(message),
                };
            }
        }
    }
}

/// Run `sequence`'s commands in order, short-circuiting on the first
/// non-PASS/WARN result unless `continue_on_failure` is set, and bounding
/// cumulative elapsed time by `sequence_timeout_ms`.
pub async fn execute_sequence(
    session: &ProtocolSession,
    sequence: &CommandSequence,
    unmatched_mode: UnmatchedResponseMode,
    trigger_hardware_on_fail: bool,
) -> CommandSequenceResult {
    let started = Instant::now();
    let overall_timeout = sequence.sequence_timeout();
    let mut results = Vec::with_capacity(sequence.commands.len());
    let mut aborted = false;

    for command in &sequence.commands {
        if !overall_timeout.is_zero() && started.elapsed() >= overall_timeout {
            aborted = true;
            break;
        }

        let result = send_command(session, command, unmatched_mode, trigger_hardware_on_fail).await;
        let should_continue = result.level.should_continue_workflow();
        results.push(result);

        if !should_continue && !sequence.continue_on_failure {
            aborted = true;
            break;
        }
    }

    let success = !aborted && results.iter().all(|r| r.level.should_continue_workflow());
    CommandSequenceResult { commands: results, success, duration: started.elapsed(), aborted }
}

/// One write + read + classify attempt. `Err` carries a transient-failure
/// message eligible for retry; `Ok` always carries a classified level,
/// including the FAIL-level timeout case.
async fn try_once(
    session: &ProtocolSession,
    command: &ProtocolCommand,
    unmatched_mode: UnmatchedResponseMode,
    trigger_hardware_on_fail: bool,
) -> Result<(String, ValidationLevel), String> {
    let mut stream = session.stream.lock().await;

    match tokio::time::timeout(command.timeout(), stream.write_all(command.outbound.as_bytes())).await {
        Ok(Ok(())) => {}
        Ok(Err(e)) => return Err(format!("write failed: {e}")),
        Err(_elapsed) => return Err("write timed out".to_string()),
    }

    match read_response(&mut *stream, command.timeout()).await {
        ReadOutcome::Bytes(response) => {
            let result = rigctl_validate::classify(&response, &command.patterns, unmatched_mode, trigger_hardware_on_fail);
            Ok((response, result.level))
        }
        ReadOutcome::Timeout => {
            let result = rigctl_validate::timeout_result(trigger_hardware_on_fail);
            Ok((String::new(), result.level))
        }
        ReadOutcome::Io(e) => Err(format!("read failed: {e}")),
    }
}

enum ReadOutcome {
    Bytes(String),
    Timeout,
    Io(std::io::Error),
}

/// Accumulate bytes until `overall_timeout` elapses with nothing received,
/// or a quiet gap of [`INTER_BYTE_QUIET`] follows at least one received byte.
///
/// Generic over the reader so the quiet-period logic can be exercised with
/// an in-memory duplex stream in tests, independent of real hardware.
async fn read_response<R: tokio::io::AsyncRead + Unpin>(stream: &mut R, overall_timeout: Duration) -> ReadOutcome {
    let deadline = Instant::now() + overall_timeout;
    let mut buf = Vec::new();
    let mut chunk = [0u8; 256];

    loop {
        let remaining = deadline.saturating_duration_since(Instant::now());
        if remaining.is_zero() {
            return if buf.is_empty() { ReadOutcome::Timeout } else { ReadOutcome::Bytes(lossy(&buf)) };
        }

        let wait = remaining.min(INTER_BYTE_QUIET);
        match tokio::time::timeout(wait, stream.read(&mut chunk)).await {
            Ok(Ok(0)) => return if buf.is_empty() { ReadOutcome::Timeout } else { ReadOutcome::Bytes(lossy(&buf)) },
            Ok(Ok(n)) => buf.extend_from_slice(&chunk[..n]),
            Ok(Err(e)) => return ReadOutcome::Io(e),
            Err(_elapsed) => {
                if buf.is_empty() {
                    continue;
                }
                return ReadOutcome::Bytes(lossy(&buf));
            }
        }
    }
}

fn lossy(buf: &[u8]) -> String {
    String::from_utf8_lossy(buf).into_owned()
}

fn to_data_bits(pattern: DataPattern) -> tokio_serial::DataBits {
    match pattern.data_bits {
        5 => tokio_serial::DataBits::Five,
        6 => tokio_serial::DataBits::Six,
        7 => tokio_serial::DataBits::Seven,
        _ => tokio_serial::DataBits::Eight,
    }
}

fn to_parity(parity: LineParity) -> tokio_serial::Parity {
    match parity {
        LineParity::None | LineParity::Mark | LineParity::Space => tokio_serial::Parity::None,
        LineParity::Even => tokio_serial::Parity::Even,
        LineParity::Odd => tokio_serial::Parity::Odd,
    }
}

fn to_stop_bits(stop_bits: LineStopBits) -> tokio_serial::StopBits {
    match stop_bits {
        LineStopBits::One | LineStopBits::OnePointFive => tokio_serial::StopBits::One,
        LineStopBits::Two => tokio_serial::StopBits::Two,
    }
}

fn classify_open_error(port_name: &PortName, error: &tokio_serial::Error) -> ProtocolError {
    match error.kind() {
        tokio_serial::ErrorKind::NoDevice => ProtocolError::PortUnavailable(port_name.clone(), error.to_string()),
        _ => ProtocolError::OpenFailed(port_name.clone(), error.to_string()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigctl_core::config_model::{ResponsePattern, ResponsePatterns};

    fn command(outbound: &str, pass: &str) -> ProtocolCommand {
        ProtocolCommand {
            outbound: outbound.to_string(),
            patterns: ResponsePatterns {
                pass: ResponsePattern { pattern: pass.to_string(), is_regex: false },
                warn: None,
                fail: None,
                critical: None,
            },
            timeout_ms: 100,
            retry_count: 0,
            retry_delay_ms: 0,
        }
    }

    #[test]
    fn data_bits_map_to_tokio_serial_equivalents() {
        let pattern = DataPattern::parse("n81").unwrap();
        assert_eq!(to_data_bits(pattern), tokio_serial::DataBits::Eight);
    }

    #[test]
    fn even_parity_maps_through() {
        assert_eq!(to_parity(LineParity::Even), tokio_serial::Parity::Even);
    }

    #[test]
    fn mark_and_space_parity_degrade_to_none() {
        assert_eq!(to_parity(LineParity::Mark), tokio_serial::Parity::None);
        assert_eq!(to_parity(LineParity::Space), tokio_serial::Parity::None);
    }

    #[test]
    fn one_point_five_stop_bits_round_to_one() {
        assert_eq!(to_stop_bits(LineStopBits::OnePointFive), tokio_serial::StopBits::One);
    }

    #[tokio::test]
    async fn read_response_times_out_with_no_bytes_ever_arriving() {
        let (mut a, _b) = tokio::io::duplex(64);
        let outcome = read_response(&mut a, Duration::from_millis(20)).await;
        assert!(matches!(outcome, ReadOutcome::Timeout));
        let _ = command("x", "OK");
    }

    #[tokio::test]
    async fn read_response_returns_bytes_once_the_quiet_period_elapses() {
        let (mut a, mut b) = tokio::io::duplex(64);
        let writer = tokio::spawn(async move {
            b.write_all(b"OK").await.unwrap();
        });
        let outcome = read_response(&mut a, Duration::from_millis(500)).await;
        writer.await.unwrap();
        match outcome {
            ReadOutcome::Bytes(s) => assert_eq!(s, "OK"),
            _ => panic!("expected bytes"),
        }
    }

    #[tokio::test]
    async fn read_response_reports_io_error_from_a_closed_writer_half() {
        let (mut a, b) = tokio::io::duplex(64);
        drop(b);
        let outcome = read_response(&mut a, Duration::from_millis(50)).await;
        assert!(matches!(outcome, ReadOutcome::Timeout), "a closed duplex yields EOF (0 bytes), not an error");
    }
}
