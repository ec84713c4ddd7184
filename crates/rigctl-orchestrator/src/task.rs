//! Per-(BIB, UUT, port) state machine (spec.md §4.I).
//!
//! A BIB's UUTs run concurrently; a UUT with more than one port runs one
//! of these per port, since each [`PortConfiguration`] carries its own
//! independent Start/Test/Stop sequences and binds to its own serial
//! session. They share the BIB's single [`GpioProvider`] and
//! [`ReservationPool`], which is where cross-port coordination (start
//! trigger, stop trigger, critical signal) actually happens.

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use rigctl_core::config_model::PortConfiguration;
use rigctl_core::discovery::SerialPortDescriptor;
use rigctl_core::ids::{BibId, ClientId, PortName, UutId};
use rigctl_core::validation::{UnmatchedResponseMode, ValidationLevel};
use rigctl_core::workflow_model::{BibWorkflowResult, CommandSequenceResult, UutTaskState};
use rigctl_gpio::{GpioProvider, StartOutcome};
use rigctl_pool::ReservationPool;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

/// Static parameters for one (BIB, UUT, port) run, independent of the
/// discovery snapshot or cancellation state a given run is bound to.
#[derive(Debug, Clone)]
pub struct UutPortTask {
    pub bib_id: BibId,
    pub uut_id: UutId,
    pub port_config: PortConfiguration,
    pub port_name: PortName,
    pub client_id: ClientId,
    pub unmatched_response_mode: UnmatchedResponseMode,
    pub trigger_hardware_on_fail: bool,
    pub start_wait_timeout: Duration,
    /// How long to assert the critical GPIO output for once raised
    /// (`RealGpioConfig`/`ServiceConfig.gpio`'s `signal_hold_time`).
    pub critical_hold_time: Duration,
}

impl UutPortTask {
    /// Run the full state machine once: `Idle` through a terminal state.
    /// Consumes a fresh discovery snapshot on each call since candidate
    /// ports may have changed between runs (continuous/scheduled modes).
    pub async fn run(
        &self,
        pool: &ReservationPool,
        candidates: &[SerialPortDescriptor],
        gpio: &Arc<dyn GpioProvider>,
        cancel: &CancellationToken,
    ) -> BibWorkflowResult {
        let started_at = SystemTime::now();
        let mut start_result = empty_sequence_result();
        let mut test_result = empty_sequence_result();
        let mut stop_result = empty_sequence_result();
        let mut iterations: u64 = 0;
        let mut error: Option<String> = None;

        let mut state = UutTaskState::WaitingForStart;

        state = match gpio.wait_for_start(self.start_wait_timeout, cancel).await {
            Ok(StartOutcome::Started) => UutTaskState::RunningStart,
            Ok(StartOutcome::Cancelled) => UutTaskState::Cancelled,
            Ok(StartOutcome::TimedOut) => {
                error = Some("timed out waiting for the start signal".to_string());
                UutTaskState::CompletedError
            }
            Err(e) => {
                error = Some(format!("gpio error while waiting for start: {e}"));
                UutTaskState::CompletedError
            }
        };

        let mut allocation = None;
        let mut session = None;

        if state == UutTaskState::RunningStart {
            let target = self.port_name.clone();
            match pool.allocate(candidates, |d| d.port_name == target, self.client_id.clone()) {
                Some(a) => allocation = Some(a),
                None => {
                    error = Some(format!("no free port matching {} for {}/{}", self.port_name, self.bib_id, self.uut_id));
                    state = UutTaskState::CompletedError;
                }
            }

            if state == UutTaskState::RunningStart {
                match rigctl_protocol::open_session(&self.port_name, &self.port_config, self.client_id.clone()).await {
                    Ok(s) => session = Some(s),
                    Err(e) => {
                        error = Some(format!("failed to open session on {}: {e}", self.port_name));
                        state = UutTaskState::CompletedError;
                    }
                }
            }

            if state == UutTaskState::RunningStart {
                let _ = gpio.set_workflow_active(true).await;
                let session_ref = session.as_ref().expect("session opened above");
                start_result = rigctl_protocol::execute_sequence(
                    session_ref,
                    &self.port_config.start,
                    self.unmatched_response_mode,
                    self.trigger_hardware_on_fail,
                )
                .await;

                state = match highest_level(&start_result) {
                    ValidationLevel::Critical => UutTaskState::CriticalHalt,
                    _ if !start_result.success => {
                        error = Some(format!("start sequence failed on {}", self.port_name));
                        UutTaskState::RunningStop
                    }
                    _ => UutTaskState::InTestLoop,
                };
            }
        }

        if state == UutTaskState::InTestLoop {
            let session_ref = session.as_ref().expect("session opened to reach InTestLoop");
            let mut critical_rx = gpio.subscribe_critical();
            loop {
                if cancel.is_cancelled() {
                    state = UutTaskState::RunningStop;
                    break;
                }
                if gpio.should_stop() {
                    state = UutTaskState::RunningStop;
                    break;
                }

                let sequence = rigctl_protocol::execute_sequence(
                    session_ref,
                    &self.port_config.test,
                    self.unmatched_response_mode,
                    self.trigger_hardware_on_fail,
                );
                tokio::pin!(sequence);

                tokio::select! {
                    biased;
                    _ = critical_rx.recv() => {
                        warn!(bib_id = %self.bib_id, uut_id = %self.uut_id, port = %self.port_name, "gpio critical input raised during test loop");
                        error = Some("critical signal raised via gpio".to_string());
                        state = UutTaskState::CriticalHalt;
                        break;
                    }
                    result = &mut sequence => {
                        test_result = result;
                        match highest_level(&test_result) {
                            ValidationLevel::Critical => {
                                state = UutTaskState::CriticalHalt;
                                break;
                            }
                            _ if !test_result.success => {
                                error = Some(format!("test sequence failed on {}", self.port_name));
                                state = UutTaskState::RunningStop;
                                break;
                            }
                            _ => {
                                iterations += 1;
                                tokio::task::yield_now().await;
                            }
                        }
                    }
                }
            }
        }

        let was_cancelled = cancel.is_cancelled() && state != UutTaskState::CompletedError;

        if state == UutTaskState::CriticalHalt {
            warn!(bib_id = %self.bib_id, uut_id = %self.uut_id, port = %self.port_name, "critical validation, asserting critical output");
            if let Err(e) = gpio.assert_critical(self.critical_hold_time).await {
                warn!(bib_id = %self.bib_id, error = %e, "failed to assert critical gpio output");
            }
            error.get_or_insert_with(|| "critical validation result".to_string());
            state = UutTaskState::RunningStop;
        }

        if state == UutTaskState::RunningStop {
            if let Some(session_ref) = session.as_ref() {
                stop_result = rigctl_protocol::execute_sequence(
                    session_ref,
                    &self.port_config.stop,
                    self.unmatched_response_mode,
                    false,
                )
                .await;
                rigctl_protocol::close_session(session_ref);
                if !stop_result.success && stop_result_ran(&stop_result) {
                    error.get_or_insert_with(|| format!("stop sequence failed on {}", self.port_name));
                }
            }
            let _ = gpio.set_workflow_active(false).await;

            state = if was_cancelled {
                UutTaskState::Cancelled
            } else if error.is_some() {
                UutTaskState::CompletedError
            } else {
                UutTaskState::Completed
            };
        }

        if let Some(a) = allocation {
            pool.release(&a.port_name, &a.session_token);
        }

        let success = matches!(state, UutTaskState::Completed);
        info!(
            bib_id = %self.bib_id,
            uut_id = %self.uut_id,
            port = %self.port_name,
            final_state = %state,
            iterations,
            "uut task finished"
        );

        BibWorkflowResult {
            bib_id: self.bib_id.clone(),
            uut_id: self.uut_id.clone(),
            port_name: self.port_name.clone(),
            session_token: None,
            started_at,
            ended_at: SystemTime::now(),
            start_result,
            test_result,
            stop_result,
            iterations,
            success,
            error,
            final_state: state,
        }
    }
}

fn empty_sequence_result() -> CommandSequenceResult {
    CommandSequenceResult { commands: Vec::new(), success: true, duration: Duration::ZERO, aborted: false }
}

fn stop_result_ran(result: &CommandSequenceResult) -> bool {
    !result.commands.is_empty()
}

/// Highest (most severe) classification level across a sequence result,
/// relying on [`ValidationLevel`]'s ascending `Ord` (spec.md §4.H).
fn highest_level(result: &CommandSequenceResult) -> ValidationLevel {
    result.commands.iter().map(|c| c.level).max().unwrap_or(ValidationLevel::Pass)
}
