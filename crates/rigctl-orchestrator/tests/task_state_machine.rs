//! Per-(BIB, UUT, port) state-machine scenarios that do not require an
//! open serial session (spec.md §8 scenarios covering WaitingForStart and
//! pool-allocation failure paths), driven by `SimulatedGpioProvider` with
//! a fixed seed for determinism.

use std::sync::Arc;
use std::time::Duration;

use rigctl_core::config_model::{
    CriticalTriggerConfig, DataPattern, HardwareSimulationConfig, LineSettings, PortConfiguration, ProtocolTag,
    RandomBehaviorConfig, StartTrigger,
};
use rigctl_core::discovery::SerialPortDescriptor;
use rigctl_core::ids::{BibId, ClientId, PortName, UutId};
use rigctl_core::validation::UnmatchedResponseMode;
use rigctl_core::workflow_model::UutTaskState;
use rigctl_gpio::{GpioProvider, SimulatedGpioProvider};
use rigctl_orchestrator::UutPortTask;
use rigctl_pool::ReservationPool;
use tokio_util::sync::CancellationToken;

fn port_config() -> PortConfiguration {
    PortConfiguration {
        number: 1,
        protocol: ProtocolTag::Rs232,
        line_settings: LineSettings { baud: 115200, data_pattern: DataPattern::parse("n81").unwrap() },
        start: Default::default(),
        test: Default::default(),
        stop: Default::default(),
        read_timeout_ms: 3000,
        write_timeout_ms: 3000,
        extras: Default::default(),
    }
}

fn sim_config(start_delay: f64) -> HardwareSimulationConfig {
    HardwareSimulationConfig {
        enabled: true,
        mode: "test".into(),
        start_trigger: StartTrigger { delay_seconds: start_delay },
        stop_trigger: None,
        critical_trigger: CriticalTriggerConfig::default(),
        speed_multiplier: 1.0,
        random_behavior: RandomBehaviorConfig::default(),
        random_seed: Some(7),
        trigger_hardware_on_fail: false,
    }
}

fn task(start_wait_timeout: Duration) -> UutPortTask {
    UutPortTask {
        bib_id: BibId::from("demo"),
        uut_id: UutId::from("uut1"),
        port_config: port_config(),
        port_name: PortName::from("/dev/ttyUSB0"),
        client_id: ClientId::from("demo/uut1/1"),
        unmatched_response_mode: UnmatchedResponseMode::default(),
        trigger_hardware_on_fail: false,
        start_wait_timeout,
        critical_hold_time: Duration::from_millis(500),
    }
}

#[tokio::test(start_paused = true)]
async fn start_timeout_completes_with_error_and_no_allocation() {
    let gpio: Arc<dyn GpioProvider> = Arc::new(SimulatedGpioProvider::new(sim_config(10.0)));
    let pool = ReservationPool::new();
    let candidates = vec![];
    let cancel = CancellationToken::new();

    let result = task(Duration::from_millis(50)).run(&pool, &candidates, &gpio, &cancel).await;

    assert_eq!(result.final_state, UutTaskState::CompletedError);
    assert!(!result.success);
    assert!(result.error.as_deref().unwrap_or_default().contains("timed out"));
    assert_eq!(pool.statistics(1).allocated, 0);
}

#[tokio::test]
async fn cancellation_before_start_yields_cancelled_state() {
    let gpio: Arc<dyn GpioProvider> = Arc::new(SimulatedGpioProvider::new(sim_config(10.0)));
    let pool = ReservationPool::new();
    let candidates = vec![];
    let cancel = CancellationToken::new();
    cancel.cancel();

    let result = task(Duration::from_secs(5)).run(&pool, &candidates, &gpio, &cancel).await;

    assert_eq!(result.final_state, UutTaskState::Cancelled);
    assert!(result.error.is_none());
}

#[tokio::test(start_paused = true)]
async fn no_matching_candidate_port_completes_with_error() {
    let gpio: Arc<dyn GpioProvider> = Arc::new(SimulatedGpioProvider::new(sim_config(0.0)));
    let pool = ReservationPool::new();
    // Candidate list has a port, but not the one this task targets.
    let candidates = vec![SerialPortDescriptor {
        port_name: PortName::from("/dev/ttyUSB9"),
        friendly_name: None,
        device_id: "0403:6010".to_string(),
        ftdi: None,
        last_seen: std::time::SystemTime::now(),
    }];
    let cancel = CancellationToken::new();

    let result = task(Duration::from_secs(5)).run(&pool, &candidates, &gpio, &cancel).await;

    assert_eq!(result.final_state, UutTaskState::CompletedError);
    assert!(result.error.as_deref().unwrap_or_default().contains("no free port"));
    assert_eq!(result.iterations, 0);
}
