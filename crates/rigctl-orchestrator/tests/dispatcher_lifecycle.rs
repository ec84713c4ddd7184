//! BIB task-set lifecycle (spec.md §8 scenario 4: hot-add/remove one BIB
//! without affecting another's running task set).

use std::sync::Arc;
use std::time::Duration;

use rigctl_core::config_model::{BibConfiguration, CriticalTriggerConfig, HardwareSimulationConfig, RandomBehaviorConfig, StartTrigger};
use rigctl_core::ids::BibId;
use rigctl_core::service_config::ServiceConfig;
use rigctl_gpio::RealGpioConfig;
use rigctl_orchestrator::{Dispatcher, ExecutionMode};

fn real_gpio_config() -> RealGpioConfig {
    RealGpioConfig {
        power_on_ready_bit: 0,
        power_down_heads_up_bit: 1,
        critical_fail_bit: 2,
        workflow_active_bit: 3,
        active_low: false,
        poll_period: Duration::from_millis(50),
        signal_hold_time: Duration::from_millis(500),
    }
}

fn simulated_bib(id: &str) -> BibConfiguration {
    BibConfiguration {
        id: BibId::from(id),
        description: String::new(),
        hardware_simulation: Some(HardwareSimulationConfig {
            enabled: true,
            mode: "test".into(),
            start_trigger: StartTrigger { delay_seconds: 0.0 },
            stop_trigger: None,
            critical_trigger: CriticalTriggerConfig::default(),
            speed_multiplier: 1.0,
            random_behavior: RandomBehaviorConfig::default(),
            random_seed: Some(1),
            trigger_hardware_on_fail: false,
        }),
        uuts: Vec::new(),
        metadata: Default::default(),
    }
}

#[tokio::test]
async fn starting_one_bib_does_not_disturb_another() {
    let tmp = tempfile::tempdir().unwrap();
    let (dispatcher, _results_rx) =
        Dispatcher::new(ServiceConfig::default(), real_gpio_config(), tmp.path().join("backups"));
    let dispatcher = Arc::new(dispatcher);

    dispatcher.start_bib(simulated_bib("a"), ExecutionMode::Single).await.unwrap();
    assert_eq!(dispatcher.running_bib_ids(), vec![BibId::from("a")]);

    dispatcher.start_bib(simulated_bib("b"), ExecutionMode::Single).await.unwrap();
    let mut running = dispatcher.running_bib_ids();
    running.sort_by(|a, b| a.as_str().cmp(b.as_str()));
    assert_eq!(running, vec![BibId::from("a"), BibId::from("b")]);

    dispatcher.stop_bib(&BibId::from("b")).await;
    assert_eq!(dispatcher.running_bib_ids(), vec![BibId::from("a")]);

    dispatcher.stop_bib(&BibId::from("a")).await;
    assert!(dispatcher.running_bib_ids().is_empty());
}

#[tokio::test]
async fn restarting_a_bib_replaces_its_own_task_set_only() {
    let tmp = tempfile::tempdir().unwrap();
    let (dispatcher, _results_rx) =
        Dispatcher::new(ServiceConfig::default(), real_gpio_config(), tmp.path().join("backups"));
    let dispatcher = Arc::new(dispatcher);

    dispatcher.start_bib(simulated_bib("a"), ExecutionMode::Single).await.unwrap();
    dispatcher.start_bib(simulated_bib("a"), ExecutionMode::Single).await.unwrap();

    assert_eq!(dispatcher.running_bib_ids(), vec![BibId::from("a")]);
    dispatcher.stop_bib(&BibId::from("a")).await;
    assert!(dispatcher.running_bib_ids().is_empty());
}
