//! Simulated GPIO provider driven by [`HardwareSimulationConfig`].

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rigctl_core::config_model::HardwareSimulationConfig;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use crate::error::GpioError;
use crate::{GpioProvider, StartOutcome};

/// Simulates start/stop/critical signals without any physical hardware.
///
/// `should_stop` doubles as the per-iteration tick the orchestrator's loop
/// naturally provides: each call rolls the configured critical probability,
/// matching spec.md's "generated probabilistically per-iteration" behavior.
pub struct SimulatedGpioProvider {
    config: HardwareSimulationConfig,
    rng: Mutex<StdRng>,
    loop_started_at: Mutex<Option<Instant>>,
    critical_tx: broadcast::Sender<()>,
    workflow_active: AtomicBool,
}

impl SimulatedGpioProvider {
    pub fn new(config: HardwareSimulationConfig) -> Self {
        let rng = match config.random_seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self {
            config,
            rng: Mutex::new(rng),
            loop_started_at: Mutex::new(None),
            critical_tx: broadcast::channel(16).0,
            workflow_active: AtomicBool::new(false),
        }
    }

    /// `speed_multiplier` is an acceleration factor: 2.0 means the
    /// simulated run goes twice as fast, so the effective delay is
    /// `seconds / speed_multiplier` (spec.md §8 scenario 1: a 20s stop
    /// delay at 2.0x reaches `shouldStop` at ~10s wall time).
    fn jittered(&self, seconds: f64) -> Duration {
        let multiplier = if self.config.speed_multiplier > 0.0 { self.config.speed_multiplier } else { 1.0 };
        let scaled = (seconds / multiplier).max(0.0);
        let jitter_fraction = self.config.random_behavior.delay_jitter_fraction;
        let factor = if self.config.random_behavior.response_variation && jitter_fraction > 0.0 {
            let mut rng = self.rng.lock().expect("sim rng lock poisoned");
            1.0 + rng.gen_range(-jitter_fraction..=jitter_fraction)
        } else {
            1.0
        };
        Duration::from_secs_f64((scaled * factor).max(0.0))
    }

    fn anchor_loop_start(&self) -> Instant {
        let mut anchor = self.loop_started_at.lock().expect("sim loop-start lock poisoned");
        *anchor.get_or_insert_with(Instant::now)
    }

    fn maybe_raise_critical(&self) {
        let trigger = self.config.critical_trigger;
        if !trigger.enabled {
            return;
        }
        let roll: f64 = {
            let mut rng = self.rng.lock().expect("sim rng lock poisoned");
            rng.gen()
        };
        if roll < trigger.probability {
            let _ = self.critical_tx.send(());
        }
    }
}

#[async_trait]
impl GpioProvider for SimulatedGpioProvider {
    async fn wait_for_start(&self, timeout: Duration, cancel: &CancellationToken) -> Result<StartOutcome, GpioError> {
        self.anchor_loop_start();
        let delay = self.jittered(self.config.start_trigger.delay_seconds);

        tokio::select! {
            _ = cancel.cancelled() => Ok(StartOutcome::Cancelled),
            _ = tokio::time::sleep(delay) => Ok(StartOutcome::Started),
            _ = tokio::time::sleep(timeout) => Ok(StartOutcome::TimedOut),
        }
    }

    fn should_stop(&self) -> bool {
        self.maybe_raise_critical();

        let Some(trigger) = self.config.stop_trigger else {
            return false;
        };
        let started_at = match *self.loop_started_at.lock().expect("sim loop-start lock poisoned") {
            Some(t) => t,
            None => return false,
        };
        started_at.elapsed() >= self.jittered(trigger.delay_seconds)
    }

    fn subscribe_critical(&self) -> broadcast::Receiver<()> {
        self.critical_tx.subscribe()
    }

    async fn assert_critical(&self, _duration: Duration) -> Result<(), GpioError> {
        let _ = self.critical_tx.send(());
        Ok(())
    }

    async fn clear_critical(&self) -> Result<(), GpioError> {
        Ok(())
    }

    async fn set_workflow_active(&self, active: bool) -> Result<(), GpioError> {
        self.workflow_active.store(active, Ordering::SeqCst);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rigctl_core::config_model::{CriticalTriggerConfig, RandomBehaviorConfig, StartTrigger, StopTrigger};

    fn config(start_delay: f64, stop_delay: Option<f64>) -> HardwareSimulationConfig {
        HardwareSimulationConfig {
            enabled: true,
            mode: "test".into(),
            start_trigger: StartTrigger { delay_seconds: start_delay },
            stop_trigger: stop_delay.map(|delay_seconds| StopTrigger { delay_seconds }),
            critical_trigger: CriticalTriggerConfig::default(),
            speed_multiplier: 1.0,
            random_behavior: RandomBehaviorConfig::default(),
            random_seed: Some(42),
            trigger_hardware_on_fail: false,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_start_resolves_after_configured_delay() {
        let provider = SimulatedGpioProvider::new(config(0.01, None));
        let cancel = CancellationToken::new();
        let outcome = provider.wait_for_start(Duration::from_secs(5), &cancel).await.unwrap();
        assert_eq!(outcome, StartOutcome::Started);
    }

    #[tokio::test(start_paused = true)]
    async fn wait_for_start_times_out_when_delay_exceeds_timeout() {
        let provider = SimulatedGpioProvider::new(config(10.0, None));
        let cancel = CancellationToken::new();
        let outcome = provider.wait_for_start(Duration::from_millis(10), &cancel).await.unwrap();
        assert_eq!(outcome, StartOutcome::TimedOut);
    }

    #[tokio::test]
    async fn wait_for_start_respects_cancellation() {
        let provider = SimulatedGpioProvider::new(config(10.0, None));
        let cancel = CancellationToken::new();
        cancel.cancel();
        let outcome = provider.wait_for_start(Duration::from_secs(5), &cancel).await.unwrap();
        assert_eq!(outcome, StartOutcome::Cancelled);
    }

    #[test]
    fn should_stop_is_false_without_a_stop_trigger_even_after_start() {
        let provider = SimulatedGpioProvider::new(config(0.0, None));
        provider.anchor_loop_start();
        assert!(!provider.should_stop());
    }

    #[test]
    fn should_stop_becomes_true_once_stop_delay_elapses() {
        let provider = SimulatedGpioProvider::new(config(0.0, Some(0.0)));
        provider.anchor_loop_start();
        assert!(provider.should_stop());
    }

    #[tokio::test(start_paused = true)]
    async fn speed_multiplier_accelerates_the_stop_delay() {
        let mut cfg = config(0.0, Some(20.0));
        cfg.speed_multiplier = 2.0;
        let provider = SimulatedGpioProvider::new(cfg);
        provider.anchor_loop_start();

        tokio::time::advance(Duration::from_secs(9)).await;
        assert!(!provider.should_stop());

        tokio::time::advance(Duration::from_secs(2)).await;
        assert!(provider.should_stop());
    }
}
