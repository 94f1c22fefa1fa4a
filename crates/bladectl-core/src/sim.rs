// ── Simulated blade ──
//
// In-process stand-in for the keyword client: N color-correction slots
// feeding one output. Writes land after a configurable latency and are
// reported back through watch callbacks, like the real subscriptions.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::action::{Action, WritePolicy};
use crate::device::{DeviceLink, ObservedUpdate};
use crate::error::CoreError;
use crate::reconciler::Reconciler;
use crate::state::{ObservedState, SourceAdjustment};

/// Knobs for the simulated device.
#[derive(Debug, Clone, PartialEq)]
pub struct SimulatorConfig {
    pub slots: usize,
    /// Delay between accepting a write and reporting the new value.
    pub latency: Duration,
    /// Quantize written floats to multiples of this value, like a device
    /// with fixed-point registers.
    pub resolution: Option<f64>,
    /// Fail every k-th write with a dispatch error.
    pub fail_every: Option<u64>,
    /// Saturation every slot starts with.
    pub initial_saturation: f64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            slots: crate::config::DEFAULT_SLOTS,
            latency: Duration::from_millis(5),
            resolution: None,
            fail_every: None,
            initial_saturation: 0.5,
        }
    }
}

type Watcher = Box<dyn Fn(ObservedUpdate) + Send + Sync>;

struct DeviceState {
    /// Slot whose output is routed to the device output, `None` if foreign.
    routed: Option<usize>,
    slots: Vec<SourceAdjustment>,
}

struct SimInner {
    config: SimulatorConfig,
    state: Mutex<DeviceState>,
    watchers: Mutex<Vec<Watcher>>,
    writes: AtomicU64,
    cancel: CancellationToken,
}

/// Cheaply cloneable simulated device.
#[derive(Clone)]
pub struct SimulatedBlade {
    inner: Arc<SimInner>,
}

impl SimulatedBlade {
    pub fn new(config: SimulatorConfig) -> Self {
        let state = DeviceState {
            routed: Some(0),
            slots: vec![SourceAdjustment::new(0.0, config.initial_saturation); config.slots],
        };
        Self {
            inner: Arc::new(SimInner {
                config,
                state: Mutex::new(state),
                watchers: Mutex::new(Vec::new()),
                writes: AtomicU64::new(0),
                cancel: CancellationToken::new(),
            }),
        }
    }

    pub fn config(&self) -> &SimulatorConfig {
        &self.inner.config
    }

    /// Total writes received, failed ones included.
    pub fn writes(&self) -> u64 {
        self.inner.writes.load(Ordering::Relaxed)
    }

    /// Current device-side values.
    pub fn snapshot(&self) -> ObservedState {
        let state = self.state();
        ObservedState {
            selected: state.routed,
            adjustments: state.slots.clone(),
        }
    }

    /// Register a callback invoked for every confirmed change.
    pub fn watch(&self, callback: impl Fn(ObservedUpdate) + Send + Sync + 'static) {
        self.watchers().push(Box::new(callback));
    }

    /// Seed `reconciler` with the device's current values and keep its
    /// observed record up to date for as long as it lives.
    pub fn attach<D: DeviceLink>(&self, reconciler: &Reconciler<D>) {
        for update in self.snapshot_updates() {
            reconciler.observe(update);
        }
        let reconciler = reconciler.downgrade();
        self.watch(move |update| {
            if let Some(reconciler) = reconciler.upgrade() {
                reconciler.observe(update);
            }
        });
    }

    /// Route a source that is none of the slots to the output, as if
    /// another operator had switched it.
    pub fn route_foreign_source(&self) {
        self.commit(|state| {
            state.routed = None;
            vec![ObservedUpdate::Selected(None)]
        });
    }

    /// Drop writes that have been accepted but not yet applied. Later
    /// writes fail with [`CoreError::Disconnected`].
    pub fn shutdown(&self) {
        self.inner.cancel.cancel();
    }

    fn snapshot_updates(&self) -> Vec<ObservedUpdate> {
        let state = self.state();
        let mut updates = vec![ObservedUpdate::Selected(state.routed)];
        for (slot, adj) in state.slots.iter().enumerate() {
            updates.push(ObservedUpdate::Hue {
                slot,
                value: adj.hue,
            });
            updates.push(ObservedUpdate::Saturation {
                slot,
                value: adj.saturation,
            });
        }
        updates
    }

    fn quantize(&self, value: f64) -> f64 {
        match self.inner.config.resolution {
            Some(res) if res > 0.0 => (value / res).round() * res,
            _ => value,
        }
    }

    fn apply(&self, action: Action) {
        let action = match action {
            Action::SetHue { slot, value } => Action::SetHue {
                slot,
                value: self.quantize(value),
            },
            Action::SetSaturation { slot, value } => Action::SetSaturation {
                slot,
                value: self.quantize(value),
            },
            switch @ Action::SwitchSource { .. } => switch,
        };

        self.commit(|state| {
            let mut updates = Vec::new();
            match action {
                Action::SwitchSource { slot } => {
                    if state.routed != Some(slot) {
                        state.routed = Some(slot);
                        updates.push(ObservedUpdate::Selected(Some(slot)));
                    }
                }
                Action::SetHue { slot, value } => {
                    if let Some(adj) = state.slots.get_mut(slot) {
                        if adj.hue.to_bits() != value.to_bits() {
                            adj.hue = value;
                            updates.push(ObservedUpdate::Hue { slot, value });
                        }
                    }
                }
                Action::SetSaturation { slot, value } => {
                    if let Some(adj) = state.slots.get_mut(slot) {
                        if adj.saturation.to_bits() != value.to_bits() {
                            adj.saturation = value;
                            updates.push(ObservedUpdate::Saturation { slot, value });
                        }
                    }
                }
            }
            updates
        });
    }

    /// Mutate device state, then notify watchers outside the state lock.
    fn commit(&self, f: impl FnOnce(&mut DeviceState) -> Vec<ObservedUpdate>) {
        let updates = {
            let mut state = self.state();
            f(&mut *state)
        };
        if updates.is_empty() {
            return;
        }
        let watchers = self.watchers();
        for update in updates {
            for watcher in watchers.iter() {
                watcher(update);
            }
        }
    }

    fn state(&self) -> MutexGuard<'_, DeviceState> {
        self.inner.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn watchers(&self) -> MutexGuard<'_, Vec<Watcher>> {
        self.inner
            .watchers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl DeviceLink for SimulatedBlade {
    async fn write(&self, action: Action, policy: WritePolicy) -> Result<(), CoreError> {
        if self.inner.cancel.is_cancelled() {
            return Err(CoreError::Disconnected);
        }
        let n = self.inner.writes.fetch_add(1, Ordering::Relaxed) + 1;
        if self.inner.config.fail_every.is_some_and(|k| k > 0 && n % k == 0) {
            return Err(CoreError::DispatchFailed {
                action: action.to_string(),
                reason: format!("simulated failure on write #{n}"),
            });
        }

        let slots = self.inner.config.slots;
        if action.slot() >= slots {
            return Err(CoreError::InvalidSlot {
                slot: action.slot(),
                slots,
            });
        }
        if let Action::SetHue { value, .. } | Action::SetSaturation { value, .. } = action {
            if !value.is_finite() {
                return Err(CoreError::Rejected {
                    action: action.to_string(),
                    message: "value is not a finite number".into(),
                });
            }
        }

        let latency = self.inner.config.latency;
        match policy {
            WritePolicy::AcceptOnSend => {
                let this = self.clone();
                let cancel = self.inner.cancel.clone();
                tokio::spawn(async move {
                    tokio::select! {
                        biased;
                        () = cancel.cancelled() => debug!(%action, "pending write dropped"),
                        () = tokio::time::sleep(latency) => this.apply(action),
                    }
                });
            }
            WritePolicy::AwaitConfirmation => {
                tokio::time::sleep(latency).await;
                self.apply(action);
            }
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use super::*;

    #[test]
    fn starts_with_setup_values() {
        let sim = SimulatedBlade::new(SimulatorConfig::default());
        let snap = sim.snapshot();
        assert_eq!(snap.selected, Some(0));
        assert_eq!(snap.adjustments.len(), 4);
        assert!(snap.adjustments.iter().all(|a| a.hue == 0.0 && a.saturation == 0.5));
    }

    #[tokio::test(start_paused = true)]
    async fn confirmed_write_notifies_watchers() {
        let sim = SimulatedBlade::new(SimulatorConfig::default());
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        sim.watch(move |u| sink.lock().unwrap().push(u));

        sim.write(Action::SetHue { slot: 1, value: 0.25 }, WritePolicy::AwaitConfirmation)
            .await
            .unwrap();
        assert_eq!(sim.snapshot().adjustments[1].hue, 0.25);
        assert_eq!(
            *seen.lock().unwrap(),
            vec![ObservedUpdate::Hue { slot: 1, value: 0.25 }]
        );
    }

    #[tokio::test(start_paused = true)]
    async fn accept_on_send_returns_before_apply() {
        let sim = SimulatedBlade::new(SimulatorConfig::default());
        sim.write(Action::SwitchSource { slot: 3 }, WritePolicy::AcceptOnSend)
            .await
            .unwrap();
        assert_eq!(sim.snapshot().selected, Some(0));
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(sim.snapshot().selected, Some(3));
    }

    #[tokio::test(start_paused = true)]
    async fn quantizes_and_fails_on_schedule() {
        let sim = SimulatedBlade::new(SimulatorConfig {
            resolution: Some(0.25),
            fail_every: Some(2),
            ..SimulatorConfig::default()
        });
        let policy = WritePolicy::AwaitConfirmation;
        sim.write(Action::SetSaturation { slot: 0, value: 0.8 }, policy)
            .await
            .unwrap();
        assert_eq!(sim.snapshot().adjustments[0].saturation, 0.75);

        let err = sim
            .write(Action::SetSaturation { slot: 0, value: 1.0 }, policy)
            .await
            .unwrap_err();
        assert!(err.is_transient());
        assert_eq!(sim.writes(), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_unknown_slot() {
        let sim = SimulatedBlade::new(SimulatorConfig::default());
        let err = sim
            .write(Action::SwitchSource { slot: 7 }, WritePolicy::AcceptOnSend)
            .await
            .unwrap_err();
        assert_eq!(err, CoreError::InvalidSlot { slot: 7, slots: 4 });
    }

    #[tokio::test(start_paused = true)]
    async fn shutdown_drops_pending_writes() {
        let sim = SimulatedBlade::new(SimulatorConfig::default());
        sim.write(Action::SetHue { slot: 0, value: 0.5 }, WritePolicy::AcceptOnSend)
            .await
            .unwrap();
        sim.shutdown();
        tokio::time::sleep(Duration::from_millis(10)).await;
        assert_eq!(sim.snapshot().adjustments[0].hue, 0.0);

        let err = sim
            .write(Action::SwitchSource { slot: 1 }, WritePolicy::AcceptOnSend)
            .await
            .unwrap_err();
        assert_eq!(err, CoreError::Disconnected);
        assert!(err.is_transient());
    }

    #[tokio::test(start_paused = true)]
    async fn rejects_non_finite_values() {
        let sim = SimulatedBlade::new(SimulatorConfig::default());
        let err = sim
            .write(
                Action::SetHue {
                    slot: 2,
                    value: f64::NAN,
                },
                WritePolicy::AwaitConfirmation,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, CoreError::Rejected { .. }), "{err}");
        assert!(!err.is_transient());
        assert_eq!(sim.snapshot().adjustments[2].hue, 0.0);
    }

    #[tokio::test(start_paused = true)]
    async fn attached_blade_does_not_keep_reconciler_alive() {
        let sim = SimulatedBlade::new(SimulatorConfig::default());
        let reconciler =
            Reconciler::new(crate::ReconcilerSettings::default(), sim.clone()).unwrap();
        sim.attach(&reconciler);
        let weak = reconciler.downgrade();
        assert!(weak.upgrade().is_some());

        drop(reconciler);
        assert!(weak.upgrade().is_none());

        // Watchers outlive the reconciler and must tolerate it being gone.
        sim.write(Action::SwitchSource { slot: 2 }, WritePolicy::AwaitConfirmation)
            .await
            .unwrap();
        assert_eq!(sim.snapshot().selected, Some(2));
    }
}
