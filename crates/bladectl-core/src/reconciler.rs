// ── Target-state reconciler ──
//
// Inputs only ever mutate the target record. All device-facing writes go
// through one convergence loop that is triggered, never queued: it diffs
// observed against target, dispatches the corrections, waits one pass
// delay and repeats until nothing is left to do.

use std::sync::{Arc, Weak};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use futures_util::future::join_all;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, trace, warn};

use crate::action::{Action, WritePolicy, diff};
use crate::config::ReconcilerSettings;
use crate::device::{DeviceLink, ObservedUpdate};
use crate::error::CoreError;
use crate::state::{Input, ObservedState, TargetState};
use crate::stream::StateStream;

/// Point-in-time counters for the convergence loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoopStats {
    /// Loop instances that acquired the activity flag.
    pub runs: u64,
    /// Passes that dispatched at least one action.
    pub passes: u64,
    /// Actions handed to the device link.
    pub dispatched: u64,
    /// Dispatches that returned an error.
    pub failures: u64,
    /// Whether a loop instance currently holds the activity flag.
    pub active: bool,
}

#[derive(Default)]
struct Counters {
    runs: AtomicU64,
    passes: AtomicU64,
    dispatched: AtomicU64,
    failures: AtomicU64,
}

/// Handle to a reconciler instance.
///
/// Cheaply cloneable via `Arc<ReconcilerInner>`. The input layer and the
/// subscription layer each hold a clone; there is no global state.
pub struct Reconciler<D: DeviceLink> {
    inner: Arc<ReconcilerInner<D>>,
}

impl<D: DeviceLink> Clone for Reconciler<D> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

/// Non-owning handle for device callbacks, which must not keep the
/// reconciler (and through it the device) alive.
pub struct WeakReconciler<D: DeviceLink> {
    inner: Weak<ReconcilerInner<D>>,
}

impl<D: DeviceLink> WeakReconciler<D> {
    pub fn upgrade(&self) -> Option<Reconciler<D>> {
        self.inner.upgrade().map(|inner| Reconciler { inner })
    }
}

struct ReconcilerInner<D> {
    settings: ReconcilerSettings,
    device: D,
    observed: watch::Sender<ObservedState>,
    target: watch::Sender<TargetState>,
    active: AtomicBool,
    counters: Counters,
}

/// Holds the activity flag; clears it on every exit path, unwinding included.
struct ActiveGuard<'a>(&'a AtomicBool);

impl<'a> ActiveGuard<'a> {
    fn acquire(flag: &'a AtomicBool) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| Self(flag))
    }
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<D: DeviceLink> Reconciler<D> {
    /// Create a reconciler with zeroed observed and target records.
    pub fn new(settings: ReconcilerSettings, device: D) -> Result<Self, CoreError> {
        settings.validate()?;
        let (observed, _) = watch::channel(ObservedState::placeholder(settings.slots));
        let (target, _) = watch::channel(TargetState::placeholder(settings.slots));

        Ok(Self {
            inner: Arc::new(ReconcilerInner {
                settings,
                device,
                observed,
                target,
                active: AtomicBool::new(false),
                counters: Counters::default(),
            }),
        })
    }

    pub fn downgrade(&self) -> WeakReconciler<D> {
        WeakReconciler {
            inner: Arc::downgrade(&self.inner),
        }
    }

    pub fn settings(&self) -> &ReconcilerSettings {
        &self.inner.settings
    }

    pub fn device(&self) -> &D {
        &self.inner.device
    }

    // ── Input path (sole writer of target) ───────────────────────

    /// Apply one input to the target record. Returns `true` if it changed.
    pub fn apply_input(&self, input: Input) -> bool {
        let settings = &self.inner.settings;
        self.inner
            .target
            .send_if_modified(|target| target.apply(input, settings))
    }

    /// Apply an input and make sure a convergence loop will notice it.
    pub fn input(&self, input: Input) {
        trace!(?input, "input");
        self.apply_input(input);
        self.trigger();
    }

    /// Overwrite the target with whatever the device last reported, so the
    /// next pass converges without forcing a reset.
    pub fn sync_target_from_observed(&self) {
        let observed = self.inner.observed.borrow().clone();
        let slots = self.inner.settings.slots;
        self.inner.target.send_modify(|target| {
            target.adjustments.clone_from(&observed.adjustments);
            if let Some(selected) = observed.selected.filter(|&s| s < slots) {
                target.selected = selected;
            }
        });
        debug!(selected = ?observed.selected, "target synced from observed state");
    }

    // ── Subscription path (sole writer of observed) ──────────────

    /// Fold a device callback into the observed record.
    pub fn observe(&self, update: ObservedUpdate) {
        let changed = self
            .inner
            .observed
            .send_if_modified(|observed| observed.apply(update));
        if changed {
            trace!(?update, "observed state changed");
        }
    }

    // ── Diff ─────────────────────────────────────────────────────

    /// Corrective actions needed right now, from the latest records.
    pub fn compute_pending_actions(&self) -> Vec<Action> {
        let target = self.inner.target.borrow().clone();
        let observed = self.inner.observed.borrow();
        diff(&observed, &target, self.inner.settings.tolerance)
    }

    // ── Convergence loop ─────────────────────────────────────────

    /// Spawn a convergence loop unless one is already running.
    ///
    /// A running loop re-reads the target on every pass, so skipping the
    /// spawn never loses an input.
    pub fn trigger(&self) -> Option<JoinHandle<bool>> {
        if self.is_active() {
            return None;
        }
        let this = self.clone();
        Some(tokio::spawn(async move { this.run_convergence_loop().await }))
    }

    /// Drive observed toward target until they agree.
    ///
    /// Returns `false` without doing anything if another instance holds the
    /// activity flag. Dispatch errors are logged and retried by the next
    /// pass; they never end the loop early.
    pub async fn run_convergence_loop(&self) -> bool {
        let mut ran = false;
        loop {
            let Some(guard) = ActiveGuard::acquire(&self.inner.active) else {
                return ran;
            };
            ran = true;
            self.inner.counters.runs.fetch_add(1, Ordering::Relaxed);

            let passes = self.drain().await;
            drop(guard);
            debug!(passes, "convergence loop idle");

            // An input may have landed between the last diff and the release
            // and seen the flag still set.
            if self.compute_pending_actions().is_empty() {
                return true;
            }
            trace!("target moved during release, resuming");
        }
    }

    async fn drain(&self) -> u64 {
        let mut passes = 0;
        loop {
            let actions = self.compute_pending_actions();
            if actions.is_empty() {
                return passes;
            }
            passes += 1;
            self.inner.counters.passes.fetch_add(1, Ordering::Relaxed);
            self.dispatch_all(actions).await;
            tokio::time::sleep(self.inner.settings.pass_delay).await;
        }
    }

    async fn dispatch_all(&self, actions: Vec<Action>) {
        let device = &self.inner.device;
        let mut pending = Vec::with_capacity(actions.len());
        for action in actions {
            pending.push(async move {
                (action, device.write(action, WritePolicy::AcceptOnSend).await)
            });
        }
        let results = join_all(pending).await;

        let counters = &self.inner.counters;
        for (action, result) in results {
            counters.dispatched.fetch_add(1, Ordering::Relaxed);
            if let Err(e) = result {
                counters.failures.fetch_add(1, Ordering::Relaxed);
                if e.is_transient() {
                    warn!(%action, error = %e, "dispatch failed, next pass will retry");
                } else {
                    warn!(%action, error = %e, "dispatch refused by device");
                }
            }
        }
    }

    // ── State observation ────────────────────────────────────────

    pub fn is_active(&self) -> bool {
        self.inner.active.load(Ordering::Acquire)
    }

    pub fn observed(&self) -> ObservedState {
        self.inner.observed.borrow().clone()
    }

    pub fn target(&self) -> TargetState {
        self.inner.target.borrow().clone()
    }

    pub fn subscribe_observed(&self) -> StateStream<ObservedState> {
        StateStream::new(self.inner.observed.subscribe())
    }

    pub fn subscribe_target(&self) -> StateStream<TargetState> {
        StateStream::new(self.inner.target.subscribe())
    }

    pub fn stats(&self) -> LoopStats {
        let c = &self.inner.counters;
        LoopStats {
            runs: c.runs.load(Ordering::Relaxed),
            passes: c.passes.load(Ordering::Relaxed),
            dispatched: c.dispatched.load(Ordering::Relaxed),
            failures: c.failures.load(Ordering::Relaxed),
            active: self.is_active(),
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::float_cmp)]
mod tests {
    use std::sync::Mutex;

    use pretty_assertions::assert_eq;

    use super::*;
    use crate::state::{Direction, Field};

    /// Records writes and never confirms anything.
    #[derive(Default)]
    struct Recorder {
        writes: Mutex<Vec<(Action, WritePolicy)>>,
    }

    impl DeviceLink for Recorder {
        async fn write(&self, action: Action, policy: WritePolicy) -> Result<(), CoreError> {
            self.writes.lock().unwrap().push((action, policy));
            Ok(())
        }
    }

    fn reconciler() -> Reconciler<Recorder> {
        Reconciler::new(ReconcilerSettings::default(), Recorder::default()).unwrap()
    }

    #[test]
    fn rejects_invalid_settings() {
        let settings = ReconcilerSettings {
            slots: 0,
            ..ReconcilerSettings::default()
        };
        assert!(Reconciler::new(settings, Recorder::default()).is_err());
    }

    #[test]
    fn select_scenario() {
        let r = reconciler();
        assert!(r.compute_pending_actions().is_empty());

        r.apply_input(Input::Select(2));
        assert_eq!(r.compute_pending_actions(), vec![Action::SwitchSource { slot: 2 }]);

        r.observe(ObservedUpdate::Selected(Some(2)));
        assert!(r.compute_pending_actions().is_empty());
    }

    #[test]
    fn hue_clamps_after_many_increases() {
        let r = reconciler();
        r.apply_input(Input::Select(1));
        for _ in 0..150 {
            r.apply_input(Input::Adjust {
                field: Field::Hue,
                direction: Direction::Increase,
            });
        }
        assert_eq!(r.target().adjustments[1].hue, 1.0);
    }

    #[test]
    fn sync_copies_observed_into_target() {
        let r = reconciler();
        r.observe(ObservedUpdate::Selected(Some(3)));
        r.observe(ObservedUpdate::Saturation { slot: 3, value: 0.5 });
        r.observe(ObservedUpdate::Hue { slot: 0, value: -0.2 });
        assert!(!r.compute_pending_actions().is_empty());

        r.sync_target_from_observed();
        assert!(r.compute_pending_actions().is_empty());
        assert_eq!(r.target().selected, 3);
        assert_eq!(r.target().adjustments[0].hue, -0.2);
    }

    #[test]
    fn sync_keeps_selection_for_foreign_source() {
        let r = reconciler();
        r.apply_input(Input::Select(1));
        r.observe(ObservedUpdate::Selected(None));
        r.sync_target_from_observed();
        assert_eq!(r.target().selected, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn loop_dispatches_with_accept_on_send() {
        let r = reconciler();
        r.apply_input(Input::Select(2));

        // Nothing ever confirms, so the loop keeps re-dispatching.
        let handle = r.trigger().unwrap();
        tokio::time::sleep(std::time::Duration::from_millis(5)).await;
        assert!(r.is_active());
        assert!(r.trigger().is_none());

        r.observe(ObservedUpdate::Selected(Some(2)));
        assert!(handle.await.unwrap());
        assert!(!r.is_active());

        let writes = r.device().writes.lock().unwrap();
        assert!(writes.len() > 1);
        assert!(writes.iter().all(|&(a, p)| {
            a == Action::SwitchSource { slot: 2 } && p == WritePolicy::AcceptOnSend
        }));
    }

    #[tokio::test(start_paused = true)]
    async fn idle_loop_returns_immediately() {
        let r = reconciler();
        assert!(r.run_convergence_loop().await);
        assert!(r.device().writes.lock().unwrap().is_empty());
        let stats = r.stats();
        assert_eq!(stats.runs, 1);
        assert_eq!(stats.passes, 0);
        assert!(!stats.active);
    }
}
