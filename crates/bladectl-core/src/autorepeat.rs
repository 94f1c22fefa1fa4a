// ── Key autorepeat ──
//
// Maps key-down/key-up into reconciler inputs. Adjust keys fire once on
// key-down and then keep firing on a timer until key-up; selection keys fire
// exactly once per key-down.

use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tracing::{debug, trace};

use crate::device::DeviceLink;
use crate::reconciler::Reconciler;
use crate::state::{Direction, Field, Input};

/// Recognized key symbols.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Key {
    /// Digit key selecting a source slot.
    Select(usize),
    HueUp,
    HueDown,
    SaturationUp,
    SaturationDown,
}

impl Key {
    /// Map a typed character to a key. Digits beyond the slot table and
    /// characters outside the key map are unrecognized.
    pub fn from_char(c: char, slots: usize) -> Option<Self> {
        if let Some(digit) = c.to_digit(10) {
            let slot = usize::try_from(digit).ok()?;
            return (slot < slots).then_some(Self::Select(slot));
        }
        match c.to_ascii_lowercase() {
            'e' => Some(Self::HueUp),
            'd' => Some(Self::HueDown),
            'r' => Some(Self::SaturationUp),
            'f' => Some(Self::SaturationDown),
            _ => None,
        }
    }

    /// The input this key produces each time it fires.
    pub fn input(self) -> Input {
        let adjust = |field, direction| Input::Adjust { field, direction };
        match self {
            Self::Select(slot) => Input::Select(slot),
            Self::HueUp => adjust(Field::Hue, Direction::Increase),
            Self::HueDown => adjust(Field::Hue, Direction::Decrease),
            Self::SaturationUp => adjust(Field::Saturation, Direction::Increase),
            Self::SaturationDown => adjust(Field::Saturation, Direction::Decrease),
        }
    }

    /// Whether holding the key keeps firing.
    pub fn repeats(self) -> bool {
        !matches!(self, Self::Select(_))
    }
}

/// Per-key autorepeat timers feeding a [`Reconciler`].
///
/// Each key owns at most one timer. Redundant key-downs (terminal or OS
/// repeat) while a timer runs are no-ops; key-up on an idle key is a no-op.
pub struct KeyRepeater<D: DeviceLink> {
    reconciler: Reconciler<D>,
    interval: Duration,
    timers: Mutex<HashMap<Key, JoinHandle<()>>>,
}

impl<D: DeviceLink> KeyRepeater<D> {
    /// Build a repeater using the reconciler's autorepeat interval.
    pub fn new(reconciler: Reconciler<D>) -> Self {
        let interval = reconciler.settings().autorepeat_interval;
        Self {
            reconciler,
            interval,
            timers: Mutex::new(HashMap::new()),
        }
    }

    pub fn reconciler(&self) -> &Reconciler<D> {
        &self.reconciler
    }

    pub fn key_down(&self, key: Key) {
        trace!(?key, "key down");
        if !key.repeats() {
            self.fire_once(key);
            return;
        }

        let mut timers = self.timers();
        if timers.contains_key(&key) {
            return;
        }
        self.fire_once(key);

        let reconciler = self.reconciler.clone();
        let input = key.input();
        let period = self.interval;
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                reconciler.input(input);
            }
        });
        timers.insert(key, handle);
    }

    pub fn key_up(&self, key: Key) {
        trace!(?key, "key up");
        if let Some(handle) = self.timers().remove(&key) {
            handle.abort();
            debug!(?key, "autorepeat stopped");
        }
    }

    /// Fire a key's input once without touching timers. Used when the input
    /// source cannot report key releases.
    pub fn fire_once(&self, key: Key) {
        self.reconciler.input(key.input());
    }

    pub fn is_repeating(&self, key: Key) -> bool {
        self.timers().contains_key(&key)
    }

    /// Stop every running timer.
    pub fn release_all(&self) {
        for (key, handle) in self.timers().drain() {
            handle.abort();
            debug!(?key, "autorepeat stopped");
        }
    }

    fn timers(&self) -> MutexGuard<'_, HashMap<Key, JoinHandle<()>>> {
        self.timers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl<D: DeviceLink> Drop for KeyRepeater<D> {
    fn drop(&mut self) {
        self.release_all();
    }
}
