// ── Runtime reconciler configuration ──
//
// These types describe *how* the reconciler behaves: slot count, step
// size, field bounds and loop timing. They never touch disk; the config
// crate builds a `ReconcilerSettings` and hands it in.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::CoreError;
use crate::state::Field;

pub const DEFAULT_SLOTS: usize = 4;
pub const DEFAULT_STEP: f64 = 0.01;
pub const DEFAULT_HUE_BOUNDS: Bounds = Bounds::new(-1.0, 1.0);
pub const DEFAULT_SATURATION_BOUNDS: Bounds = Bounds::new(0.0, 2.0);
/// Pause between convergence passes.
pub const DEFAULT_PASS_DELAY: Duration = Duration::from_millis(1);
/// One nominal frame period; repeating any faster is pointless.
pub const DEFAULT_AUTOREPEAT_INTERVAL: Duration = Duration::from_millis(20);

/// Closed numeric interval used to clamp a field at mutation time.
///
/// Serialized as a two-element array (`[min, max]`) so config files can
/// write `hue_bounds = [-1.0, 1.0]`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(from = "[f64; 2]", into = "[f64; 2]")]
pub struct Bounds {
    pub min: f64,
    pub max: f64,
}

impl Bounds {
    pub const fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Clamp `value` into the interval. Never panics, even for inverted bounds.
    pub fn clamp(self, value: f64) -> f64 {
        value.min(self.max).max(self.min)
    }

    pub fn contains(self, value: f64) -> bool {
        (self.min..=self.max).contains(&value)
    }
}

impl From<[f64; 2]> for Bounds {
    fn from([min, max]: [f64; 2]) -> Self {
        Self { min, max }
    }
}

impl From<Bounds> for [f64; 2] {
    fn from(bounds: Bounds) -> Self {
        [bounds.min, bounds.max]
    }
}

/// Configuration for a single reconciler instance.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconcilerSettings {
    /// Number of selectable source slots (N).
    pub slots: usize,
    /// Amount added or removed per adjust input.
    pub step: f64,
    pub hue_bounds: Bounds,
    pub saturation_bounds: Bounds,
    /// Sleep between dispatching a pass and re-diffing.
    pub pass_delay: Duration,
    /// Period of the key autorepeat timer.
    pub autorepeat_interval: Duration,
    /// Maximum difference at which observed and target floats count as
    /// converged. `0.0` means exact equality.
    pub tolerance: f64,
}

impl Default for ReconcilerSettings {
    fn default() -> Self {
        Self {
            slots: DEFAULT_SLOTS,
            step: DEFAULT_STEP,
            hue_bounds: DEFAULT_HUE_BOUNDS,
            saturation_bounds: DEFAULT_SATURATION_BOUNDS,
            pass_delay: DEFAULT_PASS_DELAY,
            autorepeat_interval: DEFAULT_AUTOREPEAT_INTERVAL,
            tolerance: 0.0,
        }
    }
}

impl ReconcilerSettings {
    /// Bounds that apply to `field`.
    pub fn bounds(&self, field: Field) -> Bounds {
        match field {
            Field::Hue => self.hue_bounds,
            Field::Saturation => self.saturation_bounds,
        }
    }

    /// Reject settings the reconciler cannot run with.
    pub fn validate(&self) -> Result<(), CoreError> {
        let invalid = |field: &'static str, message: String| {
            Err(CoreError::InvalidSettings { field, message })
        };

        if self.slots == 0 {
            return invalid("slots", "at least one slot is required".into());
        }
        if !(self.step.is_finite() && self.step > 0.0) {
            return invalid("step", format!("must be a positive number, got {}", self.step));
        }
        for (name, b) in [
            ("hue_bounds", self.hue_bounds),
            ("saturation_bounds", self.saturation_bounds),
        ] {
            if !(b.min.is_finite() && b.max.is_finite()) || b.min > b.max {
                return invalid(
                    name,
                    format!("[{}, {}] is not a valid interval", b.min, b.max),
                );
            }
        }
        if !(self.tolerance.is_finite() && self.tolerance >= 0.0) {
            return invalid("tolerance", format!("must be >= 0, got {}", self.tolerance));
        }
        if self.autorepeat_interval.is_zero() {
            return invalid("autorepeat_interval", "must be non-zero".into());
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        assert!(ReconcilerSettings::default().validate().is_ok());
    }

    #[test]
    fn clamp_respects_both_ends() {
        let b = Bounds::new(-1.0, 1.0);
        assert!((b.clamp(1.5) - 1.0).abs() < f64::EPSILON);
        assert!((b.clamp(-3.0) + 1.0).abs() < f64::EPSILON);
        assert!((b.clamp(0.25) - 0.25).abs() < f64::EPSILON);
    }

    #[test]
    fn rejects_zero_slots() {
        let s = ReconcilerSettings {
            slots: 0,
            ..ReconcilerSettings::default()
        };
        assert!(matches!(
            s.validate(),
            Err(CoreError::InvalidSettings { field: "slots", .. })
        ));
    }

    #[test]
    fn rejects_inverted_bounds() {
        let s = ReconcilerSettings {
            saturation_bounds: Bounds::new(2.0, 0.0),
            ..ReconcilerSettings::default()
        };
        let err = s.validate().unwrap_err();
        assert!(err.to_string().contains("saturation"), "{err}");
    }

    #[test]
    fn rejects_negative_tolerance_and_step() {
        let s = ReconcilerSettings {
            tolerance: -0.1,
            ..ReconcilerSettings::default()
        };
        assert!(s.validate().is_err());

        let s = ReconcilerSettings {
            step: 0.0,
            ..ReconcilerSettings::default()
        };
        assert!(s.validate().is_err());
    }
}
