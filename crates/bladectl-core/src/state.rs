// ── Reconciler state records ──
//
// Two records of the same shape: `TargetState` is what the operator wants,
// `ObservedState` is what the device last confirmed. Each has exactly one
// writer (input path vs. subscription path).

use serde::Serialize;
use strum::{Display, EnumIter};
use tracing::debug;

use crate::config::ReconcilerSettings;
use crate::device::ObservedUpdate;

/// Color adjustment held for one source slot.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct SourceAdjustment {
    pub hue: f64,
    pub saturation: f64,
}

impl SourceAdjustment {
    pub fn new(hue: f64, saturation: f64) -> Self {
        Self { hue, saturation }
    }

    pub fn get(self, field: Field) -> f64 {
        match field {
            Field::Hue => self.hue,
            Field::Saturation => self.saturation,
        }
    }

    pub fn set(&mut self, field: Field, value: f64) {
        match field {
            Field::Hue => self.hue = value,
            Field::Saturation => self.saturation = value,
        }
    }
}

/// An adjustable per-slot field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display, EnumIter, Serialize)]
#[strum(serialize_all = "snake_case")]
#[serde(rename_all = "snake_case")]
pub enum Field {
    Hue,
    Saturation,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Display)]
#[strum(serialize_all = "snake_case")]
pub enum Direction {
    Increase,
    Decrease,
}

impl Direction {
    pub fn signum(self) -> f64 {
        match self {
            Self::Increase => 1.0,
            Self::Decrease => -1.0,
        }
    }
}

/// A discrete operator intent, produced by the key mapper.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Input {
    /// Make slot `i` the active source.
    Select(usize),
    /// Nudge a field of the currently selected slot by one step.
    Adjust { field: Field, direction: Direction },
}

// ── Target ───────────────────────────────────────────────────────────

/// Locally declared intent. `selected` is always a valid slot index.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TargetState {
    pub selected: usize,
    pub adjustments: Vec<SourceAdjustment>,
}

impl TargetState {
    /// Zeroed record for `slots` sources with slot 0 selected.
    pub fn placeholder(slots: usize) -> Self {
        Self {
            selected: 0,
            adjustments: vec![SourceAdjustment::default(); slots],
        }
    }

    pub fn selected_adjustment(&self) -> SourceAdjustment {
        self.adjustments
            .get(self.selected)
            .copied()
            .unwrap_or_default()
    }

    /// Apply one input. Returns `true` if the record changed.
    ///
    /// Out-of-range selections are dropped here; adjustments are clamped to
    /// the field's bounds before they are stored.
    pub fn apply(&mut self, input: Input, settings: &ReconcilerSettings) -> bool {
        match input {
            Input::Select(slot) => {
                if slot >= self.adjustments.len() {
                    debug!(slot, slots = self.adjustments.len(), "ignoring out-of-range selection");
                    return false;
                }
                let changed = self.selected != slot;
                self.selected = slot;
                changed
            }
            Input::Adjust { field, direction } => {
                let Some(adj) = self.adjustments.get_mut(self.selected) else {
                    return false;
                };
                let current = adj.get(field);
                let next = settings
                    .bounds(field)
                    .clamp(current + direction.signum() * settings.step);
                adj.set(field, next);
                next.to_bits() != current.to_bits()
            }
        }
    }
}

// ── Observed ─────────────────────────────────────────────────────────

/// Last device-confirmed values.
///
/// `selected` is `None` while the device output carries a source that is
/// not one of the reconciler's slots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ObservedState {
    pub selected: Option<usize>,
    pub adjustments: Vec<SourceAdjustment>,
}

impl ObservedState {
    /// Zeroed record for `slots` sources with slot 0 reported active.
    pub fn placeholder(slots: usize) -> Self {
        Self {
            selected: Some(0),
            adjustments: vec![SourceAdjustment::default(); slots],
        }
    }

    /// Fold one subscription callback into the record. Returns `true` if the
    /// record changed.
    pub fn apply(&mut self, update: ObservedUpdate) -> bool {
        let slots = self.adjustments.len();
        match update {
            ObservedUpdate::Selected(selected) => {
                let selected = selected.filter(|&s| s < slots);
                let changed = self.selected != selected;
                self.selected = selected;
                changed
            }
            ObservedUpdate::Hue { slot, value } => self.set_field(slot, Field::Hue, value),
            ObservedUpdate::Saturation { slot, value } => {
                self.set_field(slot, Field::Saturation, value)
            }
        }
    }

    fn set_field(&mut self, slot: usize, field: Field, value: f64) -> bool {
        let slots = self.adjustments.len();
        let Some(adj) = self.adjustments.get_mut(slot) else {
            debug!(slot, slots, %field, "ignoring update for unknown slot");
            return false;
        };
        let changed = adj.get(field).to_bits() != value.to_bits();
        adj.set(field, value);
        changed
    }
}
