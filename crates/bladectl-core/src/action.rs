// ── Corrective actions ──
//
// An `Action` is one outbound keyword write produced by diffing observed
// against target state. `diff` is pure: it never touches the device.

use std::fmt;

use serde::Serialize;

use crate::state::{Field, ObservedState, TargetState};

/// A single field write that moves the device toward the target.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    /// Route the output of `slot`'s color correction to the device output.
    SwitchSource { slot: usize },
    SetHue { slot: usize, value: f64 },
    SetSaturation { slot: usize, value: f64 },
}

impl Action {
    /// Slot this action addresses.
    pub fn slot(self) -> usize {
        match self {
            Self::SwitchSource { slot }
            | Self::SetHue { slot, .. }
            | Self::SetSaturation { slot, .. } => slot,
        }
    }

    /// Field written by this action, `None` for a source switch.
    pub fn field(self) -> Option<Field> {
        match self {
            Self::SwitchSource { .. } => None,
            Self::SetHue { .. } => Some(Field::Hue),
            Self::SetSaturation { .. } => Some(Field::Saturation),
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SwitchSource { slot } => write!(f, "switch output to slot {slot}"),
            Self::SetHue { slot, value } => write!(f, "set slot {slot} hue to {value:.3}"),
            Self::SetSaturation { slot, value } => {
                write!(f, "set slot {slot} saturation to {value:.3}")
            }
        }
    }
}

/// Success criterion handed to the device link along with a write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum WritePolicy {
    /// Consider the write done as soon as it has been sent. The reconciler
    /// always uses this; its next diff is the confirmation.
    #[default]
    AcceptOnSend,
    /// Resolve only once the device reports the requested value.
    AwaitConfirmation,
}

/// Compute the corrective actions for the target-selected slot.
///
/// Order is fixed: source switch, hue, saturation. Adjustments pending on
/// other slots stay latent until that slot becomes the target selection.
pub fn diff(observed: &ObservedState, target: &TargetState, tolerance: f64) -> Vec<Action> {
    let slot = target.selected;
    let want = target.selected_adjustment();
    let have = observed.adjustments.get(slot).copied().unwrap_or_default();

    let mut actions = Vec::with_capacity(3);
    if observed.selected != Some(slot) {
        actions.push(Action::SwitchSource { slot });
    }
    if differs(have.hue, want.hue, tolerance) {
        actions.push(Action::SetHue {
            slot,
            value: want.hue,
        });
    }
    if differs(have.saturation, want.saturation, tolerance) {
        actions.push(Action::SetSaturation {
            slot,
            value: want.saturation,
        });
    }
    actions
}

#[allow(clippy::float_cmp)]
fn differs(have: f64, want: f64, tolerance: f64) -> bool {
    if tolerance == 0.0 {
        have != want
    } else {
        (have - want).abs() > tolerance
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::SourceAdjustment;
    use pretty_assertions::assert_eq;

    fn agreeing(slots: usize) -> (ObservedState, TargetState) {
        (ObservedState::placeholder(slots), TargetState::placeholder(slots))
    }

    #[test]
    fn empty_when_states_agree() {
        let (o, t) = agreeing(4);
        assert!(diff(&o, &t, 0.0).is_empty());
    }

    #[test]
    fn selection_change_emits_switch_only() {
        let (o, mut t) = agreeing(4);
        t.selected = 2;
        assert_eq!(diff(&o, &t, 0.0), vec![Action::SwitchSource { slot: 2 }]);
    }

    #[test]
    fn all_three_in_fixed_order() {
        let (mut o, mut t) = agreeing(4);
        o.selected = None;
        t.selected = 1;
        t.adjustments[1] = SourceAdjustment::new(0.2, 1.1);
        assert_eq!(
            diff(&o, &t, 0.0),
            vec![
                Action::SwitchSource { slot: 1 },
                Action::SetHue { slot: 1, value: 0.2 },
                Action::SetSaturation { slot: 1, value: 1.1 },
            ]
        );
    }

    #[test]
    fn non_selected_slots_are_latent() {
        let (o, mut t) = agreeing(4);
        t.adjustments[3] = SourceAdjustment::new(0.5, 0.5);
        assert!(diff(&o, &t, 0.0).is_empty());
        t.selected = 3;
        assert_eq!(diff(&o, &t, 0.0).len(), 3);
    }

    #[test]
    fn exact_comparison_by_default() {
        let (mut o, mut t) = agreeing(1);
        o.adjustments[0].hue = 0.300_000_000_000_000_04;
        t.adjustments[0].hue = 0.3;
        assert_eq!(diff(&o, &t, 0.0).len(), 1);
        assert!(diff(&o, &t, 1e-9).is_empty());
    }

    #[test]
    fn display_is_readable() {
        let a = Action::SetSaturation { slot: 2, value: 0.5 };
        assert_eq!(a.to_string(), "set slot 2 saturation to 0.500");
        assert_eq!(a.slot(), 2);
        assert_eq!(a.field(), Some(Field::Saturation));
    }
}
