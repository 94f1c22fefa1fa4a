//! All possible UI actions. Actions are the sole mechanism for state mutation.

use bladectl_core::{Key, ObservedState, TargetState};

#[derive(Debug, Clone, PartialEq)]
pub enum Action {
    // ── Lifecycle ──
    Quit,
    Resize(u16, u16),
    Tick,
    Render,
    /// Terminal lost focus; held keys will never report a release.
    FocusLost,

    // ── Blade keys ──
    /// Key pressed (or pressed again by terminal repeat).
    KeyDown(Key),
    /// Key released. Only delivered when the terminal reports releases.
    KeyUp(Key),
    /// Single press on a terminal that cannot report releases.
    KeyTap(Key),

    // ── Reconciler state ──
    ObservedUpdated(ObservedState),
    TargetUpdated(TargetState),
}
