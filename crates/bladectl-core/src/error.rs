// ── Core error types ──
//
// Errors surfaced by the reconciler and by `DeviceLink` implementations.
// None of these are fatal: the convergence loop logs dispatch failures
// and lets the next diff re-issue the same action.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum CoreError {
    // ── Dispatch errors ──────────────────────────────────────────────
    #[error("Dispatch of '{action}' failed: {reason}")]
    DispatchFailed { action: String, reason: String },

    /// Permanent for this value; re-sending it fails the same way.
    #[error("Device rejected '{action}': {message}")]
    Rejected { action: String, message: String },

    #[error("Device link disconnected")]
    Disconnected,

    // ── Data errors ──────────────────────────────────────────────────
    #[error("Slot {slot} out of range (device has {slots} slots)")]
    InvalidSlot { slot: usize, slots: usize },

    // ── Configuration errors ─────────────────────────────────────────
    /// `field` names the `ReconcilerSettings` field at fault.
    #[error("Invalid reconciler setting '{field}': {message}")]
    InvalidSettings {
        field: &'static str,
        message: String,
    },
}

impl CoreError {
    /// Whether the next convergence pass may succeed where this one failed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::DispatchFailed { .. } | Self::Disconnected)
    }
}
