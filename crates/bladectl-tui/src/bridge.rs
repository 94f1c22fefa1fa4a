//! State bridge: connects reconciler record streams to TUI actions.
//!
//! Runs as a background task forwarding every observed/target change as an
//! [`Action`] through the TUI's action channel.

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

use bladectl_core::{DeviceLink, Reconciler};

use crate::action::Action;

/// Forward reconciler state changes until cancelled or the channel closes.
pub async fn spawn_state_bridge<D: DeviceLink>(
    reconciler: Reconciler<D>,
    action_tx: mpsc::UnboundedSender<Action>,
    cancel: CancellationToken,
) {
    let mut observed = reconciler.subscribe_observed();
    let mut target = reconciler.subscribe_target();

    // Initial snapshots so the table has data immediately
    let _ = action_tx.send(Action::ObservedUpdated(observed.current().clone()));
    let _ = action_tx.send(Action::TargetUpdated(target.current().clone()));

    loop {
        let action = tokio::select! {
            biased;

            () = cancel.cancelled() => break,

            Some(o) = observed.changed() => Action::ObservedUpdated(o),
            Some(t) = target.changed() => Action::TargetUpdated(t),
            else => break,
        };
        if action_tx.send(action).is_err() {
            break;
        }
    }

    debug!("state bridge shut down");
}
